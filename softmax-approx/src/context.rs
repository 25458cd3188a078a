use metrics::epoch_timestamp;

use crate::checkpoint::CheckpointStore;
use crate::training_log::ObservabilitySink;

/// Everything a training run talks to outside itself: the identifier its telemetry is keyed
/// by, where progress goes, and where checkpoints are written. Both capabilities are borrowed
/// so the caller can inspect them after the run.
pub struct TrainingContext<'a> {
    run_id: String,
    sink: &'a mut dyn ObservabilitySink,
    store: &'a mut dyn CheckpointStore,
}

impl<'a> TrainingContext<'a> {
    pub fn new(
        run_id: impl Into<String>,
        sink: &'a mut dyn ObservabilitySink,
        store: &'a mut dyn CheckpointStore,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            sink,
            store,
        }
    }

    /// Same as [`new`](Self::new) with a timestamp run id.
    pub fn with_new_run_id(
        sink: &'a mut dyn ObservabilitySink,
        store: &'a mut dyn CheckpointStore,
    ) -> Self {
        Self::new(new_run_id(), sink, store)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn sink_mut(&mut self) -> &mut dyn ObservabilitySink {
        &mut *self.sink
    }

    pub fn store(&self) -> &dyn CheckpointStore {
        &*self.store
    }

    pub fn store_mut(&mut self) -> &mut dyn CheckpointStore {
        &mut *self.store
    }
}

pub fn new_run_id() -> String {
    format!("run-{}", epoch_timestamp())
}
