//! Observability sinks for training progress.
//!
//! The trainer reports one [`TrainingUpdate`] per epoch. Sinks are best-effort: any error they
//! return is logged by the trainer and otherwise ignored.

use std::fs;
use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};
use tracing::info;

use crate::errors::SinkError;

pub const TRAINING_LOG_HOME_ENV: &str = "TRAINING_LOG_HOME";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrainingSession {
    pub run_id: String,
    pub start_time_epoch: u128,
    pub initial_loss: f64,
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_samples: usize,
    pub num_epochs: usize,
    pub optimizer: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrainingUpdate {
    pub run_id: String,
    pub epoch: usize,
    pub loss: f64,
    pub elapsed_ms: u128,
}

/// Write-only destination for the `(epoch, loss)` series of a run.
pub trait ObservabilitySink {
    fn start_session(&mut self, _session: &TrainingSession) -> Result<(), SinkError> {
        Ok(())
    }

    fn record(&mut self, update: &TrainingUpdate) -> Result<(), SinkError>;
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl ObservabilitySink for NullSink {
    fn record(&mut self, _update: &TrainingUpdate) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Emits each update as a structured `tracing` event.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn start_session(&mut self, session: &TrainingSession) -> Result<(), SinkError> {
        info!(
            run_id = %session.run_id,
            initial_loss = session.initial_loss,
            optimizer = %session.optimizer,
            "training session started"
        );
        Ok(())
    }

    fn record(&mut self, update: &TrainingUpdate) -> Result<(), SinkError> {
        info!(
            run_id = %update.run_id,
            epoch = update.epoch,
            loss = update.loss,
            "loss"
        );
        Ok(())
    }
}

/// Keeps every update in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub session: Option<TrainingSession>,
    pub updates: Vec<TrainingUpdate>,
}

impl ObservabilitySink for MemorySink {
    fn start_session(&mut self, session: &TrainingSession) -> Result<(), SinkError> {
        self.session = Some(session.clone());
        Ok(())
    }

    fn record(&mut self, update: &TrainingUpdate) -> Result<(), SinkError> {
        self.updates.push(update.clone());
        Ok(())
    }
}

/// Writes `session-info.json` and one `epoch-N.json` per update into
/// `<training log home>/<run id>/`.
pub struct TrainingSessionLogger {
    training_log_home: PathBuf,
    full_session_output_directory: Option<PathBuf>,
}

impl TrainingSessionLogger {
    pub fn new(training_log_home: impl Into<PathBuf>) -> Self {
        Self {
            training_log_home: training_log_home.into(),
            full_session_output_directory: None,
        }
    }

    pub fn session_directory(&self) -> Option<&Path> {
        self.full_session_output_directory.as_deref()
    }

    pub fn create_training_log_directory(&mut self, run_id: &str) -> Result<(), SinkError> {
        let session_dir = self.training_log_home.join(run_id);
        fs::create_dir_all(&session_dir)?;
        self.full_session_output_directory = Some(session_dir);
        Ok(())
    }

    fn write_json<T: serde::Serialize>(&self, file_name: &str, value: &T) -> Result<(), SinkError> {
        let output_dir = self
            .full_session_output_directory
            .as_ref()
            .ok_or(SinkError::NotInitialized)?;
        let serialized = serde_json::to_string_pretty(value)?;
        fs::write(output_dir.join(file_name), serialized)?;
        Ok(())
    }
}

impl ObservabilitySink for TrainingSessionLogger {
    fn start_session(&mut self, session: &TrainingSession) -> Result<(), SinkError> {
        self.create_training_log_directory(&session.run_id)?;
        self.write_json("session-info.json", session)
    }

    fn record(&mut self, update: &TrainingUpdate) -> Result<(), SinkError> {
        self.write_json(&format!("epoch-{}.json", update.epoch), update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> TrainingSession {
        TrainingSession {
            run_id: "run-1".to_owned(),
            start_time_epoch: 1,
            initial_loss: 0.5,
            input_size: 4,
            hidden_size: 8,
            num_samples: 10,
            num_epochs: 2,
            optimizer: "adam".to_owned(),
        }
    }

    fn update(epoch: usize) -> TrainingUpdate {
        TrainingUpdate {
            run_id: "run-1".to_owned(),
            epoch,
            loss: 0.25,
            elapsed_ms: 3,
        }
    }

    #[test]
    fn session_logger_writes_one_file_per_epoch() {
        let home = tempfile::tempdir().unwrap();
        let mut logger = TrainingSessionLogger::new(home.path());
        logger.start_session(&session()).unwrap();
        logger.record(&update(0)).unwrap();
        logger.record(&update(1)).unwrap();

        let dir = home.path().join("run-1");
        assert_eq!(logger.session_directory(), Some(dir.as_path()));
        assert!(dir.join("session-info.json").exists());

        let written: TrainingUpdate =
            serde_json::from_str(&fs::read_to_string(dir.join("epoch-1.json")).unwrap()).unwrap();
        assert_eq!(written, update(1));
    }

    #[test]
    fn session_logger_requires_directory() {
        let home = tempfile::tempdir().unwrap();
        let mut logger = TrainingSessionLogger::new(home.path());
        assert!(matches!(logger.record(&update(0)), Err(SinkError::NotInitialized)));
    }

    #[test]
    fn memory_sink_keeps_updates() {
        let mut sink = MemorySink::default();
        sink.start_session(&session()).unwrap();
        sink.record(&update(0)).unwrap();
        assert_eq!(sink.session, Some(session()));
        assert_eq!(sink.updates, vec![update(0)]);
    }
}
