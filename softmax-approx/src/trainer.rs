use std::path::{Path, PathBuf};

use metrics::{epoch_timestamp, SimpleTimer};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::big_theta::BigTheta;
use crate::checkpoint::Checkpoint;
use crate::config::SoftmaxApproxConfig;
use crate::context::TrainingContext;
use crate::data::TrainingSet;
use crate::errors::{Result, ShapeMismatch};
use crate::network::{SurrogateNetwork, NUM_LAYERS};
use crate::optimizer::{Optimizer, OptimizerState};
use crate::training_log::{TrainingSession, TrainingUpdate};

/// What a finished run looked like: its id and the loss after each epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub run_id: String,
    pub initial_loss: f64,
    pub losses: Vec<f64>,
}

impl TrainingReport {
    /// Loss after the last epoch, or the initial loss if no epoch ran.
    pub fn final_loss(&self) -> f64 {
        self.losses.last().copied().unwrap_or(self.initial_loss)
    }
}

/// Fits a [`SurrogateNetwork`] to reference softmax labels with full-batch gradient steps.
#[derive(Debug, Clone)]
pub struct Trainer {
    optimizer: Optimizer,
    num_epochs: usize,
}

impl Trainer {
    pub fn new(optimizer: Optimizer, num_epochs: usize) -> Self {
        Self {
            optimizer,
            num_epochs,
        }
    }

    pub fn from_config(config: &SoftmaxApproxConfig) -> Self {
        Self::new(config.optimizer(), config.num_epochs)
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    pub fn num_epochs(&self) -> usize {
        self.num_epochs
    }

    pub fn train(
        &self,
        network: &mut SurrogateNetwork,
        training_set: &TrainingSet,
        ctx: &mut TrainingContext,
    ) -> Result<TrainingReport> {
        if training_set.input_size() != network.input_size() {
            return Err(ShapeMismatch::new_with_msg(
                network.input_size(),
                training_set.input_size(),
                "training rows must match the network's input_size",
            )
            .into());
        }

        let (initial_loss, _) = loss_and_gradients(network, training_set);
        info!(run_id = ctx.run_id(), initial_loss, "initial loss across entire training set");

        let session = TrainingSession {
            run_id: ctx.run_id().to_owned(),
            start_time_epoch: epoch_timestamp(),
            initial_loss,
            input_size: network.input_size(),
            hidden_size: network.hidden_size(),
            num_samples: training_set.num_samples(),
            num_epochs: self.num_epochs,
            optimizer: format!("{:?}", self.optimizer),
        };
        if let Err(e) = ctx.sink_mut().start_session(&session) {
            warn!(error = %e, "observability sink failed to start session, continuing");
        }

        let mut state = OptimizerState::new(self.optimizer.clone(), network.parameters());
        let mut losses = Vec::with_capacity(self.num_epochs);

        for epoch in 0..self.num_epochs {
            let mut t_epoch = SimpleTimer::start_new("t_epoch");

            // gradients are rebuilt from zero on every pass
            let (loss, gradients) = loss_and_gradients(network, training_set);
            state.step(network.parameters_mut(), &gradients);

            let elapsed_ms = t_epoch
                .stop()
                .and_then(|_| t_epoch.get_total_milliseconds())
                .unwrap_or(0);
            info!(epoch, loss, elapsed_ms, "finished epoch");

            let update = TrainingUpdate {
                run_id: ctx.run_id().to_owned(),
                epoch,
                loss,
                elapsed_ms,
            };
            if let Err(e) = ctx.sink_mut().record(&update) {
                warn!(epoch, error = %e, "observability sink failed, continuing");
            }

            losses.push(loss);
        }

        info!(
            epochs = self.num_epochs,
            final_loss = losses.last().copied().unwrap_or(initial_loss),
            "stopping after configured epochs"
        );

        Ok(TrainingReport {
            run_id: ctx.run_id().to_owned(),
            initial_loss,
            losses,
        })
    }

    /// Writes the network's parameters through the context's store and returns where they
    /// landed.
    pub fn save(
        &self,
        network: &SurrogateNetwork,
        ctx: &mut TrainingContext,
        path: &Path,
    ) -> Result<PathBuf> {
        let checkpoint = Checkpoint::from_network(network);
        Ok(ctx.store_mut().save(&checkpoint, path)?)
    }
}

/// Mean squared error of the network over the whole set, and its gradient with respect to
/// every parameter.
///
/// With `N` rows of width `D`, proxy `e`, correction `c_i` and labels `y`, the loss is
/// `sum_ij (e_ij c_i - y_ij)^2 / (N D)`, so each row contributes
/// `dL/dc_i = 2 / (N D) * sum_j (e_ij c_i - y_ij) e_ij` to backprop through the regressor.
pub fn loss_and_gradients(network: &SurrogateNetwork, training_set: &TrainingSet) -> (f64, BigTheta) {
    let inputs = training_set.inputs();
    let labels = training_set.labels();
    let num_elements = inputs.len();

    if num_elements == 0 {
        return (0.0, network.parameters().zeros_like());
    }
    let scale = 2.0 / num_elements as f64;

    let zero = || (network.parameters().zeros_like(), 0.0);

    let (gradients, squared_error_sum) = (0..inputs.nrows())
        .into_par_iter()
        .fold(zero, |(mut gradients, squared_error_sum), row_index| {
            let (e, intermediates) = network.forward_row(inputs.row(row_index));
            let correction = intermediates[NUM_LAYERS - 1].activation_v[0];

            let residual = &e * correction - &labels.row(row_index);
            let d_correction = scale * residual.dot(&e);
            network.accumulate_gradients(&intermediates, d_correction, &mut gradients);

            (gradients, squared_error_sum + residual.dot(&residual))
        })
        .reduce(zero, |(mut a, a_sum), (b, b_sum)| {
            a.add_in_place(&b);
            (a, a_sum + b_sum)
        });

    (squared_error_sum / num_elements as f64, gradients)
}
