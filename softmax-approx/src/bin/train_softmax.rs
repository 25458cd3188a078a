//! Trains the softmax surrogate, saves it, then reloads the checkpoint into the encrypted
//! evaluator and reports how far its decrypted output is from the plaintext forward pass.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use softmax_approx::{
    DataGenerator, EncryptedEvaluator, EncryptedRuntime, FileCheckpointStore, ObservabilitySink,
    Initializer, ReluKind, SoftmaxApproxConfig, SurrogateNetwork, TracingSink, Trainer, TrainingContext,
    TrainingSessionLogger, TransparentRuntime,
};

const NUM_HELD_OUT_ROWS: usize = 8;

#[derive(Parser)]
#[command(name = "train-softmax")]
#[command(about = "Train an encryption-friendly softmax approximation")]
struct Cli {
    /// JSON config file; flags given on the command line override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    hidden_size: Option<usize>,

    #[arg(long)]
    num_samples: Option<usize>,

    #[arg(long)]
    input_size: Option<usize>,

    /// Recognized but unused: the whole dataset is one batch
    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    num_epochs: Option<usize>,

    #[arg(long)]
    checkpoint_path: Option<PathBuf>,

    /// Inputs are drawn uniformly from [-input_range, input_range]
    #[arg(long)]
    input_range: Option<f64>,

    /// Seed for data generation and initialization; random when absent
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, value_enum)]
    relu: Option<ReluKind>,

    #[arg(long)]
    relu_bound: Option<f64>,

    /// Weight initialization for the regressor layers
    #[arg(long, value_enum)]
    initializer: Option<Initializer>,

    /// Write per-epoch JSON logs under this directory (defaults to $TRAINING_LOG_HOME)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<SoftmaxApproxConfig> {
        let mut config = match &self.config {
            Some(path) => SoftmaxApproxConfig::from_json_file(path)?,
            None => SoftmaxApproxConfig::default(),
        };

        if let Some(v) = self.hidden_size {
            config.hidden_size = v;
        }
        if let Some(v) = self.num_samples {
            config.num_samples = v;
        }
        if let Some(v) = self.input_size {
            config.input_size = v;
        }
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.learning_rate {
            config.learning_rate = v;
        }
        if let Some(v) = self.num_epochs {
            config.num_epochs = v;
        }
        if let Some(v) = self.checkpoint_path {
            config.checkpoint_path = v;
        }
        if let Some(v) = self.input_range {
            config.input_range = v;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(v) = self.relu {
            config.relu = v;
        }
        if let Some(v) = self.relu_bound {
            config.relu_bound = v;
        }
        if let Some(v) = self.initializer {
            config.initializer = v;
        }
        if self.log_dir.is_some() {
            config.log_dir = self.log_dir;
        }

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Cli::parse().into_config()?;
    info!(?config, "starting training run");

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let training_set = DataGenerator::new(config.num_samples, config.input_size)
        .with_range(config.input_range)
        .generate(&mut rng);
    let mut network = SurrogateNetwork::with_initializer(
        config.input_size,
        config.hidden_size,
        config.relu_strategy(),
        config.initializer,
        &mut rng,
    );

    let mut sink: Box<dyn ObservabilitySink> = match &config.log_dir {
        Some(dir) => Box::new(TrainingSessionLogger::new(dir)),
        None => Box::new(TracingSink),
    };
    let mut store = FileCheckpointStore;
    let mut ctx = TrainingContext::with_new_run_id(sink.as_mut(), &mut store);

    let trainer = Trainer::from_config(&config);
    let report = trainer.train(&mut network, &training_set, &mut ctx)?;
    info!(
        run_id = %report.run_id,
        initial_loss = report.initial_loss,
        final_loss = report.final_loss(),
        "training finished"
    );
    drop(training_set);

    let saved_path = trainer
        .save(&network, &mut ctx, &config.checkpoint_path)
        .with_context(|| format!("saving checkpoint to {}", config.checkpoint_path.display()))?;

    let evaluator = EncryptedEvaluator::load_trained(TransparentRuntime::new(), &ctx, &saved_path)
        .with_context(|| format!("reloading checkpoint from {}", saved_path.display()))?;

    let held_out = DataGenerator::new(NUM_HELD_OUT_ROWS, config.input_size)
        .with_range(config.input_range)
        .generate(&mut rng);
    let plaintext = network.forward(held_out.inputs())?;

    let runtime = evaluator.runtime();
    let mut decrypted = Array2::<f64>::zeros(plaintext.dim());
    for (row, mut out) in held_out.inputs().outer_iter().zip(decrypted.outer_iter_mut()) {
        let ct = runtime.encrypt(row)?;
        let result = evaluator.forward(&ct)?;
        debug_assert_eq!(runtime.size(&result), config.input_size);
        out.assign(&runtime.decrypt(&result));
    }

    let max_parity_error = (&decrypted - &plaintext)
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    info!(
        max_parity_error,
        held_out_mse = network.mse_against_reference(held_out.inputs())?,
        "encrypted evaluation of reloaded checkpoint"
    );

    Ok(())
}
