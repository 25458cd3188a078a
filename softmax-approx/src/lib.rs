//! Trains a small network that approximates softmax with operations an encryption scheme can
//! evaluate, and replays its forward pass over encrypted rows.
//!
//! `S(x)_i = e_i * T(sum_j e_j)` with `e = relu((x / 2 + 1)^3)` and `T` a `1 -> H -> H -> 1`
//! regressor fitted against the exact softmax.

pub mod activation;
pub use activation::{Activator, PolynomialReLU, ReLU, ReluStrategy};

pub mod approx_formula;
pub use approx_formula::{exp_proxy, exp_proxy_with, row_statistic};

pub mod reference_softmax;
pub use reference_softmax::softmax_rows;

pub mod initializer;
pub use initializer::Initializer;

pub mod big_theta;
pub use big_theta::BigTheta;

pub mod cost;

pub mod network;
pub use network::SurrogateNetwork;

pub mod data;
pub use data::{DataGenerator, TrainingSet};

pub mod optimizer;
pub use optimizer::{AdamConfig, Optimizer};

pub mod training_log;
pub use training_log::{
    MemorySink, NullSink, ObservabilitySink, TracingSink, TrainingSessionLogger,
};

pub mod checkpoint;
pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};

pub mod context;
pub use context::TrainingContext;

pub mod trainer;
pub use trainer::{Trainer, TrainingReport};

pub mod encrypted;
pub use encrypted::{EncryptedEvaluator, EncryptedRelu, EncryptedRuntime, TransparentRuntime};

pub mod config;
pub use config::{ReluKind, SoftmaxApproxConfig};

pub mod errors;
pub use errors::{Result, SoftmaxApproxError};

type LayerIndex = usize;
