use std::path::PathBuf;
use thiserror::Error;

use crate::activation::ReluStrategy;

#[derive(Error, Debug)]
pub enum SoftmaxApproxError {
    #[error("Softmax Approx Error: {0}")]
    ShapeMismatch(#[from] ShapeMismatch),
    #[error("Softmax Approx Error: {0}")]
    Storage(#[from] StorageError),
    #[error("Softmax Approx Error: {0}")]
    Capability(#[from] CapabilityError),
    #[error("Softmax Approx Error: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// An input whose rank or dimension does not match what the network was built for.
#[derive(Error, Debug, PartialEq)]
#[error("ShapeMismatch: expected {expected}, got {actual} ({msg})")]
pub struct ShapeMismatch {
    pub expected: usize,
    pub actual: usize,
    pub msg: String,
}

impl ShapeMismatch {
    pub fn new_with_msg(expected: usize, actual: usize, msg: &str) -> Self {
        Self {
            expected,
            actual,
            msg: msg.to_owned(),
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("checkpoint not found: {0:?}")]
    NotFound(PathBuf),
    #[error("checkpoint io failed for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint at {path:?} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("checkpoint does not describe a 1 -> {hidden_size} -> {hidden_size} -> 1 network: {msg}")]
    ArchitectureMismatch { hidden_size: usize, msg: String },
    #[error("checkpoint was trained with {trained:?} but the evaluator was given {injected:?}")]
    ReluMismatch {
        trained: ReluStrategy,
        injected: ReluStrategy,
    },
}

/// Failures of the observability sink. The trainer logs these and carries on.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("training log io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("training log serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("training log directory has not been created; call create_training_log_directory() first")]
    NotInitialized,
}

/// Failures of an injected encrypted-vector capability.
#[derive(Error, Debug, PartialEq)]
pub enum CapabilityError {
    #[error("operation `{op}` is not supported by this runtime")]
    Unsupported { op: &'static str },
    #[error("operation `{op}` expected length {expected}, got {actual}")]
    LengthMismatch {
        op: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("operation `{op}` failed: {reason}")]
    Runtime { op: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, SoftmaxApproxError>;
