use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};
use tracing::info;

use crate::activation::ReluStrategy;
use crate::big_theta::BigTheta;
use crate::errors::StorageError;
use crate::network::SurrogateNetwork;

pub const DEFAULT_CHECKPOINT_PATH: &str = "output/softmax_trained.model";

/// Snapshot of a trained surrogate: everything needed to rebuild it, plaintext or encrypted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub input_size: usize,
    pub relu: ReluStrategy,
    pub parameters: BigTheta,
}

impl Checkpoint {
    pub fn from_network(network: &SurrogateNetwork) -> Self {
        Self {
            input_size: network.input_size(),
            relu: *network.relu(),
            parameters: network.parameters().clone(),
        }
    }

    pub fn hidden_size(&self) -> usize {
        self.parameters.sizes.get(1).copied().unwrap_or(0)
    }

    pub fn into_network(self) -> Result<SurrogateNetwork, StorageError> {
        SurrogateNetwork::from_parameters(self.input_size, self.relu, self.parameters)
    }

    fn from_json(path: &Path, json: &str) -> Result<Self, StorageError> {
        let checkpoint: Checkpoint =
            serde_json::from_str(json).map_err(|source| StorageError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;
        // reject anything that would not rebuild into a surrogate network
        checkpoint.clone().into_network()?;
        Ok(checkpoint)
    }

    fn to_json(&self, path: &Path) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|source| StorageError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Path-addressed persistence for checkpoints.
pub trait CheckpointStore {
    /// Writes `checkpoint` to `path` and returns the location it was written to.
    fn save(&mut self, checkpoint: &Checkpoint, path: &Path) -> Result<PathBuf, StorageError>;

    fn load(&self, path: &Path) -> Result<Checkpoint, StorageError>;
}

/// Stores checkpoints as JSON files, creating parent directories as needed.
#[derive(Debug, Default)]
pub struct FileCheckpointStore;

impl CheckpointStore for FileCheckpointStore {
    fn save(&mut self, checkpoint: &Checkpoint, path: &Path) -> Result<PathBuf, StorageError> {
        let io_err = |source: io::Error| StorageError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, checkpoint.to_json(path)?).map_err(io_err)?;

        info!(path = %path.display(), "model saved");
        Ok(path.to_path_buf())
    }

    fn load(&self, path: &Path) -> Result<Checkpoint, StorageError> {
        let json = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                StorageError::NotFound(path.to_path_buf())
            } else {
                StorageError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Checkpoint::from_json(path, &json)
    }
}

/// Keeps serialized checkpoints in memory, keyed by path.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    entries: HashMap<PathBuf, String>,
}

impl InMemoryCheckpointStore {
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Overwrites the stored bytes for `path`. Handy for simulating corruption.
    pub fn put_raw(&mut self, path: &Path, raw: impl Into<String>) {
        self.entries.insert(path.to_path_buf(), raw.into());
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn save(&mut self, checkpoint: &Checkpoint, path: &Path) -> Result<PathBuf, StorageError> {
        let json = checkpoint.to_json(path)?;
        self.entries.insert(path.to_path_buf(), json);
        Ok(path.to_path_buf())
    }

    fn load(&self, path: &Path) -> Result<Checkpoint, StorageError> {
        let json = self
            .entries
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))?;
        Checkpoint::from_json(path, json)
    }
}
