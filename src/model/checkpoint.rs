//! Saved network weights and references to them.
//!
//! Checkpoints live in a run's net directory as `weights-epoch-<n>.json`. A saved
//! checkpoint is never modified; training always writes into a new run directory.

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::network::Network;
use crate::config::{Alphabet, DataPaths};
use crate::error::{ConfigError, ResourceError};
use crate::storage::write_atomically;

/// Run directory of the best English model.
pub const BEST_ENGLISH_RUN: &str = "20170316-180957-adam-small-learning-rate-complete-95";

/// Epoch of the best English model.
pub const BEST_ENGLISH_EPOCH: usize = 1192;

/// File name of the weights saved after `epoch`.
pub fn weights_file_name(epoch: usize) -> String {
    format!("weights-epoch-{}.json", epoch)
}

/// Identifies one pretrained model: where it is, which epoch, and what it predicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointReference {
    pub directory: PathBuf,
    pub epoch: usize,
    /// Alphabet the checkpoint's output layer was trained on.
    pub alphabet: Alphabet,
    /// Name of the configuration the checkpoint was trained with.
    pub configuration_name: String,
}

impl CheckpointReference {
    pub fn new(directory: impl Into<PathBuf>, epoch: usize, alphabet: Alphabet, configuration_name: impl Into<String>) -> Self {
        Self { directory: directory.into(), epoch, alphabet, configuration_name: configuration_name.into() }
    }

    /// The best English model under `paths`.
    pub fn best_english(paths: &DataPaths) -> Self {
        Self::new(paths.nets().join(BEST_ENGLISH_RUN), BEST_ENGLISH_EPOCH, Alphabet::english(), "English")
    }

    pub fn weights_path(&self) -> PathBuf {
        self.directory.join(weights_file_name(self.epoch))
    }
}

/// Parameters of one layer as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLayer {
    pub name: String,
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
}

/// Layer parameters after a given epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: usize,
    pub layers: Vec<StoredLayer>,
}

impl Checkpoint {
    /// Snapshot of `network`'s parameters.
    pub fn of(network: &Network, epoch: usize) -> Self {
        let layers = network
            .layers()
            .iter()
            .map(|layer| StoredLayer { name: layer.name.clone(), weights: layer.weights.clone(), biases: layer.biases.clone() })
            .collect();
        Self { epoch, layers }
    }

    /// Write into `directory`, returning the file path.
    pub fn save(&self, directory: &Path) -> Result<PathBuf, ResourceError> {
        let path = directory.join(weights_file_name(self.epoch));
        let bytes = serde_json::to_vec(self).map_err(|e| ResourceError::unwritable(&path, std::io::Error::other(e)))?;
        write_atomically(&path, &bytes)?;
        info!("Saved checkpoint for epoch {} to {}", self.epoch, path.display());
        Ok(path)
    }

    /// Read a checkpoint file.
    ///
    /// # Errors
    /// Returns [`ConfigError::CheckpointMissing`] if the file does not exist and
    /// [`ConfigError::CheckpointUnreadable`] if it cannot be read or decoded.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::CheckpointMissing(path.to_path_buf())
            } else {
                ConfigError::CheckpointUnreadable { path: path.to_path_buf(), reason: e.to_string() }
            }
        })?;

        let checkpoint: Checkpoint = serde_json::from_slice(&bytes)
            .map_err(|e| ConfigError::CheckpointUnreadable { path: path.to_path_buf(), reason: e.to_string() })?;

        debug!("Loaded checkpoint {} ({} layers)", path.display(), checkpoint.layers.len());
        Ok(checkpoint)
    }
}
