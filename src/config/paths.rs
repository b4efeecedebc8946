//! Data directory layout shared by every workflow.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;
use tracing::info;

use crate::training::{format_timestamp, now};

/// Base data directory and the subdirectories derived from it.
///
/// ```text
/// <base>/logs/<run-name>/
/// <base>/nets/<run-name>/
/// <base>/recordings/<name>.wav
/// <base>/corpus/<config-name>/corpus.csv
/// <base>/spectrogram-cache/<config-name>/
/// <base>/kenlm/<language>/
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPaths {
    base: PathBuf,
}

impl DataPaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Training metric logs, one subdirectory per run.
    pub fn tensorboard_logs(&self) -> PathBuf {
        self.base.join("logs")
    }

    /// Model checkpoints, one subdirectory per run.
    pub fn nets(&self) -> PathBuf {
        self.base.join("nets")
    }

    pub fn recordings(&self) -> PathBuf {
        self.base.join("recordings")
    }

    /// `<recordings>/recording-<YYYYMMDD-HHMMSS>.wav`
    pub fn recording_path(&self, timestamp: PrimitiveDateTime) -> crate::Result<PathBuf> {
        let timestamp = format_timestamp(timestamp).map_err(anyhow::Error::from)?;
        Ok(self.recordings().join(format!("recording-{}.wav", timestamp)))
    }

    /// [`DataPaths::recording_path`] for the current local time.
    pub fn new_recording_path(&self) -> crate::Result<PathBuf> {
        self.recording_path(now())
    }

    pub fn corpus(&self) -> PathBuf {
        self.base.join("corpus")
    }

    pub fn spectrogram_cache(&self) -> PathBuf {
        self.base.join("spectrogram-cache")
    }

    pub fn kenlm(&self) -> PathBuf {
        self.base.join("kenlm")
    }

    /// Language-model directory for one language (e.g. `english`).
    pub fn kenlm_directory(&self, language: &str) -> PathBuf {
        self.kenlm().join(language)
    }

    /// Log the resolved layout.
    pub fn log_layout(&self) {
        info!("Data layout:");
        info!("  Base: {}", self.base.display());
        info!("  Logs: {}", self.tensorboard_logs().display());
        info!("  Nets: {}", self.nets().display());
        info!("  Recordings: {}", self.recordings().display());
        info!("  Corpus: {}", self.corpus().display());
        info!("  Spectrogram cache: {}", self.spectrogram_cache().display());
        info!("  KenLM: {}", self.kenlm().display());
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::new(default_base_dir())
    }
}

/// Get the default data directory (~/speechless-data).
pub fn default_base_dir() -> PathBuf {
    if let Some(home_dir) = dirs::home_dir() {
        home_dir.join("speechless-data")
    } else {
        PathBuf::from("speechless-data")
    }
}
