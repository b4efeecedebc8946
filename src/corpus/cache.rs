//! Content-addressed spectrogram cache.
//!
//! Each example's spectrogram is stored as `<cache>/<example id>.json`. Entries are
//! written through a temporary file and renamed into place, so a fill that is
//! interrupted or runs concurrently with another never leaves a partial entry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::Array2;
use tracing::{debug, info};

use super::FeatureExtractor;
use super::example::LabeledExample;
use crate::error::{DataError, Result};
use crate::storage::{ensure_directory, write_atomically};

/// Outcome of a cache fill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheFillReport {
    pub computed: usize,
    pub skipped: usize,
}

/// Spectrogram store keyed by example id.
#[derive(Clone)]
pub struct SpectrogramCache {
    directory: PathBuf,
    extractor: Arc<dyn FeatureExtractor>,
}

impl SpectrogramCache {
    /// Create a cache handle. Nothing is read or written until an entry is requested.
    pub fn new(directory: impl Into<PathBuf>, extractor: Arc<dyn FeatureExtractor>) -> Self {
        Self { directory: directory.into(), extractor }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Location of the entry for `id`.
    ///
    /// # Errors
    /// Ids are used verbatim as file names and must consist of ASCII letters,
    /// digits, `-`, `_` or `.` without a leading dot.
    pub fn entry_path(&self, id: &str) -> std::result::Result<PathBuf, DataError> {
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(DataError::InvalidExampleId(id.to_string()));
        }
        Ok(self.directory.join(format!("{}.json", id)))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entry_path(id).map(|path| path.is_file()).unwrap_or(false)
    }

    /// Spectrogram for `example`, computed and stored on first request.
    pub fn get(&self, example: &LabeledExample) -> Result<Array2<f32>> {
        let path = self.entry_path(&example.id)?;
        if path.is_file() {
            return Ok(read_entry(&path)?);
        }
        self.compute_and_store(example, &path)
    }

    /// Compute every missing entry; present entries are skipped without being read.
    pub fn fill<'a>(&self, examples: impl IntoIterator<Item = &'a LabeledExample>) -> Result<CacheFillReport> {
        ensure_directory(&self.directory)?;

        let mut report = CacheFillReport::default();
        for example in examples {
            let path = self.entry_path(&example.id)?;
            if path.is_file() {
                report.skipped += 1;
                continue;
            }
            self.compute_and_store(example, &path)?;
            report.computed += 1;
        }

        info!(
            "Spectrogram cache {}: {} computed, {} already present",
            self.directory.display(),
            report.computed,
            report.skipped
        );
        Ok(report)
    }

    fn compute_and_store(&self, example: &LabeledExample, path: &Path) -> Result<Array2<f32>> {
        debug!("Computing spectrogram for {}", example.id);
        let spectrogram = self
            .extractor
            .spectrogram(example)
            .map_err(|source| DataError::Extraction { id: example.id.clone(), source })?;

        let bytes = serde_json::to_vec(&spectrogram).map_err(|source| DataError::CorruptEntry { path: path.to_path_buf(), source })?;
        write_atomically(path, &bytes)?;
        Ok(spectrogram)
    }
}

fn read_entry(path: &Path) -> std::result::Result<Array2<f32>, DataError> {
    let bytes = std::fs::read(path).map_err(|e| DataError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|source| DataError::CorruptEntry { path: path.to_path_buf(), source })
}
