//! Batches of cached spectrograms for training, testing and preview.

use std::sync::Arc;

use super::FeatureExtractor;
use super::cache::{CacheFillReport, SpectrogramCache};
use super::corpus::Corpus;
use super::example::{Batch, LabeledExample, LabeledSpectrogram};
use crate::error::Result;

/// Default number of examples per batch.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Pairs a corpus with its spectrogram cache.
///
/// Construction is free of I/O; the cache directory is only touched by the
/// batch and fill operations.
#[derive(Clone)]
pub struct BatchGenerator {
    corpus: Arc<Corpus>,
    cache: SpectrogramCache,
    batch_size: usize,
}

impl BatchGenerator {
    pub fn new(corpus: Arc<Corpus>, cache: SpectrogramCache, batch_size: usize) -> Self {
        Self { corpus, cache, batch_size: batch_size.max(1) }
    }

    pub fn with_extractor(corpus: Arc<Corpus>, cache_directory: impl Into<std::path::PathBuf>, extractor: Arc<dyn FeatureExtractor>) -> Self {
        Self::new(corpus, SpectrogramCache::new(cache_directory, extractor), DEFAULT_BATCH_SIZE)
    }

    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    pub fn cache(&self) -> &SpectrogramCache {
        &self.cache
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Compute spectrograms for every training and test example not yet cached.
    pub fn fill_cache(&self) -> Result<CacheFillReport> {
        self.cache.fill(self.corpus.examples())
    }

    /// The `index`-th training batch, cycling through the training examples.
    ///
    /// Returns an empty batch when the corpus has no training examples.
    pub fn training_batch(&self, index: usize) -> Result<Batch> {
        let examples = self.corpus.training_examples();
        if examples.is_empty() {
            return Ok(Batch::default());
        }

        let len = examples.len();
        let start = ((index % len) * (self.batch_size % len)) % len;
        let selected = (0..self.batch_size.min(len)).map(|offset| &examples[(start + offset) % len]);
        self.load_batch(selected)
    }

    /// All test examples in batches of at most `batch_size`.
    pub fn test_batches(&self) -> Result<Vec<Batch>> {
        self.corpus.test_examples().chunks(self.batch_size).map(|chunk| self.load_batch(chunk.iter())).collect()
    }

    /// First batch of test examples, falling back to training examples.
    pub fn preview_batch(&self) -> Result<Batch> {
        let source = if self.corpus.test_examples().is_empty() { self.corpus.training_examples() } else { self.corpus.test_examples() };
        self.load_batch(source.iter().take(self.batch_size))
    }

    fn load_batch<'a>(&self, examples: impl Iterator<Item = &'a LabeledExample>) -> Result<Batch> {
        let examples = examples
            .map(|example| {
                Ok(LabeledSpectrogram { id: example.id.clone(), label: example.label.clone(), spectrogram: self.cache.get(example)? })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Batch { examples })
    }
}
