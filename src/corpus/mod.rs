//! Corpus, spectrogram cache and batch generation.
//!
//! Spectrogram computation itself is provided by a [`FeatureExtractor`].

mod batch;
mod cache;
#[allow(clippy::module_inception)]
mod corpus;
mod example;

use ndarray::Array2;

pub use batch::{BatchGenerator, DEFAULT_BATCH_SIZE};
pub use cache::{CacheFillReport, SpectrogramCache};
pub use corpus::{Corpus, CorpusSummary, SplitSummary};
pub use example::{Batch, LabeledExample, LabeledSpectrogram};

/// Computes model input features for an example.
pub trait FeatureExtractor: Send + Sync {
    /// Z-normalized spectrogram of shape `(frames, frequency bins)`.
    fn spectrogram(&self, example: &LabeledExample) -> anyhow::Result<Array2<f32>>;
}
