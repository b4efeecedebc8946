//! Acoustic model parameters, checkpoint transfer and inference.
//!
//! The crate owns layer parameters and their provenance; computing with them is
//! delegated to a [`Backend`].

mod checkpoint;
mod decode;
mod mapping;
mod network;
mod resolver;

use std::fmt;
use std::sync::Arc;

use ndarray::{Array2, ArrayView2};
use tracing::debug;

use crate::config::OutputSymbol;
use crate::corpus::{Batch, BatchGenerator};
use crate::error::Result;
use crate::training::TrainingRun;

pub use checkpoint::{BEST_ENGLISH_EPOCH, BEST_ENGLISH_RUN, Checkpoint, CheckpointReference, StoredLayer, weights_file_name};
pub use decode::{edit_distance, greedy_ctc_decode};
pub use mapping::{AlphabetMapping, ColumnTransfer};
pub use network::{Architecture, Layer, MEL_FREQUENCY_COUNT, Network};
pub use resolver::{ModelResolver, ResolveOptions, ResolvedNetwork};

/// Forward pass, loss and optimizer loop of the acoustic network.
pub trait Backend: Send + Sync {
    /// Per-frame output scores of shape `(frames, output width)` for one spectrogram.
    fn forward(&self, network: &Network, spectrogram: ArrayView2<'_, f32>) -> anyhow::Result<Array2<f32>>;

    /// Average CTC loss over `batches`.
    fn loss(&self, network: &Network, batches: &[Batch]) -> anyhow::Result<f32>;

    /// Run the epoch loop for `run`, updating only trainable layers.
    ///
    /// Implementations write metric logs into `run.log_directory` and checkpoints
    /// into `run.net_directory`.
    fn train(&self, network: &mut Network, batches: &BatchGenerator, run: &TrainingRun) -> anyhow::Result<()>;
}

/// N-gram language model fused into decoding.
pub trait LanguageModel: Send + Sync {
    fn decode(&self, scores: ArrayView2<'_, f32>, symbols: &[OutputSymbol]) -> anyhow::Result<String>;
}

/// A network bound to the backend that computes with it.
#[derive(Clone)]
pub struct Model {
    network: Network,
    backend: Arc<dyn Backend>,
    language_model: Option<Arc<dyn LanguageModel>>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("alphabet", &self.network.alphabet().to_string())
            .field("layers", &self.network.layer_count())
            .field("frozen", &self.network.frozen_layer_count())
            .field("language_model", &self.language_model.is_some())
            .finish()
    }
}

/// One example's label next to the model's transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectationVsPrediction {
    pub id: String,
    pub expected: Option<String>,
    pub predicted: String,
}

impl ExpectationVsPrediction {
    /// Character edit distance divided by the label length, if the example is labeled.
    pub fn letter_error_rate(&self) -> Option<f32> {
        let expected = self.expected.as_deref()?;
        let length = expected.chars().count().max(1);
        Some(edit_distance(expected, &self.predicted) as f32 / length as f32)
    }
}

impl fmt::Display for ExpectationVsPrediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.expected, self.letter_error_rate()) {
            (Some(expected), Some(rate)) => write!(f, "{}: \"{}\" -> \"{}\" (LER {:.2})", self.id, expected, self.predicted, rate),
            _ => write!(f, "{}: \"{}\"", self.id, self.predicted),
        }
    }
}

impl Model {
    pub fn new(network: Network, backend: Arc<dyn Backend>) -> Self {
        Self { network, backend, language_model: None }
    }

    /// Decode with `language_model` instead of greedy CTC.
    pub fn with_language_model(mut self, language_model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(language_model);
        self
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn has_language_model(&self) -> bool {
        self.language_model.is_some()
    }

    /// Transcribe one spectrogram.
    ///
    /// # Errors
    /// Fails if the backend fails or returns scores whose width differs from the
    /// network's output width.
    pub fn predict_single(&self, spectrogram: ArrayView2<'_, f32>) -> Result<String> {
        let scores = self.backend.forward(&self.network, spectrogram)?;
        let symbols = self.network.output_symbols();
        if scores.ncols() != symbols.len() {
            return Err(anyhow::anyhow!("backend returned {} output columns, network has {}", scores.ncols(), symbols.len()).into());
        }

        let text = match &self.language_model {
            Some(language_model) => language_model.decode(scores.view(), &symbols)?,
            None => greedy_ctc_decode(scores.view(), &symbols),
        };
        debug!("Decoded {} frames into {} characters", scores.nrows(), text.chars().count());
        Ok(text)
    }

    /// Transcribe every example of a batch, in order.
    pub fn predict(&self, batch: &Batch) -> Result<Vec<String>> {
        batch.examples.iter().map(|example| self.predict_single(example.spectrogram.view())).collect()
    }

    /// Average loss over `batches`.
    pub fn loss(&self, batches: &[Batch]) -> Result<f32> {
        Ok(self.backend.loss(&self.network, batches)?)
    }

    /// Train the network in place for `run`.
    pub fn train(&mut self, batches: &BatchGenerator, run: &TrainingRun) -> Result<()> {
        self.backend.train(&mut self.network, batches, run)?;
        Ok(())
    }

    /// Labels and predictions for every example of `batch`.
    pub fn expectations_vs_predictions(&self, batch: &Batch) -> Result<Vec<ExpectationVsPrediction>> {
        batch
            .examples
            .iter()
            .map(|example| {
                Ok(ExpectationVsPrediction {
                    id: example.id.clone(),
                    expected: example.label.clone(),
                    predicted: self.predict_single(example.spectrogram.view())?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Stub collaborators shared by tests across modules.

    use parking_lot::Mutex;

    use super::*;

    /// Backend whose scores pick the output column given by each frame's first value.
    #[derive(Default)]
    pub struct ScriptedBackend {
        pub trained: Mutex<Vec<String>>,
    }

    impl Backend for ScriptedBackend {
        fn forward(&self, network: &Network, spectrogram: ArrayView2<'_, f32>) -> anyhow::Result<Array2<f32>> {
            let width = network.output_width();
            Ok(Array2::from_shape_fn((spectrogram.nrows(), width), |(t, j)| if spectrogram[[t, 0]] as usize == j { 1.0 } else { 0.0 }))
        }

        fn loss(&self, _network: &Network, batches: &[Batch]) -> anyhow::Result<f32> {
            Ok(batches.iter().map(Batch::len).sum::<usize>() as f32)
        }

        fn train(&self, _network: &mut Network, _batches: &BatchGenerator, run: &TrainingRun) -> anyhow::Result<()> {
            self.trained.lock().push(run.identity.to_string());
            Ok(())
        }
    }
}
