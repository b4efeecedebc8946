//! Interactive prediction with the best pretrained model.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::ArrayView2;
use once_cell::unsync::OnceCell;
use tracing::{info, warn};

use super::recorder::{CaptureEvent, CaptureOptions, CaptureOutcome, Recorder};
use crate::config::{Alphabet, DataPaths};
use crate::corpus::{FeatureExtractor, LabeledExample};
use crate::error::{DataError, Result};
use crate::model::{Backend, LanguageModel, Model, ModelResolver, ResolveOptions};
use crate::storage::ensure_directory;

/// Recordings predicted by [`PredictionDemo::predict_reference_recordings`], with descriptions.
pub const REFERENCE_RECORDINGS: [(&str, &str); 5] = [
    ("6930-75918-0000.flac", "Sample labeled \"concord returned to its place amidst the tents\""),
    ("recording-20170310-135534.wav", "Recorded playback of the same sample"),
    ("recording-20170310-135144.wav", "Recording of me saying the same sentence"),
    ("recording-20170314-224329.wav", "Recording of me saying \"I just wrote a speech recognizer\""),
    ("bad-quality-louis.wav", "Louis' rerecording of worse quality"),
];

/// Saves a picture of an example's spectrogram.
pub trait SpectrogramPlotter: Send + Sync {
    /// Write the plot into `directory`, returning the file written.
    fn save_spectrogram(&self, example: &LabeledExample, spectrogram: ArrayView2<'_, f32>, directory: &Path) -> anyhow::Result<PathBuf>;
}

/// One transcription, printed as `<description>: "<text>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    pub description: String,
    pub audio_file: PathBuf,
    pub transcription: String,
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: \"{}\"", self.description, self.transcription)
    }
}

/// Predicts recordings with a model resolved once on first use.
pub struct PredictionDemo {
    paths: DataPaths,
    resolver: ModelResolver,
    alphabet: Alphabet,
    backend: Arc<dyn Backend>,
    extractor: Arc<dyn FeatureExtractor>,
    language_model: Option<Arc<dyn LanguageModel>>,
    plotter: Option<Arc<dyn SpectrogramPlotter>>,
    model: OnceCell<Model>,
}

impl PredictionDemo {
    /// Demo predicting over the alphabet the resolver's checkpoint was trained on.
    pub fn new(paths: DataPaths, resolver: ModelResolver, backend: Arc<dyn Backend>, extractor: Arc<dyn FeatureExtractor>) -> Self {
        let alphabet = resolver.checkpoint().alphabet.clone();
        Self { paths, resolver, alphabet, backend, extractor, language_model: None, plotter: None, model: OnceCell::new() }
    }

    pub fn with_language_model(mut self, language_model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(language_model);
        self.model = OnceCell::new();
        self
    }

    pub fn with_plotter(mut self, plotter: Arc<dyn SpectrogramPlotter>) -> Self {
        self.plotter = Some(plotter);
        self
    }

    /// The resolved model; the checkpoint is read on the first call only.
    pub fn model(&self) -> Result<&Model> {
        self.model.get_or_try_init(|| {
            let options = ResolveOptions { frozen_layer_count: 0, language_model: self.language_model.clone() };
            self.resolver.resolve(&self.alphabet, options, Arc::clone(&self.backend))
        })
    }

    /// Transcribe `example`, described by `description` or else its id.
    pub fn predict_example(&self, example: &LabeledExample, description: Option<&str>) -> Result<Prediction> {
        let spectrogram = self.spectrogram(example)?;
        let transcription = self.model()?.predict_single(spectrogram.view())?;
        Ok(Prediction { description: description.unwrap_or(&example.id).to_string(), audio_file: example.audio_file.clone(), transcription })
    }

    /// Transcribe an audio file.
    pub fn predict_file(&self, path: &Path, description: Option<&str>) -> Result<Prediction> {
        if !path.is_file() {
            return Err(DataError::Missing(path.to_path_buf()).into());
        }
        self.predict_example(&LabeledExample::from_audio_file(path), description)
    }

    /// Record `<recordings>/recording-<timestamp>.wav`, plot it and transcribe it.
    ///
    /// Returns `None` if the recording was cancelled or nothing was heard before the timeout.
    pub fn record_and_predict(&self, recorder: &dyn Recorder, options: &CaptureOptions, on_event: &mut dyn FnMut(CaptureEvent)) -> Result<Option<Prediction>> {
        let directory = self.paths.recordings();
        ensure_directory(&directory)?;
        let path = self.paths.new_recording_path()?;

        let example = match recorder.record(&path, options, on_event)? {
            CaptureOutcome::Recorded(example) => example,
            CaptureOutcome::Cancelled => {
                info!("Recording cancelled");
                return Ok(None);
            }
            CaptureOutcome::TimedOut => {
                info!("Nothing recorded within {:?}", options.timeout);
                return Ok(None);
            }
        };

        let spectrogram = self.spectrogram(&example)?;
        if let Some(plotter) = &self.plotter {
            let plot = plotter.save_spectrogram(&example, spectrogram.view(), &directory)?;
            info!("Saved spectrogram plot to {}", plot.display());
        }

        let transcription = self.model()?.predict_single(spectrogram.view())?;
        Ok(Some(Prediction { description: example.id.clone(), audio_file: example.audio_file, transcription }))
    }

    /// Transcribe the reference recordings found in the recordings directory.
    ///
    /// Missing recordings are skipped with a warning.
    pub fn predict_reference_recordings(&self) -> Result<Vec<Prediction>> {
        let mut predictions = Vec::new();
        for (file_name, description) in REFERENCE_RECORDINGS {
            let path = self.paths.recordings().join(file_name);
            if !path.is_file() {
                warn!("Reference recording {} not found, skipping", path.display());
                continue;
            }
            let prediction = self.predict_file(&path, Some(description))?;
            info!("{}", prediction);
            predictions.push(prediction);
        }
        Ok(predictions)
    }

    fn spectrogram(&self, example: &LabeledExample) -> Result<ndarray::Array2<f32>> {
        self.extractor.spectrogram(example).map_err(|source| DataError::Extraction { id: example.id.clone(), source }.into())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ndarray::{Array1, Array2, array};

    use super::*;
    use crate::model::testing::ScriptedBackend;
    use crate::model::{Architecture, Checkpoint, CheckpointReference, StoredLayer};

    /// Spectrogram frames selecting a, b, blank, a.
    struct FixedExtractor;

    impl FeatureExtractor for FixedExtractor {
        fn spectrogram(&self, _example: &LabeledExample) -> anyhow::Result<Array2<f32>> {
            Ok(array![[0.0f32, 0.0], [1.0, 0.0], [2.0, 0.0], [0.0, 0.0]])
        }
    }

    struct CountingPlotter(AtomicUsize);

    impl SpectrogramPlotter for CountingPlotter {
        fn save_spectrogram(&self, example: &LabeledExample, _spectrogram: ArrayView2<'_, f32>, directory: &Path) -> anyhow::Result<PathBuf> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(directory.join(format!("{}.png", example.id)))
        }
    }

    /// Writes a short file and reports it as recorded.
    struct FakeRecorder {
        outcome_recorded: bool,
    }

    impl Recorder for FakeRecorder {
        fn record(&self, path: &Path, _options: &CaptureOptions, on_event: &mut dyn FnMut(CaptureEvent)) -> Result<CaptureOutcome> {
            on_event(CaptureEvent::Listening);
            if !self.outcome_recorded {
                return Ok(CaptureOutcome::TimedOut);
            }
            std::fs::write(path, b"RIFF").unwrap();
            Ok(CaptureOutcome::Recorded(LabeledExample::from_audio_file(path)))
        }
    }

    fn demo(paths: &DataPaths) -> PredictionDemo {
        let architecture = Architecture { input_size_per_time_step: 2, hidden_layer_widths: vec![2], reserved_symbols: 1 };
        let alphabet = Alphabet::new("ab".chars()).unwrap();
        let directory = paths.nets().join("best");
        let layers = architecture
            .layer_shapes(&alphabet)
            .into_iter()
            .map(|shape| StoredLayer { name: String::new(), weights: Array2::zeros(shape), biases: Array1::zeros(shape.1) })
            .collect();
        Checkpoint { epoch: 7, layers }.save(&directory).unwrap();

        let resolver = ModelResolver::new(architecture, CheckpointReference::new(directory, 7, alphabet, "English"));
        PredictionDemo::new(paths.clone(), resolver, Arc::new(ScriptedBackend::default()), Arc::new(FixedExtractor))
    }

    #[test]
    fn model_is_resolved_once() {
        let dir = tempfile::tempdir().unwrap();
        let demo = demo(&DataPaths::new(dir.path()));

        let first = demo.model().unwrap() as *const Model;
        let second = demo.model().unwrap() as *const Model;
        assert_eq!(first, second);
    }

    #[test]
    fn reference_recordings_are_described() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        std::fs::create_dir_all(paths.recordings()).unwrap();
        std::fs::write(paths.recordings().join("bad-quality-louis.wav"), b"RIFF").unwrap();

        let predictions = demo(&paths).predict_reference_recordings().unwrap();

        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].to_string(), "Louis' rerecording of worse quality: \"aba\"");
    }

    #[test]
    fn missing_file_is_a_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let demo = demo(&DataPaths::new(dir.path()));

        let result = demo.predict_file(&dir.path().join("absent.wav"), None);
        assert!(matches!(result, Err(crate::Error::Data(DataError::Missing(_)))));
    }

    #[test]
    fn recording_is_saved_plotted_and_predicted() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let plotter = Arc::new(CountingPlotter(AtomicUsize::new(0)));
        let demo = demo(&paths).with_plotter(plotter.clone());

        let mut events = Vec::new();
        let prediction = demo.record_and_predict(&FakeRecorder { outcome_recorded: true }, &CaptureOptions::default(), &mut |e| events.push(e)).unwrap().unwrap();

        assert!(prediction.description.starts_with("recording-"));
        assert_eq!(prediction.audio_file.parent(), Some(paths.recordings().as_path()));
        assert_eq!(prediction.transcription, "aba");
        assert_eq!(plotter.0.load(Ordering::SeqCst), 1);
        assert_eq!(events, vec![CaptureEvent::Listening]);
    }

    #[test]
    fn timed_out_recording_predicts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let demo = demo(&DataPaths::new(dir.path()));

        let prediction = demo.record_and_predict(&FakeRecorder { outcome_recorded: false }, &CaptureOptions::default(), &mut |_| {}).unwrap();
        assert!(prediction.is_none());
    }
}
