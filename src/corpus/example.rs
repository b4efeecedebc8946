//! Labeled examples and their spectrograms.

use std::path::{Path, PathBuf};

use ndarray::Array2;

/// One audio file with its optional transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledExample {
    pub id: String,
    pub audio_file: PathBuf,
    pub label: Option<String>,
}

impl LabeledExample {
    pub fn new(id: impl Into<String>, audio_file: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self { id: id.into(), audio_file: audio_file.into(), label: Some(label.into()) }
    }

    /// An unlabeled example named after the file stem (used for recordings).
    pub fn from_audio_file(audio_file: impl AsRef<Path>) -> Self {
        let audio_file = audio_file.as_ref();
        let id = audio_file
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| audio_file.to_string_lossy().to_string());
        Self { id, audio_file: audio_file.to_path_buf(), label: None }
    }
}

/// Spectrogram of an example, shape `(frames, frequency bins)`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSpectrogram {
    pub id: String,
    pub label: Option<String>,
    pub spectrogram: Array2<f32>,
}

/// A group of spectrograms fed to the model together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub examples: Vec<LabeledSpectrogram>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}
