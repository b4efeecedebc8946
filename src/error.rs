//! Error types organized by failure class.
//!
//! Nothing in this crate retries: every error is surfaced to the caller with the
//! configuration name and resolved path that produced it where one is known.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error for experiment workflows.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid experiment setup (counts, alphabets, checkpoints)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Corpus loading for a configuration failed
    #[error("corpus for configuration '{config}' could not be loaded from {}", path.display())]
    Corpus {
        config: String,
        path: PathBuf,
        #[source]
        source: DataError,
    },

    /// Corpus or cache data error
    #[error(transparent)]
    Data(#[from] DataError),

    /// Directory or file could not be written
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Audio capture or WAV output error
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Failure reported by an external collaborator (backend, extractor, plotter, language model)
    #[error(transparent)]
    External(#[from] anyhow::Error),
}

/// Caller contract violations and unusable checkpoints.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration names end up in directory and run names
    #[error("invalid configuration name '{0}': expected ASCII letters, digits or '_'")]
    InvalidName(String),

    /// Alphabet cannot be used as an output layer
    #[error("malformed alphabet: {0}")]
    MalformedAlphabet(String),

    /// More frozen layers requested than the network has
    #[error("cannot freeze {requested} layers of a {total}-layer network")]
    FrozenLayerCount { requested: usize, total: usize },

    /// More trainable layers requested than the network has
    #[error("cannot train {requested} layers of a {total}-layer network")]
    TrainableLayerCount { requested: usize, total: usize },

    /// Checkpoint file does not exist
    #[error("checkpoint not found: {}", .0.display())]
    CheckpointMissing(PathBuf),

    /// Checkpoint file exists but cannot be decoded
    #[error("checkpoint {} is unreadable: {reason}", path.display())]
    CheckpointUnreadable { path: PathBuf, reason: String },

    /// Checkpoint layers do not fit the requested architecture
    #[error("checkpoint layer '{layer}' has shape {found:?}, expected {expected:?}")]
    CheckpointIncompatible {
        layer: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// Checkpoint holds a different number of layers than the architecture
    #[error("checkpoint has {found} layers, architecture expects {expected}")]
    LayerCountMismatch { expected: usize, found: usize },

    /// Run directory name does not follow `<timestamp>-<slug>-<config>[-freeze-<n>]`
    #[error("'{0}' is not a run name")]
    InvalidRunName(String),

    /// A workflow needs a collaborator the configuration was not given
    #[error("configuration '{config}' has no {collaborator}")]
    MissingCollaborator { config: String, collaborator: &'static str },
}

/// Corpus and feature cache errors.
#[derive(Debug, Error)]
pub enum DataError {
    /// Corpus directory or file is absent
    #[error("not found: {}", .0.display())]
    Missing(PathBuf),

    /// File content could not be parsed
    #[error("{}:{line}: {reason}", path.display())]
    Malformed { path: PathBuf, line: usize, reason: String },

    /// Example id is not usable as a cache key
    #[error("example id '{0}' is not a valid cache key")]
    InvalidExampleId(String),

    /// Field would break the CSV format
    #[error("field '{field}' of example '{id}' contains a separator, quote or line break")]
    UnencodableField { id: String, field: &'static str },

    /// Cached feature entry cannot be decoded
    #[error("corrupt cache entry {}: {source}", path.display())]
    CorruptEntry {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Spectrogram extraction failed for one example
    #[error("feature extraction failed for '{id}': {source}")]
    Extraction {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    /// Reading a file failed
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Output locations that cannot be written.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Directory or file could not be created or replaced
    #[error("cannot write {}: {source}", path.display())]
    Unwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Audio capture and WAV output errors.
#[derive(Debug, Error)]
pub enum AudioError {
    /// No usable input device or stream configuration
    #[error("audio device error: {0}")]
    Device(String),

    /// Stream failed while capturing
    #[error("audio stream error: {0}")]
    Stream(String),

    /// WAV file format error
    #[error(transparent)]
    Hound(#[from] hound::Error),
}

/// Result type alias for experiment operations.
pub type Result<T> = std::result::Result<T, Error>;

impl ResourceError {
    pub(crate) fn unwritable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ResourceError::Unwritable { path: path.into(), source }
    }
}

impl DataError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            DataError::Missing(path)
        } else {
            DataError::Io { path, source }
        }
    }
}

// hound::Error → AudioError → Error
impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Error::Audio(AudioError::Hound(e))
    }
}
