//! Recording and prediction demo.

mod microphone;
mod prediction;
mod recorder;

pub use microphone::Microphone;
pub use prediction::{Prediction, PredictionDemo, REFERENCE_RECORDINGS, SpectrogramPlotter};
pub use recorder::{CaptureEvent, CaptureOptions, CaptureOutcome, RECORDING_SAMPLE_RATE, Recorder, SilenceGate, rms, write_wav};
