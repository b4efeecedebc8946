//! Silence-delimited recording: wait for sound, record until it stops.

use std::io::BufWriter;
use std::path::Path;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::corpus::LabeledExample;
use crate::error::{AudioError, ResourceError, Result};
use crate::storage::ensure_directory;

/// Sample rate requested from input devices.
pub const RECORDING_SAMPLE_RATE: u32 = 16000;

/// Something that can record one utterance into a WAV file.
pub trait Recorder {
    /// Record into `path`, reporting progress through `on_event`.
    ///
    /// Returns [`CaptureOutcome::Cancelled`] or [`CaptureOutcome::TimedOut`] without
    /// writing a file if recording never started.
    fn record(&self, path: &Path, options: &CaptureOptions, on_event: &mut dyn FnMut(CaptureEvent)) -> Result<CaptureOutcome>;
}

/// Limits and thresholds for one recording.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Upper bound on the whole capture, waiting included.
    pub timeout: Duration,
    /// RMS amplitude above which a window counts as sound.
    pub threshold: f32,
    /// Continuous silence that ends a recording.
    pub silence_duration: Duration,
    pub cancel: CancellationToken,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30), threshold: 0.02, silence_duration: Duration::from_secs(1), cancel: CancellationToken::new() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Waiting for sound.
    Listening,
    Started,
    Stopped { duration: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Recorded(LabeledExample),
    Cancelled,
    TimedOut,
}

/// Energy gate deciding where a recording starts and ends.
///
/// Samples are judged in 20 ms windows. The first window whose RMS exceeds the
/// threshold starts the recording; it ends once enough consecutive quiet windows
/// follow. Trailing silence is not kept.
#[derive(Debug)]
pub struct SilenceGate {
    threshold: f32,
    window: usize,
    quiet_windows_to_stop: usize,
    pending: Vec<f32>,
    recorded: Vec<f32>,
    loud_end: usize,
    quiet_windows: usize,
    started: bool,
    finished: bool,
}

impl SilenceGate {
    pub fn new(sample_rate: u32, threshold: f32, silence_duration: Duration) -> Self {
        let window = (sample_rate as usize / 50).max(1);
        let quiet_windows_to_stop = ((silence_duration.as_secs_f64() * sample_rate as f64) / window as f64).ceil().max(1.0) as usize;
        Self {
            threshold,
            window,
            quiet_windows_to_stop,
            pending: Vec::with_capacity(window),
            recorded: Vec::new(),
            loud_end: 0,
            quiet_windows: 0,
            started: false,
            finished: false,
        }
    }

    /// Feed captured samples. Samples after the end of the recording are ignored.
    pub fn push(&mut self, samples: &[f32]) {
        for &sample in samples {
            if self.finished {
                return;
            }
            self.pending.push(sample);
            if self.pending.len() == self.window {
                let window = std::mem::take(&mut self.pending);
                self.judge(&window);
                self.pending = window;
                self.pending.clear();
            }
        }
    }

    fn judge(&mut self, window: &[f32]) {
        let loud = rms(window) > self.threshold;
        if !self.started {
            if !loud {
                return;
            }
            self.started = true;
        }

        self.recorded.extend_from_slice(window);
        if loud {
            self.loud_end = self.recorded.len();
            self.quiet_windows = 0;
        } else {
            self.quiet_windows += 1;
            if self.quiet_windows >= self.quiet_windows_to_stop {
                self.finished = true;
            }
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Recorded samples up to the end of the last loud window.
    pub fn into_samples(mut self) -> Vec<f32> {
        self.recorded.truncate(self.loud_end);
        self.recorded
    }
}

/// Root mean square of a sample window.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Result of draining a sample source through a [`SilenceGate`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Captured {
    Samples(Vec<f32>),
    Cancelled,
    TimedOut,
}

/// Pull samples from `source` until the gate closes, the timeout passes or the
/// capture is cancelled. A timeout after sound started keeps what was recorded.
///
/// `source` fills the front of the buffer and returns how many samples it wrote.
/// A timeout too large to represent as an instant means no deadline.
pub(crate) fn capture(
    mut source: impl FnMut(&mut [f32]) -> usize,
    sample_rate: u32,
    options: &CaptureOptions,
    on_event: &mut dyn FnMut(CaptureEvent),
) -> Captured {
    let deadline = Instant::now().checked_add(options.timeout);
    let mut gate = SilenceGate::new(sample_rate, options.threshold, options.silence_duration);
    let mut buffer = vec![0.0f32; 2048];

    on_event(CaptureEvent::Listening);
    loop {
        if options.cancel.is_cancelled() {
            debug!("Recording cancelled");
            return Captured::Cancelled;
        }

        let read = source(&mut buffer);
        if read > 0 {
            let was_started = gate.is_started();
            gate.push(&buffer[..read]);
            if !was_started && gate.is_started() {
                on_event(CaptureEvent::Started);
            }
            if gate.is_finished() {
                break;
            }
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            if gate.is_started() {
                debug!("Recording hit the timeout, keeping what was captured");
                break;
            }
            return Captured::TimedOut;
        }

        if read == 0 {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    let samples = gate.into_samples();
    on_event(CaptureEvent::Stopped { duration: Duration::from_micros(samples.len() as u64 * 1_000_000 / sample_rate.max(1) as u64) });
    Captured::Samples(samples)
}

/// Write mono samples as 16-bit PCM, replacing `path` atomically.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_directory(dir)?;

    let spec = hound::WavSpec { channels: 1, sample_rate, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
    let tmp = NamedTempFile::new_in(dir).map_err(|e| ResourceError::unwritable(dir, e))?;
    let file = tmp.reopen().map_err(|e| ResourceError::unwritable(tmp.path(), e))?;

    let mut writer = hound::WavWriter::new(BufWriter::new(file), spec).map_err(AudioError::from)?;
    for &sample in samples {
        let s16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer.write_sample(s16).map_err(AudioError::from)?;
    }
    writer.finalize().map_err(AudioError::from)?;

    tmp.persist(path).map_err(|e| ResourceError::unwritable(path, e.error))?;
    info!("Saved {:.1} s recording to {}", samples.len() as f64 / sample_rate as f64, path.display());
    Ok(())
}
