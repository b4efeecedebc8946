//! Microphone recording using cpal.
//!
//! The input callback mixes to mono and pushes into a lock-free ring buffer; the
//! recording thread drains it through the silence gate.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};
use parking_lot::Mutex;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Producer, Split};
use tracing::{debug, error, info, warn};

use super::recorder::{CaptureEvent, CaptureOptions, CaptureOutcome, Captured, RECORDING_SAMPLE_RATE, Recorder, capture, write_wav};
use crate::corpus::LabeledExample;
use crate::error::{AudioError, Result};

/// Ring buffer size: about 4 seconds at 16 kHz.
const RING_CAPACITY: usize = 65536;

/// Records from the default input device.
#[derive(Debug, Clone)]
pub struct Microphone {
    sample_rate: u32,
}

impl Default for Microphone {
    fn default() -> Self {
        Self::new(RECORDING_SAMPLE_RATE)
    }
}

impl Microphone {
    /// Microphone preferring `sample_rate`; the closest supported rate is used otherwise.
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl Recorder for Microphone {
    fn record(&self, path: &Path, options: &CaptureOptions, on_event: &mut dyn FnMut(CaptureEvent)) -> Result<CaptureOutcome> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or_else(|| AudioError::Device("no input device available".to_string()))?;
        info!("Using input device: {}", device_name(&device));

        let supported_configs = device.supported_input_configs().map_err(|e| AudioError::Device(format!("failed to get supported input configs: {}", e)))?;
        let config = find_best_config(supported_configs, self.sample_rate)?;
        let sample_rate = config.sample_rate();
        let channels = config.channels() as usize;
        if sample_rate != self.sample_rate {
            info!("Device does not support {} Hz, recording at {} Hz", self.sample_rate, sample_rate);
        }
        debug!("Audio capture config: {} Hz, {} channels, {:?}", sample_rate, channels, config.sample_format());

        let (mut producer, mut consumer) = HeapRb::<f32>::new(RING_CAPACITY).split();
        let stream_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let error_slot = Arc::clone(&stream_error);
        let dropped = Arc::new(AtomicU64::new(0));
        let dropped_in_callback = Arc::clone(&dropped);

        let stream = device
            .build_input_stream(
                &config.config(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let samples = to_mono(data, channels);
                    let written = producer.push_slice(&samples);
                    if written < samples.len() {
                        dropped_in_callback.fetch_add(1, Ordering::Relaxed);
                    }
                },
                move |err| {
                    error!("Audio capture error: {}", err);
                    *error_slot.lock() = Some(err.to_string());
                },
                None,
            )
            .map_err(|e| AudioError::Device(format!("failed to build input stream: {}", e)))?;
        stream.play().map_err(|e| AudioError::Stream(format!("failed to start audio stream: {}", e)))?;

        let captured = capture(|buffer| consumer.pop_slice(buffer), sample_rate, options, on_event);
        if let Err(e) = stream.pause() {
            debug!("Failed to pause audio stream: {}", e);
        }
        drop(stream);

        let dropped = dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            warn!("Ring buffer full, dropped {} audio chunks", dropped);
        }
        if let Some(message) = stream_error.lock().take() {
            return Err(AudioError::Stream(message).into());
        }

        match captured {
            Captured::Samples(samples) => {
                write_wav(path, &samples, sample_rate)?;
                Ok(CaptureOutcome::Recorded(LabeledExample::from_audio_file(path)))
            }
            Captured::Cancelled => Ok(CaptureOutcome::Cancelled),
            Captured::TimedOut => Ok(CaptureOutcome::TimedOut),
        }
    }
}

/// Get a human-readable device name, or "Unknown".
fn device_name(device: &Device) -> String {
    device.description().ok().map(|desc| desc.name().to_string()).unwrap_or_else(|| "Unknown".to_string())
}

/// Pick an F32 mono or stereo configuration at `target_sample_rate`, or the closest rate available.
fn find_best_config(configs: impl Iterator<Item = SupportedStreamConfigRange>, target_sample_rate: u32) -> std::result::Result<SupportedStreamConfig, AudioError> {
    let candidates: Vec<SupportedStreamConfigRange> = configs.filter(|config| config.channels() <= 2 && config.sample_format() == SampleFormat::F32).collect();

    if let Some(config) = candidates.iter().find(|config| (config.min_sample_rate()..=config.max_sample_rate()).contains(&target_sample_rate)) {
        return Ok((*config).with_sample_rate(target_sample_rate));
    }

    let config = candidates.first().ok_or_else(|| AudioError::Device("no mono or stereo F32 input configuration".to_string()))?;
    let rate = if target_sample_rate < config.min_sample_rate() { config.min_sample_rate() } else { config.max_sample_rate() };
    Ok((*config).with_sample_rate(rate))
}

/// Mix interleaved frames down to one channel by averaging.
fn to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        data.to_vec()
    } else {
        data.chunks(channels).map(|frame| frame.iter().sum::<f32>() / channels as f32).collect()
    }
}
