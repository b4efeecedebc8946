//! Command line interface.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{Configuration, DataPaths, default_base_dir};
use crate::demo::{CaptureEvent, CaptureOptions, CaptureOutcome, Microphone, RECORDING_SAMPLE_RATE, Recorder};
use crate::model::CheckpointReference;
use crate::storage::ensure_directory;
use crate::training::{Regime, list_runs};

/// Language of a built-in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    German,
}

impl Language {
    /// The built-in configuration reading the cached corpus.
    pub fn configuration(self, paths: &DataPaths) -> crate::Result<Configuration> {
        match self {
            Language::English => Configuration::english(paths),
            Language::German => Configuration::german(paths),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::English => write!(f, "english"),
            Language::German => write!(f, "german"),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "speechless")]
#[command(author, version, about = "Speech recognition experiment configurations, runs and recordings", long_about = None)]
pub struct Cli {
    /// Base directory for corpora, caches, logs, nets and recordings
    #[arg(long, short = 'd', global = true, env = "SPEECHLESS_DATA", default_value_os_t = default_base_dir())]
    pub data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show where every workflow reads and writes its data
    Layout,

    /// Print a cached corpus summary and rewrite summary.csv and corpus.csv
    Summarize {
        /// Configuration to summarize
        #[arg(long, short = 'l', value_enum, default_value_t = Language::English)]
        language: Language,
    },

    /// Record one utterance from the microphone into the recordings directory
    Record(RecordArgs),

    /// List training runs found in the nets directory
    Runs,
}

/// Longest recording timeout or silence the CLI accepts.
const MAX_RECORDING_SECS: u64 = 86_400;

#[derive(clap::Args, Debug, Clone)]
pub struct RecordArgs {
    /// Give up if nothing is heard within this many seconds (1 - 86400)
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..=MAX_RECORDING_SECS))]
    pub timeout_secs: u64,

    /// RMS amplitude that counts as sound (0.0 - 1.0)
    #[arg(long, default_value = "0.02", value_parser = parse_threshold)]
    pub threshold: f32,

    /// Seconds of silence that end the recording
    #[arg(long, default_value = "1.0", value_parser = parse_silence_secs)]
    pub silence_secs: f32,

    /// Preferred input sample rate
    #[arg(long, default_value_t = RECORDING_SAMPLE_RATE)]
    pub sample_rate: u32,
}

impl RecordArgs {
    pub fn capture_options(&self, cancel: CancellationToken) -> CaptureOptions {
        CaptureOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            threshold: self.threshold,
            silence_duration: Duration::from_secs_f32(self.silence_secs),
            cancel,
        }
    }
}

/// Parse and validate a recording threshold.
fn parse_threshold(s: &str) -> std::result::Result<f32, String> {
    let value: f32 = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("threshold must be between 0.0 and 1.0, got {}", value));
    }
    Ok(value)
}

/// Parse and validate a silence duration in seconds.
fn parse_silence_secs(s: &str) -> std::result::Result<f32, String> {
    let value: f32 = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
    if !value.is_finite() || !(0.0..=MAX_RECORDING_SECS as f32).contains(&value) {
        return Err(format!("silence must be between 0 and {} seconds, got {}", MAX_RECORDING_SECS, s));
    }
    Ok(value)
}

impl Cli {
    pub fn paths(&self) -> DataPaths {
        DataPaths::new(&self.data_dir)
    }
}

/// Execute a parsed command. Blocks until the command finishes or `cancel` fires.
pub fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");
    let paths = cli.paths();

    match cli.command {
        Command::Layout => {
            paths.log_layout();
            let best = CheckpointReference::best_english(&paths);
            info!("  Best English checkpoint: {}", best.weights_path().display());
            info!("  English language model: {}", paths.kenlm_directory("english").display());
            Ok(())
        }
        Command::Summarize { language } => {
            let config = language.configuration(&paths)?;
            config.summarize_and_save_corpus().with_context(|| format!("Failed to summarize the {} corpus", language))
        }
        Command::Record(args) => record(&paths, &args, cancel),
        Command::Runs => {
            let runs = list_runs(&paths)?;
            if runs.is_empty() {
                info!("No runs in {}", paths.nets().display());
            }
            for run in runs {
                let regime = match &run.regime {
                    Regime::CompleteTraining => "complete".to_string(),
                    Regime::Transfer { source } => format!("transfer from {}", source),
                    Regime::Custom(slug) => slug.clone(),
                };
                let frozen = run.frozen_layer_count.map(|n| format!(", {} frozen", n)).unwrap_or_default();
                println!("{}  [{} on {}{}]", run, regime, run.config_name, frozen);
            }
            Ok(())
        }
    }
}

fn record(paths: &DataPaths, args: &RecordArgs, cancel: CancellationToken) -> Result<()> {
    ensure_directory(&paths.recordings())?;
    let path = paths.new_recording_path()?;

    let microphone = Microphone::new(args.sample_rate);
    let outcome = microphone
        .record(&path, &args.capture_options(cancel), &mut |event| match event {
            CaptureEvent::Listening => info!("Wait in silence to begin recording; wait in silence to terminate"),
            CaptureEvent::Started => info!("Recording..."),
            CaptureEvent::Stopped { duration } => info!("Stopped after {:.1} s", duration.as_secs_f32()),
        })
        .context("Failed to record from the microphone")?;

    match outcome {
        CaptureOutcome::Recorded(example) => println!("{}", example.audio_file.display()),
        CaptureOutcome::Cancelled => info!("Recording cancelled"),
        CaptureOutcome::TimedOut => info!("Nothing heard within {} s", args.timeout_secs),
    }
    Ok(())
}
