//! Fresh and transfer training runs for a configuration.

use std::path::PathBuf;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;
use tracing::info;

use super::run::{self, RunIdentity};
use crate::config::{Configuration, DataPaths};
use crate::error::{ConfigError, Result};
use crate::model::{Architecture, Backend, Model, ModelResolver, Network, ResolveOptions};
use crate::storage::ensure_directory;

/// Training constants shared by every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Spectrogram bins per time step.
    pub mel_frequency_count: usize,
    /// Training batches per epoch before a checkpoint is written.
    pub batches_per_epoch: usize,
    /// Upper bound on epochs in one run.
    pub max_epochs: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self { mel_frequency_count: 128, batches_per_epoch: 100, max_epochs: 10_000 }
    }
}

/// Everything a backend needs to know about the run it executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingRun {
    pub identity: RunIdentity,
    pub log_directory: PathBuf,
    pub net_directory: PathBuf,
    pub batches_per_epoch: usize,
    pub max_epochs: usize,
}

/// A finished run and the model it trained.
#[derive(Debug)]
pub struct TrainedRun {
    pub run: TrainingRun,
    pub model: Model,
}

/// Starts training runs under one data directory.
pub struct TrainingOrchestrator {
    paths: DataPaths,
    backend: Arc<dyn Backend>,
    settings: TrainingSettings,
    seed: Option<u64>,
}

impl TrainingOrchestrator {
    pub fn new(paths: DataPaths, backend: Arc<dyn Backend>) -> Self {
        Self { paths, backend, settings: TrainingSettings::default(), seed: None }
    }

    pub fn with_settings(mut self, settings: TrainingSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Seed fresh initialization for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn settings(&self) -> &TrainingSettings {
        &self.settings
    }

    /// Train a new network for `config` from scratch, named after the current time.
    pub fn train(&self, config: &Configuration) -> Result<TrainedRun> {
        self.train_at(config, run::now())
    }

    /// [`TrainingOrchestrator::train`] with an explicit run timestamp.
    pub fn train_at(&self, config: &Configuration, timestamp: PrimitiveDateTime) -> Result<TrainedRun> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let architecture = Architecture::wav2letter(self.settings.mel_frequency_count);
        let network = Network::initialize(architecture, config.alphabet().clone(), &mut rng);

        let identity = RunIdentity::complete_training(timestamp, config.name());
        self.execute(config, Model::new(network, Arc::clone(&self.backend)), identity)
    }

    /// Fine-tune the resolver's checkpoint on `config`, training only the last
    /// `trainable_layer_count` layers.
    pub fn train_transfer(&self, config: &Configuration, resolver: &ModelResolver, trainable_layer_count: usize) -> Result<TrainedRun> {
        self.train_transfer_at(config, resolver, trainable_layer_count, run::now())
    }

    /// [`TrainingOrchestrator::train_transfer`] with an explicit run timestamp.
    ///
    /// # Errors
    /// Returns [`ConfigError::TrainableLayerCount`] before anything is loaded or
    /// created if `trainable_layer_count` exceeds the resolver's layer count, and
    /// [`ConfigError::InvalidName`] if the checkpoint's configuration name cannot
    /// appear in a run name.
    pub fn train_transfer_at(
        &self,
        config: &Configuration,
        resolver: &ModelResolver,
        trainable_layer_count: usize,
        timestamp: PrimitiveDateTime,
    ) -> Result<TrainedRun> {
        let total = resolver.layer_count();
        let frozen_layer_count = total
            .checked_sub(trainable_layer_count)
            .ok_or(ConfigError::TrainableLayerCount { requested: trainable_layer_count, total })?;

        let identity = RunIdentity::transfer(timestamp, &resolver.checkpoint().configuration_name, config.name(), frozen_layer_count)?;

        let model = resolver.resolve(config.alphabet(), ResolveOptions { frozen_layer_count, language_model: None }, Arc::clone(&self.backend))?;
        self.execute(config, model, identity)
    }

    fn execute(&self, config: &Configuration, mut model: Model, identity: RunIdentity) -> Result<TrainedRun> {
        let batches = config.batch_generator()?;

        let run = TrainingRun {
            log_directory: identity.log_directory(&self.paths),
            net_directory: identity.net_directory(&self.paths),
            identity,
            batches_per_epoch: self.settings.batches_per_epoch,
            max_epochs: self.settings.max_epochs,
        };
        ensure_directory(&run.log_directory)?;
        ensure_directory(&run.net_directory)?;

        info!("Starting run {}", run.identity);
        info!("  Logs: {}", run.log_directory.display());
        info!("  Nets: {}", run.net_directory.display());
        info!(
            "  {} layers ({} frozen), output width {}, {} batches per epoch",
            model.network().layer_count(),
            model.network().frozen_layer_count(),
            model.network().output_width(),
            run.batches_per_epoch
        );

        model.train(batches, &run)?;
        info!("Finished run {}", run.identity);

        Ok(TrainedRun { run, model })
    }
}
