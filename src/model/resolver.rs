//! Builds runnable networks for a target alphabet from a fixed pretrained checkpoint.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use super::checkpoint::{Checkpoint, CheckpointReference};
use super::mapping::AlphabetMapping;
use super::network::{Architecture, MEL_FREQUENCY_COUNT, Network};
use super::{Backend, LanguageModel, Model};
use crate::config::{Alphabet, DataPaths};
use crate::error::{ConfigError, Result};

/// Options for [`ModelResolver::resolve`].
#[derive(Clone, Default)]
pub struct ResolveOptions {
    /// Leading layers excluded from further training.
    pub frozen_layer_count: usize,
    /// Scorer fused in at decode time only.
    pub language_model: Option<Arc<dyn LanguageModel>>,
}

/// A network initialized from a checkpoint, with the column mapping that produced it.
#[derive(Debug, Clone)]
pub struct ResolvedNetwork {
    pub network: Network,
    pub mapping: AlphabetMapping,
    /// Output columns that kept their fresh initialization.
    pub initialized_outputs: Vec<bool>,
}

/// Resolves one pretrained checkpoint into networks for arbitrary target alphabets.
#[derive(Debug, Clone)]
pub struct ModelResolver {
    architecture: Architecture,
    checkpoint: CheckpointReference,
    seed: Option<u64>,
}

impl ModelResolver {
    pub fn new(architecture: Architecture, checkpoint: CheckpointReference) -> Self {
        Self { architecture, checkpoint, seed: None }
    }

    /// Resolver for the best English model with the default architecture.
    pub fn best_english(paths: &DataPaths) -> Self {
        Self::new(Architecture::wav2letter(MEL_FREQUENCY_COUNT), CheckpointReference::best_english(paths))
    }

    /// Make fresh initialization of target-only symbols reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    pub fn checkpoint(&self) -> &CheckpointReference {
        &self.checkpoint
    }

    pub fn layer_count(&self) -> usize {
        self.architecture.layer_count()
    }

    /// Build a network for `target` from the checkpoint.
    ///
    /// Layers whose shape does not depend on the alphabet are loaded unchanged. The
    /// output layer takes the checkpoint columns of symbols shared with the trained
    /// alphabet and fresh parameters for the rest. The first `frozen_layer_count`
    /// layers are marked non-trainable.
    ///
    /// # Errors
    /// - [`ConfigError::FrozenLayerCount`] if `frozen_layer_count` exceeds the layer
    ///   count; checked before the checkpoint is read
    /// - [`ConfigError::CheckpointMissing`] / [`ConfigError::CheckpointUnreadable`]
    /// - [`ConfigError::LayerCountMismatch`] / [`ConfigError::CheckpointIncompatible`]
    ///   if the checkpoint does not fit the architecture
    pub fn resolve_network(&self, target: &Alphabet, frozen_layer_count: usize) -> Result<ResolvedNetwork> {
        let total = self.layer_count();
        if frozen_layer_count > total {
            return Err(ConfigError::FrozenLayerCount { requested: frozen_layer_count, total }.into());
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut network = Network::initialize(self.architecture.clone(), target.clone(), &mut rng);

        let weights_path = self.checkpoint.weights_path();
        info!("Loading weights from {} for alphabet \"{}\"", weights_path.display(), target);
        let checkpoint = Checkpoint::load(&weights_path)?;

        if checkpoint.layers.len() != total {
            return Err(ConfigError::LayerCountMismatch { expected: total, found: checkpoint.layers.len() }.into());
        }

        let (stored_output, stored_hidden) = checkpoint.layers.split_last().ok_or(ConfigError::LayerCountMismatch { expected: total, found: 0 })?;
        for (layer, stored) in network.layers_mut().iter_mut().zip(stored_hidden) {
            if stored.weights.dim() != layer.shape() || stored.biases.len() != layer.biases.len() {
                return Err(ConfigError::CheckpointIncompatible { layer: layer.name.clone(), expected: layer.shape(), found: stored.weights.dim() }.into());
            }
            layer.weights.assign(&stored.weights);
            layer.biases.assign(&stored.biases);
        }

        let trained_symbols = self.checkpoint.alphabet.output_symbols(self.architecture.reserved_symbols);
        let mapping = AlphabetMapping::new(&trained_symbols, &network.output_symbols());

        let output = network.output_layer_mut();
        let weights = mapping.apply(stored_output.weights.view(), output.weights.clone())?;
        let biases = mapping.apply(stored_output.biases.view().insert_axis(ndarray::Axis(0)), output.biases.clone().insert_axis(ndarray::Axis(0)))?;
        output.weights = weights.values;
        output.biases = biases.values.row(0).to_owned();

        network.freeze_leading(frozen_layer_count)?;

        if mapping.is_identity() {
            debug!("Output alphabet matches checkpoint alphabet");
        } else {
            info!(
                "Output alphabet differs from checkpoint: {} symbols transferred, {} initialized, {} dropped",
                mapping.transferred().len(),
                mapping.initialized().len(),
                mapping.dropped().len()
            );
        }
        info!("Resolved {}-layer network with {} frozen layers", total, frozen_layer_count);

        Ok(ResolvedNetwork { network, mapping, initialized_outputs: weights.initialized })
    }

    /// Resolve a network and wrap it with `backend` (and an optional language model) for inference or training.
    pub fn resolve(&self, target: &Alphabet, options: ResolveOptions, backend: Arc<dyn Backend>) -> Result<Model> {
        let resolved = self.resolve_network(target, options.frozen_layer_count)?;
        let model = Model::new(resolved.network, backend);
        Ok(match options.language_model {
            Some(language_model) => model.with_language_model(language_model),
            None => model,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use ndarray::{Array1, Array2};

    use super::*;
    use crate::config::OutputSymbol;
    use crate::error::Error;
    use crate::model::StoredLayer;

    fn architecture() -> Architecture {
        Architecture { input_size_per_time_step: 2, hidden_layer_widths: vec![3, 3], reserved_symbols: 1 }
    }

    /// Checkpoint with distinct, exactly representable values in every position.
    fn write_checkpoint(dir: &Path, trained: &Alphabet) -> CheckpointReference {
        let shapes = architecture().layer_shapes(trained);
        let layers = shapes
            .iter()
            .enumerate()
            .map(|(l, &(rows, cols))| StoredLayer {
                name: format!("layer-{}", l),
                weights: Array2::from_shape_fn((rows, cols), |(r, c)| (l * 100 + r * 10 + c) as f32 + 0.5),
                biases: Array1::from_shape_fn(cols, |c| -((l * 100 + c) as f32) - 0.25),
            })
            .collect();
        Checkpoint { epoch: 5, layers }.save(dir).unwrap();
        CheckpointReference::new(dir, 5, trained.clone(), "Source")
    }

    fn alphabet(characters: &str) -> Alphabet {
        Alphabet::new(characters.chars()).unwrap()
    }

    #[test]
    fn shared_symbols_keep_checkpoint_weights() {
        let dir = tempfile::tempdir().unwrap();
        let reference = write_checkpoint(dir.path(), &alphabet("abc"));
        let stored = Checkpoint::load(&reference.weights_path()).unwrap();
        let resolver = ModelResolver::new(architecture(), reference).with_seed(3);

        let resolved = resolver.resolve_network(&alphabet("bcd"), 0).unwrap();
        let output = resolved.network.output_layer();
        let stored_output = &stored.layers[2];

        // target columns: b c d blank; trained columns: a b c blank
        assert_eq!(output.weights.column(0), stored_output.weights.column(1));
        assert_eq!(output.weights.column(1), stored_output.weights.column(2));
        assert_eq!(output.weights.column(3), stored_output.weights.column(3));
        assert_eq!(output.biases[0], stored_output.biases[1]);
        assert_eq!(output.biases[3], stored_output.biases[3]);

        for value in output.weights.column(2) {
            assert!(!stored_output.weights.iter().any(|stored| stored == value), "fresh weight {} found in checkpoint", value);
        }
        assert_eq!(resolved.initialized_outputs, vec![false, false, true, false]);
        assert_eq!(resolved.mapping.dropped(), vec![OutputSymbol::Character('a')]);
    }

    #[test]
    fn alphabet_independent_layers_load_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let reference = write_checkpoint(dir.path(), &alphabet("abc"));
        let stored = Checkpoint::load(&reference.weights_path()).unwrap();
        let resolver = ModelResolver::new(architecture(), reference);

        let resolved = resolver.resolve_network(&alphabet("xy"), 1).unwrap();

        for (layer, stored) in resolved.network.layers()[..2].iter().zip(&stored.layers) {
            assert_eq!(layer.weights, stored.weights);
            assert_eq!(layer.biases, stored.biases);
        }
        assert_eq!(resolved.network.output_width(), 3);
        assert_eq!(resolved.network.frozen_layer_count(), 1);
    }

    #[test]
    fn every_frozen_count_in_range_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let reference = write_checkpoint(dir.path(), &alphabet("ab"));
        let resolver = ModelResolver::new(architecture(), reference);

        for k in 0..=resolver.layer_count() {
            let network = resolver.resolve_network(&alphabet("ab"), k).unwrap().network;
            let trainable: Vec<bool> = network.layers().iter().map(|layer| layer.trainable).collect();
            assert_eq!(trainable, (0..3).map(|i| i >= k).collect::<Vec<_>>());
        }
    }

    #[test]
    fn frozen_count_beyond_layers_fails_before_reading_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        // no checkpoint written: a missing-checkpoint error would mean I/O happened first
        let reference = CheckpointReference::new(dir.path().join("absent"), 1, alphabet("ab"), "Source");
        let resolver = ModelResolver::new(architecture(), reference);

        let result = resolver.resolve_network(&alphabet("ab"), 4);
        assert!(matches!(result, Err(Error::Config(ConfigError::FrozenLayerCount { requested: 4, total: 3 }))));
    }

    #[test]
    fn missing_checkpoint_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let reference = CheckpointReference::new(dir.path().join("absent"), 1, alphabet("ab"), "Source");
        let resolver = ModelResolver::new(architecture(), reference);

        assert!(matches!(resolver.resolve_network(&alphabet("ab"), 0), Err(Error::Config(ConfigError::CheckpointMissing(_)))));
    }

    #[test]
    fn checkpoint_of_other_architecture_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let reference = write_checkpoint(dir.path(), &alphabet("ab"));
        let wider = Architecture { input_size_per_time_step: 2, hidden_layer_widths: vec![4, 3], reserved_symbols: 1 };
        let resolver = ModelResolver::new(wider, reference);

        let result = resolver.resolve_network(&alphabet("ab"), 0);
        assert!(matches!(result, Err(Error::Config(ConfigError::CheckpointIncompatible { .. }))));
    }
}
