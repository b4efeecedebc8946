//! Layer parameters of the acoustic network.
//!
//! Only parameter shapes and trainability live here; the forward pass and the
//! optimizer belong to the [`Backend`](super::Backend).

use ndarray::{Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{Alphabet, OutputSymbol};
use crate::error::ConfigError;

/// Spectrogram bins per time step the default architecture consumes.
pub const MEL_FREQUENCY_COUNT: usize = 128;

/// Layer widths of a network, independent of its output alphabet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    pub input_size_per_time_step: usize,
    pub hidden_layer_widths: Vec<usize>,
    /// Output columns after the alphabet characters (1 for the CTC blank).
    pub reserved_symbols: usize,
}

impl Architecture {
    /// Wav2Letter layout: eight 250-wide layers, two 2000-wide layers, output layer.
    pub fn wav2letter(mel_frequency_count: usize) -> Self {
        let mut hidden_layer_widths = vec![250; 8];
        hidden_layer_widths.extend([2000, 2000]);
        Self { input_size_per_time_step: mel_frequency_count, hidden_layer_widths, reserved_symbols: 1 }
    }

    /// Total number of layers including the output layer.
    pub fn layer_count(&self) -> usize {
        self.hidden_layer_widths.len() + 1
    }

    pub fn output_width(&self, alphabet: &Alphabet) -> usize {
        alphabet.len() + self.reserved_symbols
    }

    /// `(inputs, outputs)` of every layer for the given alphabet.
    pub fn layer_shapes(&self, alphabet: &Alphabet) -> Vec<(usize, usize)> {
        let mut inputs = self.input_size_per_time_step;
        let mut shapes = Vec::with_capacity(self.layer_count());
        for &width in &self.hidden_layer_widths {
            shapes.push((inputs, width));
            inputs = width;
        }
        shapes.push((inputs, self.output_width(alphabet)));
        shapes
    }
}

impl Default for Architecture {
    fn default() -> Self {
        Self::wav2letter(MEL_FREQUENCY_COUNT)
    }
}

/// Weights `(inputs, outputs)` and biases `(outputs)` of one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    /// Whether the optimizer may update this layer.
    pub trainable: bool,
}

impl Layer {
    /// Glorot-uniform weights, zero biases.
    fn initialize(name: String, (inputs, outputs): (usize, usize), rng: &mut impl Rng) -> Self {
        let limit = (6.0 / (inputs + outputs).max(1) as f32).sqrt();
        let weights = Array2::from_shape_simple_fn((inputs, outputs), || rng.gen_range(-limit..limit));
        Self { name, weights, biases: Array1::zeros(outputs), trainable: true }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.weights.dim()
    }
}

/// Parameters of a network whose output layer predicts over an alphabet.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    architecture: Architecture,
    alphabet: Alphabet,
    layers: Vec<Layer>,
}

impl Network {
    /// Fresh network sized for `alphabet`, every layer trainable.
    pub fn initialize(architecture: Architecture, alphabet: Alphabet, rng: &mut impl Rng) -> Self {
        let shapes = architecture.layer_shapes(&alphabet);
        let last = shapes.len() - 1;
        let layers = shapes
            .into_iter()
            .enumerate()
            .map(|(i, shape)| {
                let name = if i == last { "output".to_string() } else { format!("layer-{}", i) };
                Layer::initialize(name, shape, rng)
            })
            .collect();
        Self { architecture, alphabet, layers }
    }

    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn output_layer(&self) -> &Layer {
        &self.layers[self.layers.len() - 1]
    }

    pub(crate) fn output_layer_mut(&mut self) -> &mut Layer {
        let last = self.layers.len() - 1;
        &mut self.layers[last]
    }

    /// Columns of the output layer: alphabet characters, then reserved symbols.
    pub fn output_symbols(&self) -> Vec<OutputSymbol> {
        self.alphabet.output_symbols(self.architecture.reserved_symbols)
    }

    pub fn output_width(&self) -> usize {
        self.output_layer().shape().1
    }

    /// Mark the first `count` layers non-trainable and all others trainable.
    ///
    /// # Errors
    /// Returns [`ConfigError::FrozenLayerCount`] if `count` exceeds the layer count;
    /// the network is left unchanged.
    pub fn freeze_leading(&mut self, count: usize) -> Result<(), ConfigError> {
        if count > self.layers.len() {
            return Err(ConfigError::FrozenLayerCount { requested: count, total: self.layers.len() });
        }
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.trainable = i >= count;
        }
        Ok(())
    }

    /// Number of non-trainable layers.
    pub fn frozen_layer_count(&self) -> usize {
        self.layers.iter().filter(|layer| !layer.trainable).count()
    }
}
