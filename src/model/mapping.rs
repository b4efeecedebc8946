//! Identity-matched transfer of output columns between alphabets.
//!
//! A checkpoint's output layer has one column per symbol of the alphabet it was
//! trained on. A network for another alphabet reuses the column of every symbol the
//! two alphabets share, looked up by the symbol itself rather than its position.

use std::collections::HashMap;

use ndarray::{Array2, ArrayView2};

use crate::config::OutputSymbol;
use crate::error::ConfigError;

/// For each target output column, the trained column carrying the same symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphabetMapping {
    trained: Vec<OutputSymbol>,
    target: Vec<OutputSymbol>,
    source_columns: Vec<Option<usize>>,
}

/// Result of [`AlphabetMapping::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnTransfer {
    pub values: Array2<f32>,
    /// `true` for target columns that kept their fresh initialization.
    pub initialized: Vec<bool>,
}

impl AlphabetMapping {
    pub fn new(trained: &[OutputSymbol], target: &[OutputSymbol]) -> Self {
        let trained_columns: HashMap<OutputSymbol, usize> = trained.iter().enumerate().map(|(i, &symbol)| (symbol, i)).collect();
        let source_columns = target.iter().map(|symbol| trained_columns.get(symbol).copied()).collect();
        Self { trained: trained.to_vec(), target: target.to_vec(), source_columns }
    }

    /// Trained column for `target_column`, if the symbol was trained.
    pub fn source_column(&self, target_column: usize) -> Option<usize> {
        self.source_columns.get(target_column).copied().flatten()
    }

    /// Symbols present in both alphabets, in target order.
    pub fn transferred(&self) -> Vec<OutputSymbol> {
        self.target.iter().zip(&self.source_columns).filter(|(_, source)| source.is_some()).map(|(&symbol, _)| symbol).collect()
    }

    /// Target-only symbols that need fresh parameters.
    pub fn initialized(&self) -> Vec<OutputSymbol> {
        self.target.iter().zip(&self.source_columns).filter(|(_, source)| source.is_none()).map(|(&symbol, _)| symbol).collect()
    }

    /// Trained-only symbols whose parameters are discarded.
    pub fn dropped(&self) -> Vec<OutputSymbol> {
        self.trained.iter().filter(|symbol| !self.target.contains(symbol)).copied().collect()
    }

    /// Whether every target column maps to the trained column at the same position.
    pub fn is_identity(&self) -> bool {
        self.trained.len() == self.target.len() && self.source_columns.iter().enumerate().all(|(j, source)| *source == Some(j))
    }

    /// Build target-alphabet parameters from trained ones.
    ///
    /// `checkpoint` has one column per trained symbol, `fresh` one column per target
    /// symbol and the same number of rows. Shared symbols take the checkpoint column
    /// verbatim; the others keep their `fresh` column.
    ///
    /// # Errors
    /// Returns [`ConfigError::CheckpointIncompatible`] when the column counts do not
    /// match the alphabets or the row counts differ.
    pub fn apply(&self, checkpoint: ArrayView2<'_, f32>, fresh: Array2<f32>) -> Result<ColumnTransfer, ConfigError> {
        let expected = (fresh.nrows(), self.trained.len());
        if checkpoint.dim() != expected || fresh.ncols() != self.target.len() {
            return Err(ConfigError::CheckpointIncompatible { layer: "output".to_string(), expected, found: checkpoint.dim() });
        }

        let mut values = fresh;
        let mut initialized = Vec::with_capacity(self.target.len());
        for (j, source) in self.source_columns.iter().enumerate() {
            match source {
                Some(i) => {
                    values.column_mut(j).assign(&checkpoint.column(*i));
                    initialized.push(false);
                }
                None => initialized.push(true),
            }
        }

        Ok(ColumnTransfer { values, initialized })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::config::Alphabet;

    fn symbols(characters: &str, reserved: usize) -> Vec<OutputSymbol> {
        Alphabet::new(characters.chars()).unwrap().output_symbols(reserved)
    }

    #[test]
    fn matches_by_symbol_not_position() {
        let mapping = AlphabetMapping::new(&symbols("abc", 1), &symbols("bcd", 1));

        assert_eq!(mapping.source_column(0), Some(1));
        assert_eq!(mapping.source_column(1), Some(2));
        assert_eq!(mapping.source_column(2), None);
        assert_eq!(mapping.source_column(3), Some(3));
        assert_eq!(mapping.dropped(), vec![OutputSymbol::Character('a')]);
        assert_eq!(mapping.initialized(), vec![OutputSymbol::Character('d')]);
        assert!(!mapping.is_identity());
    }

    #[test]
    fn permuted_alphabet_follows_symbols() {
        let mapping = AlphabetMapping::new(&symbols("ab", 0), &symbols("ba", 0));
        let checkpoint = array![[1.0f32, 2.0], [3.0, 4.0]];

        let transfer = mapping.apply(checkpoint.view(), Array2::zeros((2, 2))).unwrap();

        assert_eq!(transfer.values, array![[2.0f32, 1.0], [4.0, 3.0]]);
        assert_eq!(transfer.initialized, vec![false, false]);
    }

    #[test]
    fn shared_columns_copied_and_new_columns_kept_fresh() {
        let mapping = AlphabetMapping::new(&symbols("abc", 0), &symbols("bcd", 0));
        let checkpoint = array![[0.1f32, 0.2, 0.3], [0.4, 0.5, 0.6]];
        let fresh = array![[9.0f32, 9.0, 9.5], [9.0, 9.0, 9.75]];

        let transfer = mapping.apply(checkpoint.view(), fresh).unwrap();

        assert_eq!(transfer.values.column(0), checkpoint.column(1));
        assert_eq!(transfer.values.column(1), checkpoint.column(2));
        assert_eq!(transfer.values.column(2), array![9.5f32, 9.75]);
        assert_eq!(transfer.initialized, vec![false, false, true]);
    }

    #[test]
    fn wrong_checkpoint_width_is_rejected() {
        let mapping = AlphabetMapping::new(&symbols("abc", 1), &symbols("ab", 1));
        let result = mapping.apply(Array2::<f32>::zeros((2, 3)).view(), Array2::zeros((2, 3)));
        assert!(matches!(result, Err(ConfigError::CheckpointIncompatible { expected: (2, 4), found: (2, 3), .. })));
    }

    #[test]
    fn identical_alphabets_map_identically() {
        let mapping = AlphabetMapping::new(&symbols("abc", 1), &symbols("abc", 1));
        assert!(mapping.is_identity());
        assert!(mapping.dropped().is_empty());
    }
}
