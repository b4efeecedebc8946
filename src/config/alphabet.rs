//! Output alphabets and the symbols of an output layer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Characters of the English configuration, in output-column order.
pub const ENGLISH_FREQUENT_CHARACTERS: &str = "abcdefghijklmnopqrstuvwxyz '";

/// German adds umlauts and sharp s after the English characters.
pub const GERMAN_FREQUENT_CHARACTERS: &str = "abcdefghijklmnopqrstuvwxyz 'äöüß";

/// One column of an output layer.
///
/// Reserved symbols (e.g. the CTC blank) follow the alphabet characters and are
/// identified by their reserved index, so they line up across alphabets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputSymbol {
    Character(char),
    Reserved(usize),
}

/// Ordered, deduplicated set of characters a model predicts over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Alphabet {
    characters: Vec<char>,
}

impl Alphabet {
    /// Build an alphabet, keeping the first occurrence of repeated characters.
    ///
    /// # Errors
    /// Returns [`ConfigError::MalformedAlphabet`] if no characters remain or a
    /// control character is present.
    pub fn new(characters: impl IntoIterator<Item = char>) -> Result<Self, ConfigError> {
        let mut unique: Vec<char> = Vec::new();
        for c in characters {
            if c.is_control() {
                return Err(ConfigError::MalformedAlphabet(format!("control character {:?}", c)));
            }
            if !unique.contains(&c) {
                unique.push(c);
            }
        }

        if unique.is_empty() {
            return Err(ConfigError::MalformedAlphabet("no characters".to_string()));
        }

        Ok(Self { characters: unique })
    }

    pub fn english() -> Self {
        Self { characters: ENGLISH_FREQUENT_CHARACTERS.chars().collect() }
    }

    pub fn german() -> Self {
        Self { characters: GERMAN_FREQUENT_CHARACTERS.chars().collect() }
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    pub fn characters(&self) -> &[char] {
        &self.characters
    }

    pub fn contains(&self, c: char) -> bool {
        self.characters.contains(&c)
    }

    /// Output columns for this alphabet followed by `reserved` reserved symbols.
    pub fn output_symbols(&self, reserved: usize) -> Vec<OutputSymbol> {
        self.characters
            .iter()
            .copied()
            .map(OutputSymbol::Character)
            .chain((0..reserved).map(OutputSymbol::Reserved))
            .collect()
    }
}

impl fmt::Display for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.characters {
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Alphabet {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Alphabet::new(value.chars())
    }
}

impl From<Alphabet> for String {
    fn from(alphabet: Alphabet) -> Self {
        alphabet.to_string()
    }
}
