//! Experiment configuration: alphabets, data directory layout and named configurations.

mod alphabet;
mod configuration;
mod paths;

pub use alphabet::{Alphabet, ENGLISH_FREQUENT_CHARACTERS, GERMAN_FREQUENT_CHARACTERS, OutputSymbol};
pub use configuration::{BestModelReport, CORPUS_FILE_NAME, Configuration, CorpusLoader, SUMMARY_FILE_NAME, load_cached_corpus};
pub use paths::{DataPaths, default_base_dir};

pub(crate) use configuration::validate_name;
