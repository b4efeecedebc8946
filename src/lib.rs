//! Speech recognition experiment configurations and their resource lifecycle.
//!
//! A [`config::Configuration`] names an alphabet and lazily provides the corpus and
//! batch generator for it. [`training::TrainingOrchestrator`] starts fresh and
//! transfer runs, [`model::ModelResolver`] reuses a pretrained checkpoint across
//! alphabets and [`demo::PredictionDemo`] transcribes recordings.

pub mod cli;
pub mod config;
pub mod corpus;
pub mod demo;
pub mod error;
pub mod model;
mod storage;
pub mod training;

pub use error::{Error, Result};
