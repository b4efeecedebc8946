//! Training runs: naming, directory layout and orchestration.

mod orchestrator;
mod run;

pub use orchestrator::{TrainedRun, TrainingOrchestrator, TrainingRun, TrainingSettings};
pub use run::{Regime, RunIdentity, format_timestamp, list_runs, now};
