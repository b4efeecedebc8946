//! Run names and the directories derived from them.
//!
//! A run is named `<YYYYMMDD-HHMMSS>-<regime>-<configuration>[-freeze-<n>]`, for example
//! `20170322-091502-adam-small-learning-rate-transfer-from-English-to-German-freeze-10`.
//! The same name is used for its log directory and its net directory.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::debug;

use crate::config::{DataPaths, validate_name};
use crate::error::{ConfigError, DataError};

const COMPLETE_TRAINING_SLUG: &str = "adam-small-learning-rate-complete-training";
const TRANSFER_PREFIX: &str = "adam-small-learning-rate-transfer-from-";
const TRANSFER_SUFFIX: &str = "-to";

static RUN_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<timestamp>\d{8}-\d{6})-(?P<slug>[A-Za-z0-9-]+?)-(?P<config>[A-Za-z0-9_]+)(?:-freeze-(?P<frozen>\d+))?$")
        .expect("run name pattern is valid")
});

/// How a run was trained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Regime {
    /// All layers trained from scratch.
    CompleteTraining,
    /// Initialized from a model trained on the `source` configuration.
    Transfer { source: String },
    /// Any other slug found on disk.
    Custom(String),
}

impl Regime {
    pub fn slug(&self) -> String {
        match self {
            Regime::CompleteTraining => COMPLETE_TRAINING_SLUG.to_string(),
            Regime::Transfer { source } => format!("{}{}{}", TRANSFER_PREFIX, source, TRANSFER_SUFFIX),
            Regime::Custom(slug) => slug.clone(),
        }
    }

    fn from_slug(slug: &str) -> Self {
        if slug == COMPLETE_TRAINING_SLUG {
            return Regime::CompleteTraining;
        }
        match slug.strip_prefix(TRANSFER_PREFIX).and_then(|rest| rest.strip_suffix(TRANSFER_SUFFIX)) {
            Some(source) if !source.is_empty() => Regime::Transfer { source: source.to_string() },
            _ => Regime::Custom(slug.to_string()),
        }
    }
}

/// Name parts of one training run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunIdentity {
    /// Wall-clock start, second resolution.
    pub timestamp: PrimitiveDateTime,
    pub regime: Regime,
    pub config_name: String,
    pub frozen_layer_count: Option<usize>,
}

impl RunIdentity {
    pub fn complete_training(timestamp: PrimitiveDateTime, config_name: impl Into<String>) -> Self {
        Self { timestamp: truncate_to_second(timestamp), regime: Regime::CompleteTraining, config_name: config_name.into(), frozen_layer_count: None }
    }

    /// # Errors
    /// Returns [`ConfigError::InvalidName`] if either configuration name could not be
    /// read back from the run name.
    pub fn transfer(
        timestamp: PrimitiveDateTime,
        source: impl Into<String>,
        config_name: impl Into<String>,
        frozen_layer_count: usize,
    ) -> Result<Self, ConfigError> {
        let (source, config_name) = (source.into(), config_name.into());
        validate_name(&source)?;
        validate_name(&config_name)?;

        Ok(Self {
            timestamp: truncate_to_second(timestamp),
            regime: Regime::Transfer { source },
            config_name,
            frozen_layer_count: Some(frozen_layer_count),
        })
    }

    /// Directory name of the run.
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// Parse a run directory name.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidRunName`] if `name` does not have the run name layout.
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidRunName(name.to_string());
        let captures = RUN_NAME.captures(name).ok_or_else(invalid)?;

        let timestamp = PrimitiveDateTime::parse(&captures["timestamp"], format_description!("[year][month][day]-[hour][minute][second]"))
            .map_err(|_| invalid())?;
        let frozen_layer_count = match captures.name("frozen") {
            Some(frozen) => Some(frozen.as_str().parse().map_err(|_| invalid())?),
            None => None,
        };

        Ok(Self {
            timestamp,
            regime: Regime::from_slug(&captures["slug"]),
            config_name: captures["config"].to_string(),
            frozen_layer_count,
        })
    }

    /// `<base>/logs/<run name>`
    pub fn log_directory(&self, paths: &DataPaths) -> PathBuf {
        paths.tensorboard_logs().join(self.name())
    }

    /// `<base>/nets/<run name>`
    pub fn net_directory(&self, paths: &DataPaths) -> PathBuf {
        paths.nets().join(self.name())
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timestamp = format_timestamp(self.timestamp).map_err(|_| fmt::Error)?;
        write!(f, "{}-{}-{}", timestamp, self.regime.slug(), self.config_name)?;
        if let Some(frozen) = self.frozen_layer_count {
            write!(f, "-freeze-{}", frozen)?;
        }
        Ok(())
    }
}

impl FromStr for RunIdentity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// `YYYYMMDD-HHMMSS`, as used in run and recording names.
pub fn format_timestamp(timestamp: PrimitiveDateTime) -> Result<String, time::error::Format> {
    timestamp.format(format_description!("[year][month][day]-[hour][minute][second]"))
}

/// Current local time, falling back to UTC when the local offset is unknown.
pub fn now() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    truncate_to_second(PrimitiveDateTime::new(now.date(), now.time()))
}

fn truncate_to_second(timestamp: PrimitiveDateTime) -> PrimitiveDateTime {
    timestamp.replace_nanosecond(0).unwrap_or(timestamp)
}

/// Runs found in the net directory, oldest first. Entries that are not run names are skipped.
pub fn list_runs(paths: &DataPaths) -> Result<Vec<RunIdentity>, DataError> {
    let nets = paths.nets();
    let entries = match std::fs::read_dir(&nets) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(DataError::io(&nets, e)),
    };

    let mut runs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DataError::io(&nets, e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        match RunIdentity::parse(&name) {
            Ok(run) => runs.push(run),
            Err(_) => debug!("Skipping {} in {}", name, nets.display()),
        }
    }

    runs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.name().cmp(&b.name())));
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use time::Duration;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn runs_one_second_apart_differ_and_parse_back() {
        let first = RunIdentity::transfer(datetime!(2017-03-22 09:15:02), "English", "German", 10).unwrap();
        let second = RunIdentity::transfer(datetime!(2017-03-22 09:15:02) + Duration::seconds(1), "English", "German", 10).unwrap();

        assert_ne!(first.name(), second.name());
        assert_eq!(first.name(), "20170322-091502-adam-small-learning-rate-transfer-from-English-to-German-freeze-10");

        for run in [first, second] {
            let parsed = RunIdentity::parse(&run.name()).unwrap();
            assert_eq!(parsed, run);
            assert_eq!(parsed.config_name, "German");
            assert_eq!(parsed.frozen_layer_count, Some(10));
        }
    }

    #[test]
    fn transfer_source_must_survive_the_round_trip() {
        for source in ["English US", "en/US", "", "en-US"] {
            let result = RunIdentity::transfer(datetime!(2017-03-22 09:15:02), source, "German", 2);
            assert!(matches!(result, Err(ConfigError::InvalidName(ref name)) if name == source), "{:?}", source);
        }
        assert!(matches!(RunIdentity::transfer(datetime!(2017-03-22 09:15:02), "English", "de/DE", 2), Err(ConfigError::InvalidName(_))));
    }

    #[test]
    fn complete_training_has_no_freeze_suffix() {
        let run = RunIdentity::complete_training(datetime!(2017-03-16 18:09:57.250), "English");
        assert_eq!(run.name(), "20170316-180957-adam-small-learning-rate-complete-training-English");
        assert_eq!(run.name().parse::<RunIdentity>().unwrap(), run);
    }

    #[test]
    fn unknown_slugs_are_kept_verbatim() {
        let run = RunIdentity::parse("20170316-180957-adam-small-learning-rate-complete-95").unwrap();
        assert_eq!(run.regime, Regime::Custom("adam-small-learning-rate-complete".to_string()));
        assert_eq!(run.config_name, "95");
        assert_eq!(run.frozen_layer_count, None);
        assert_eq!(run.name(), "20170316-180957-adam-small-learning-rate-complete-95");
    }

    #[test]
    fn malformed_names_are_rejected() {
        for name in ["", "weights-epoch-3.json", "2017-180957-x-English", "20171399-180957-adam-English"] {
            assert!(matches!(RunIdentity::parse(name), Err(ConfigError::InvalidRunName(_))), "{:?}", name);
        }
    }

    #[test]
    fn directories_are_named_after_the_run() {
        let paths = DataPaths::new("/data");
        let run = RunIdentity::complete_training(datetime!(2017-03-16 18:09:57), "English");
        assert_eq!(run.log_directory(&paths), PathBuf::from("/data/logs/20170316-180957-adam-small-learning-rate-complete-training-English"));
        assert_eq!(run.net_directory(&paths), PathBuf::from("/data/nets/20170316-180957-adam-small-learning-rate-complete-training-English"));
    }

    #[test]
    fn listing_skips_foreign_entries() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        assert!(list_runs(&paths).unwrap().is_empty());

        std::fs::create_dir_all(paths.nets().join("20170316-180957-adam-small-learning-rate-complete-95")).unwrap();
        std::fs::create_dir_all(paths.nets().join("scratch")).unwrap();

        let runs = list_runs(&paths).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].config_name, "95");
    }
}
