//! Training/test split of labeled examples with CSV persistence.

use std::fmt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::example::LabeledExample;
use crate::error::{DataError, Result};
use crate::storage::write_atomically;

const HEADER: &str = "id,audio_file,label,split";
const TRAINING: &str = "training";
const TEST: &str = "test";
/// Label field of a labeled example whose label is empty; an empty field means unlabeled.
const EMPTY_LABEL: &str = "\"\"";

/// Immutable set of labeled examples, split into training and test examples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    training: Vec<LabeledExample>,
    test: Vec<LabeledExample>,
}

impl Corpus {
    pub fn new(training: Vec<LabeledExample>, test: Vec<LabeledExample>) -> Self {
        Self { training, test }
    }

    pub fn training_examples(&self) -> &[LabeledExample] {
        &self.training
    }

    pub fn test_examples(&self) -> &[LabeledExample] {
        &self.test
    }

    /// All examples, training first.
    pub fn examples(&self) -> impl Iterator<Item = &LabeledExample> {
        self.training.iter().chain(self.test.iter())
    }

    pub fn len(&self) -> usize {
        self.training.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a corpus written by [`Corpus::save`].
    ///
    /// # Errors
    /// Returns [`DataError::Missing`] if the file does not exist and
    /// [`DataError::Malformed`] for any line that is not a valid record.
    pub fn load(path: &Path) -> std::result::Result<Self, DataError> {
        let content = std::fs::read_to_string(path).map_err(|e| DataError::io(path, e))?;
        let mut lines = content.lines().enumerate();

        match lines.next() {
            Some((_, header)) if header.trim_end() == HEADER => {}
            _ => {
                return Err(DataError::Malformed {
                    path: path.to_path_buf(),
                    line: 1,
                    reason: format!("expected header '{}'", HEADER),
                });
            }
        }

        let mut corpus = Corpus::default();
        for (index, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let malformed = |reason: String| DataError::Malformed { path: path.to_path_buf(), line: index + 1, reason };

            let fields: Vec<&str> = line.split(',').collect();
            let [id, audio_file, label, split] = fields[..] else {
                return Err(malformed(format!("expected 4 fields, found {}", fields.len())));
            };
            if id.is_empty() {
                return Err(malformed("empty id".to_string()));
            }

            let example = LabeledExample {
                id: id.to_string(),
                audio_file: PathBuf::from(audio_file),
                label: match label {
                    "" => None,
                    EMPTY_LABEL => Some(String::new()),
                    label => Some(label.to_string()),
                },
            };
            match split {
                TRAINING => corpus.training.push(example),
                TEST => corpus.test.push(example),
                other => return Err(malformed(format!("unknown split '{}'", other))),
            }
        }

        debug!("Loaded corpus from {}: {} training, {} test", path.display(), corpus.training.len(), corpus.test.len());
        Ok(corpus)
    }

    /// Write the corpus as CSV, replacing any previous file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut csv = String::from(HEADER);
        csv.push('\n');

        for (split, examples) in [(TRAINING, &self.training), (TEST, &self.test)] {
            for example in examples {
                let audio_file = example.audio_file.to_string_lossy();
                let label = example.label.as_deref().unwrap_or("");
                check_field(&example.id, "id", &example.id)?;
                check_field(&example.id, "audio_file", &audio_file)?;
                check_field(&example.id, "label", label)?;
                let label = match &example.label {
                    Some(label) if label.is_empty() => EMPTY_LABEL,
                    _ => label,
                };
                let _ = writeln!(csv, "{},{},{},{}", example.id, audio_file, label, split);
            }
        }

        write_atomically(path, csv.as_bytes())?;
        info!("Saved corpus ({} examples) to {}", self.len(), path.display());
        Ok(())
    }

    /// Example counts and label statistics per split.
    pub fn summary(&self) -> CorpusSummary {
        CorpusSummary { training: SplitSummary::of(&self.training), test: SplitSummary::of(&self.test) }
    }

    /// Write [`Corpus::summary`] as CSV.
    pub fn summarize_to_csv(&self, path: &Path) -> Result<()> {
        let summary = self.summary();
        let mut csv = String::from("split,examples,label_characters,mean_label_length\n");
        for (split, stats) in [(TRAINING, &summary.training), (TEST, &summary.test)] {
            let _ = writeln!(csv, "{},{},{},{:.3}", split, stats.examples, stats.label_characters, stats.mean_label_length());
        }

        write_atomically(path, csv.as_bytes())?;
        info!("Saved corpus summary to {}", path.display());
        Ok(())
    }
}

fn check_field(id: &str, field: &'static str, value: &str) -> std::result::Result<(), DataError> {
    if value.contains([',', '"', '\n', '\r']) {
        return Err(DataError::UnencodableField { id: id.to_string(), field });
    }
    Ok(())
}

/// Statistics for one split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitSummary {
    pub examples: usize,
    pub labeled_examples: usize,
    pub label_characters: usize,
}

impl SplitSummary {
    fn of(examples: &[LabeledExample]) -> Self {
        let labels: Vec<&str> = examples.iter().filter_map(|e| e.label.as_deref()).collect();
        Self {
            examples: examples.len(),
            labeled_examples: labels.len(),
            label_characters: labels.iter().map(|l| l.chars().count()).sum(),
        }
    }

    pub fn mean_label_length(&self) -> f64 {
        if self.labeled_examples == 0 { 0.0 } else { self.label_characters as f64 / self.labeled_examples as f64 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorpusSummary {
    pub training: SplitSummary,
    pub test: SplitSummary,
}

impl fmt::Display for CorpusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} training examples ({} labeled, mean label length {:.1})",
            self.training.examples,
            self.training.labeled_examples,
            self.training.mean_label_length()
        )?;
        write!(
            f,
            "{} test examples ({} labeled, mean label length {:.1})",
            self.test.examples,
            self.test.labeled_examples,
            self.test.mean_label_length()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn sample_corpus() -> Corpus {
        Corpus::new(
            vec![
                LabeledExample::new("6930-75918-0000", "/audio/6930-75918-0000.flac", "concord returned to its place"),
                LabeledExample::new("6930-75918-0001", "/audio/6930-75918-0001.flac", "amidst the tents"),
            ],
            vec![LabeledExample::new("1089-134686-0000", "/audio/1089-134686-0000.flac", "he hoped")],
        )
    }

    #[test]
    fn save_then_load_preserves_splits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("German").join("corpus.csv");
        let corpus = sample_corpus();

        corpus.save(&path).unwrap();
        let loaded = Corpus::load(&path).unwrap();

        assert_eq!(loaded, corpus);
        assert_eq!(loaded.training_examples().len(), 2);
        assert_eq!(loaded.test_examples().len(), 1);
    }

    #[test]
    fn empty_labels_stay_distinct_from_unlabeled_examples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.csv");
        let corpus = Corpus::new(
            vec![LabeledExample::new("silence", "/silence.wav", ""), LabeledExample::from_audio_file("/recording.wav")],
            vec![],
        );

        corpus.save(&path).unwrap();
        let loaded = Corpus::load(&path).unwrap();

        assert_eq!(loaded, corpus);
        assert_eq!(loaded.training_examples()[0].label.as_deref(), Some(""));
        assert_eq!(loaded.training_examples()[1].label, None);
    }

    #[test]
    fn labels_with_quotes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = Corpus::new(vec![LabeledExample::new("a", "/a.wav", "\"\"")], vec![]);
        let result = corpus.save(&dir.path().join("corpus.csv"));
        assert!(matches!(result, Err(Error::Data(DataError::UnencodableField { field: "label", .. }))));
    }

    #[test]
    fn missing_file_is_reported_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.csv");
        assert!(matches!(Corpus::load(&path), Err(DataError::Missing(p)) if p == path));
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.csv");
        std::fs::write(&path, format!("{}\na,/a.wav,x,training\nb,/b.wav,x\n", HEADER)).unwrap();

        match Corpus::load(&path) {
            Err(DataError::Malformed { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn labels_with_commas_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = Corpus::new(vec![LabeledExample::new("a", "/a.wav", "yes, no")], vec![]);
        let result = corpus.save(&dir.path().join("corpus.csv"));
        assert!(matches!(result, Err(Error::Data(DataError::UnencodableField { field: "label", .. }))));
    }

    #[test]
    fn summary_counts_label_characters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let corpus = sample_corpus();

        let summary = corpus.summary();
        assert_eq!(summary.training.examples, 2);
        assert_eq!(summary.training.label_characters, 29 + 16);
        assert_eq!(summary.test.label_characters, 8);

        corpus.summarize_to_csv(&path).unwrap();
        let csv = std::fs::read_to_string(&path).unwrap();
        assert!(csv.starts_with("split,examples,label_characters,mean_label_length\n"));
        assert!(csv.contains("test,1,8,8.000"));
    }
}
