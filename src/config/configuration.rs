//! Experiment configurations: a named alphabet with its corpus and feature cache.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::unsync::OnceCell;
use tracing::info;

use super::alphabet::Alphabet;
use super::paths::DataPaths;
use crate::corpus::{BatchGenerator, CacheFillReport, Corpus, DEFAULT_BATCH_SIZE, FeatureExtractor, SpectrogramCache};
use crate::error::{ConfigError, DataError, Error, Result};
use crate::model::{ExpectationVsPrediction, LanguageModel, ModelResolver, ResolveOptions};

/// Reads a corpus from its directory.
pub type CorpusLoader = Arc<dyn Fn(&Path) -> std::result::Result<Corpus, DataError> + Send + Sync>;

/// File a cached corpus is stored in, inside its corpus directory.
pub const CORPUS_FILE_NAME: &str = "corpus.csv";

/// File the corpus summary is written to, inside the corpus directory.
pub const SUMMARY_FILE_NAME: &str = "summary.csv";

/// Load `<directory>/corpus.csv`.
pub fn load_cached_corpus(directory: &Path) -> std::result::Result<Corpus, DataError> {
    Corpus::load(&directory.join(CORPUS_FILE_NAME))
}

/// Named experiment descriptor.
///
/// The corpus and the batch generator are built on first access and then reused
/// for the lifetime of the configuration. A failed corpus load is not remembered,
/// so a later access tries again.
pub struct Configuration {
    name: String,
    alphabet: Alphabet,
    corpus_loader: CorpusLoader,
    corpus_directory: PathBuf,
    spectrogram_cache_directory: PathBuf,
    feature_extractor: Option<Arc<dyn FeatureExtractor>>,
    batch_size: usize,
    corpus: OnceCell<Arc<Corpus>>,
    batch_generator: OnceCell<BatchGenerator>,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("name", &self.name)
            .field("alphabet", &self.alphabet.to_string())
            .field("corpus_directory", &self.corpus_directory)
            .field("spectrogram_cache_directory", &self.spectrogram_cache_directory)
            .field("feature_extractor", &self.feature_extractor.is_some())
            .field("corpus_loaded", &self.corpus.get().is_some())
            .finish()
    }
}

/// Outcome of [`Configuration::test_best_model`].
#[derive(Debug, Clone, PartialEq)]
pub struct BestModelReport {
    pub expectations: Vec<ExpectationVsPrediction>,
    /// Average loss over all test batches.
    pub test_loss: f32,
}

impl fmt::Display for BestModelReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for expectation in &self.expectations {
            writeln!(f, "{}", expectation)?;
        }
        write!(f, "Average test loss: {:.4}", self.test_loss)
    }
}

impl Configuration {
    /// Create a configuration with directories under `paths`.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidName`] unless `name` is non-empty ASCII
    /// letters, digits and underscores.
    pub fn new(name: impl Into<String>, alphabet: Alphabet, paths: &DataPaths, corpus_loader: CorpusLoader) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;

        Ok(Self {
            corpus_directory: paths.corpus().join(&name),
            spectrogram_cache_directory: paths.spectrogram_cache().join(&name),
            name,
            alphabet,
            corpus_loader,
            feature_extractor: None,
            batch_size: DEFAULT_BATCH_SIZE,
            corpus: OnceCell::new(),
            batch_generator: OnceCell::new(),
        })
    }

    /// English alphabet, corpus read from the cached `corpus.csv`.
    pub fn english(paths: &DataPaths) -> Result<Self> {
        Self::new("English", Alphabet::english(), paths, Arc::new(load_cached_corpus))
    }

    /// German alphabet, corpus read from the cached `corpus.csv`.
    pub fn german(paths: &DataPaths) -> Result<Self> {
        Self::new("German", Alphabet::german(), paths, Arc::new(load_cached_corpus))
    }

    /// German alphabet with a parser for the raw corpus sources.
    pub fn german_from_raw(paths: &DataPaths, corpus_loader: CorpusLoader) -> Result<Self> {
        Self::new("German", Alphabet::german(), paths, corpus_loader)
    }

    pub fn with_corpus_loader(mut self, corpus_loader: CorpusLoader) -> Self {
        self.corpus_loader = corpus_loader;
        self.corpus = OnceCell::new();
        self.batch_generator = OnceCell::new();
        self
    }

    pub fn with_feature_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.feature_extractor = Some(extractor);
        self.batch_generator = OnceCell::new();
        self
    }

    pub fn with_corpus_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.corpus_directory = directory.into();
        self.corpus = OnceCell::new();
        self.batch_generator = OnceCell::new();
        self
    }

    pub fn with_cache_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.spectrogram_cache_directory = directory.into();
        self.batch_generator = OnceCell::new();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self.batch_generator = OnceCell::new();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn corpus_directory(&self) -> &Path {
        &self.corpus_directory
    }

    pub fn spectrogram_cache_directory(&self) -> &Path {
        &self.spectrogram_cache_directory
    }

    /// The corpus, loaded from the corpus directory on first call.
    ///
    /// # Errors
    /// Returns [`Error::Corpus`] with the configuration name and directory if the
    /// loader fails.
    pub fn corpus(&self) -> Result<Arc<Corpus>> {
        let corpus = self.corpus.get_or_try_init(|| {
            info!("Loading corpus for {} from {}", self.name, self.corpus_directory.display());
            (self.corpus_loader)(&self.corpus_directory)
                .map(Arc::new)
                .map_err(|source| Error::Corpus { config: self.name.clone(), path: self.corpus_directory.clone(), source })
        })?;
        Ok(Arc::clone(corpus))
    }

    /// The batch generator over [`Configuration::corpus`] and the cache directory.
    ///
    /// Building it loads the corpus but does not touch the cache directory.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingCollaborator`] if no feature extractor was
    /// given, or the corpus load error.
    pub fn batch_generator(&self) -> Result<&BatchGenerator> {
        self.batch_generator.get_or_try_init(|| {
            let extractor = self
                .feature_extractor
                .clone()
                .ok_or_else(|| ConfigError::MissingCollaborator { config: self.name.clone(), collaborator: "feature extractor" })?;
            let cache = SpectrogramCache::new(&self.spectrogram_cache_directory, extractor);
            Ok(BatchGenerator::new(self.corpus()?, cache, self.batch_size))
        })
    }

    /// The batch generator if it has been built already.
    pub fn batch_generator_if_built(&self) -> Option<&BatchGenerator> {
        self.batch_generator.get()
    }

    /// Log the corpus summary and write `summary.csv` and `corpus.csv` into the corpus directory.
    pub fn summarize_and_save_corpus(&self) -> Result<()> {
        let corpus = self.corpus()?;
        info!("{} corpus:\n{}", self.name, corpus.summary());
        corpus.summarize_to_csv(&self.corpus_directory.join(SUMMARY_FILE_NAME))?;
        corpus.save(&self.corpus_directory.join(CORPUS_FILE_NAME))
    }

    /// Compute every missing spectrogram of the corpus.
    pub fn fill_up_cache(&self) -> Result<CacheFillReport> {
        self.batch_generator()?.fill_cache()
    }

    /// Predict the preview batch with the resolver's model and measure the test loss.
    pub fn test_best_model(
        &self,
        resolver: &ModelResolver,
        backend: Arc<dyn crate::model::Backend>,
        language_model: Option<Arc<dyn LanguageModel>>,
    ) -> Result<BestModelReport> {
        let model = resolver.resolve(&self.alphabet, ResolveOptions { frozen_layer_count: 0, language_model }, backend)?;
        let batches = self.batch_generator()?;

        let expectations = model.expectations_vs_predictions(&batches.preview_batch()?)?;
        for expectation in &expectations {
            info!("{}", expectation);
        }

        let test_loss = model.loss(&batches.test_batches()?)?;
        info!("Average test loss of {} on {}: {:.4}", resolver.checkpoint().configuration_name, self.name, test_loss);

        Ok(BestModelReport { expectations, test_loss })
    }
}

/// Names end up in directory and run names: non-empty ASCII letters, digits and `_`.
pub(crate) fn validate_name(name: &str) -> std::result::Result<(), ConfigError> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ndarray::{Array1, Array2};

    use super::*;
    use crate::corpus::LabeledExample;
    use crate::model::testing::ScriptedBackend;
    use crate::model::{Architecture, Checkpoint, CheckpointReference, StoredLayer};

    struct OnesExtractor;

    impl FeatureExtractor for OnesExtractor {
        fn spectrogram(&self, _example: &LabeledExample) -> anyhow::Result<Array2<f32>> {
            Ok(Array2::ones((2, 2)))
        }
    }

    fn counting_loader(calls: Arc<AtomicUsize>) -> CorpusLoader {
        Arc::new(move |_dir: &Path| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Corpus::new(vec![LabeledExample::new("a", "/a.wav", "ab")], vec![LabeledExample::new("b", "/b.wav", "ba")]))
        })
    }

    #[test]
    fn corpus_is_loaded_once_and_shared() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = Configuration::new("Test", Alphabet::new("ab".chars()).unwrap(), &DataPaths::new("/data"), counting_loader(calls.clone())).unwrap();

        let first = config.corpus().unwrap();
        let second = config.corpus().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn directories_default_under_base() {
        let config = Configuration::english(&DataPaths::new("/data")).unwrap();
        assert_eq!(config.corpus_directory(), Path::new("/data/corpus/English"));
        assert_eq!(config.spectrogram_cache_directory(), Path::new("/data/spectrogram-cache/English"));

        let config = config.with_corpus_directory("/elsewhere");
        assert_eq!(config.corpus_directory(), Path::new("/elsewhere"));
    }

    #[test]
    fn batch_generator_is_lazy_and_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let config = Configuration::new("Test", Alphabet::new("ab".chars()).unwrap(), &DataPaths::new(dir.path()), counting_loader(calls.clone()))
            .unwrap()
            .with_feature_extractor(Arc::new(OnesExtractor));

        assert!(config.batch_generator_if_built().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let generator = config.batch_generator().unwrap();
        assert!(Arc::ptr_eq(generator.corpus(), &config.corpus().unwrap()));
        assert!(std::ptr::eq(generator, config.batch_generator().unwrap()));
        assert!(!config.spectrogram_cache_directory().exists());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_is_reported_with_context_and_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let loader: CorpusLoader = Arc::new(move |dir: &Path| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(DataError::Missing(dir.join(CORPUS_FILE_NAME)))
            } else {
                Ok(Corpus::default())
            }
        });
        let config = Configuration::new("German", Alphabet::german(), &DataPaths::new("/data"), loader).unwrap();

        let error = config.corpus().unwrap_err();
        assert!(matches!(&error, Error::Corpus { config, path, .. } if config == "German" && path == Path::new("/data/corpus/German")));
        assert!(config.corpus().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_extractor_is_reported() {
        let config = Configuration::new("Test", Alphabet::english(), &DataPaths::new("/data"), counting_loader(Arc::default())).unwrap();
        assert!(matches!(config.batch_generator(), Err(Error::Config(ConfigError::MissingCollaborator { .. }))));
    }

    #[test]
    fn invalid_names_are_rejected() {
        for name in ["", "has space", "dash-ed", "../up"] {
            let result = Configuration::new(name, Alphabet::english(), &DataPaths::new("/data"), Arc::new(load_cached_corpus));
            assert!(matches!(result, Err(Error::Config(ConfigError::InvalidName(_)))), "{:?}", name);
        }
    }

    #[test]
    fn summarize_writes_summary_and_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let config = Configuration::new("Test", Alphabet::new("ab".chars()).unwrap(), &paths, counting_loader(Arc::default())).unwrap();

        config.summarize_and_save_corpus().unwrap();

        let corpus_dir = paths.corpus().join("Test");
        assert!(corpus_dir.join(SUMMARY_FILE_NAME).exists());
        let reloaded = load_cached_corpus(&corpus_dir).unwrap();
        assert_eq!(reloaded, *config.corpus().unwrap());
    }

    #[test]
    fn best_model_is_tested_on_preview_and_test_batches() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let alphabet = Alphabet::new("ab".chars()).unwrap();
        let architecture = Architecture { input_size_per_time_step: 2, hidden_layer_widths: vec![2], reserved_symbols: 1 };
        let checkpoint_directory = paths.nets().join("best");
        let layers = architecture
            .layer_shapes(&alphabet)
            .into_iter()
            .map(|shape| StoredLayer { name: String::new(), weights: Array2::zeros(shape), biases: Array1::zeros(shape.1) })
            .collect();
        Checkpoint { epoch: 3, layers }.save(&checkpoint_directory).unwrap();
        let resolver = ModelResolver::new(architecture, CheckpointReference::new(checkpoint_directory, 3, alphabet.clone(), "English"));

        let loader: CorpusLoader = Arc::new(|_dir: &Path| {
            Ok(Corpus::new(
                vec![LabeledExample::new("train", "/train.wav", "a")],
                vec![LabeledExample::new("first", "/first.wav", "bb"), LabeledExample::new("second", "/second.wav", "ab")],
            ))
        });
        let config = Configuration::new("Test", alphabet, &paths, loader).unwrap().with_feature_extractor(Arc::new(OnesExtractor));

        let report = config.test_best_model(&resolver, Arc::new(ScriptedBackend::default()), None).unwrap();

        let ids: Vec<&str> = report.expectations.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert!(report.expectations.iter().all(|e| e.predicted == "b"));
        assert_eq!(report.expectations[0].expected.as_deref(), Some("bb"));
        assert_eq!(report.test_loss, 2.0);
        assert!(report.to_string().ends_with("Average test loss: 2.0000"));
    }

    #[test]
    fn fill_up_cache_computes_every_example() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration::new("Test", Alphabet::new("ab".chars()).unwrap(), &DataPaths::new(dir.path()), counting_loader(Arc::default()))
            .unwrap()
            .with_feature_extractor(Arc::new(OnesExtractor));

        let report = config.fill_up_cache().unwrap();
        assert_eq!(report.computed, 2);
        assert_eq!(config.fill_up_cache().unwrap().computed, 0);
    }
}
