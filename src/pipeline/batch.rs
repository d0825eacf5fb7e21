// Batch trainer: fit one topic model per run specification.
//
// Each specification goes through fetch -> normalize -> vocabulary ->
// vectorize -> fit -> validate -> persist. Any failure along the way is
// turned into a TrainingError recorded against that run_id; the batch always
// runs to the end and returns one outcome per input entry, in input order.
//
// Corpus preparation is memoized per exact dataset identity (type and raw
// name, plus run_id under the per-run strategy). With the shared vocabulary
// strategy every specification naming the same dataset waits on the same
// cell, so the dataset is fetched once and its PreparedCorpus is handed out
// read-only behind an Arc. A failed preparation is cached too, so every
// dependent specification reports it without refetching.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use super::spec::{reject_duplicates, RunSpecification, SpecEntry};
use crate::corpus::prepared::{CorpusKey, PreparedCorpus};
use crate::corpus::vocabulary::VocabularyThresholds;
use crate::dataset::traits::CorpusProvider;
use crate::dataset::DatasetType;
use crate::error::TrainingError;
use crate::fitter::traits::{FitParams, TopicFitter};
use crate::storage::models::{rescue, ModelArtifact};
use crate::storage::{default_rescue_dir, CorpusStore, ModelStore};
use crate::text::normalizer::{NormalizerConfig, TextNormalizer};

/// Whether runs on the same dataset share one vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VocabularyStrategy {
    /// One corpus and vocabulary per dataset, reused by every run in the batch
    #[default]
    Shared,
    /// A fresh corpus and vocabulary for every run
    PerRun,
}

/// Exact identity of a corpus within one batch: dataset type, raw dataset
/// name, and the run_id under the per-run strategy.
type CorpusIdentity = (DatasetType, String, Option<String>);

impl VocabularyStrategy {
    fn identity(&self, spec: &RunSpecification) -> CorpusIdentity {
        let run = match self {
            VocabularyStrategy::Shared => None,
            VocabularyStrategy::PerRun => Some(spec.run_id.clone()),
        };
        (spec.dataset_type, spec.dataset_name.clone(), run)
    }

    fn corpus_key(&self, spec: &RunSpecification) -> CorpusKey {
        match self {
            VocabularyStrategy::Shared => CorpusKey::shared(spec.dataset_type, &spec.dataset_name),
            VocabularyStrategy::PerRun => {
                CorpusKey::per_run(spec.dataset_type, &spec.dataset_name, &spec.run_id)
            }
        }
    }
}

impl FromStr for VocabularyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(VocabularyStrategy::Shared),
            "per-run" => Ok(VocabularyStrategy::PerRun),
            other => Err(format!(
                "unknown vocabulary strategy '{other}' (expected 'shared' or 'per-run')"
            )),
        }
    }
}

impl fmt::Display for VocabularyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VocabularyStrategy::Shared => f.write_str("shared"),
            VocabularyStrategy::PerRun => f.write_str("per-run"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub normalizer: NormalizerConfig,
    pub thresholds: VocabularyThresholds,
    pub strategy: VocabularyStrategy,
    /// Load a stored corpus with matching thresholds instead of fetching
    pub reuse_corpus: bool,
    /// Replace artifacts that already exist for a run_id
    pub overwrite: bool,
    /// Sampling iterations for specifications without n_iters
    pub default_iterations: usize,
    pub fetch_timeout: Duration,
    pub fit_timeout: Duration,
    /// Specifications in flight at once
    pub concurrency: usize,
    pub rescue_dir: PathBuf,
    pub show_progress: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            normalizer: NormalizerConfig::default(),
            thresholds: VocabularyThresholds::default(),
            strategy: VocabularyStrategy::Shared,
            reuse_corpus: false,
            overwrite: false,
            default_iterations: 500,
            fetch_timeout: Duration::from_secs(300),
            fit_timeout: Duration::from_secs(3600),
            concurrency: 1,
            rescue_dir: default_rescue_dir(),
            show_progress: false,
        }
    }
}

/// Shared cancellation switch, checked before each specification starts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub enum RunStatus {
    Succeeded {
        artifact: PathBuf,
        iterations: usize,
        final_log_likelihood: Option<f64>,
    },
    Failed(TrainingError),
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// 1-based position of the entry in the specification file
    pub position: usize,
    /// run_id, or "entry #n" when none could be read
    pub run_id: String,
    pub status: RunStatus,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Succeeded { .. })
    }

    pub fn error(&self) -> Option<&TrainingError> {
        match &self.status {
            RunStatus::Failed(e) => Some(e),
            RunStatus::Succeeded { .. } => None,
        }
    }
}

/// Per-entry outcomes in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<RunOutcome>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(RunOutcome::is_success)
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

type CorpusCell = Arc<OnceCell<Result<Arc<PreparedCorpus>, TrainingError>>>;

pub struct BatchTrainer {
    provider: Arc<dyn CorpusProvider>,
    fitter: Arc<dyn TopicFitter>,
    models: ModelStore,
    corpora: CorpusStore,
    normalizer: Arc<TextNormalizer>,
    options: BatchOptions,
    cancel: CancelFlag,
}

impl BatchTrainer {
    pub fn new(
        provider: Arc<dyn CorpusProvider>,
        fitter: Arc<dyn TopicFitter>,
        models: ModelStore,
        corpora: CorpusStore,
        options: BatchOptions,
    ) -> Self {
        let normalizer = Arc::new(TextNormalizer::new(&options.normalizer));
        Self {
            provider,
            fitter,
            models,
            corpora,
            normalizer,
            options,
            cancel: CancelFlag::default(),
        }
    }

    /// Use an externally owned cancellation flag (e.g. one tripped by Ctrl-C).
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Train every entry and report one outcome per entry, in input order.
    pub async fn run(&self, mut entries: Vec<SpecEntry>) -> BatchReport {
        if let Err(e) = self.options.thresholds.validate() {
            error!(error = %e, "Vocabulary thresholds are invalid, no run can proceed");
            return BatchReport {
                outcomes: entries
                    .into_iter()
                    .map(|entry| RunOutcome {
                        position: entry.position,
                        run_id: entry.label,
                        status: RunStatus::Failed(e.clone()),
                    })
                    .collect(),
            };
        }

        // Configuration problems surface before any corpus is fetched
        reject_duplicates(&mut entries);
        if !self.options.overwrite {
            for entry in entries.iter_mut() {
                if let Ok(spec) = &entry.spec {
                    let path = self.models.artifact_path(&spec.run_id);
                    if path.exists() {
                        entry.spec = Err(format!(
                            "artifact already exists at {} (use --overwrite to replace it)",
                            path.display()
                        ));
                    }
                }
            }
        }

        let mut cells: HashMap<CorpusIdentity, (CorpusKey, CorpusCell)> = HashMap::new();
        let planned: Vec<(SpecEntry, Option<(CorpusKey, CorpusCell)>)> = entries
            .into_iter()
            .map(|entry| {
                let slot = entry.spec.as_ref().ok().map(|spec| {
                    let strategy = self.options.strategy;
                    cells
                        .entry(strategy.identity(spec))
                        .or_insert_with(|| (strategy.corpus_key(spec), CorpusCell::default()))
                        .clone()
                });
                (entry, slot)
            })
            .collect();

        info!(
            specifications = planned.len(),
            corpora = cells.len(),
            strategy = %self.options.strategy,
            concurrency = self.options.concurrency,
            "Starting batch"
        );

        let pb = if self.options.show_progress {
            let pb = ProgressBar::new(planned.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  Training [{bar:30}] {pos}/{len} ({eta})")
                    .expect("valid template"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let outcomes: Vec<RunOutcome> = stream::iter(planned.into_iter().map(|(entry, slot)| {
            let pb = pb.clone();
            async move {
                let outcome = self.run_entry(entry, slot).await;
                pb.inc(1);
                outcome
            }
        }))
        .buffered(self.options.concurrency.max(1))
        .collect()
        .await;
        pb.finish_and_clear();

        let report = BatchReport { outcomes };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Batch finished"
        );
        report
    }

    async fn run_entry(&self, entry: SpecEntry, slot: Option<(CorpusKey, CorpusCell)>) -> RunOutcome {
        let position = entry.position;
        let run_id = entry.label;

        let status = match (entry.spec, slot) {
            (Err(message), _) => {
                warn!(run_id = %run_id, error = %message, "Invalid run specification");
                RunStatus::Failed(TrainingError::Configuration(message))
            }
            _ if self.cancel.is_cancelled() => RunStatus::Failed(TrainingError::Cancelled),
            (Ok(spec), Some((key, cell))) => match self.train(spec, key, cell).await {
                Ok(status) => status,
                Err(e) => {
                    error!(run_id = %run_id, kind = e.kind(), error = %e, "Run failed");
                    RunStatus::Failed(e)
                }
            },
            (Ok(_), None) => RunStatus::Failed(TrainingError::Configuration(
                "no corpus was planned for this specification".to_string(),
            )),
        };

        RunOutcome {
            position,
            run_id,
            status,
        }
    }

    async fn train(
        &self,
        spec: RunSpecification,
        key: CorpusKey,
        cell: CorpusCell,
    ) -> Result<RunStatus, TrainingError> {
        info!(
            run_id = %spec.run_id,
            dataset = %spec.dataset_name,
            n_topics = spec.n_topics,
            alpha = spec.alpha,
            eta = spec.eta,
            "Training run"
        );

        let corpus = cell
            .get_or_init(|| self.prepare_corpus(spec.dataset_type, &spec.dataset_name, key))
            .await
            .clone()?;

        let params = FitParams {
            n_topics: spec.n_topics,
            alpha: spec.alpha,
            eta: spec.eta,
            iterations: spec.n_iters.unwrap_or(self.options.default_iterations),
            seed: spec.seed,
        };

        let model = {
            let fitter = Arc::clone(&self.fitter);
            let corpus = Arc::clone(&corpus);
            let handle = tokio::task::spawn_blocking(move || fitter.fit(&corpus.dtm, &params));
            match tokio::time::timeout(self.options.fit_timeout, handle).await {
                Err(_) => {
                    return Err(TrainingError::Timeout {
                        stage: "fit".to_string(),
                        seconds: self.options.fit_timeout.as_secs(),
                    })
                }
                Ok(Err(join_err)) if join_err.is_panic() => {
                    return Err(TrainingError::Fitting(format!(
                        "fitter panicked: {}",
                        panic_message(join_err.into_panic())
                    )))
                }
                Ok(Err(join_err)) => {
                    return Err(TrainingError::Fitting(format!("fit task failed: {join_err}")))
                }
                Ok(Ok(Err(e))) => return Err(TrainingError::Fitting(format!("{e:#}"))),
                Ok(Ok(Ok(model))) => model,
            }
        };

        model
            .validate(spec.n_topics, corpus.vocabulary.len(), corpus.dtm.n_rows())
            .map_err(|e| TrainingError::Fitting(format!("fitter returned an invalid model: {e:#}")))?;

        let iterations = model.log_likelihood_trace.len();
        let final_log_likelihood = model.final_log_likelihood();
        let artifact = ModelArtifact::new(
            spec,
            corpus.key.clone(),
            corpus.vocabulary.clone(),
            model,
        );

        let path = self.persist(&artifact)?;
        info!(
            run_id = %artifact.run_id,
            path = %path.display(),
            iterations,
            "Model saved"
        );

        Ok(RunStatus::Succeeded {
            artifact: path,
            iterations,
            final_log_likelihood,
        })
    }

    /// Save an artifact; if that fails, try the rescue directory so the
    /// fitted model survives, and report both locations.
    fn persist(&self, artifact: &ModelArtifact) -> Result<PathBuf, TrainingError> {
        match self.models.save(artifact) {
            Ok(path) => Ok(path),
            Err(e) => {
                let rescued = match rescue(artifact, &self.options.rescue_dir) {
                    Ok(path) => {
                        warn!(run_id = %artifact.run_id, path = %path.display(), "Model rescued");
                        Some(path)
                    }
                    Err(rescue_err) => {
                        error!(
                            run_id = %artifact.run_id,
                            error = %rescue_err,
                            "Could not rescue model, it is lost"
                        );
                        None
                    }
                };
                Err(TrainingError::Persistence {
                    path: self.models.artifact_path(&artifact.run_id),
                    message: format!("{e:#}"),
                    rescued,
                })
            }
        }
    }

    async fn prepare_corpus(
        &self,
        dataset_type: DatasetType,
        dataset_name: &str,
        key: CorpusKey,
    ) -> Result<Arc<PreparedCorpus>, TrainingError> {
        let thresholds = self.options.thresholds;

        if self.options.reuse_corpus {
            match self.corpora.load_matching(&key, thresholds) {
                Ok(Some(corpus)) => {
                    info!(corpus = %key, documents = corpus.documents.len(), "Reusing stored corpus");
                    return Ok(Arc::new(corpus));
                }
                Ok(None) => debug!(corpus = %key, "No reusable stored corpus"),
                Err(e) => warn!(corpus = %key, error = %e, "Ignoring unreadable stored corpus"),
            }
        }

        let records = match tokio::time::timeout(
            self.options.fetch_timeout,
            self.provider.fetch(dataset_type, dataset_name),
        )
        .await
        {
            Err(_) => {
                return Err(TrainingError::Timeout {
                    stage: format!("fetching dataset '{dataset_name}'"),
                    seconds: self.options.fetch_timeout.as_secs(),
                })
            }
            Ok(Err(e)) => {
                return Err(TrainingError::Corpus {
                    dataset: dataset_name.to_string(),
                    message: format!("{e:#}"),
                })
            }
            Ok(Ok(records)) => records,
        };
        info!(dataset = %dataset_name, records = records.len(), "Dataset fetched");

        let normalizer = Arc::clone(&self.normalizer);
        let name = dataset_name.to_string();
        let corpus = tokio::task::spawn_blocking(move || {
            PreparedCorpus::prepare(key, &name, &records, &normalizer, thresholds)
        })
        .await
        .map_err(|e| TrainingError::Corpus {
            dataset: dataset_name.to_string(),
            message: format!("corpus preparation task failed: {e}"),
        })??;

        info!(
            corpus = %corpus.key,
            documents = corpus.documents.len(),
            vocabulary = corpus.vocabulary.len(),
            nonzero = corpus.dtm.nnz(),
            "Corpus prepared"
        );

        if let Err(e) = self.corpora.save(&corpus) {
            warn!(corpus = %corpus.key, error = %e, "Failed to store corpus artifacts");
        }

        Ok(Arc::new(corpus))
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
