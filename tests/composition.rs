// Composition tests: how the batch trainer, providers, fitters and stores
// behave together across a whole specification file.
//
// Providers and fitters here are in-test doubles; the last section runs the
// real local-file provider and Gibbs sampler end to end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use topica::analysis::analyser::TopicAnalyser;
use topica::corpus::vectorizer::{vectorize, DocumentTermMatrix};
use topica::corpus::vocabulary::VocabularyThresholds;
use topica::dataset::local::LocalFileProvider;
use topica::dataset::traits::{CorpusProvider, RawRecords};
use topica::dataset::DatasetType;
use topica::error::TrainingError;
use topica::evaluation::coherence;
use topica::evaluation::convergence::{evaluate, ConvergenceCriteria};
use topica::fitter::gibbs::GibbsSampler;
use topica::fitter::model::FittedModel;
use topica::fitter::traits::{FitParams, TopicFitter};
use topica::pipeline::batch::{BatchOptions, BatchReport, BatchTrainer, VocabularyStrategy};
use topica::pipeline::spec::{parse_spec_file, SpecEntry};
use topica::storage::{CorpusStore, ModelStore};
use topica::text::normalizer::NormalizerConfig;

// ============================================================
// Test doubles
// ============================================================

/// Serves canned datasets by name and counts fetches.
struct CannedProvider {
    datasets: HashMap<String, RawRecords>,
    fetches: AtomicUsize,
}

impl CannedProvider {
    fn new() -> Self {
        let mut datasets = HashMap::new();
        datasets.insert(
            "pets".to_string(),
            vec![
                Some("cats purr cats nap".to_string()),
                Some("dogs bark dogs fetch".to_string()),
                None,
                Some("cats chase dogs".to_string()),
            ],
        );
        datasets.insert(
            "space".to_string(),
            vec![
                Some("rockets orbit planets".to_string()),
                Some("planets orbit stars".to_string()),
            ],
        );
        Self {
            datasets,
            fetches: AtomicUsize::new(0),
        }
    }

    fn with_dataset(mut self, name: &str, records: &[&str]) -> Self {
        let records = records.iter().map(|r| Some(r.to_string())).collect();
        self.datasets.insert(name.to_string(), records);
        self
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CorpusProvider for CannedProvider {
    async fn fetch(&self, _dataset_type: DatasetType, dataset_name: &str) -> Result<RawRecords> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.datasets
            .get(dataset_name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("dataset '{dataset_name}' not found"))
    }
}

/// Uniform model of the requested shape. Sleeps longer for fewer topics, so
/// later specifications finish first under concurrency.
struct UniformFitter;

impl TopicFitter for UniformFitter {
    fn fit(&self, dtm: &DocumentTermMatrix, params: &FitParams) -> Result<FittedModel> {
        std::thread::sleep(Duration::from_millis(10 * (6 - params.n_topics.min(5)) as u64));
        let (k, v) = (params.n_topics, dtm.n_cols());
        Ok(FittedModel {
            topic_word: vec![vec![1.0 / v as f64; v]; k],
            doc_topic: vec![vec![1.0 / k as f64; k]; dtm.n_rows()],
            log_likelihood_trace: vec![-50.0; params.iterations],
        })
    }
}

fn spec_line(run_id: &str, dataset: &str, n_topics: i64) -> String {
    format!(
        r#"{{"dataset_type": "Local", "dataset_name": "{dataset}", "n_topics": {n_topics}, "alpha": 0.1, "eta": 0.01, "run_id": "{run_id}"}}"#
    )
}

fn entries(lines: &[String]) -> Vec<SpecEntry> {
    parse_spec_file(&lines.join("\n")).unwrap()
}

fn options(root: &std::path::Path) -> BatchOptions {
    BatchOptions {
        normalizer: NormalizerConfig {
            stem: false,
            ..NormalizerConfig::default()
        },
        thresholds: VocabularyThresholds {
            max_relative_frequency: 1.0,
            min_absolute_frequency: 1,
        },
        default_iterations: 5,
        rescue_dir: root.join("rescue"),
        ..BatchOptions::default()
    }
}

fn trainer(provider: Arc<CannedProvider>, root: &std::path::Path, options: BatchOptions) -> BatchTrainer {
    BatchTrainer::new(
        provider,
        Arc::new(UniformFitter),
        ModelStore::new(root.join("models")),
        CorpusStore::new(root.join("data")),
        options,
    )
}

fn kinds(report: &BatchReport) -> Vec<&'static str> {
    report
        .outcomes
        .iter()
        .map(|o| o.error().map_or("ok", TrainingError::kind))
        .collect()
}

// ============================================================
// Chain: spec file -> per-entry outcomes -> artifacts
// ============================================================

#[tokio::test]
async fn invalid_entry_fails_alone() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(CannedProvider::new());
    let t = trainer(provider.clone(), dir.path(), options(dir.path()));

    let report = t
        .run(entries(&[
            spec_line("run1", "pets", 2),
            spec_line("run2", "pets", 0),
            spec_line("run3", "pets", 3),
        ]))
        .await;

    assert_eq!(kinds(&report), vec!["ok", "configuration", "ok"]);
    assert!(!report.all_succeeded());

    let models = ModelStore::new(dir.path().join("models"));
    assert!(!models.exists("run2"));
    assert_eq!(models.load("run1").unwrap().model.n_topics(), 2);
    assert_eq!(models.load("run3").unwrap().model.n_topics(), 3);
}

#[tokio::test]
async fn unreadable_dataset_fails_only_its_runs() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(CannedProvider::new());
    let t = trainer(provider, dir.path(), options(dir.path()));

    let report = t
        .run(entries(&[
            spec_line("a", "pets", 2),
            spec_line("b", "missing", 2),
            spec_line("c", "space", 2),
            spec_line("d", "missing", 3),
        ]))
        .await;

    assert_eq!(kinds(&report), vec!["ok", "corpus", "ok", "corpus"]);
    match report.outcomes[1].error() {
        Some(TrainingError::Corpus { dataset, message }) => {
            assert_eq!(dataset, "missing");
            assert!(message.contains("not found"));
        }
        other => panic!("expected corpus error, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_run_id_keeps_first() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(CannedProvider::new());
    let t = trainer(provider, dir.path(), options(dir.path()));

    let report = t
        .run(entries(&[spec_line("same", "pets", 2), spec_line("same", "space", 2)]))
        .await;

    assert_eq!(kinds(&report), vec!["ok", "configuration"]);
    let artifact = ModelStore::new(dir.path().join("models")).load("same").unwrap();
    assert_eq!(artifact.spec.dataset_name, "pets");
}

#[tokio::test]
async fn run_id_of_invalid_entry_is_not_reused() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(CannedProvider::new());
    let t = trainer(provider, dir.path(), options(dir.path()));

    let report = t
        .run(entries(&[spec_line("x", "pets", 0), spec_line("x", "space", 2)]))
        .await;

    assert_eq!(kinds(&report), vec!["configuration", "configuration"]);
    match report.outcomes[1].error() {
        Some(TrainingError::Configuration(message)) => {
            assert!(message.contains("duplicate run_id 'x'"), "{message}")
        }
        other => panic!("expected configuration error, got {other:?}"),
    }
    assert!(!ModelStore::new(dir.path().join("models")).exists("x"));
}

#[tokio::test]
async fn json_array_and_integer_run_ids() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(CannedProvider::new());
    let t = trainer(provider, dir.path(), options(dir.path()));

    let content = r#"[
        {"dataset_type": "Local", "dataset_name": "space", "n_topics": 2, "alpha": 0.5, "eta": 0.1, "run_id": 7},
        {"dataset_type": "Parquet", "dataset_name": "space", "n_topics": 2, "alpha": 0.5, "eta": 0.1, "run_id": 8}
    ]"#;
    let report = t.run(parse_spec_file(content).unwrap()).await;

    assert_eq!(kinds(&report), vec!["ok", "configuration"]);
    assert_eq!(report.outcomes[0].run_id, "7");
    assert!(ModelStore::new(dir.path().join("models")).exists("7"));
}

// ============================================================
// Chain: vocabulary strategy -> fetch count -> artifact vocabulary
// ============================================================

#[tokio::test]
async fn shared_strategy_fetches_each_dataset_once() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(CannedProvider::new());
    let t = trainer(provider.clone(), dir.path(), options(dir.path()));

    let report = t
        .run(entries(&[
            spec_line("p1", "pets", 2),
            spec_line("p2", "pets", 3),
            spec_line("s1", "space", 2),
            spec_line("p3", "pets", 4),
        ]))
        .await;

    assert!(report.all_succeeded());
    assert_eq!(provider.fetch_count(), 2);

    let models = ModelStore::new(dir.path().join("models"));
    let p1 = models.load("p1").unwrap();
    let p3 = models.load("p3").unwrap();
    assert_eq!(p1.corpus_key, p3.corpus_key);
    assert_eq!(p1.vocabulary.tokens(), p3.vocabulary.tokens());
}

#[tokio::test]
async fn per_run_strategy_fetches_every_run() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(CannedProvider::new());
    let mut opts = options(dir.path());
    opts.strategy = VocabularyStrategy::PerRun;
    let t = trainer(provider.clone(), dir.path(), opts);

    let report = t
        .run(entries(&[
            spec_line("p1", "pets", 2),
            spec_line("p2", "pets", 3),
            spec_line("p3", "pets", 4),
        ]))
        .await;

    assert!(report.all_succeeded());
    assert_eq!(provider.fetch_count(), 3);
    let models = ModelStore::new(dir.path().join("models"));
    assert_ne!(models.load("p1").unwrap().corpus_key, models.load("p2").unwrap().corpus_key);
}

#[tokio::test]
async fn shared_dataset_failure_reported_for_every_dependent() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(CannedProvider::new());
    let t = trainer(provider.clone(), dir.path(), options(dir.path()));

    let report = t
        .run(entries(&[spec_line("x", "missing", 2), spec_line("y", "missing", 2)]))
        .await;

    assert_eq!(kinds(&report), vec!["corpus", "corpus"]);
    assert_eq!(provider.fetch_count(), 1);
}

#[tokio::test]
async fn datasets_with_equal_slugs_keep_their_own_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(
        CannedProvider::new()
            .with_dataset("data/plots.txt", &["pirates treasure ships", "ships treasure"])
            .with_dataset("data_plots.txt", &["robots circuits factories", "robots factories"]),
    );
    let t = trainer(provider.clone(), dir.path(), options(dir.path()));

    let report = t
        .run(entries(&[
            spec_line("a", "data/plots.txt", 2),
            spec_line("b", "data_plots.txt", 2),
        ]))
        .await;

    assert!(report.all_succeeded());
    assert_eq!(provider.fetch_count(), 2);

    let models = ModelStore::new(dir.path().join("models"));
    let a = models.load("a").unwrap();
    let b = models.load("b").unwrap();
    assert_ne!(a.corpus_key, b.corpus_key);

    let mut b_tokens = b.vocabulary.tokens().to_vec();
    b_tokens.sort();
    assert_eq!(b_tokens, vec!["circuits", "factories", "robots"]);
    assert!(!a.vocabulary.tokens().contains(&"robots".to_string()));

    let corpora = CorpusStore::new(dir.path().join("data"));
    let stored = corpora.load(&b.corpus_key).unwrap().unwrap();
    assert_eq!(stored.documents.len(), 2);
    assert_eq!(stored.vocabulary.tokens(), b.vocabulary.tokens());
}

#[tokio::test]
async fn empty_vocabulary_fails_only_its_runs() {
    let dir = tempfile::tempdir().unwrap();
    let provider =
        Arc::new(CannedProvider::new().with_dataset("scattered", &["alpha bravo", "charlie delta"]));
    let mut opts = options(dir.path());
    opts.thresholds.min_absolute_frequency = 2;
    let t = trainer(provider.clone(), dir.path(), opts);

    let report = t
        .run(entries(&[
            spec_line("p", "pets", 2),
            spec_line("s1", "scattered", 2),
            spec_line("o", "space", 2),
            spec_line("s2", "scattered", 3),
        ]))
        .await;

    assert_eq!(kinds(&report), vec!["ok", "vocabulary", "ok", "vocabulary"]);
    assert_eq!(provider.fetch_count(), 3);
    for outcome in [&report.outcomes[1], &report.outcomes[3]] {
        let message = outcome.error().unwrap().to_string();
        assert!(message.contains("min_absolute_frequency=2"), "{message}");
        assert!(message.contains("max_relative_frequency=1"), "{message}");
    }

    let models = ModelStore::new(dir.path().join("models"));
    assert!(models.exists("p"));
    assert!(models.exists("o"));
    assert!(!models.exists("s1"));
}

#[tokio::test]
async fn stored_corpus_reused_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(CannedProvider::new());
    let t = trainer(provider.clone(), dir.path(), options(dir.path()));
    assert!(t.run(entries(&[spec_line("first", "pets", 2)])).await.all_succeeded());
    assert_eq!(provider.fetch_count(), 1);

    let mut opts = options(dir.path());
    opts.reuse_corpus = true;
    let t = trainer(provider.clone(), dir.path(), opts);
    assert!(t.run(entries(&[spec_line("second", "pets", 3)])).await.all_succeeded());
    assert_eq!(provider.fetch_count(), 1);
}

// ============================================================
// Chain: concurrency -> outcome order
// ============================================================

#[tokio::test]
async fn outcomes_keep_file_order_under_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(CannedProvider::new());
    let mut opts = options(dir.path());
    opts.concurrency = 4;
    let t = trainer(provider, dir.path(), opts);

    let report = t
        .run(entries(&[
            spec_line("slowest", "pets", 1),
            spec_line("slow", "pets", 2),
            spec_line("fast", "pets", 4),
            spec_line("fastest", "pets", 5),
        ]))
        .await;

    assert!(report.all_succeeded());
    let order: Vec<(usize, &str)> = report
        .outcomes
        .iter()
        .map(|o| (o.position, o.run_id.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![(1, "slowest"), (2, "slow"), (3, "fast"), (4, "fastest")]
    );
}

// ============================================================
// Chain: local file -> Gibbs sampler -> artifact -> evaluation
// ============================================================

#[tokio::test]
async fn local_file_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = dir.path().join("stories.txt");
    let lines = [
        "pirates sail galleons across oceans",
        "pirates bury treasure near oceans",
        "galleons carry pirates and treasure",
        "robots assemble circuits inside factories",
        "factories build robots with circuits",
        "robots repair circuits in factories",
        "",
    ];
    std::fs::write(&dataset, lines.join("\n")).unwrap();

    let mut opts = options(dir.path());
    opts.thresholds.min_absolute_frequency = 2;
    let trainer = BatchTrainer::new(
        Arc::new(LocalFileProvider::default()),
        Arc::new(GibbsSampler),
        ModelStore::new(dir.path().join("models")),
        CorpusStore::new(dir.path().join("data")),
        opts,
    );

    let spec = format!(
        r#"{{"dataset_type": "Local", "dataset_name": "{}", "n_topics": 2, "alpha": 0.1, "eta": 0.01, "run_id": "e2e", "n_iters": 40, "seed": 7}}"#,
        dataset.display()
    );
    let report = trainer.run(parse_spec_file(&spec).unwrap()).await;
    assert!(report.all_succeeded(), "{:?}", report.outcomes[0].error());

    let artifact = ModelStore::new(dir.path().join("models")).load("e2e").unwrap();
    assert_eq!(artifact.model.n_topics(), 2);
    assert_eq!(artifact.model.n_documents(), 6);
    assert_eq!(artifact.model.log_likelihood_trace.len(), 40);
    assert!(artifact.vocabulary.contains("pirates"));
    assert!(!artifact.vocabulary.contains("sail"));

    // The corpus was stored alongside, so evaluation can rebuild the DTM
    let corpus = CorpusStore::new(dir.path().join("data"))
        .load(&artifact.corpus_key)
        .unwrap()
        .expect("corpus stored");
    let dtm = vectorize(&corpus.documents, &artifact.vocabulary);
    assert_eq!(dtm.n_rows(), 6);

    let scores = coherence::score(&artifact.model.topic_word, &dtm, 3).unwrap();
    assert_eq!(scores.len(), 2);
    assert!(scores.iter().all(|s| s.is_finite() && *s < 1e-9));

    let report = evaluate(&artifact.model.log_likelihood_trace, &ConvergenceCriteria::default());
    assert_eq!(report.iterations, 40);

    let analyser = TopicAnalyser::new(&artifact.model, &artifact.vocabulary).unwrap();
    let words = analyser.top_words(0, 3).unwrap();
    assert_eq!(words.len(), 3);
    let (topic, weight) = analyser.dominant_topic(0).unwrap();
    assert!(topic < 2 && weight >= 0.5);
}
