use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use topica::analysis::analyser::TopicAnalyser;
use topica::analysis::create_interpreter;
use topica::config::Config;
use topica::corpus::document::Document;
use topica::corpus::vectorizer::{vectorize, DocumentTermMatrix};
use topica::dataset::huggingface::HuggingFaceProvider;
use topica::dataset::local::LocalFileProvider;
use topica::dataset::router::DatasetRouter;
use topica::evaluation::coherence::{self, CoherenceMeasure};
use topica::evaluation::convergence::{self, ConvergenceCriteria};
use topica::evaluation::similarity::{topic_similarity, Aggregation};
use topica::fitter::gibbs::GibbsSampler;
use topica::output::terminal::{self, TopicRow};
use topica::pipeline::batch::{BatchTrainer, CancelFlag, VocabularyStrategy};
use topica::pipeline::spec::parse_spec_file;
use topica::storage::models::ModelArtifact;
use topica::storage::{CorpusStore, ModelStore};

/// Topica: fit, evaluate, and explore LDA topic models.
///
/// Trains one model per entry of a run specification file, persists every
/// model under its run_id, and answers questions about the results.
#[derive(Parser)]
#[command(name = "topica", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit one model per entry of a run specification file (JSON array or JSONL)
    Train {
        /// Path to the run specification file
        spec_file: std::path::PathBuf,

        /// Runs to fit in parallel (default: TOPICA_CONCURRENCY or 1)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Share one vocabulary per dataset, or build one per run
        #[arg(long)]
        vocabulary: Option<VocabularyStrategy>,

        /// Load stored corpora with matching thresholds instead of refetching
        #[arg(long)]
        reuse_corpus: bool,

        /// Replace model artifacts that already exist
        #[arg(long)]
        overwrite: bool,
    },

    /// Report convergence, coherence, and topic similarity for a trained run
    Evaluate {
        run_id: String,

        /// Trailing iterations compared for convergence
        #[arg(long, default_value = "10")]
        window: usize,

        /// Largest relative change still counted as converged
        #[arg(long, default_value = "0.001")]
        tolerance: f64,

        /// Words per topic used for coherence
        #[arg(long, default_value = "10")]
        top_n: usize,

        /// Coherence measure: umass or npmi
        #[arg(long, default_value = "umass")]
        measure: CoherenceMeasure,

        /// Topic similarity aggregation: mean or max
        #[arg(long, default_value = "mean")]
        similarity: Aggregation,
    },

    /// Show the top words of every topic
    Topics {
        run_id: String,

        #[arg(long, default_value = "10")]
        top_n: usize,
    },

    /// Show one document's topic mixture
    Document { run_id: String, doc_id: usize },

    /// Ask the configured language model to name and describe a topic
    Interpret {
        run_id: String,
        topic: usize,

        #[arg(long, default_value = "10")]
        top_n: usize,

        /// Also send this many of the topic's most representative documents
        #[arg(long, default_value = "0")]
        examples: usize,
    },

    /// Show stored models and corpora
    Status,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("topica=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let models = ModelStore::new(&config.models_dir);
    let corpora = CorpusStore::new(&config.data_dir);

    match cli.command {
        Commands::Train {
            spec_file,
            concurrency,
            vocabulary,
            reuse_corpus,
            overwrite,
        } => {
            let content = std::fs::read_to_string(&spec_file)
                .with_context(|| format!("Failed to read {}", spec_file.display()))?;
            let entries = parse_spec_file(&content)?;
            if entries.is_empty() {
                anyhow::bail!("{} holds no run specifications", spec_file.display());
            }

            let mut options = config.batch_options();
            options.concurrency = concurrency.unwrap_or(options.concurrency).max(1);
            options.strategy = vocabulary.unwrap_or(options.strategy);
            options.reuse_corpus = reuse_corpus;
            options.overwrite = overwrite;

            println!(
                "Training {} run(s) from {} ({} vocabulary, {} at a time)...",
                entries.len(),
                spec_file.display(),
                options.strategy,
                options.concurrency,
            );

            let provider = DatasetRouter::new(
                Box::new(LocalFileProvider::default()),
                Box::new(HuggingFaceProvider::new(config.hugging_face())?),
            );
            let cancel = CancelFlag::default();
            let trainer = BatchTrainer::new(
                Arc::new(provider),
                Arc::new(GibbsSampler),
                models,
                corpora,
                options,
            )
            .with_cancel_flag(cancel.clone());

            // Ctrl-C stops new runs from starting; runs in flight finish
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling remaining runs");
                    cancel.cancel();
                }
            });

            let report = trainer.run(entries).await;
            terminal::display_outcomes(&report);

            return Ok(if report.all_succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
        }

        Commands::Evaluate {
            run_id,
            window,
            tolerance,
            top_n,
            measure,
            similarity,
        } => {
            let artifact = models.load(&run_id)?;
            let criteria = ConvergenceCriteria { window, tolerance };
            let report = convergence::evaluate(&artifact.model.log_likelihood_trace, &criteria);

            let coherence_scores = match load_dtm(&corpora, &artifact) {
                Ok(Some(dtm)) => Some(coherence::score_with(
                    &artifact.model.topic_word,
                    &dtm,
                    top_n,
                    measure,
                )?),
                Ok(None) => {
                    println!(
                        "{}",
                        format!(
                            "Corpus {} not found in {} or no longer matches the model; skipping coherence.",
                            artifact.corpus_key,
                            corpora.dir().display()
                        )
                        .yellow()
                    );
                    None
                }
                Err(e) => {
                    warn!(error = %e, "Could not rebuild the training corpus");
                    None
                }
            };
            let similarities = topic_similarity(&artifact.model.topic_word, similarity);

            let analyser = TopicAnalyser::new(&artifact.model, &artifact.vocabulary)?;
            let rows = (0..analyser.n_topics())
                .map(|k| {
                    Ok(TopicRow {
                        topic: k,
                        coherence: coherence_scores.as_ref().map(|c| c[k]),
                        similarity: similarities[k],
                        top_words: analyser.top_words(k, 5)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            terminal::display_evaluation(&run_id, &report, measure, &rows);
        }

        Commands::Topics { run_id, top_n } => {
            let artifact = models.load(&run_id)?;
            let analyser = TopicAnalyser::new(&artifact.model, &artifact.vocabulary)?;
            let topics = (0..analyser.n_topics())
                .map(|k| analyser.top_word_weights(k, top_n))
                .collect::<Result<Vec<_>>>()?;
            terminal::display_topics(&run_id, &topics);
        }

        Commands::Document { run_id, doc_id } => {
            let artifact = models.load(&run_id)?;
            let analyser = TopicAnalyser::new(&artifact.model, &artifact.vocabulary)?;
            let mixture = analyser.document_mixture(doc_id)?;
            let documents = load_documents(&corpora, &artifact);
            let preview = documents
                .as_ref()
                .and_then(|docs| docs.get(doc_id))
                .map(Document::joined);
            terminal::display_mixture(&run_id, doc_id, mixture, preview.as_deref());
        }

        Commands::Interpret {
            run_id,
            topic,
            top_n,
            examples,
        } => {
            let interpreter = create_interpreter(&config)?;
            let artifact = models.load(&run_id)?;
            let analyser = TopicAnalyser::new(&artifact.model, &artifact.vocabulary)?;

            let example_texts: Vec<String> = if examples > 0 {
                match load_documents(&corpora, &artifact) {
                    Some(documents) => analyser
                        .top_documents(topic, examples)?
                        .into_iter()
                        .filter_map(|(doc, _)| documents.get(doc).map(Document::joined))
                        .collect(),
                    None => {
                        warn!(corpus = %artifact.corpus_key, "Corpus not found, sending no examples");
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            };

            info!(run_id = %run_id, topic, examples = example_texts.len(), "Interpreting topic");
            let interpretation = analyser
                .interpret(topic, top_n, interpreter.as_ref(), &example_texts)
                .await?;
            let words = analyser.top_words(topic, top_n)?;
            terminal::display_interpretation(topic, &words, &interpretation);
        }

        Commands::Status => {
            topica::status::show(&models, &corpora)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Documents of the corpus a model was trained on, if still stored and
/// consistent with the model.
fn load_documents(corpora: &CorpusStore, artifact: &ModelArtifact) -> Option<Vec<Document>> {
    match corpora.load_for(artifact) {
        Ok(corpus) => corpus.map(|c| c.documents),
        Err(e) => {
            warn!(corpus = %artifact.corpus_key, error = %e, "Failed to load stored corpus");
            None
        }
    }
}

/// Rebuild the training DTM against the model's own vocabulary.
fn load_dtm(corpora: &CorpusStore, artifact: &ModelArtifact) -> Result<Option<DocumentTermMatrix>> {
    Ok(corpora
        .load_for(artifact)?
        .map(|corpus| vectorize(&corpus.documents, &artifact.vocabulary)))
}
