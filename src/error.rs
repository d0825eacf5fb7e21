// Error taxonomy for batch training.
//
// Plumbing code returns anyhow::Result. The batch trainer converts every
// failure into one of these typed categories so that each run gets a
// precise, user-visible outcome without aborting the rest of the batch.

use std::path::PathBuf;

use thiserror::Error;

/// The retained vocabulary was empty for the given thresholds.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "vocabulary is empty: no token out of {distinct_tokens} distinct tokens in {document_count} \
     documents satisfies max_relative_frequency={max_relative_frequency} and \
     min_absolute_frequency={min_absolute_frequency}"
)]
pub struct EmptyVocabularyError {
    pub max_relative_frequency: f64,
    pub min_absolute_frequency: u64,
    pub document_count: usize,
    pub distinct_tokens: usize,
}

/// Why a single run specification failed.
#[derive(Debug, Clone, Error)]
pub enum TrainingError {
    /// Malformed run specification, duplicate run_id, or an existing artifact.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The dataset could not be fetched or held no usable text.
    #[error("corpus error for dataset '{dataset}': {message}")]
    Corpus { dataset: String, message: String },

    #[error(transparent)]
    EmptyVocabulary(#[from] EmptyVocabularyError),

    /// The fitter failed, panicked, or returned an invalid model.
    #[error("fitting error: {0}")]
    Fitting(String),

    /// The artifact could not be written. `rescued` points at the fallback
    /// copy of the model when one could be written.
    #[error("persistence error writing {}: {message}{}", path.display(), rescue_note(rescued))]
    Persistence {
        path: PathBuf,
        message: String,
        rescued: Option<PathBuf>,
    },

    /// An external capability exceeded its time budget.
    #[error("{stage} timed out after {seconds}s")]
    Timeout { stage: String, seconds: u64 },

    /// The batch was cancelled before this run started.
    #[error("cancelled before start")]
    Cancelled,
}

fn rescue_note(rescued: &Option<PathBuf>) -> String {
    match rescued {
        Some(path) => format!(" (model rescued to {})", path.display()),
        None => " (model could not be rescued)".to_string(),
    }
}

impl TrainingError {
    /// Short category name for outcome tables and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TrainingError::Configuration(_) => "configuration",
            TrainingError::Corpus { .. } => "corpus",
            TrainingError::EmptyVocabulary(_) => "vocabulary",
            TrainingError::Fitting(_) => "fitting",
            TrainingError::Persistence { .. } => "persistence",
            TrainingError::Timeout { .. } => "timeout",
            TrainingError::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_vocabulary_names_thresholds() {
        let err = EmptyVocabularyError {
            max_relative_frequency: 0.5,
            min_absolute_frequency: 7,
            document_count: 3,
            distinct_tokens: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("max_relative_frequency=0.5"), "{msg}");
        assert!(msg.contains("min_absolute_frequency=7"), "{msg}");
    }

    #[test]
    fn kinds_are_stable() {
        assert_eq!(TrainingError::Cancelled.kind(), "cancelled");
        assert_eq!(TrainingError::Fitting("x".into()).kind(), "fitting");
        let err: TrainingError = EmptyVocabularyError {
            max_relative_frequency: 1.0,
            min_absolute_frequency: 1,
            document_count: 0,
            distinct_tokens: 0,
        }
        .into();
        assert_eq!(err.kind(), "vocabulary");
    }

    #[test]
    fn persistence_message_mentions_rescue() {
        let err = TrainingError::Persistence {
            path: PathBuf::from("models/model_a.json"),
            message: "disk full".to_string(),
            rescued: Some(PathBuf::from("/tmp/rescue/model_a.json")),
        };
        let msg = err.to_string();
        assert!(msg.contains("models/model_a.json"));
        assert!(msg.contains("/tmp/rescue/model_a.json"));
    }
}
