// PreparedCorpus: the training input for one dataset. Holds the normalized
// documents plus the vocabulary fit on them and the vectorized matrix.
//
// Once built it is never mutated; the batch trainer shares it read-only
// (behind an Arc) between every run that trains on the same dataset.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::document::Document;
use super::vectorizer::{vectorize, DocumentTermMatrix};
use super::vocabulary::{Vocabulary, VocabularyThresholds};
use crate::dataset::DatasetType;
use crate::error::TrainingError;
use crate::text::normalizer::TextNormalizer;

/// Relative location of a corpus's artifacts under the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorpusKey(String);

impl CorpusKey {
    /// Key for a corpus shared by every run on the same dataset.
    ///
    /// The slug is lossy ("owner/x" and "owner_x" slug alike), so a short
    /// digest of the raw name keeps distinct datasets in distinct directories.
    pub fn shared(dataset_type: DatasetType, dataset_name: &str) -> Self {
        Self(format!(
            "{}__{}-{}",
            dataset_type.slug(),
            slugify(dataset_name),
            name_digest(dataset_name)
        ))
    }

    /// Key for a corpus prepared for a single run.
    pub fn per_run(dataset_type: DatasetType, dataset_name: &str, run_id: &str) -> Self {
        let base = Self::shared(dataset_type, dataset_name);
        Self(format!("{}/runs/{}", base.0, slugify(run_id)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorpusKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// First 8 hex digits of the SHA-256 of a dataset name.
fn name_digest(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    hex::encode(&digest[..4])
}

/// Replace everything outside [A-Za-z0-9._-] so the result is one safe
/// path component. Leading dots are replaced too.
pub fn slugify(raw: &str) -> String {
    let slug: String = raw
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || (c == '.' && i > 0) {
                c
            } else {
                '_'
            }
        })
        .collect();
    if slug.is_empty() {
        "_".to_string()
    } else {
        slug
    }
}

#[derive(Debug, Clone)]
pub struct PreparedCorpus {
    pub key: CorpusKey,
    pub documents: Vec<Document>,
    pub vocabulary: Vocabulary,
    pub dtm: DocumentTermMatrix,
}

impl PreparedCorpus {
    /// Normalize raw records, fit a vocabulary, and vectorize.
    pub fn prepare<S: AsRef<str>>(
        key: CorpusKey,
        dataset: &str,
        records: &[Option<S>],
        normalizer: &TextNormalizer,
        thresholds: VocabularyThresholds,
    ) -> Result<Self, TrainingError> {
        let documents = normalizer.normalize(records);
        if documents.is_empty() {
            return Err(TrainingError::Corpus {
                dataset: dataset.to_string(),
                message: format!(
                    "none of {} records contained usable text after normalization",
                    records.len()
                ),
            });
        }
        let vocabulary = Vocabulary::build(&documents, thresholds)?;
        Ok(Self::from_parts(key, documents, vocabulary))
    }

    /// Reassemble from stored documents and vocabulary.
    pub fn from_parts(key: CorpusKey, documents: Vec<Document>, vocabulary: Vocabulary) -> Self {
        let dtm = vectorize(&documents, &vocabulary);
        Self {
            key,
            documents,
            vocabulary,
            dtm,
        }
    }
}
