// Corpus artifacts: the normalized documents and the vocabulary fit on them.
//
//   <data_dir>/<corpus-key>/documents.json   array of token arrays
//   <data_dir>/<corpus-key>/vocabulary.json  thresholds + tokens in index order
//
// The DTM is never stored; it is rebuilt from these two files on load.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::models::ModelArtifact;
use super::write_json_atomic;
use crate::corpus::document::Document;
use crate::corpus::prepared::{CorpusKey, PreparedCorpus};
use crate::corpus::vocabulary::{Vocabulary, VocabularyThresholds};

const DOCUMENTS_FILE: &str = "documents.json";
const VOCABULARY_FILE: &str = "vocabulary.json";

#[derive(Debug, Clone)]
pub struct CorpusStore {
    data_dir: PathBuf,
}

impl CorpusStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn corpus_dir(&self, key: &CorpusKey) -> PathBuf {
        key.as_str()
            .split('/')
            .fold(self.data_dir.clone(), |path, part| path.join(part))
    }

    /// Write both files and return the corpus directory.
    pub fn save(&self, corpus: &PreparedCorpus) -> Result<PathBuf> {
        let dir = self.corpus_dir(&corpus.key);
        write_json_atomic(&dir.join(DOCUMENTS_FILE), &corpus.documents)?;
        write_json_atomic(&dir.join(VOCABULARY_FILE), &corpus.vocabulary)?;
        debug!(corpus = %corpus.key, dir = %dir.display(), "Saved corpus artifacts");
        Ok(dir)
    }

    /// Load a stored corpus. Returns None when either file is missing.
    pub fn load(&self, key: &CorpusKey) -> Result<Option<PreparedCorpus>> {
        let dir = self.corpus_dir(key);
        let documents_path = dir.join(DOCUMENTS_FILE);
        let vocabulary_path = dir.join(VOCABULARY_FILE);
        if !documents_path.exists() || !vocabulary_path.exists() {
            return Ok(None);
        }

        let documents: Vec<Document> = read_json(&documents_path)?;
        let vocabulary: Vocabulary = read_json(&vocabulary_path)?;
        Ok(Some(PreparedCorpus::from_parts(key.clone(), documents, vocabulary)))
    }

    /// Load a stored corpus only if its vocabulary was built with exactly
    /// these thresholds.
    pub fn load_matching(
        &self,
        key: &CorpusKey,
        thresholds: VocabularyThresholds,
    ) -> Result<Option<PreparedCorpus>> {
        match self.load(key)? {
            Some(corpus) if corpus.vocabulary.thresholds() == thresholds => Ok(Some(corpus)),
            Some(corpus) => {
                debug!(
                    corpus = %key,
                    stored = ?corpus.vocabulary.thresholds(),
                    wanted = ?thresholds,
                    "Stored corpus built with different thresholds"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Load the corpus a model was trained on. A stored corpus whose document
    /// count differs from the model's doc-topic rows was overwritten since
    /// training and is treated as absent.
    pub fn load_for(&self, artifact: &ModelArtifact) -> Result<Option<PreparedCorpus>> {
        match self.load(&artifact.corpus_key)? {
            Some(corpus) if corpus.documents.len() == artifact.model.n_documents() => Ok(Some(corpus)),
            Some(corpus) => {
                warn!(
                    corpus = %artifact.corpus_key,
                    stored = corpus.documents.len(),
                    expected = artifact.model.n_documents(),
                    "Stored corpus no longer matches the model"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {}", path.display()))
}
