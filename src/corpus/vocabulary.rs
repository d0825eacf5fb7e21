// Vocabulary builder: frequency-filtered, indexed token set.
//
// Two passes over the corpus: first count, for every distinct token, how many
// documents contain it and how often it occurs overall; then keep the tokens
// whose document share stays under the ceiling and whose total count reaches
// the floor. Indices follow ascending token order, so the same corpus and
// thresholds always produce the same vocabulary.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::document::Document;
use crate::error::{EmptyVocabularyError, TrainingError};

/// Frequency thresholds that decide vocabulary membership.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VocabularyThresholds {
    /// Keep a token only if (documents containing it / corpus size) <= this
    pub max_relative_frequency: f64,
    /// Keep a token only if it occurs at least this many times overall
    pub min_absolute_frequency: u64,
}

impl Default for VocabularyThresholds {
    fn default() -> Self {
        Self {
            max_relative_frequency: 0.9,
            min_absolute_frequency: 5,
        }
    }
}

impl VocabularyThresholds {
    pub fn validate(&self) -> Result<(), TrainingError> {
        let rel = self.max_relative_frequency;
        if !(rel > 0.0 && rel <= 1.0) {
            return Err(TrainingError::Configuration(format!(
                "max_relative_frequency must be in (0, 1], got {rel}"
            )));
        }
        if self.min_absolute_frequency == 0 {
            return Err(TrainingError::Configuration(
                "min_absolute_frequency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn admits(&self, stats: &TokenStats, corpus_size: usize) -> bool {
        let share = stats.document_frequency as f64 / corpus_size as f64;
        share <= self.max_relative_frequency && stats.absolute_frequency >= self.min_absolute_frequency
    }
}

/// Corpus-wide counts for one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenStats {
    /// Number of distinct documents containing the token at least once
    pub document_frequency: u64,
    /// Total occurrences across the corpus
    pub absolute_frequency: u64,
}

/// A frozen bijection between accepted tokens and dense 0-based indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VocabularyRecord", into = "VocabularyRecord")]
pub struct Vocabulary {
    tokens: Vec<String>,
    index: HashMap<String, usize>,
    thresholds: VocabularyThresholds,
}

/// On-disk shape of a vocabulary: the thresholds that built it plus the
/// tokens in index order.
#[derive(Serialize, Deserialize)]
struct VocabularyRecord {
    max_relative_frequency: f64,
    min_absolute_frequency: u64,
    tokens: Vec<String>,
}

impl Vocabulary {
    /// Build a vocabulary from a corpus of documents.
    pub fn build(
        documents: &[Document],
        thresholds: VocabularyThresholds,
    ) -> Result<Self, TrainingError> {
        Self::build_with_stats(documents, thresholds).map(|(vocab, _)| vocab)
    }

    /// Build a vocabulary and also return the per-token statistics of the
    /// whole corpus (retained and rejected tokens alike).
    pub fn build_with_stats(
        documents: &[Document],
        thresholds: VocabularyThresholds,
    ) -> Result<(Self, BTreeMap<String, TokenStats>), TrainingError> {
        thresholds.validate()?;

        // Pass 1: document and absolute frequencies
        let mut stats: BTreeMap<String, TokenStats> = BTreeMap::new();
        for doc in documents {
            let mut seen: HashSet<&str> = HashSet::new();
            for token in doc.tokens() {
                let entry = stats.entry(token.clone()).or_default();
                entry.absolute_frequency += 1;
                if seen.insert(token.as_str()) {
                    entry.document_frequency += 1;
                }
            }
        }

        // Pass 2: filter. BTreeMap iteration gives ascending token order.
        let tokens: Vec<String> = if documents.is_empty() {
            Vec::new()
        } else {
            stats
                .iter()
                .filter(|(_, s)| thresholds.admits(s, documents.len()))
                .map(|(token, _)| token.clone())
                .collect()
        };

        if tokens.is_empty() {
            return Err(EmptyVocabularyError {
                max_relative_frequency: thresholds.max_relative_frequency,
                min_absolute_frequency: thresholds.min_absolute_frequency,
                document_count: documents.len(),
                distinct_tokens: stats.len(),
            }
            .into());
        }

        info!(
            documents = documents.len(),
            distinct_tokens = stats.len(),
            retained = tokens.len(),
            max_relative_frequency = thresholds.max_relative_frequency,
            min_absolute_frequency = thresholds.min_absolute_frequency,
            "Built vocabulary"
        );

        let vocab = Self::assemble(tokens, thresholds)?;
        Ok((vocab, stats))
    }

    /// Rebuild a vocabulary from a stored token list (index order preserved).
    pub fn from_tokens(
        tokens: Vec<String>,
        thresholds: VocabularyThresholds,
    ) -> Result<Self, TrainingError> {
        Self::assemble(tokens, thresholds)
    }

    fn assemble(
        tokens: Vec<String>,
        thresholds: VocabularyThresholds,
    ) -> Result<Self, TrainingError> {
        let mut index = HashMap::with_capacity(tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            if index.insert(token.clone(), i).is_some() {
                return Err(TrainingError::Configuration(format!(
                    "vocabulary token '{token}' appears more than once"
                )));
            }
        }
        Ok(Self {
            tokens,
            index,
            thresholds,
        })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn index_of(&self, token: &str) -> Option<usize> {
        self.index.get(token).copied()
    }

    pub fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    /// Tokens in index order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn thresholds(&self) -> VocabularyThresholds {
        self.thresholds
    }
}

impl TryFrom<VocabularyRecord> for Vocabulary {
    type Error = TrainingError;

    fn try_from(record: VocabularyRecord) -> Result<Self, Self::Error> {
        Self::assemble(
            record.tokens,
            VocabularyThresholds {
                max_relative_frequency: record.max_relative_frequency,
                min_absolute_frequency: record.min_absolute_frequency,
            },
        )
    }
}

impl From<Vocabulary> for VocabularyRecord {
    fn from(vocab: Vocabulary) -> Self {
        Self {
            max_relative_frequency: vocab.thresholds.max_relative_frequency,
            min_absolute_frequency: vocab.thresholds.min_absolute_frequency,
            tokens: vocab.tokens,
        }
    }
}
