// Text normalization: raw record strings -> cleaned token sequences.
//
// Each record goes through the same fixed pipeline: lowercase, split into
// alphabetic tokens, drop stop words, reduce to a Snowball stem. Token order
// is preserved throughout. Records that are absent, empty, or that lose every
// token during cleaning never become a Document.

use std::collections::HashSet;

use regex_lite::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use stop_words::{get, LANGUAGE};
use tracing::debug;

use crate::corpus::document::Document;

/// Tunables for the normalization pipeline.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Tokens shorter than this (in characters) are dropped after tokenizing
    pub min_token_length: usize,
    /// Reduce tokens to their Snowball English stem
    pub stem: bool,
    /// Extra stop words on top of the built-in English list
    pub extra_stop_words: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_token_length: 2,
            stem: true,
            extra_stop_words: Vec::new(),
        }
    }
}

/// Deterministic raw-text cleaner. Build once, reuse for every corpus.
pub struct TextNormalizer {
    word_pattern: Regex,
    stop_words: HashSet<String>,
    stemmer: Option<Stemmer>,
    min_token_length: usize,
}

impl TextNormalizer {
    pub fn new(config: &NormalizerConfig) -> Self {
        let mut stop_words: HashSet<String> = get(LANGUAGE::English).into_iter().collect();
        stop_words.extend(config.extra_stop_words.iter().map(|w| w.to_lowercase()));

        Self {
            // Constant pattern; only fails if the literal itself is broken.
            word_pattern: Regex::new("[a-z]+").expect("word pattern is valid"),
            stop_words,
            stemmer: config.stem.then(|| Stemmer::create(Algorithm::English)),
            min_token_length: config.min_token_length,
        }
    }

    /// Normalize a whole corpus of raw records.
    ///
    /// Output length is at most the input length; skipped records leave no
    /// placeholder, so positions are not preserved.
    pub fn normalize<S: AsRef<str>>(&self, records: &[Option<S>]) -> Vec<Document> {
        let documents: Vec<Document> = records
            .iter()
            .filter_map(|record| record.as_ref())
            .filter_map(|text| self.normalize_one(text.as_ref()))
            .collect();

        debug!(
            records = records.len(),
            documents = documents.len(),
            "Normalized corpus"
        );

        documents
    }

    /// Normalize one record. Returns None when nothing survives cleaning.
    pub fn normalize_one(&self, text: &str) -> Option<Document> {
        if text.trim().is_empty() {
            return None;
        }

        let tokens = self.tokens(text);
        if tokens.is_empty() {
            None
        } else {
            Some(Document::new(tokens))
        }
    }

    fn tokens(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();

        self.word_pattern
            .find_iter(&lower)
            .map(|m| m.as_str())
            .filter(|token| token.chars().count() >= self.min_token_length)
            .filter(|token| !self.stop_words.contains(*token))
            .map(|token| match &self.stemmer {
                Some(stemmer) => stemmer.stem(token).into_owned(),
                None => token.to_string(),
            })
            .collect()
    }
}
