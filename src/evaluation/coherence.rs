// Topic coherence from document co-occurrence.
//
// Each topic is reduced to its top_n words. Every unordered pair (i, j) with
// i ranked above j contributes
//
//   UMass:  ln((D(i, j) + 1e-12) / D(i))
//   NPMI:   ln(P(i, j) / (P(i) P(j))) / -ln P(i, j),  or -1 if D(i, j) = 0
//
// where D counts documents and P = D / corpus size. UMass sums over pairs,
// NPMI averages. Higher is more coherent under both.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::Serialize;

use crate::corpus::vectorizer::DocumentTermMatrix;
use crate::fitter::model::rank_descending;

/// Keeps the logarithm finite for pairs that never co-occur.
pub const SMOOTHING: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CoherenceMeasure {
    #[default]
    UMass,
    Npmi,
}

impl FromStr for CoherenceMeasure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "umass" => Ok(CoherenceMeasure::UMass),
            "npmi" => Ok(CoherenceMeasure::Npmi),
            other => Err(format!("unknown coherence measure '{other}' (expected 'umass' or 'npmi')")),
        }
    }
}

impl fmt::Display for CoherenceMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoherenceMeasure::UMass => f.write_str("umass"),
            CoherenceMeasure::Npmi => f.write_str("npmi"),
        }
    }
}

/// Document-occurrence index over a DTM, built once and queried per pair.
pub struct CoherenceScorer {
    /// For each column, the ascending row ids that contain it
    postings: Vec<Vec<u32>>,
    n_documents: usize,
}

impl CoherenceScorer {
    pub fn new(dtm: &DocumentTermMatrix) -> Self {
        Self {
            postings: dtm.column_rows(),
            n_documents: dtm.n_rows(),
        }
    }

    pub fn n_words(&self) -> usize {
        self.postings.len()
    }

    pub fn document_frequency(&self, word: usize) -> usize {
        self.postings.get(word).map_or(0, Vec::len)
    }

    /// Documents containing both words.
    pub fn co_document_frequency(&self, a: usize, b: usize) -> usize {
        let (Some(xs), Some(ys)) = (self.postings.get(a), self.postings.get(b)) else {
            return 0;
        };
        let (mut i, mut j, mut shared) = (0, 0, 0);
        while i < xs.len() && j < ys.len() {
            match xs[i].cmp(&ys[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    shared += 1;
                    i += 1;
                    j += 1;
                }
            }
        }
        shared
    }

    /// Summed UMass score for words listed highest-ranked first.
    pub fn umass(&self, ranked_words: &[usize]) -> f64 {
        let mut total = 0.0;
        for (i, &wi) in ranked_words.iter().enumerate() {
            let df = self.document_frequency(wi).max(1) as f64;
            for &wj in &ranked_words[i + 1..] {
                let co = self.co_document_frequency(wi, wj) as f64;
                total += ((co + SMOOTHING) / df).ln();
            }
        }
        total
    }

    /// Mean NPMI over all pairs. Fewer than two words scores 0.
    pub fn npmi(&self, ranked_words: &[usize]) -> f64 {
        if self.n_documents == 0 {
            return 0.0;
        }
        let d = self.n_documents as f64;
        let mut total = 0.0;
        let mut pairs = 0usize;
        for (i, &wi) in ranked_words.iter().enumerate() {
            for &wj in &ranked_words[i + 1..] {
                pairs += 1;
                let co = self.co_document_frequency(wi, wj);
                if co == 0 {
                    total -= 1.0;
                    continue;
                }
                let p_ij = co as f64 / d;
                let p_i = self.document_frequency(wi) as f64 / d;
                let p_j = self.document_frequency(wj) as f64 / d;
                let denom = -p_ij.ln();
                // Both words in every document
                total += if denom > 0.0 {
                    (p_ij / (p_i * p_j)).ln() / denom
                } else {
                    1.0
                };
            }
        }
        if pairs == 0 {
            0.0
        } else {
            total / pairs as f64
        }
    }

    pub fn measure(&self, measure: CoherenceMeasure, ranked_words: &[usize]) -> f64 {
        match measure {
            CoherenceMeasure::UMass => self.umass(ranked_words),
            CoherenceMeasure::Npmi => self.npmi(ranked_words),
        }
    }
}

/// One UMass coherence score per topic, in topic order.
pub fn score(topic_word: &[Vec<f64>], dtm: &DocumentTermMatrix, top_n: usize) -> Result<Vec<f64>> {
    score_with(topic_word, dtm, top_n, CoherenceMeasure::UMass)
}

pub fn score_with(
    topic_word: &[Vec<f64>],
    dtm: &DocumentTermMatrix,
    top_n: usize,
    measure: CoherenceMeasure,
) -> Result<Vec<f64>> {
    if top_n == 0 {
        anyhow::bail!("top_n must be positive");
    }
    if let Some((k, row)) = topic_word
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != dtm.n_cols())
    {
        anyhow::bail!(
            "topic {k} has {} word weights but the corpus has {} vocabulary columns",
            row.len(),
            dtm.n_cols()
        );
    }

    let scorer = CoherenceScorer::new(dtm);
    Ok(topic_word
        .iter()
        .map(|row| scorer.measure(measure, &rank_descending(row, top_n)))
        .collect())
}
