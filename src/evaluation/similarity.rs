// Topic similarity: how much each topic's word distribution overlaps with
// the others. High values flag near-duplicate topics, which usually means
// n_topics is set too high for the corpus.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Aggregation {
    /// Mean similarity to every other topic
    #[default]
    Mean,
    /// Similarity to the closest other topic
    Max,
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Aggregation::Mean),
            "max" => Ok(Aggregation::Max),
            other => Err(format!("unknown aggregation '{other}' (expected 'mean' or 'max')")),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Mean => f.write_str("mean"),
            Aggregation::Max => f.write_str("max"),
        }
    }
}

/// Cosine similarity; 0 when either vector has zero norm.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// One score per topic, in topic order. A single-topic model scores 0.
pub fn topic_similarity(topic_word: &[Vec<f64>], aggregation: Aggregation) -> Vec<f64> {
    let k = topic_word.len();
    (0..k)
        .map(|i| {
            let others = (0..k)
                .filter(|&j| j != i)
                .map(|j| cosine(&topic_word[i], &topic_word[j]));
            match aggregation {
                Aggregation::Mean => {
                    let (sum, count) = others.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
                    if count == 0 {
                        0.0
                    } else {
                        sum / count as f64
                    }
                }
                Aggregation::Max => others.fold(None, |best: Option<f64>, v| {
                    Some(best.map_or(v, |b| b.max(v)))
                })
                .unwrap_or(0.0),
            }
        })
        .collect()
}
