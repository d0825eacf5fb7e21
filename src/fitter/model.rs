// FittedModel: the three outputs of one LDA fit.
//
//   topic_word            n_topics x |vocabulary|, each row a distribution
//   doc_topic             n_documents x n_topics, each row a distribution
//   log_likelihood_trace  one value per training iteration

use serde::{Deserialize, Serialize};

/// Tolerance for "each row sums to 1".
pub const ROW_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub topic_word: Vec<Vec<f64>>,
    pub doc_topic: Vec<Vec<f64>>,
    pub log_likelihood_trace: Vec<f64>,
}

impl FittedModel {
    pub fn n_topics(&self) -> usize {
        self.topic_word.len()
    }

    pub fn n_documents(&self) -> usize {
        self.doc_topic.len()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.topic_word.first().map_or(0, Vec::len)
    }

    pub fn final_log_likelihood(&self) -> Option<f64> {
        self.log_likelihood_trace.last().copied()
    }

    /// Check the model against the shape it was asked to produce.
    pub fn validate(&self, n_topics: usize, vocabulary_size: usize, n_documents: usize) -> anyhow::Result<()> {
        if self.topic_word.len() != n_topics {
            anyhow::bail!(
                "topic_word has {} rows, expected {n_topics}",
                self.topic_word.len()
            );
        }
        if self.doc_topic.len() != n_documents {
            anyhow::bail!(
                "doc_topic has {} rows, expected {n_documents}",
                self.doc_topic.len()
            );
        }
        check_distributions("topic_word", &self.topic_word, vocabulary_size)?;
        check_distributions("doc_topic", &self.doc_topic, n_topics)?;
        if let Some(bad) = self.log_likelihood_trace.iter().position(|v| !v.is_finite()) {
            anyhow::bail!("log_likelihood_trace[{bad}] is not finite");
        }
        Ok(())
    }
}

fn check_distributions(name: &str, rows: &[Vec<f64>], width: usize) -> anyhow::Result<()> {
    for (i, row) in rows.iter().enumerate() {
        if row.len() != width {
            anyhow::bail!("{name} row {i} has {} columns, expected {width}", row.len());
        }
        if row.iter().any(|w| !w.is_finite() || *w < 0.0) {
            anyhow::bail!("{name} row {i} has a negative or non-finite weight");
        }
        let sum: f64 = row.iter().sum();
        if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
            anyhow::bail!("{name} row {i} sums to {sum}, not 1");
        }
    }
    Ok(())
}

/// Indices of the `n` largest weights, heaviest first. Equal weights are
/// ordered by lower index.
pub fn rank_descending(weights: &[f64], n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| weights[b].total_cmp(&weights[a]).then(a.cmp(&b)));
    order.truncate(n);
    order
}
