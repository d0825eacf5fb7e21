// Topic fitter trait: the boundary around the LDA estimation algorithm.
//
// The batch trainer only knows this trait. The bundled GibbsSampler is one
// implementation; a different estimator (variational, online, a binding to an
// external library) can be dropped in without touching the pipeline.

use anyhow::Result;

use super::model::FittedModel;
use crate::corpus::vectorizer::DocumentTermMatrix;

/// Hyperparameters for one fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitParams {
    pub n_topics: usize,
    /// Document-topic prior concentration
    pub alpha: f64,
    /// Topic-word prior concentration
    pub eta: f64,
    pub iterations: usize,
    /// Fixed seed for reproducible fits; None draws one from the OS
    pub seed: Option<u64>,
}

/// Trait for estimating an LDA model from a document-term matrix.
///
/// Fits are CPU-bound and may run for a long time, so this is synchronous;
/// the batch trainer moves each call onto the blocking thread pool.
pub trait TopicFitter: Send + Sync {
    fn fit(&self, dtm: &DocumentTermMatrix, params: &FitParams) -> Result<FittedModel>;
}
