// Model evaluation: convergence of the likelihood trace, per-topic
// coherence against the training corpus, and topic-to-topic similarity.
//
// All of it is diagnostic. Nothing here mutates a model or rejects one.

pub mod coherence;
pub mod convergence;
pub mod similarity;
