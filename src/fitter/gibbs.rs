// Collapsed Gibbs sampler for LDA with symmetric priors.
//
// Every token occurrence in the DTM gets a topic assignment. Each sweep
// resamples every assignment from its full conditional
//
//   p(z = k | rest) ∝ (n_kw + eta) / (n_k + V·eta) · (n_dk + alpha)
//
// After each sweep the log-likelihood of the corpus under the current point
// estimates of theta and phi is appended to the trace:
//
//   Σ_(d,w) count(d,w) · ln Σ_k theta_dk · phi_kw

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::model::FittedModel;
use super::traits::{FitParams, TopicFitter};
use crate::corpus::vectorizer::DocumentTermMatrix;

#[derive(Debug, Clone, Copy, Default)]
pub struct GibbsSampler;

impl TopicFitter for GibbsSampler {
    fn fit(&self, dtm: &DocumentTermMatrix, params: &FitParams) -> Result<FittedModel> {
        if params.n_topics == 0 {
            anyhow::bail!("n_topics must be positive");
        }
        if !(params.alpha > 0.0 && params.eta > 0.0) {
            anyhow::bail!(
                "priors must be positive (alpha={}, eta={})",
                params.alpha,
                params.eta
            );
        }
        if params.iterations == 0 {
            anyhow::bail!("iterations must be positive");
        }
        if dtm.n_cols() == 0 || dtm.total_count() == 0 {
            anyhow::bail!("document-term matrix holds no tokens");
        }

        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut state = SamplerState::initialize(dtm, params, &mut rng);
        let mut trace = Vec::with_capacity(params.iterations);

        for iteration in 0..params.iterations {
            state.sweep(&mut rng);
            let ll = state.log_likelihood(dtm);
            if iteration % 50 == 0 {
                debug!(iteration, log_likelihood = ll, "Gibbs sweep");
            }
            trace.push(ll);
        }

        Ok(FittedModel {
            topic_word: state.topic_word(),
            doc_topic: state.doc_topic(),
            log_likelihood_trace: trace,
        })
    }
}

struct SamplerState {
    k: usize,
    v: usize,
    alpha: f64,
    eta: f64,
    /// (document, word) of every token occurrence
    tokens: Vec<(u32, u32)>,
    /// Topic assignment per token occurrence
    z: Vec<u32>,
    /// topic-word counts, row-major k × v
    nkw: Vec<u32>,
    /// document-topic counts, row-major d × k
    ndk: Vec<u32>,
    nk: Vec<u32>,
    /// token count per document
    nd: Vec<u32>,
}

impl SamplerState {
    fn initialize(dtm: &DocumentTermMatrix, params: &FitParams, rng: &mut StdRng) -> Self {
        let k = params.n_topics;
        let v = dtm.n_cols();
        let d = dtm.n_rows();

        let mut tokens = Vec::with_capacity(dtm.total_count() as usize);
        for doc in 0..d {
            for (word, count) in dtm.row(doc) {
                for _ in 0..count {
                    tokens.push((doc as u32, word as u32));
                }
            }
        }

        let mut state = Self {
            k,
            v,
            alpha: params.alpha,
            eta: params.eta,
            z: Vec::with_capacity(tokens.len()),
            tokens,
            nkw: vec![0; k * v],
            ndk: vec![0; d * k],
            nk: vec![0; k],
            nd: vec![0; d],
        };

        for i in 0..state.tokens.len() {
            let (doc, word) = state.tokens[i];
            let topic = rng.random_range(0..k);
            state.z.push(topic as u32);
            state.assign(doc as usize, word as usize, topic);
        }

        state
    }

    fn assign(&mut self, doc: usize, word: usize, topic: usize) {
        self.nkw[topic * self.v + word] += 1;
        self.ndk[doc * self.k + topic] += 1;
        self.nk[topic] += 1;
        self.nd[doc] += 1;
    }

    fn unassign(&mut self, doc: usize, word: usize, topic: usize) {
        self.nkw[topic * self.v + word] -= 1;
        self.ndk[doc * self.k + topic] -= 1;
        self.nk[topic] -= 1;
        self.nd[doc] -= 1;
    }

    fn sweep(&mut self, rng: &mut StdRng) {
        let v_eta = self.v as f64 * self.eta;
        let mut weights = vec![0.0f64; self.k];

        for i in 0..self.tokens.len() {
            let (doc, word) = self.tokens[i];
            let (doc, word) = (doc as usize, word as usize);
            let old = self.z[i] as usize;
            self.unassign(doc, word, old);

            let mut total = 0.0;
            for (topic, weight) in weights.iter_mut().enumerate() {
                let word_part =
                    (self.nkw[topic * self.v + word] as f64 + self.eta) / (self.nk[topic] as f64 + v_eta);
                let doc_part = self.ndk[doc * self.k + topic] as f64 + self.alpha;
                total += word_part * doc_part;
                *weight = total;
            }

            let target = rng.random::<f64>() * total;
            let new = weights
                .iter()
                .position(|&cumulative| target < cumulative)
                .unwrap_or(self.k - 1);

            self.z[i] = new as u32;
            self.assign(doc, word, new);
        }
    }

    fn theta(&self, doc: usize, topic: usize) -> f64 {
        (self.ndk[doc * self.k + topic] as f64 + self.alpha)
            / (self.nd[doc] as f64 + self.k as f64 * self.alpha)
    }

    fn phi(&self, topic: usize, word: usize) -> f64 {
        (self.nkw[topic * self.v + word] as f64 + self.eta)
            / (self.nk[topic] as f64 + self.v as f64 * self.eta)
    }

    fn log_likelihood(&self, dtm: &DocumentTermMatrix) -> f64 {
        let mut ll = 0.0;
        for doc in 0..dtm.n_rows() {
            for (word, count) in dtm.row(doc) {
                let p: f64 = (0..self.k)
                    .map(|topic| self.theta(doc, topic) * self.phi(topic, word))
                    .sum();
                ll += count as f64 * p.ln();
            }
        }
        ll
    }

    fn topic_word(&self) -> Vec<Vec<f64>> {
        (0..self.k)
            .map(|topic| normalize((0..self.v).map(|w| self.phi(topic, w)).collect()))
            .collect()
    }

    fn doc_topic(&self) -> Vec<Vec<f64>> {
        (0..self.nd.len())
            .map(|doc| normalize((0..self.k).map(|t| self.theta(doc, t)).collect()))
            .collect()
    }
}

/// Rescale so the row sums to exactly 1 up to rounding.
fn normalize(mut row: Vec<f64>) -> Vec<f64> {
    let sum: f64 = row.iter().sum();
    if sum > 0.0 {
        for w in &mut row {
            *w /= sum;
        }
    }
    row
}
