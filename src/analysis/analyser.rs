// TopicAnalyser: read-only queries over one fitted model.
//
// The analyser holds borrowed references only. Loading, caching and sharing
// models is the caller's business; any number of analysers can read the same
// model at once.

use anyhow::Result;

use super::interpret::{TopicInterpretation, TopicInterpreter};
use crate::corpus::vocabulary::Vocabulary;
use crate::fitter::model::{rank_descending, FittedModel};

#[derive(Debug, Clone, Copy)]
pub struct TopicAnalyser<'a> {
    model: &'a FittedModel,
    vocabulary: &'a Vocabulary,
}

impl<'a> TopicAnalyser<'a> {
    /// Pair a model with the vocabulary it was fit against.
    pub fn new(model: &'a FittedModel, vocabulary: &'a Vocabulary) -> Result<Self> {
        if model.n_topics() > 0 && model.vocabulary_size() != vocabulary.len() {
            anyhow::bail!(
                "model has {} word columns but the vocabulary has {} tokens",
                model.vocabulary_size(),
                vocabulary.len()
            );
        }
        Ok(Self { model, vocabulary })
    }

    pub fn n_topics(&self) -> usize {
        self.model.n_topics()
    }

    pub fn n_documents(&self) -> usize {
        self.model.n_documents()
    }

    fn topic_row(&self, topic: usize) -> Result<&'a [f64]> {
        self.model
            .topic_word
            .get(topic)
            .map(Vec::as_slice)
            .ok_or_else(|| anyhow::anyhow!("topic {topic} out of range (model has {} topics)", self.n_topics()))
    }

    /// Vocabulary indices of the `n` heaviest words, heaviest first.
    pub fn top_word_indices(&self, topic: usize, n: usize) -> Result<Vec<usize>> {
        Ok(rank_descending(self.topic_row(topic)?, n))
    }

    /// The `n` heaviest words of a topic. Returns min(n, |vocabulary|) tokens
    /// ordered by descending weight, lower index first on ties.
    pub fn top_words(&self, topic: usize, n: usize) -> Result<Vec<String>> {
        Ok(self
            .top_word_weights(topic, n)?
            .into_iter()
            .map(|(word, _)| word)
            .collect())
    }

    pub fn top_word_weights(&self, topic: usize, n: usize) -> Result<Vec<(String, f64)>> {
        let row = self.topic_row(topic)?;
        rank_descending(row, n)
            .into_iter()
            .map(|i| {
                let token = self
                    .vocabulary
                    .token(i)
                    .ok_or_else(|| anyhow::anyhow!("word index {i} missing from vocabulary"))?;
                Ok((token.to_string(), row[i]))
            })
            .collect()
    }

    /// A document's topic distribution.
    pub fn document_mixture(&self, doc: usize) -> Result<&'a [f64]> {
        self.model
            .doc_topic
            .get(doc)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "document {doc} out of range (model has {} documents)",
                    self.n_documents()
                )
            })
    }

    /// The topic with the largest share of a document.
    pub fn dominant_topic(&self, doc: usize) -> Result<(usize, f64)> {
        let mixture = self.document_mixture(doc)?;
        let topic = rank_descending(mixture, 1)
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("document {doc} has an empty topic mixture"))?;
        Ok((topic, mixture[topic]))
    }

    /// Up to `n` documents whose dominant topic is `topic`, most confident
    /// first (equal weights by lower document index).
    pub fn top_documents(&self, topic: usize, n: usize) -> Result<Vec<(usize, f64)>> {
        self.topic_row(topic)?;
        let mut docs: Vec<(usize, f64)> = (0..self.n_documents())
            .filter_map(|doc| match self.dominant_topic(doc) {
                Ok((t, weight)) if t == topic => Some((doc, weight)),
                _ => None,
            })
            .collect();
        docs.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        docs.truncate(n);
        Ok(docs)
    }

    /// Send a topic's top words to the interpreter and return its answer
    /// unchanged.
    pub async fn interpret(
        &self,
        topic: usize,
        n: usize,
        interpreter: &dyn TopicInterpreter,
        examples: &[String],
    ) -> Result<TopicInterpretation> {
        let words = self.top_words(topic, n)?;
        interpreter.interpret(&words, examples).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::vocabulary::VocabularyThresholds;

    fn vocab() -> Vocabulary {
        Vocabulary::from_tokens(
            vec!["apple".into(), "banana".into(), "cherry".into()],
            VocabularyThresholds::default(),
        )
        .unwrap()
    }

    fn model() -> FittedModel {
        FittedModel {
            topic_word: vec![vec![0.2, 0.7, 0.1], vec![0.4, 0.2, 0.4]],
            doc_topic: vec![vec![0.9, 0.1], vec![0.3, 0.7], vec![0.6, 0.4], vec![0.2, 0.8]],
            log_likelihood_trace: vec![-1.0],
        }
    }

    #[test]
    fn top_words_descending_with_index_ties() {
        let (m, v) = (model(), vocab());
        let a = TopicAnalyser::new(&m, &v).unwrap();
        assert_eq!(a.top_words(0, 2).unwrap(), vec!["banana", "apple"]);
        assert_eq!(a.top_words(1, 3).unwrap(), vec!["apple", "cherry", "banana"]);
        assert_eq!(a.top_words(1, 10).unwrap().len(), 3);
    }

    #[test]
    fn mixture_and_dominant_topic() {
        let (m, v) = (model(), vocab());
        let a = TopicAnalyser::new(&m, &v).unwrap();
        assert_eq!(a.document_mixture(1).unwrap(), &[0.3, 0.7]);
        assert_eq!(a.dominant_topic(2).unwrap(), (0, 0.6));
        assert!(a.document_mixture(4).is_err());
    }

    #[test]
    fn top_documents_most_confident_first() {
        let (m, v) = (model(), vocab());
        let a = TopicAnalyser::new(&m, &v).unwrap();
        assert_eq!(a.top_documents(1, 5).unwrap(), vec![(3, 0.8), (1, 0.7)]);
        assert_eq!(a.top_documents(0, 1).unwrap(), vec![(0, 0.9)]);
        assert!(a.top_documents(2, 1).is_err());
    }

    #[test]
    fn vocabulary_mismatch_rejected() {
        let m = model();
        let v = Vocabulary::from_tokens(vec!["apple".into()], VocabularyThresholds::default()).unwrap();
        assert!(TopicAnalyser::new(&m, &v).is_err());
    }
}
