// Topic interpreter trait: turns a topic's top words into a label.
//
// Interpretation is network I/O against an external language model. It only
// ever runs during analysis, after models are persisted, so a slow or
// failing service cannot affect training.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// The service's structured answer, kept exactly as returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TopicInterpretation(pub Value);

impl TopicInterpretation {
    pub fn topic_name(&self) -> Option<&str> {
        self.0.get("topic_name").and_then(Value::as_str)
    }

    pub fn topic_description(&self) -> Option<&str> {
        self.0.get("topic_description").and_then(Value::as_str)
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

#[async_trait]
pub trait TopicInterpreter: Send + Sync {
    /// Label a topic from its top words, heaviest first. `examples` are
    /// optional documents that exhibit the topic.
    async fn interpret(&self, top_words: &[String], examples: &[String]) -> Result<TopicInterpretation>;
}

/// Interpreter used when no service is configured. Fails if called, so no
/// fabricated label ever reaches the user.
pub struct NoopInterpreter;

#[async_trait]
impl TopicInterpreter for NoopInterpreter {
    async fn interpret(&self, _top_words: &[String], _examples: &[String]) -> Result<TopicInterpretation> {
        anyhow::bail!("No topic interpreter configured (set the AZURE_OPENAI_* variables)")
    }
}
