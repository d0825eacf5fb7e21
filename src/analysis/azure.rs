// Azure OpenAI topic interpreter.
//
// Sends the top words (and optionally a few example documents) to a chat
// completions deployment in JSON mode and returns the parsed JSON object
// the model answers with, expected to carry "topic_name" and
// "topic_description".
//
// API docs: https://learn.microsoft.com/azure/ai-services/openai/reference

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::interpret::{TopicInterpretation, TopicInterpreter};
use crate::output::truncate_chars;
use crate::rate_limit::{with_retry, RateLimiter};

const SYSTEM_PROMPT: &str = "You name and describe topics found by a topic model. \
The user gives you the top words of one topic, most important first, and may add \
example documents that exhibit it. Documents can exhibit other topics as well, so \
describe only the topic the top words point to and use the documents to understand \
how the words relate. Answer with a JSON object containing \"topic_name\": a concise \
name derived from the words, and \"topic_description\": a detailed explanation of \
the topic's core ideas and key concepts.";

/// Example documents are clipped to this many characters in the prompt.
const EXAMPLE_CHARS: usize = 600;

#[derive(Debug, Clone)]
pub struct AzureSettings {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub deployment: String,
    pub timeout: Duration,
}

pub struct AzureInterpreter {
    client: Client,
    settings: AzureSettings,
    rate_limiter: RateLimiter,
}

impl AzureInterpreter {
    pub fn new(settings: AzureSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            settings,
            // Keep well under typical per-deployment request quotas
            rate_limiter: RateLimiter::new(2.0),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.deployment,
            self.settings.api_version
        )
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let response = self
            .client
            .post(self.url())
            .header("api-key", &self.settings.api_key)
            .json(request)
            .send()
            .await
            .context("Failed to call Azure OpenAI")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Azure OpenAI returned {}: {}", status, truncate_chars(&body, 300));
        }

        response
            .json::<ChatResponse>()
            .await
            .context("Failed to parse Azure OpenAI response")
    }
}

#[async_trait]
impl TopicInterpreter for AzureInterpreter {
    async fn interpret(&self, top_words: &[String], examples: &[String]) -> Result<TopicInterpretation> {
        let request = build_request(top_words, examples);
        let response = with_retry(&self.rate_limiter, || self.complete(&request)).await?;
        let interpretation = parse_response(response)?;

        debug!(
            words = top_words.len(),
            examples = examples.len(),
            topic_name = ?interpretation.topic_name(),
            "Interpreted topic"
        );
        Ok(interpretation)
    }
}

pub fn user_prompt(top_words: &[String], examples: &[String]) -> String {
    let mut prompt = format!("top words: {}\n", top_words.join(", "));
    if !examples.is_empty() {
        prompt.push_str("example documents:\n");
        for (i, doc) in examples.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, truncate_chars(doc, EXAMPLE_CHARS)));
        }
    }
    prompt.push_str(
        "Using this information, provide a JSON object with \"topic_name\" and \"topic_description\".",
    );
    prompt
}

fn build_request(top_words: &[String], examples: &[String]) -> ChatRequest {
    ChatRequest {
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user_prompt(top_words, examples),
            },
        ],
        temperature: 0.0,
        response_format: ResponseFormat {
            kind: "json_object".to_string(),
        },
    }
}

/// Parse the first choice's content as JSON and hand it back untouched.
fn parse_response(response: ChatResponse) -> Result<TopicInterpretation> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .context("Azure OpenAI response has no message content")?;
    let value: Value = serde_json::from_str(&content).with_context(|| {
        format!(
            "Azure OpenAI answered with non-JSON content: {}",
            truncate_chars(&content, 200)
        )
    })?;
    Ok(TopicInterpretation(value))
}

// --- Chat completions request/response types ---

#[derive(Debug, Serialize)]
struct ChatRequest {
    messages: Vec<ChatMessage>,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words() -> Vec<String> {
        vec!["space".into(), "rocket".into(), "orbit".into()]
    }

    #[test]
    fn prompt_lists_words_in_order() {
        let prompt = user_prompt(&words(), &[]);
        assert!(prompt.starts_with("top words: space, rocket, orbit\n"));
        assert!(!prompt.contains("example documents"));
    }

    #[test]
    fn prompt_numbers_examples() {
        let prompt = user_prompt(&words(), &["a launch".into(), "a landing".into()]);
        assert!(prompt.contains("1. a launch\n2. a landing\n"));
    }

    #[test]
    fn request_uses_json_mode() {
        let request = build_request(&words(), &[]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
    }

    #[test]
    fn response_content_is_returned_verbatim() {
        let response: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"role": "assistant",
                "content": "{\"topic_name\": \"Spaceflight\", \"topic_description\": \"Launches\", \"confidence\": 0.9}"}}]
        }))
        .unwrap();
        let interp = parse_response(response).unwrap();
        assert_eq!(interp.topic_name(), Some("Spaceflight"));
        assert_eq!(interp.0["confidence"], 0.9);
    }

    #[test]
    fn non_json_content_is_an_error() {
        let response: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"content": "Spaceflight!"}}]
        }))
        .unwrap();
        assert!(parse_response(response).is_err());

        let empty: ChatResponse = serde_json::from_value(serde_json::json!({"choices": []})).unwrap();
        assert!(parse_response(empty).is_err());
    }

    #[test]
    fn url_joins_endpoint_and_deployment() {
        let interp = AzureInterpreter::new(AzureSettings {
            endpoint: "https://example.openai.azure.com/".into(),
            api_key: "k".into(),
            api_version: "2024-06-01".into(),
            deployment: "gpt4o".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        assert_eq!(
            interp.url(),
            "https://example.openai.azure.com/openai/deployments/gpt4o/chat/completions?api-version=2024-06-01"
        );
    }
}
