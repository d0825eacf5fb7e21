// Local file corpus provider.
//
// Supported layouts, chosen by file extension:
//   .jsonl  one JSON value per line
//   .json   a JSON array
//   other   plain text, one record per line
//
// A JSON value may be a string, null, or an object holding the text under the
// configured field. Blank text lines and nulls become absent records.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::traits::{CorpusProvider, RawRecords};
use super::DatasetType;

pub struct LocalFileProvider {
    /// Object field holding the text when records are JSON objects
    pub text_field: String,
}

impl Default for LocalFileProvider {
    fn default() -> Self {
        Self {
            text_field: "text".to_string(),
        }
    }
}

impl LocalFileProvider {
    pub fn new(text_field: &str) -> Self {
        Self {
            text_field: text_field.to_string(),
        }
    }

    pub async fn read(&self, path: &Path) -> Result<RawRecords> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read local dataset {}", path.display()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let records = match extension.as_deref() {
            Some("jsonl") => parse_json_lines(&content, &self.text_field)?,
            Some("json") => parse_json_array(&content, &self.text_field)?,
            _ => parse_plain_lines(&content),
        };

        debug!(path = %path.display(), records = records.len(), "Read local dataset");
        Ok(records)
    }
}

#[async_trait]
impl CorpusProvider for LocalFileProvider {
    async fn fetch(&self, dataset_type: DatasetType, dataset_name: &str) -> Result<RawRecords> {
        if dataset_type != DatasetType::Local {
            anyhow::bail!("LocalFileProvider cannot fetch {dataset_type} dataset '{dataset_name}'");
        }
        self.read(Path::new(dataset_name)).await
    }
}

pub fn parse_plain_lines(content: &str) -> RawRecords {
    content
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect()
}

pub fn parse_json_lines(content: &str, text_field: &str) -> Result<RawRecords> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let value: Value = serde_json::from_str(line)
                .with_context(|| format!("Invalid JSON on line {}", i + 1))?;
            Ok(record_text(&value, text_field))
        })
        .collect()
}

pub fn parse_json_array(content: &str, text_field: &str) -> Result<RawRecords> {
    let values: Vec<Value> =
        serde_json::from_str(content).context("Expected a JSON array of records")?;
    Ok(values.iter().map(|v| record_text(v, text_field)).collect())
}

/// Extract the text of one JSON record, if it has any.
pub fn record_text(value: &Value, text_field: &str) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get(text_field)
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}
