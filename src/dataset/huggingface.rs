// Hugging Face corpus provider.
//
// Pages through the datasets server `/rows` endpoint (at most 100 rows per
// request) and pulls the configured text column out of each row. Rows whose
// text column is missing or null come back as absent records so the
// normalizer can skip them.
//
// API docs: https://huggingface.co/docs/dataset-viewer/rows

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::local::record_text;
use super::traits::{CorpusProvider, RawRecords};
use super::DatasetType;
use crate::rate_limit::{with_retry, RateLimiter};

/// Public datasets server endpoint.
pub const DEFAULT_DATASETS_SERVER_URL: &str = "https://datasets-server.huggingface.co";

/// The server refuses pages longer than this.
const PAGE_SIZE: usize = 100;

/// Which slice of a hub dataset to read, and how much of it.
#[derive(Debug, Clone)]
pub struct HuggingFaceOptions {
    pub endpoint: String,
    pub config: String,
    pub split: String,
    pub text_field: String,
    pub max_rows: usize,
    pub token: Option<String>,
    pub request_timeout: Duration,
}

impl Default for HuggingFaceOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_DATASETS_SERVER_URL.to_string(),
            config: "default".to_string(),
            split: "train".to_string(),
            text_field: "overview".to_string(),
            max_rows: 10_000,
            token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct HuggingFaceProvider {
    client: Client,
    options: HuggingFaceOptions,
    rate_limiter: RateLimiter,
}

impl HuggingFaceProvider {
    pub fn new(options: HuggingFaceOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent("topica/0.1 (topic-modelling)")
            .timeout(options.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            options,
            // Anonymous access is throttled aggressively; stay well under it
            rate_limiter: RateLimiter::new(5.0),
        })
    }

    async fn fetch_page(&self, dataset: &str, offset: usize, length: usize) -> Result<RowsResponse> {
        let url = format!("{}/rows", self.options.endpoint.trim_end_matches('/'));
        let offset = offset.to_string();
        let length = length.to_string();

        let mut request = self.client.get(&url).query(&[
            ("dataset", dataset),
            ("config", self.options.config.as_str()),
            ("split", self.options.split.as_str()),
            ("offset", offset.as_str()),
            ("length", length.as_str()),
        ]);
        if let Some(token) = &self.options.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context("Hugging Face datasets server request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Hugging Face datasets server returned {}: {}", status, body);
        }

        response
            .json::<RowsResponse>()
            .await
            .context("Failed to parse datasets server response")
    }
}

#[async_trait]
impl CorpusProvider for HuggingFaceProvider {
    async fn fetch(&self, dataset_type: DatasetType, dataset_name: &str) -> Result<RawRecords> {
        if dataset_type != DatasetType::HuggingFace {
            anyhow::bail!("HuggingFaceProvider cannot fetch {dataset_type} dataset '{dataset_name}'");
        }

        let mut records = Vec::new();
        let mut offset = 0;

        while records.len() < self.options.max_rows {
            let length = PAGE_SIZE.min(self.options.max_rows - records.len());
            let page = with_retry(&self.rate_limiter, || {
                self.fetch_page(dataset_name, offset, length)
            })
            .await
            .with_context(|| format!("Failed to fetch rows {offset}.. of {dataset_name}"))?;

            let fetched = page.rows.len();
            records.extend(extract_texts(&page, &self.options.text_field));
            offset += fetched;

            debug!(dataset = dataset_name, offset, total = ?page.num_rows_total, "Fetched page");

            let exhausted = page.num_rows_total.is_some_and(|total| offset as u64 >= total);
            if fetched == 0 || exhausted {
                break;
            }
        }

        info!(
            dataset = dataset_name,
            split = %self.options.split,
            records = records.len(),
            "Fetched Hugging Face dataset"
        );

        Ok(records)
    }
}

/// Pull the text column out of every row in a page.
pub fn extract_texts(page: &RowsResponse, text_field: &str) -> RawRecords {
    page.rows
        .iter()
        .map(|r| record_text(&r.row, text_field))
        .collect()
}

// --- datasets server response types ---

#[derive(Debug, Deserialize)]
pub struct RowsResponse {
    pub rows: Vec<RowEntry>,
    pub num_rows_total: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RowEntry {
    pub row_idx: u64,
    pub row: Value,
}
