use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::analysis::azure::AzureSettings;
use crate::corpus::vocabulary::VocabularyThresholds;
use crate::dataset::huggingface::{HuggingFaceOptions, DEFAULT_DATASETS_SERVER_URL};
use crate::pipeline::batch::{BatchOptions, VocabularyStrategy};
use crate::storage::default_rescue_dir;
use crate::text::normalizer::NormalizerConfig;

/// Central configuration loaded from environment variables.
///
/// Every value has a default, so an empty environment is a working one for
/// local datasets. Secrets (HF_TOKEN, AZURE_OPENAI_API_KEY) are only read
/// from the environment. The .env file is loaded at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Corpus artifacts (documents + vocabulary) live here
    pub data_dir: PathBuf,
    /// One model artifact per run_id lives here
    pub models_dir: PathBuf,
    pub thresholds: VocabularyThresholds,
    pub min_token_length: usize,
    pub stem: bool,
    pub vocabulary: VocabularyStrategy,
    /// Sampling iterations for runs that don't set n_iters
    pub iterations: usize,
    pub concurrency: usize,
    pub fetch_timeout: Duration,
    pub fit_timeout: Duration,

    pub hf_token: Option<String>,
    pub hf_endpoint: String,
    pub hf_config: String,
    pub hf_split: String,
    pub hf_text_field: String,
    pub hf_max_rows: usize,

    pub azure_endpoint: String,
    pub azure_api_key: String,
    pub azure_api_version: String,
    pub azure_deployment: String,
    pub interpret_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        Ok(Self {
            data_dir: PathBuf::from(var_or("TOPICA_DATA_DIR", "./data")),
            models_dir: PathBuf::from(var_or("TOPICA_MODELS_DIR", "./models")),
            thresholds: VocabularyThresholds {
                max_relative_frequency: parse_var("TOPICA_MAX_RELATIVE_FREQUENCY", 0.9)?,
                min_absolute_frequency: parse_var("TOPICA_MIN_ABSOLUTE_FREQUENCY", 5)?,
            },
            min_token_length: parse_var("TOPICA_MIN_TOKEN_LENGTH", 2)?,
            stem: parse_var("TOPICA_STEM", true)?,
            vocabulary: match env::var("TOPICA_VOCABULARY") {
                Ok(raw) => raw
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!("TOPICA_VOCABULARY: {e}"))?,
                Err(_) => VocabularyStrategy::Shared,
            },
            iterations: parse_var("TOPICA_ITERATIONS", 500)?,
            concurrency: parse_var("TOPICA_CONCURRENCY", 1)?,
            fetch_timeout: Duration::from_secs(parse_var("TOPICA_FETCH_TIMEOUT_SECS", 300)?),
            fit_timeout: Duration::from_secs(parse_var("TOPICA_FIT_TIMEOUT_SECS", 3600)?),

            hf_token: env::var("HF_TOKEN").ok().filter(|t| !t.is_empty()),
            hf_endpoint: var_or("TOPICA_HF_ENDPOINT", DEFAULT_DATASETS_SERVER_URL),
            hf_config: var_or("TOPICA_HF_CONFIG", "default"),
            hf_split: var_or("TOPICA_HF_SPLIT", "train"),
            hf_text_field: var_or("TOPICA_HF_TEXT_FIELD", "overview"),
            hf_max_rows: parse_var("TOPICA_HF_MAX_ROWS", 10_000)?,

            azure_endpoint: env::var("AZURE_OPENAI_ENDPOINT").unwrap_or_default(),
            azure_api_key: env::var("AZURE_OPENAI_API_KEY").unwrap_or_default(),
            azure_api_version: var_or("AZURE_OPENAI_API_VERSION", "2024-06-01"),
            azure_deployment: env::var("AZURE_OPENAI_DEPLOYMENT").unwrap_or_default(),
            interpret_timeout: Duration::from_secs(parse_var("TOPICA_INTERPRET_TIMEOUT_SECS", 60)?),
        })
    }

    /// Check that the Azure OpenAI interpreter is configured.
    /// Call this before any operation that labels topics.
    pub fn require_interpreter(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("AZURE_OPENAI_ENDPOINT", &self.azure_endpoint),
            ("AZURE_OPENAI_API_KEY", &self.azure_api_key),
            ("AZURE_OPENAI_DEPLOYMENT", &self.azure_deployment),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            anyhow::bail!(
                "{} not set. Add them to your .env file to enable topic interpretation.",
                missing.join(", ")
            );
        }
        Ok(())
    }

    pub fn normalizer(&self) -> NormalizerConfig {
        NormalizerConfig {
            min_token_length: self.min_token_length,
            stem: self.stem,
            extra_stop_words: Vec::new(),
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            normalizer: self.normalizer(),
            thresholds: self.thresholds,
            strategy: self.vocabulary,
            reuse_corpus: false,
            overwrite: false,
            default_iterations: self.iterations,
            fetch_timeout: self.fetch_timeout,
            fit_timeout: self.fit_timeout,
            concurrency: self.concurrency,
            rescue_dir: default_rescue_dir(),
            show_progress: true,
        }
    }

    pub fn hugging_face(&self) -> HuggingFaceOptions {
        HuggingFaceOptions {
            endpoint: self.hf_endpoint.clone(),
            config: self.hf_config.clone(),
            split: self.hf_split.clone(),
            text_field: self.hf_text_field.clone(),
            max_rows: self.hf_max_rows,
            token: self.hf_token.clone(),
            // A single page never gets longer than the whole fetch
            request_timeout: HuggingFaceOptions::default()
                .request_timeout
                .min(self.fetch_timeout),
        }
    }

    pub fn azure(&self) -> AzureSettings {
        AzureSettings {
            endpoint: self.azure_endpoint.clone(),
            api_key: self.azure_api_key.clone(),
            api_version: self.azure_api_version.clone(),
            deployment: self.azure_deployment.clone(),
            timeout: self.interpret_timeout,
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value '{raw}'")),
        _ => Ok(default),
    }
}
