// Corpus provider trait: the swap-ready boundary for dataset acquisition.

use anyhow::Result;
use async_trait::async_trait;

use super::DatasetType;

/// Raw text records as delivered by a provider. `None` marks a record whose
/// text field was missing or null upstream.
pub type RawRecords = Vec<Option<String>>;

/// Trait for fetching a named dataset's raw text records.
///
/// Implementations may block on network or disk; the batch trainer bounds
/// every call with its own timeout.
#[async_trait]
pub trait CorpusProvider: Send + Sync {
    async fn fetch(&self, dataset_type: DatasetType, dataset_name: &str) -> Result<RawRecords>;
}
