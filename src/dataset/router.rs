// Routes a fetch to the provider registered for its dataset type.

use anyhow::Result;
use async_trait::async_trait;

use super::traits::{CorpusProvider, RawRecords};
use super::DatasetType;

pub struct DatasetRouter {
    local: Box<dyn CorpusProvider>,
    hugging_face: Box<dyn CorpusProvider>,
}

impl DatasetRouter {
    pub fn new(local: Box<dyn CorpusProvider>, hugging_face: Box<dyn CorpusProvider>) -> Self {
        Self {
            local,
            hugging_face,
        }
    }
}

#[async_trait]
impl CorpusProvider for DatasetRouter {
    async fn fetch(&self, dataset_type: DatasetType, dataset_name: &str) -> Result<RawRecords> {
        match dataset_type {
            DatasetType::Local => self.local.fetch(dataset_type, dataset_name).await,
            DatasetType::HuggingFace => self.hugging_face.fetch(dataset_type, dataset_name).await,
        }
    }
}
