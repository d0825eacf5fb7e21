// Dataset acquisition: trait-based corpus providers.
//
// The CorpusProvider trait is the only thing the batch trainer sees.
// LocalFileProvider reads text files from disk, HuggingFaceProvider pulls rows
// from the Hugging Face datasets server, and DatasetRouter picks between them
// by dataset type.

pub mod huggingface;
pub mod local;
pub mod router;
pub mod traits;

use serde::{Deserialize, Serialize};

/// Where a dataset comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetType {
    /// A dataset on the Hugging Face hub, addressed as `owner/name`
    #[serde(rename = "HF")]
    HuggingFace,
    /// A file on the local filesystem
    Local,
}

impl DatasetType {
    /// Parse the run specification spelling (`HF` or `Local`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "HF" => Some(DatasetType::HuggingFace),
            "Local" => Some(DatasetType::Local),
            _ => None,
        }
    }

    /// Lowercase form used in artifact paths.
    pub fn slug(&self) -> &'static str {
        match self {
            DatasetType::HuggingFace => "hf",
            DatasetType::Local => "local",
        }
    }
}

impl std::fmt::Display for DatasetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetType::HuggingFace => f.write_str("HF"),
            DatasetType::Local => f.write_str("Local"),
        }
    }
}
