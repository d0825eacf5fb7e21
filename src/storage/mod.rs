// Durable storage: versioned model artifacts and reusable corpus artifacts.
//
// Everything is JSON. Writes go to a sibling temp file first and are then
// renamed into place, so a crash mid-write never leaves a truncated artifact
// under the final name.

pub mod corpus;
pub mod models;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

pub use corpus::CorpusStore;
pub use models::{ModelArtifact, ModelStore};

/// Where models go when the models directory cannot be written.
/// Uses the platform data directory: ~/.local/share/topica/rescue/ on Linux,
/// falling back to the system temp directory.
pub fn default_rescue_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("topica")
        .join("rescue")
}

/// Serialize `value` to `path` via a temp file and rename.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let bytes = serde_json::to_vec(value).context("Failed to serialize artifact")?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, &bytes).with_context(|| format!("Failed to write {}", tmp.display()))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to move artifact into {}", path.display()));
    }
    Ok(())
}

/// Human-readable byte count for status output.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
