// Status display: shows stored models and corpus directories.

use anyhow::Result;

use crate::storage::models::load_path;
use crate::storage::{format_bytes, CorpusStore, ModelStore};

/// Display what is on disk to the terminal.
pub fn show(models: &ModelStore, corpora: &CorpusStore) -> Result<()> {
    let stored = models.list()?;
    if stored.is_empty() {
        println!("Models: none in {}", models.dir().display());
        println!("\nRun `topica train <SPEC_FILE>` to fit some.");
    } else {
        println!("Models: {} in {}", stored.len(), models.dir().display());
        for model in &stored {
            match load_path(&model.path) {
                Ok(artifact) => println!(
                    "  {:<20} {:>3} topics  {:>6} docs  {:>6} words  {:>9}  ({}, {})",
                    artifact.run_id,
                    artifact.model.n_topics(),
                    artifact.model.n_documents(),
                    artifact.vocabulary.len(),
                    format_bytes(model.size_bytes),
                    artifact.spec.dataset_name,
                    artifact.created_at.format("%Y-%m-%d %H:%M"),
                ),
                Err(e) => println!("  {}  unreadable: {e:#}", model.path.display()),
            }
        }
    }

    // Shared corpora are the top-level directories of the data dir
    let data_dir = corpora.dir();
    let corpus_dirs: Vec<String> = match std::fs::read_dir(data_dir) {
        Ok(entries) => {
            let mut names: Vec<String> = entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }
        Err(_) => Vec::new(),
    };

    if corpus_dirs.is_empty() {
        println!("Corpora: none in {}", data_dir.display());
    } else {
        println!("Corpora: {} in {}", corpus_dirs.len(), data_dir.display());
        for name in &corpus_dirs {
            println!("  {name}");
        }
    }

    Ok(())
}
