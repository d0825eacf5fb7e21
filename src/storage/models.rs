// Model artifacts: one self-describing JSON file per run_id.
//
// Layout: <models_dir>/model_<run-id-slug>.json holding the run
// specification, the vocabulary the model was fit against, and the three
// FittedModel matrices/sequences. The `format` and `version` fields let a
// reader reject files it does not understand instead of misreading them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::write_json_atomic;
use crate::corpus::prepared::{slugify, CorpusKey};
use crate::corpus::vocabulary::Vocabulary;
use crate::fitter::model::FittedModel;
use crate::pipeline::spec::{artifact_stem, RunSpecification};

pub const ARTIFACT_FORMAT: &str = "topica.fitted-model";
pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format: String,
    pub version: u32,
    pub run_id: String,
    pub spec: RunSpecification,
    pub corpus_key: CorpusKey,
    pub created_at: DateTime<Utc>,
    pub vocabulary: Vocabulary,
    pub model: FittedModel,
}

impl ModelArtifact {
    pub fn new(
        spec: RunSpecification,
        corpus_key: CorpusKey,
        vocabulary: Vocabulary,
        model: FittedModel,
    ) -> Self {
        Self {
            format: ARTIFACT_FORMAT.to_string(),
            version: ARTIFACT_VERSION,
            run_id: spec.run_id.clone(),
            spec,
            corpus_key,
            created_at: Utc::now(),
            vocabulary,
            model,
        }
    }

    /// Parse and check an artifact from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes).context("Artifact is not valid JSON")?;

        let format = value.get("format").and_then(Value::as_str).unwrap_or("");
        if format != ARTIFACT_FORMAT {
            anyhow::bail!("Unrecognized artifact format '{format}', expected '{ARTIFACT_FORMAT}'");
        }
        let version = value.get("version").and_then(Value::as_u64).unwrap_or(0);
        if version != u64::from(ARTIFACT_VERSION) {
            anyhow::bail!("Unsupported artifact version {version}, expected {ARTIFACT_VERSION}");
        }

        let artifact: ModelArtifact =
            serde_json::from_value(value).context("Artifact does not match the expected layout")?;
        artifact
            .model
            .validate(
                artifact.spec.n_topics,
                artifact.vocabulary.len(),
                artifact.model.n_documents(),
            )
            .context("Artifact holds an inconsistent model")?;
        Ok(artifact)
    }
}

/// Summary of one artifact on disk, for status listings.
#[derive(Debug, Clone)]
pub struct StoredModel {
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ModelStore {
    models_dir: PathBuf,
}

impl ModelStore {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.models_dir
    }

    /// Deterministic artifact location for a run_id.
    pub fn artifact_path(&self, run_id: &str) -> PathBuf {
        self.models_dir.join(format!("{}.json", artifact_stem(run_id)))
    }

    pub fn exists(&self, run_id: &str) -> bool {
        self.artifact_path(run_id).exists()
    }

    /// Write the artifact under its run_id and return where it landed.
    pub fn save(&self, artifact: &ModelArtifact) -> Result<PathBuf> {
        let path = self.artifact_path(&artifact.run_id);
        write_json_atomic(&path, artifact)?;
        Ok(path)
    }

    pub fn load(&self, run_id: &str) -> Result<ModelArtifact> {
        let path = self.artifact_path(run_id);
        if !path.exists() {
            anyhow::bail!(
                "No model artifact for run_id '{run_id}' (looked for {})",
                path.display()
            );
        }
        load_path(&path)
    }

    /// Every model_*.json file in the models directory, sorted by name.
    pub fn list(&self) -> Result<Vec<StoredModel>> {
        if !self.models_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.models_dir)
            .with_context(|| format!("Failed to read {}", self.models_dir.display()))?;

        let mut models = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !(name.starts_with("model_") && name.ends_with(".json")) {
                continue;
            }
            models.push(StoredModel {
                path: entry.path(),
                size_bytes: entry.metadata().map(|m| m.len()).unwrap_or(0),
            });
        }
        models.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(models)
    }
}

pub fn load_path(path: &Path) -> Result<ModelArtifact> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    ModelArtifact::from_slice(&bytes).with_context(|| format!("Failed to load {}", path.display()))
}

/// Write a copy of an artifact that could not be saved to its normal
/// location. The file name carries a timestamp so repeated rescues of the
/// same run_id never clobber each other.
pub fn rescue(artifact: &ModelArtifact, rescue_dir: &Path) -> Result<PathBuf> {
    let name = format!(
        "model_{}-{}.json",
        slugify(&artifact.run_id),
        artifact.created_at.format("%Y%m%dT%H%M%S%.3fZ")
    );
    let path = rescue_dir.join(name);
    write_json_atomic(&path, artifact)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::vocabulary::VocabularyThresholds;
    use crate::dataset::DatasetType;

    fn artifact(run_id: &str) -> ModelArtifact {
        let spec = RunSpecification {
            dataset_type: DatasetType::Local,
            dataset_name: "notes.txt".to_string(),
            n_topics: 2,
            alpha: 0.1,
            eta: 0.01,
            run_id: run_id.to_string(),
            n_iters: None,
            seed: None,
        };
        let vocabulary = Vocabulary::from_tokens(
            vec!["cat".into(), "dog".into(), "sat".into()],
            VocabularyThresholds::default(),
        )
        .unwrap();
        let model = FittedModel {
            topic_word: vec![vec![0.6, 0.2, 0.2], vec![0.1, 0.8, 0.1]],
            doc_topic: vec![vec![0.5, 0.5]],
            log_likelihood_trace: vec![-20.0, -15.5],
        };
        ModelArtifact::new(
            spec,
            CorpusKey::shared(DatasetType::Local, "notes.txt"),
            vocabulary,
            model,
        )
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        let original = artifact("7");

        let path = store.save(&original).unwrap();
        assert_eq!(path, dir.path().join("model_7.json"));
        assert!(store.exists("7"));

        let loaded = store.load("7").unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn artifact_names_are_path_safe() {
        let store = ModelStore::new("/models");
        assert_eq!(
            store.artifact_path("../escape"),
            PathBuf::from("/models/model__._escape.json")
        );
    }

    #[test]
    fn rejects_foreign_format_and_version() {
        let mut value = serde_json::to_value(artifact("1")).unwrap();
        value["format"] = Value::from("something.else");
        let err = ModelArtifact::from_slice(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(err.to_string().contains("Unrecognized artifact format"));

        let mut value = serde_json::to_value(artifact("1")).unwrap();
        value["version"] = Value::from(99);
        let err = ModelArtifact::from_slice(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(err.to_string().contains("Unsupported artifact version"));
    }

    #[test]
    fn rejects_model_vocabulary_mismatch() {
        let mut value = serde_json::to_value(artifact("1")).unwrap();
        value["vocabulary"]["tokens"] = serde_json::json!(["cat", "dog"]);
        assert!(ModelArtifact::from_slice(&serde_json::to_vec(&value).unwrap()).is_err());
    }

    #[test]
    fn missing_artifact_names_run_id() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelStore::new(dir.path()).load("ghost").unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn list_only_sees_model_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        store.save(&artifact("b")).unwrap();
        store.save(&artifact("a")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let listed = store.list().unwrap();
        let names: Vec<_> = listed
            .iter()
            .map(|m| m.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["model_a.json", "model_b.json"]);
        assert!(listed.iter().all(|m| m.size_bytes > 0));
    }

    #[test]
    fn rescue_writes_a_loadable_copy() {
        let dir = tempfile::tempdir().unwrap();
        let original = artifact("r");
        let path = rescue(&original, dir.path()).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("model_r-"));
        assert_eq!(load_path(&path).unwrap(), original);
    }
}
