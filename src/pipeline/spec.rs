// Run specification file parsing.
//
// The file is either a JSON array or line-delimited JSON. Every entry is
// validated on its own: a malformed entry becomes a failed SpecEntry while
// its neighbours still parse, so one bad configuration never sinks the file.

use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::corpus::prepared::slugify;
use crate::dataset::DatasetType;

/// One validated hyperparameter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpecification {
    pub dataset_type: DatasetType,
    pub dataset_name: String,
    pub n_topics: usize,
    pub alpha: f64,
    pub eta: f64,
    pub run_id: String,
    /// Sampling iterations; the configured default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_iters: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl RunSpecification {
    /// File-name-safe form of the run_id, used to name the model artifact.
    pub fn artifact_stem(&self) -> String {
        artifact_stem(&self.run_id)
    }
}

pub fn artifact_stem(run_id: &str) -> String {
    format!("model_{}", slugify(run_id))
}

/// A parsed file entry: either a valid specification or the reason it isn't.
#[derive(Debug, Clone)]
pub struct SpecEntry {
    /// 1-based position in the file
    pub position: usize,
    /// The run_id when one could be read, otherwise "entry #<position>"
    pub label: String,
    /// The run_id as read from the entry, even when the entry is invalid
    pub run_id: Option<String>,
    pub spec: Result<RunSpecification, String>,
}

/// Parse a specification file's content into per-entry results.
///
/// Only content that cannot be split into entries at all (a JSON array that
/// is not valid JSON) fails the whole file.
pub fn parse_spec_file(content: &str) -> Result<Vec<SpecEntry>> {
    let trimmed = content.trim_start();

    let raw: Vec<Result<Value, String>> = if trimmed.starts_with('[') {
        let values: Vec<Value> =
            serde_json::from_str(trimmed).context("Specification file is not a valid JSON array")?;
        values.into_iter().map(Ok).collect()
    } else {
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<Value>(line).map_err(|e| format!("invalid JSON: {e}")))
            .collect()
    };

    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            let position = i + 1;
            let run_id = value
                .as_ref()
                .ok()
                .and_then(|v| v.get("run_id"))
                .and_then(run_id_text);
            let label = run_id.clone().unwrap_or_else(|| format!("entry #{position}"));
            let spec = value.and_then(|v| validate_entry(&v));
            SpecEntry {
                position,
                label,
                run_id,
                spec,
            }
        })
        .collect())
}

/// Fail every entry whose run_id (or artifact file name) repeats an earlier
/// entry's. The first occurrence stays valid. An invalid entry still claims
/// its run_id when one could be read, so a later entry reusing it fails too.
pub fn reject_duplicates(entries: &mut [SpecEntry]) {
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_stems: HashSet<String> = HashSet::new();

    for entry in entries.iter_mut() {
        let run_id = match (&entry.spec, &entry.run_id) {
            (Ok(spec), _) => spec.run_id.clone(),
            (Err(_), Some(id)) => {
                seen_ids.insert(id.clone());
                seen_stems.insert(artifact_stem(id));
                continue;
            }
            (Err(_), None) => continue,
        };
        let stem = artifact_stem(&run_id);
        if !seen_ids.insert(run_id.clone()) {
            entry.spec = Err(format!("duplicate run_id '{run_id}'"));
        } else if !seen_stems.insert(stem.clone()) {
            entry.spec = Err(format!(
                "run_id '{run_id}' maps to artifact name '{stem}' already used by another entry"
            ));
        }
    }
}

fn run_id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

fn validate_entry(value: &Value) -> Result<RunSpecification, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| "entry is not a JSON object".to_string())?;

    let dataset_type = {
        let raw = required(obj, "dataset_type")?
            .as_str()
            .ok_or("dataset_type must be a string")?;
        DatasetType::parse(raw)
            .ok_or_else(|| format!("dataset_type must be \"HF\" or \"Local\", got \"{raw}\""))?
    };

    let dataset_name = required(obj, "dataset_name")?
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .ok_or("dataset_name must be a non-empty string")?
        .to_string();

    let n_topics = positive_integer(required(obj, "n_topics")?, "n_topics")?;
    let alpha = positive_real(required(obj, "alpha")?, "alpha")?;
    let eta = positive_real(required(obj, "eta")?, "eta")?;

    let run_id = run_id_text(required(obj, "run_id")?)
        .ok_or("run_id must be a non-empty string or an integer")?;

    let n_iters = obj
        .get("n_iters")
        .filter(|v| !v.is_null())
        .map(|v| positive_integer(v, "n_iters"))
        .transpose()?;

    let seed = match obj.get("seed").filter(|v| !v.is_null()) {
        Some(v) => Some(v.as_u64().ok_or("seed must be a non-negative integer")?),
        None => None,
    };

    Ok(RunSpecification {
        dataset_type,
        dataset_name,
        n_topics,
        alpha,
        eta,
        run_id,
        n_iters,
        seed,
    })
}

fn required<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a Value, String> {
    obj.get(field)
        .filter(|v| !v.is_null())
        .ok_or_else(|| format!("missing required field '{field}'"))
}

fn positive_integer(value: &Value, field: &str) -> Result<usize, String> {
    match value.as_i64() {
        Some(n) if n > 0 => Ok(n as usize),
        Some(n) => Err(format!("{field} must be greater than 0, got {n}")),
        None => Err(format!("{field} must be an integer, got {value}")),
    }
}

fn positive_real(value: &Value, field: &str) -> Result<f64, String> {
    match value.as_f64() {
        Some(x) if x.is_finite() && x > 0.0 => Ok(x),
        Some(x) => Err(format!("{field} must be a positive real, got {x}")),
        None => Err(format!("{field} must be a number, got {value}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"{"dataset_type": "HF", "dataset_name": "owner/movies", "n_topics": 10, "alpha": 0.1, "eta": 0.01, "run_id": 1}"#;

    #[test]
    fn parses_json_lines() {
        let content = format!("{GOOD}\n\n{}\n", GOOD.replace("\"run_id\": 1", "\"run_id\": \"b\""));
        let entries = parse_spec_file(&content).unwrap();
        assert_eq!(entries.len(), 2);
        let first = entries[0].spec.as_ref().unwrap();
        assert_eq!(first.dataset_type, DatasetType::HuggingFace);
        assert_eq!(first.run_id, "1");
        assert_eq!(first.n_iters, None);
        assert_eq!(entries[1].label, "b");
    }

    #[test]
    fn parses_json_array() {
        let content = format!("[{GOOD}, {}]", GOOD.replace("\"HF\"", "\"Local\""));
        let entries = parse_spec_file(&content).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].spec.as_ref().unwrap().dataset_type, DatasetType::Local);
    }

    #[test]
    fn broken_line_fails_only_that_entry() {
        let content = format!("{GOOD}\n{{not json\n{}", GOOD.replace("\"run_id\": 1", "\"run_id\": 3"));
        let entries = parse_spec_file(&content).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].spec.is_ok());
        assert!(entries[1].spec.as_ref().unwrap_err().contains("invalid JSON"));
        assert_eq!(entries[1].label, "entry #2");
        assert!(entries[2].spec.is_ok());
    }

    #[test]
    fn broken_array_fails_the_file() {
        assert!(parse_spec_file("[{\"run_id\": 1},").is_err());
    }

    #[test]
    fn validates_fields() {
        let cases = [
            (GOOD.replace("\"n_topics\": 10", "\"n_topics\": 0"), "n_topics must be greater than 0"),
            (GOOD.replace("\"n_topics\": 10", "\"n_topics\": -3"), "n_topics must be greater than 0"),
            (GOOD.replace("\"n_topics\": 10", "\"n_topics\": 2.5"), "n_topics must be an integer"),
            (GOOD.replace("\"alpha\": 0.1", "\"alpha\": 0"), "alpha must be a positive real"),
            (GOOD.replace("\"eta\": 0.01", "\"eta\": \"x\""), "eta must be a number"),
            (GOOD.replace("\"HF\"", "\"S3\""), "dataset_type must be"),
            (GOOD.replace("\"run_id\": 1", "\"run_id\": \"\""), "run_id must be"),
            (GOOD.replace(", \"alpha\": 0.1", ""), "missing required field 'alpha'"),
        ];
        for (content, expected) in cases {
            let entries = parse_spec_file(&content).unwrap();
            let err = entries[0].spec.as_ref().unwrap_err();
            assert!(err.contains(expected), "{err} should contain {expected}");
        }
    }

    #[test]
    fn optional_fields_are_read() {
        let content = GOOD.replace("\"run_id\": 1", "\"run_id\": 1, \"n_iters\": 200, \"seed\": 42");
        let entries = parse_spec_file(&content).unwrap();
        let spec = entries[0].spec.as_ref().unwrap();
        assert_eq!(spec.n_iters, Some(200));
        assert_eq!(spec.seed, Some(42));
    }

    #[test]
    fn duplicates_fail_after_first_occurrence() {
        let content = format!(
            "{GOOD}\n{GOOD}\n{}\n{}",
            GOOD.replace("\"run_id\": 1", "\"run_id\": \"a/b\""),
            GOOD.replace("\"run_id\": 1", "\"run_id\": \"a_b\"")
        );
        let mut entries = parse_spec_file(&content).unwrap();
        reject_duplicates(&mut entries);
        assert!(entries[0].spec.is_ok());
        assert!(entries[1].spec.as_ref().unwrap_err().contains("duplicate run_id"));
        assert!(entries[2].spec.is_ok());
        assert!(entries[3].spec.as_ref().unwrap_err().contains("artifact name"));
    }

    #[test]
    fn invalid_entry_still_claims_its_run_id() {
        let content = format!(
            "{}\n{GOOD}\n{}",
            GOOD.replace("\"n_topics\": 10", "\"n_topics\": 0"),
            GOOD.replace("\"run_id\": 1", "\"run_id\": \"x\"")
        );
        let mut entries = parse_spec_file(&content).unwrap();
        assert_eq!(entries[0].run_id.as_deref(), Some("1"));
        assert!(entries[0].spec.is_err());

        reject_duplicates(&mut entries);
        assert!(entries[0].spec.as_ref().unwrap_err().contains("n_topics"));
        assert!(entries[1].spec.as_ref().unwrap_err().contains("duplicate run_id '1'"));
        assert!(entries[2].spec.is_ok());
    }
}
