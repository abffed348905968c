use crate::error::{EvalError, Result};
use crate::run_artifacts::{ParamValue, TrackerParams};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Path of the default configuration shipped for `tracker`.
pub fn base_config_path(config_dir: &Path, tracker: &str) -> PathBuf {
    config_dir.join(format!("{}.json", tracker.to_lowercase()))
}

fn load_base_config(config_dir: &Path, tracker: &str) -> Result<Map<String, Value>> {
    let path = base_config_path(config_dir, tracker);
    if !path.exists() {
        return Err(EvalError::tracker_config(format!(
            "Tracker config not found for {} at {:?}",
            tracker, path
        )));
    }
    let content = fs::read_to_string(&path)?;
    match serde_json::from_str(&content)? {
        Value::Object(map) => Ok(map),
        other => Err(EvalError::tracker_config(format!(
            "Tracker config {:?} must be a JSON object, found {}",
            path, other
        ))),
    }
}

/// Replaces every key with a non-null override; everything else is kept.
pub fn apply_overrides(config: &mut Map<String, Value>, overrides: &TrackerParams) {
    for (key, value) in overrides {
        if let Some(value) = value {
            config.insert(key.clone(), param_to_json(value));
        }
    }
}

fn param_to_json(value: &ParamValue) -> Value {
    match value {
        ParamValue::Bool(b) => Value::from(*b),
        ParamValue::Int(i) => Value::from(*i),
        ParamValue::Float(f) => Value::from(*f),
    }
}

/// Writes the tracker's base config with `overrides` applied to a temp file.
///
/// The file is deleted when the returned handle is dropped, so the caller
/// keeps it alive for as long as the tracker needs to read it.
pub fn build_tracker_config(
    config_dir: &Path,
    tracker: &str,
    overrides: &TrackerParams,
) -> Result<NamedTempFile> {
    let mut config = load_base_config(config_dir, tracker)?;
    apply_overrides(&mut config, overrides);

    let mut file = tempfile::Builder::new()
        .prefix(&format!("{}_", tracker.to_lowercase()))
        .suffix(".json")
        .tempfile()?;
    serde_json::to_writer_pretty(&mut file, &config)?;
    file.flush()?;

    tracing::debug!("Tracker config for {} written to {:?}", tracker, file.path());
    Ok(file)
}
