use crate::pipeline::report::generate_summary_report;
use crate::run_artifacts::{RunFailure, RunResult};
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const RUNS_DIR: &str = "runs";
pub const CSV_FILE: &str = "bulk_test_results.csv";
pub const JSONL_FILE: &str = "bulk_test_data.jsonl";
pub const FAILURES_FILE: &str = "failed_runs.json";

/// Saves all results in every output format and regenerates the summary.
pub fn save_results(
    results: &[RunResult],
    failures: &[RunFailure],
    output_dir: &Path,
) -> Result<()> {
    let runs_dir = output_dir.join(RUNS_DIR);
    fs::create_dir_all(&runs_dir)
        .with_context(|| format!("Failed to create {:?}", runs_dir))?;

    for result in results {
        let path = runs_dir.join(format!("{}.json", result.run_id));
        let json = serde_json::to_string_pretty(result)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))?;
    }

    let failures_path = output_dir.join(FAILURES_FILE);
    fs::write(&failures_path, serde_json::to_string_pretty(failures)?)
        .with_context(|| format!("Failed to write {:?}", failures_path))?;

    let csv_path = write_exports(results, output_dir)?;
    let summary_path = generate_summary_report(results, failures, output_dir)?;

    tracing::info!("Results saved to {:?}", output_dir);
    tracing::info!("  Individual runs: {:?}", runs_dir);
    tracing::info!("  CSV summary: {:?}", csv_path);
    tracing::info!("  Summary report: {:?}", summary_path);
    if !failures.is_empty() {
        tracing::warn!("  {} failed run(s) listed in {:?}", failures.len(), failures_path);
    }
    Ok(())
}

/// Rebuilds the CSV, JSONL and summary from the per-run files of a previous batch.
pub fn regenerate_outputs(output_dir: &Path) -> Result<usize> {
    let results = load_runs(output_dir)?;
    let failures = load_failures(output_dir)?;
    write_exports(&results, output_dir)?;
    let summary_path = generate_summary_report(&results, &failures, output_dir)?;
    tracing::info!(
        "Regenerated outputs for {} run(s); summary at {:?}",
        results.len(),
        summary_path
    );
    Ok(results.len())
}

/// Loads `runs/*.json`, ordered by file name.
pub fn load_runs(output_dir: &Path) -> Result<Vec<RunResult>> {
    let runs_dir = output_dir.join(RUNS_DIR);
    if !runs_dir.exists() {
        return Ok(Vec::new());
    }

    let mut results = Vec::new();
    for entry in WalkDir::new(&runs_dir)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("json"))
    {
        let content = fs::read_to_string(entry.path())
            .with_context(|| format!("Failed to read {:?}", entry.path()))?;
        let result: RunResult = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", entry.path()))?;
        results.push(result);
    }
    Ok(results)
}

fn load_failures(output_dir: &Path) -> Result<Vec<RunFailure>> {
    let path = output_dir.join(FAILURES_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(&path)?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
}

fn write_exports(results: &[RunResult], output_dir: &Path) -> Result<PathBuf> {
    let csv_path = output_dir.join(CSV_FILE);
    write_csv(results, &csv_path)?;

    let jsonl_path = output_dir.join(JSONL_FILE);
    let mut jsonl = BufWriter::new(
        File::create(&jsonl_path).with_context(|| format!("Failed to create {:?}", jsonl_path))?,
    );
    for result in results {
        serde_json::to_writer(&mut jsonl, result)?;
        jsonl.write_all(b"\n")?;
    }
    jsonl.flush()?;

    Ok(csv_path)
}

/// One row per result in field order, frame log excluded. An empty result
/// set produces an empty file.
fn write_csv(results: &[RunResult], path: &Path) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create {:?}", path))?;

    for (i, result) in results.iter().enumerate() {
        let Value::Object(mut row) = serde_json::to_value(result)? else {
            anyhow::bail!("Run {} did not serialize to an object", result.run_id);
        };
        row.shift_remove("frame_log");

        if i == 0 {
            writer.write_record(row.keys())?;
        }
        writer.write_record(row.values().map(csv_cell))?;
    }

    writer.flush()?;
    Ok(())
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
