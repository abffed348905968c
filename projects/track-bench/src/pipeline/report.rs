use crate::run_artifacts::{format_float, RunFailure, RunResult};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const SUMMARY_FILE: &str = "bulk_test_summary.md";

/// Minimum score for a run to count as high quality
const HIGH_QUALITY_SCORE: u32 = 70;

/// Writes `bulk_test_summary.md` into `output_dir` and returns its path.
pub fn generate_summary_report(
    results: &[RunResult],
    failures: &[RunFailure],
    output_dir: &Path,
) -> Result<PathBuf> {
    let path = output_dir.join(SUMMARY_FILE);
    fs::write(&path, render_summary(results, failures))
        .with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}

/// Renders the markdown summary of a batch.
pub fn render_summary(results: &[RunResult], failures: &[RunFailure]) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_summary(&mut out, results, failures);
    out
}

fn write_summary(
    out: &mut String,
    results: &[RunResult],
    failures: &[RunFailure],
) -> std::fmt::Result {
    writeln!(out, "# Bulk CV Tracking Test Results\n")?;
    writeln!(out, "**Total runs**: {}\n", results.len())?;
    if !failures.is_empty() {
        writeln!(out, "**Failed runs**: {}\n", failures.len())?;
    }

    let (Some(best), Some(worst)) = (best_by_continuity(results), worst_by_continuity(results))
    else {
        writeln!(out, "No successful runs to summarize.\n")?;
        return write_failures(out, failures);
    };
    let total = results.len();

    writeln!(out, "## Overall Results (All Runs)\n")?;
    write_run(out, "Best", best)?;
    write_run(out, "Worst", worst)?;

    let high_quality: Vec<&RunResult> = results
        .iter()
        .filter(|r| r.quality_score > HIGH_QUALITY_SCORE)
        .collect();
    if let Some(best_hq) = best_by_continuity(high_quality.iter().copied()) {
        writeln!(
            out,
            "## High Quality Results Only (Quality Score > {})\n",
            HIGH_QUALITY_SCORE
        )?;
        writeln!(
            out,
            "**Best**: {} @ conf={} (player {}, {})",
            best_hq.model,
            format_float(best_hq.conf),
            best_hq.player_idx,
            best_hq.video
        )?;
        writeln!(
            out,
            "  - Continuous from start: {:.1}s",
            best_hq.continuous_tracking_from_start_sec
        )?;
        writeln!(out, "  - Success rate: {:.1}%\n", best_hq.success_rate * 100.0)?;
        let filtered = total - high_quality.len();
        writeln!(
            out,
            "**Runs filtered out**: {} / {} ({:.1}%)\n",
            filtered,
            total,
            percent(filtered, total)
        )?;
    }

    let success_5 = results.iter().filter(|r| r.success_first_5sec).count();
    writeln!(out, "## First 5 Seconds Success\n")?;
    writeln!(
        out,
        "**Runs with ≥5 seconds continuous tracking**: {} / {} ({:.1}%)\n",
        success_5,
        total,
        percent(success_5, total)
    )?;

    writeln!(out, "## Results by Model\n")?;
    let models: BTreeSet<&str> = results.iter().map(|r| r.model.as_str()).collect();
    for model in models {
        let group: Vec<&RunResult> = results.iter().filter(|r| r.model == model).collect();
        writeln!(out, "### {}", model)?;
        write_success_group(out, &group)?;
    }

    writeln!(out, "## Results by Confidence Threshold\n")?;
    let mut confs: Vec<f64> = results.iter().map(|r| r.conf).collect();
    confs.sort_by(f64::total_cmp);
    confs.dedup();
    for conf in confs {
        let group: Vec<&RunResult> = results.iter().filter(|r| r.conf == conf).collect();
        writeln!(out, "### conf={}", format_float(conf))?;
        write_success_group(out, &group)?;
    }

    writeln!(out, "## Results by Tracker\n")?;
    let trackers: BTreeSet<&str> = results.iter().map(|r| r.tracker.as_str()).collect();
    for tracker in trackers {
        let group: Vec<&RunResult> = results.iter().filter(|r| r.tracker == tracker).collect();
        let avg_quality = mean(group.iter().map(|r| r.quality_score as f64));
        writeln!(out, "### {}", tracker)?;
        writeln!(
            out,
            "- Avg continuous from start: {:.1}s",
            mean(group.iter().map(|r| r.continuous_tracking_from_start_sec))
        )?;
        writeln!(out, "- Avg quality score: {:.1}/100", avg_quality)?;
        writeln!(out, "- Runs: {}\n", group.len())?;
    }

    write_failures(out, failures)
}

fn write_run(out: &mut String, label: &str, r: &RunResult) -> std::fmt::Result {
    writeln!(
        out,
        "**{}**: {}/{} @ conf={} (player {}, {})",
        label,
        r.model,
        r.tracker,
        format_float(r.conf),
        r.player_idx,
        r.video
    )?;
    writeln!(
        out,
        "  - Continuous from start: {:.1}s",
        r.continuous_tracking_from_start_sec
    )?;
    writeln!(out, "  - Success rate: {:.1}%", r.success_rate * 100.0)?;
    writeln!(out, "  - Quality score: {}/100\n", r.quality_score)
}

fn write_success_group(out: &mut String, group: &[&RunResult]) -> std::fmt::Result {
    let success_5 = group.iter().filter(|r| r.success_first_5sec).count();
    writeln!(
        out,
        "- Avg continuous from start: {:.1}s",
        mean(group.iter().map(|r| r.continuous_tracking_from_start_sec))
    )?;
    writeln!(
        out,
        "- Success at 5sec: {}/{} ({:.1}%)\n",
        success_5,
        group.len(),
        percent(success_5, group.len())
    )
}

fn write_failures(out: &mut String, failures: &[RunFailure]) -> std::fmt::Result {
    if failures.is_empty() {
        return Ok(());
    }
    writeln!(out, "## Failed Runs\n")?;
    for f in failures {
        writeln!(out, "- `{}`: {}", f.run_id, f.error)?;
    }
    writeln!(out)
}

/// First run with the longest continuous tracking from the start.
fn best_by_continuity<'a>(runs: impl IntoIterator<Item = &'a RunResult>) -> Option<&'a RunResult> {
    runs.into_iter().fold(None, |best, r| match best {
        Some(b) if b.continuous_tracking_from_start_sec >= r.continuous_tracking_from_start_sec => {
            Some(b)
        }
        _ => Some(r),
    })
}

/// First run with the shortest continuous tracking from the start.
fn worst_by_continuity<'a>(runs: impl IntoIterator<Item = &'a RunResult>) -> Option<&'a RunResult> {
    runs.into_iter().fold(None, |worst, r| match worst {
        Some(w) if w.continuous_tracking_from_start_sec <= r.continuous_tracking_from_start_sec => {
            Some(w)
        }
        _ => Some(r),
    })
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}
