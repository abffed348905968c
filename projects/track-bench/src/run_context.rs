use crate::cli::{BulkArgs, ReportArgs};
use crate::pipeline::finalize::{regenerate_outputs, save_results};
use crate::pipeline::matrix::{generate_configs, sample_configs, MatrixPreset};
use crate::pipeline::orchestrator::run_batch;
use crate::video::subprocess::SubprocessBackend;
use crate::video::TrackingBackend;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const VIDEO_PREFIX: &str = "test_video";
const MAX_DEFAULT_THREADS: usize = 12;

/// `test_video*.mp4` / `.mov` directly under `video_root`, sorted by path.
pub fn discover_videos(video_root: &Path) -> Vec<PathBuf> {
    let mut videos: Vec<PathBuf> = WalkDir::new(video_root)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|name| name.starts_with(VIDEO_PREFIX))
                .unwrap_or(false)
        })
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|s| matches!(s.to_lowercase().as_str(), "mp4" | "mov"))
                .unwrap_or(false)
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    videos.sort();
    videos
}

/// Threads per tracker process, sharing the machine between `jobs` workers.
pub fn default_thread_count(jobs: usize, cpus: usize) -> usize {
    let available = if jobs > 1 { cpus / jobs } else { cpus };
    available.clamp(1, MAX_DEFAULT_THREADS)
}

pub fn run_bulk(args: &BulkArgs) -> Result<()> {
    let videos = discover_videos(&args.video_root);
    if videos.is_empty() {
        anyhow::bail!(
            "No test videos found in {:?} (expected test_video*.mp4 or test_video*.mov)",
            args.video_root
        );
    }
    tracing::info!("Found {} test video(s):", videos.len());
    for v in &videos {
        tracing::info!("  - {:?}", v.file_name().unwrap_or_default());
    }

    let preset = if args.full {
        MatrixPreset::full()
    } else {
        MatrixPreset::quick()
    };
    let jobs = args.jobs.max(1);
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let threads = args
        .threads
        .map(|t| t.max(1))
        .unwrap_or_else(|| default_thread_count(jobs, cpus));

    tracing::info!(
        "Running {} test matrix",
        if preset.quick { "QUICK" } else { "FULL" }
    );
    tracing::info!("  Models: {:?}", preset.models);
    tracing::info!("  Confidence thresholds: {:?}", preset.confs);
    tracing::info!("  Trackers: {:?}", preset.trackers);
    tracing::info!("  Players per video: top {}", preset.num_players);
    tracing::info!("  Videos: {}", videos.len().min(preset.max_videos));
    tracing::info!("  Threads per run: {} (jobs={})", threads, jobs);

    let mut detector = SubprocessBackend::new(&args.tracker_cmd, threads)
        .context("Invalid tracker command")?;
    let configs = generate_configs(&videos, &preset, &mut detector);
    let configs = sample_configs(configs, args.sample_size, args.random_seed);
    if configs.is_empty() {
        anyhow::bail!("No test configurations generated; check the tracker command");
    }
    tracing::info!("Total test runs: {}", configs.len());

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create {:?}", args.output_dir))?;

    let factory = || -> crate::error::Result<Box<dyn TrackingBackend>> {
        Ok(Box::new(SubprocessBackend::new(&args.tracker_cmd, threads)?))
    };
    let outcome = run_batch(configs, jobs, &args.tracker_config_dir, &factory);

    tracing::info!(
        "Completed {} run(s), {} failed",
        outcome.results.len(),
        outcome.failures.len()
    );
    save_results(&outcome.results, &outcome.failures, &args.output_dir)
}

pub fn run_report(args: &ReportArgs) -> Result<()> {
    let count = regenerate_outputs(&args.output_dir)
        .with_context(|| format!("Failed to regenerate outputs in {:?}", args.output_dir))?;
    if count == 0 {
        tracing::warn!("No saved runs found under {:?}", args.output_dir);
    }
    Ok(())
}
