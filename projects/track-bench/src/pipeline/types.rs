use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Instant;

#[derive(Debug, Serialize, Clone, Default)]
pub struct StageProgress {
    pub runs: usize,
    pub frames: usize,
    pub ms_per_frame: f64,
}

/// Batch state shared between the run workers and the collector
#[derive(Debug)]
pub struct BatchState {
    pub total_runs: usize,
    pub completed: AtomicUsize,
    pub failed: AtomicUsize,
    /// Number of active run workers
    pub active_workers: AtomicUsize,
    /// Frame throughput over finished runs
    pub tracking: RwLock<StageProgress>,
    /// Start time of the batch
    pub start_time: Instant,
}

impl BatchState {
    pub fn new(total_runs: usize) -> Self {
        Self {
            total_runs,
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            active_workers: AtomicUsize::new(0),
            tracking: RwLock::new(StageProgress::default()),
            start_time: Instant::now(),
        }
    }

    pub fn record_success(&self, frames: usize, processing_time_sec: f64) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if frames == 0 {
            return;
        }
        let ms_per_frame = processing_time_sec * 1000.0 / frames as f64;
        if let Ok(mut progress) = self.tracking.write() {
            progress.runs += 1;
            progress.frames += frames;
            // Simple exponential moving average for smoothing durations
            if progress.ms_per_frame == 0.0 {
                progress.ms_per_frame = ms_per_frame;
            } else {
                progress.ms_per_frame = progress.ms_per_frame * 0.9 + ms_per_frame * 0.1;
            }
        }
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finished(&self) -> usize {
        self.completed.load(Ordering::Relaxed) + self.failed.load(Ordering::Relaxed)
    }

    pub fn to_progress_json(&self) -> serde_json::Value {
        let tracking = self
            .tracking
            .read()
            .map(|p| p.clone())
            .unwrap_or_default();

        let elapsed = self.start_time.elapsed().as_secs_f64();
        let runs_per_minute = if elapsed > 0.0 {
            self.finished() as f64 * 60.0 / elapsed
        } else {
            0.0
        };

        serde_json::json!({
            "total_runs": self.total_runs,
            "completed": self.completed.load(Ordering::Relaxed),
            "failed": self.failed.load(Ordering::Relaxed),
            "active_workers": self.active_workers.load(Ordering::Relaxed),
            "tracking": {
                "runs": tracking.runs,
                "frames": tracking.frames,
                "ms_per_frame": tracking.ms_per_frame,
                "fps": if tracking.ms_per_frame > 0.0 { 1000.0 / tracking.ms_per_frame } else { 0.0 },
            },
            "runs_per_minute": runs_per_minute,
        })
    }
}
