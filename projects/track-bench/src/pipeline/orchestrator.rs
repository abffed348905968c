// Run orchestrator: drives test configurations through the tracking backend
//
// A single run is one sequential pass over the tracker's frame stream. A
// batch fans runs out over worker threads, each owning its own backend, and
// collects results and failures over channels.

use crate::error::{EvalError, Result};
use crate::pipeline::quality::{evaluate, frame_diag};
use crate::pipeline::resolver::TrackTargetResolver;
use crate::pipeline::streaks::summarize;
use crate::pipeline::types::BatchState;
use crate::run_artifacts::{FrameLog, RunFailure, RunResult, TestConfig};
use crate::tracker_config::build_tracker_config;
use crate::video::{person_candidates, TrackRequest, TrackingBackend};
use chrono::{SecondsFormat, Utc};
use crossbeam::channel::{self, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Continuous tracking needed from the start of the clip for a short success
const SUCCESS_SHORT_SEC: f64 = 5.0;
const SUCCESS_LONG_SEC: f64 = 10.0;

/// Run a single tracking test and collect all metrics.
///
/// Any backend failure aborts the run; the partial frame log is dropped.
pub fn run_single_test(
    config: &TestConfig,
    backend: &mut dyn TrackingBackend,
    tracker_config_dir: &Path,
) -> Result<RunResult> {
    let run_start = Instant::now();
    let run_start_ts = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

    tracing::info!(
        "[{}] Starting test: video={:?} model={} conf={} tracker={} params={:?} player={}",
        config.run_id,
        config.video_path.file_name().unwrap_or_default(),
        config.model_name,
        config.conf_threshold,
        config.tracker,
        config.tracker_params,
        config.player_idx
    );

    let props = backend.probe(&config.video_path)?;
    if props.fps == 0 {
        return Err(EvalError::invalid_argument(format!(
            "{:?} reports fps=0",
            config.video_path
        )));
    }

    let detections = backend.detect_players(&config.video_path, &config.model_name, 0)?;
    let target = detections
        .get(config.player_idx)
        .copied()
        .ok_or(EvalError::PlayerNotFound {
            player_idx: config.player_idx,
            detected: detections.len(),
        })?;

    // Removed again when the handle drops, on success or error
    let tracker_config =
        build_tracker_config(tracker_config_dir, &config.tracker, &config.tracker_params)?;
    let request = TrackRequest {
        video_path: &config.video_path,
        model_name: &config.model_name,
        tracker_config: tracker_config.path(),
        conf_threshold: config.conf_threshold,
    };

    let mut resolver = TrackTargetResolver::new(target.bbox);
    let mut frame_log = FrameLog::new();
    for frame in backend.track(&request)? {
        let objects = frame?;
        let candidates = person_candidates(&objects);
        frame_log.push(resolver.resolve(&candidates).into(), props.fps);
    }
    drop(tracker_config);

    let processing_time = run_start.elapsed().as_secs_f64();

    let streaks = summarize(&frame_log, props.fps as f64)?;
    let quality = evaluate(
        &frame_log,
        frame_diag(props.width, props.height),
        target.bbox.center(),
    );

    let total_frames = frame_log.len();
    let tracked_frames = frame_log.tracked_count();
    let success_rate = if frame_log.is_empty() {
        0.0
    } else {
        tracked_frames as f64 / total_frames as f64
    };
    let processing_speed = if processing_time > 0.0 {
        props.duration_sec() / processing_time
    } else {
        0.0
    };
    let avg_frame_latency = if frame_log.is_empty() {
        0.0
    } else {
        processing_time / total_frames as f64
    };

    let result = RunResult {
        run_id: config.run_id.clone(),
        video: config
            .video_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        model: config.model_name.clone(),
        tracker: config.tracker.clone(),
        tracker_params: config.tracker_params.clone(),
        conf: config.conf_threshold,
        player_idx: config.player_idx,
        run_start_ts,
        run_end_ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        run_elapsed_sec: run_start.elapsed().as_secs_f64(),
        continuous_tracking_from_start_sec: streaks.continuous_from_start_sec,
        first_loss_time_sec: streaks.first_loss_time_sec,
        success_first_5sec: streaks.continuous_from_start_sec >= SUCCESS_SHORT_SEC,
        success_first_10sec: streaks.continuous_from_start_sec >= SUCCESS_LONG_SEC,
        total_frames,
        tracked_frames,
        success_rate,
        max_consecutive_loss_frames: streaks.max_consecutive_loss_frames,
        max_consecutive_loss_sec: streaks.max_consecutive_loss_sec,
        max_consecutive_tracked_frames: streaks.max_consecutive_tracked_frames,
        longest_tracked_streak_sec: streaks.longest_tracked_streak_sec,
        id_switches: resolver.id_switches(),
        avg_confidence: quality.avg_confidence,
        bbox_variance: quality.bbox_variance,
        bbox_size_variance: quality.bbox_size_variance,
        position_jumps: quality.position_jumps,
        max_center_drift_px: quality.max_center_drift_px,
        median_center_drift_px: quality.median_center_drift_px,
        center_drift_ratio: quality.center_drift_ratio,
        suspicious_frames: quality.position_jumps,
        frozen_track: quality.frozen_track,
        likely_wrong_player: quality.likely_wrong_player,
        quality_score: quality.quality_score,
        processing_time_sec: processing_time,
        processing_speed_x_realtime: processing_speed,
        avg_frame_latency_sec: avg_frame_latency,
        peak_rss_mb: peak_rss_mb(),
        detection_count_first_frame: detections.len(),
        target_initial_confidence: Some(target.confidence),
        fps: props.fps,
        frame_width: props.width,
        frame_height: props.height,
        frame_log,
    };

    tracing::info!(
        "[{}] Complete: locked track {:?}, continuous from start {} frames ({:.1}s), success rate {:.1}%, quality {}/100",
        result.run_id,
        resolver.locked_track_id(),
        streaks.continuous_from_start_frames,
        result.continuous_tracking_from_start_sec,
        result.success_rate * 100.0,
        result.quality_score
    );

    Ok(result)
}

/// Peak resident set size of this process in MiB (Linux only).
fn peak_rss_mb() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmHWM:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024.0)
}

/// Results and failures of a batch
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: Vec<RunResult>,
    pub failures: Vec<RunFailure>,
}

enum RunMessage {
    Done(Box<RunResult>),
    Failed(RunFailure),
}

/// Creates a backend for one worker; called on the worker's own thread.
pub trait BackendFactory: Sync {
    fn create(&self) -> Result<Box<dyn TrackingBackend>>;
}

impl<F> BackendFactory for F
where
    F: Fn() -> Result<Box<dyn TrackingBackend>> + Sync,
{
    fn create(&self) -> Result<Box<dyn TrackingBackend>> {
        self()
    }
}

/// Runs every config over `jobs` workers. Failed runs are reported and
/// skipped; they never stop the rest of the batch.
pub fn run_batch(
    configs: Vec<TestConfig>,
    jobs: usize,
    tracker_config_dir: &Path,
    factory: &dyn BackendFactory,
) -> BatchOutcome {
    let total = configs.len();
    let state = Arc::new(BatchState::new(total));
    let pb = progress_bar(total);

    let (tx_cfg, rx_cfg) = channel::unbounded::<TestConfig>();
    for config in configs {
        // Receiver is alive until the workers below finish
        let _ = tx_cfg.send(config);
    }
    drop(tx_cfg);
    let (tx_res, rx_res) = channel::unbounded::<RunMessage>();

    let workers = jobs.max(1).min(total.max(1));
    tracing::info!("Running {} configs with {} worker(s)", total, workers);

    let mut outcome = BatchOutcome::default();
    thread::scope(|scope| {
        for worker_id in 0..workers {
            let rx = rx_cfg.clone();
            let tx = tx_res.clone();
            let state = state.clone();
            scope.spawn(move || {
                state.active_workers.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Spawning run worker {}", worker_id);
                run_worker(rx, tx, &state, factory, tracker_config_dir);
                state.active_workers.fetch_sub(1, Ordering::Relaxed);
                tracing::debug!("Run worker {} finished gracefully", worker_id);
            });
        }
        drop(tx_res);

        for message in rx_res {
            match message {
                RunMessage::Done(result) => {
                    pb.set_message(result.run_id.clone());
                    outcome.results.push(*result);
                }
                RunMessage::Failed(failure) => {
                    tracing::error!("Test failed for {}: {}", failure.run_id, failure.error);
                    outcome.failures.push(failure);
                }
            }
            pb.inc(1);
            tracing::info!("Progress: {}/{} complete", state.finished(), total);
        }
    });

    pb.finish_with_message("Done");
    tracing::info!("Batch finished: {}", state.to_progress_json());
    outcome
}

fn run_worker(
    rx: Receiver<TestConfig>,
    tx: Sender<RunMessage>,
    state: &BatchState,
    factory: &dyn BackendFactory,
    tracker_config_dir: &Path,
) {
    let mut backend: Option<Box<dyn TrackingBackend>> = None;

    for config in rx {
        let outcome = match backend.as_mut() {
            Some(b) => run_single_test(&config, b.as_mut(), tracker_config_dir),
            None => match factory.create() {
                Ok(b) => run_single_test(&config, backend.insert(b).as_mut(), tracker_config_dir),
                Err(e) => Err(e),
            },
        };

        let message = match outcome {
            Ok(result) => {
                state.record_success(result.total_frames, result.processing_time_sec);
                RunMessage::Done(Box::new(result))
            }
            Err(e) => {
                state.record_failure();
                RunMessage::Failed(RunFailure {
                    run_id: config.run_id.clone(),
                    error: e.to_string(),
                })
            }
        };
        if tx.send(message).is_err() {
            break;
        }
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} runs ({eta}) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_artifacts::{
        BoundingBox, Detection, FrameState, ParamValue, TrackerParams,
    };
    use crate::video::{FrameStream, TrackedObject, VideoProperties};
    use assert_matches::assert_matches;
    use std::fs;
    use std::path::PathBuf;

    #[derive(Clone)]
    struct ScriptedBackend {
        props: VideoProperties,
        detections: Vec<Detection>,
        frames: Vec<Vec<TrackedObject>>,
        fail_at_frame: Option<usize>,
    }

    impl TrackingBackend for ScriptedBackend {
        fn probe(&mut self, _video_path: &Path) -> Result<VideoProperties> {
            Ok(self.props)
        }

        fn detect_players(
            &mut self,
            _video_path: &Path,
            _model_name: &str,
            _frame_index: usize,
        ) -> Result<Vec<Detection>> {
            Ok(self.detections.clone())
        }

        fn track<'a>(&'a mut self, request: &TrackRequest<'_>) -> Result<FrameStream<'a>> {
            assert!(request.tracker_config.exists());
            let fail_at = self.fail_at_frame;
            Ok(Box::new(self.frames.iter().enumerate().map(move |(i, f)| {
                if Some(i) == fail_at {
                    Err(EvalError::upstream("decoder crashed"))
                } else {
                    Ok(f.clone())
                }
            })))
        }
    }

    fn person(cx: f64, cy: f64, track_id: i64) -> TrackedObject {
        TrackedObject {
            class_id: 0,
            bbox: BoundingBox::new(cx - 20.0, cy - 40.0, cx + 20.0, cy + 40.0),
            confidence: 0.85,
            track_id: Some(track_id),
        }
    }

    fn backend(frames: Vec<Vec<TrackedObject>>) -> ScriptedBackend {
        ScriptedBackend {
            props: VideoProperties {
                fps: 10,
                frame_count: frames.len(),
                width: 1920,
                height: 1080,
            },
            detections: vec![
                Detection {
                    bbox: BoundingBox::new(80.0, 60.0, 120.0, 140.0), // center (100, 100)
                    confidence: 0.91,
                },
                Detection {
                    bbox: BoundingBox::new(580.0, 60.0, 620.0, 140.0), // center (600, 100)
                    confidence: 0.77,
                },
            ],
            frames,
            fail_at_frame: None,
        }
    }

    fn config_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("botsort.json"), r#"{"track_buffer": 30}"#).unwrap();
        dir
    }

    fn config(player_idx: usize, run_id: &str) -> TestConfig {
        TestConfig {
            video_path: PathBuf::from("spike/test_video.mov"),
            model_name: "yolo11s".to_string(),
            tracker: "botsort".to_string(),
            tracker_params: TrackerParams::from([(
                "track_buffer".to_string(),
                Some(ParamValue::Int(25)),
            )]),
            conf_threshold: 0.25,
            player_idx,
            run_id: run_id.to_string(),
        }
    }

    #[test]
    fn test_run_tracks_per_frame_boxes() {
        let frames: Vec<Vec<TrackedObject>> = (0..12)
            .map(|i| {
                let x = 100.0 + 3.0 * i as f64;
                if i == 6 {
                    vec![person(600.0, 100.0, 2)]
                } else {
                    vec![person(600.0, 100.0, 2), person(x, 100.0, 1)]
                }
            })
            .collect();
        let dir = config_dir();
        let mut backend = backend(frames);

        let result = run_single_test(&config(0, "run"), &mut backend, dir.path()).unwrap();

        assert_eq!(result.total_frames, 12);
        assert_eq!(result.tracked_frames, 11);
        assert_eq!(result.fps, 10);
        assert_eq!(result.continuous_tracking_from_start_sec, 0.6);
        assert_eq!(result.first_loss_time_sec, Some(0.6));
        assert_eq!(result.max_consecutive_tracked_frames, 6);
        assert_eq!(result.id_switches, 0);
        assert_eq!(result.detection_count_first_frame, 2);
        assert_eq!(result.target_initial_confidence, Some(0.91));
        assert!(!result.success_first_5sec);
        assert_eq!(result.position_jumps, 0);
        assert_eq!(result.max_center_drift_px, 33.0);
        assert!(!result.frozen_track);
        assert!(!result.likely_wrong_player);
        assert_eq!(result.video, "test_video.mov");

        // Boxes follow the player rather than staying on the first frame
        let records = result.frame_log.records();
        assert_eq!(records[6].state, FrameState::Lost);
        assert_matches!(
            records[11].state,
            FrameState::Tracked { bbox, track_id: 1, .. } if bbox.center() == (133.0, 100.0)
        );
    }

    #[test]
    fn test_run_sticks_to_locked_identity() {
        // Player 1 is selected; it is nearest to track 2, which later vanishes
        let mut frames = vec![vec![person(605.0, 100.0, 2), person(650.0, 100.0, 3)]];
        frames.extend((0..4).map(|_| vec![person(650.0, 100.0, 3)]));
        let dir = config_dir();
        let mut backend = backend(frames);

        let result = run_single_test(&config(1, "sticky"), &mut backend, dir.path()).unwrap();
        assert_eq!(result.tracked_frames, 1);
        assert_eq!(result.max_consecutive_loss_frames, 4);
        assert_matches!(
            result.frame_log.records()[0].state,
            FrameState::Tracked { track_id: 2, .. }
        );
    }

    #[test]
    fn test_player_not_found() {
        let dir = config_dir();
        let mut backend = backend(vec![]);
        assert_matches!(
            run_single_test(&config(2, "missing"), &mut backend, dir.path()),
            Err(EvalError::PlayerNotFound {
                player_idx: 2,
                detected: 2
            })
        );
    }

    #[test]
    fn test_stream_failure_aborts_run() {
        let dir = config_dir();
        let mut backend = backend(vec![vec![person(100.0, 100.0, 1)]; 5]);
        backend.fail_at_frame = Some(3);
        assert_matches!(
            run_single_test(&config(0, "crash"), &mut backend, dir.path()),
            Err(EvalError::UpstreamStreamFailure(_))
        );
    }

    #[test]
    fn test_zero_fps_is_invalid() {
        let dir = config_dir();
        let mut backend = backend(vec![]);
        backend.props.fps = 0;
        assert_matches!(
            run_single_test(&config(0, "nofps"), &mut backend, dir.path()),
            Err(EvalError::InvalidArgument(_))
        );
    }

    #[test]
    fn test_missing_tracker_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(vec![]);
        assert_matches!(
            run_single_test(&config(0, "nocfg"), &mut backend, dir.path()),
            Err(EvalError::TrackerConfig(_))
        );
    }

    #[test]
    fn test_empty_stream_yields_empty_result() {
        let dir = config_dir();
        let mut backend = backend(vec![]);
        let result = run_single_test(&config(0, "empty"), &mut backend, dir.path()).unwrap();
        assert_eq!(result.total_frames, 0);
        assert_eq!(result.success_rate, 0.0);
        assert_eq!(result.avg_frame_latency_sec, 0.0);
        assert_eq!(result.first_loss_time_sec, None);
        assert_eq!(result.quality_score, 100);
    }

    #[test]
    fn test_batch_skips_failed_runs() {
        let dir = config_dir();
        let template = backend(vec![vec![person(100.0, 100.0, 1)]; 8]);
        let factory = || -> Result<Box<dyn TrackingBackend>> { Ok(Box::new(template.clone())) };

        let configs = vec![
            config(0, "a"),
            config(5, "b"),
            config(1, "c"),
            config(0, "d"),
        ];
        let outcome = run_batch(configs, 3, dir.path(), &factory);

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].run_id, "b");
        assert!(outcome.failures[0].error.contains("Player 5 not found"));

        let mut ids: Vec<&str> = outcome.results.iter().map(|r| r.run_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_batch_reports_backend_creation_failure() {
        let dir = config_dir();
        let factory =
            || -> Result<Box<dyn TrackingBackend>> { Err(EvalError::upstream("no tracker")) };
        let outcome = run_batch(vec![config(0, "x"), config(0, "y")], 1, dir.path(), &factory);
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.failures.len(), 2);
    }
}
