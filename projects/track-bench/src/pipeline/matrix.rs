use crate::run_artifacts::{format_float, ParamValue, TestConfig, TrackerParams};
use crate::video::TrackingBackend;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};

/// Sweep dimensions of a bulk evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixPreset {
    pub models: Vec<String>,
    pub confs: Vec<f64>,
    /// Players per video, taken from the top of the detector's list
    pub num_players: usize,
    pub max_videos: usize,
    pub trackers: Vec<String>,
    pub quick: bool,
}

impl MatrixPreset {
    /// Small validation sweep
    pub fn quick() -> Self {
        Self {
            models: vec!["yolo11s".to_string()],
            confs: vec![0.20, 0.25],
            num_players: 3,
            max_videos: 1,
            trackers: vec!["botsort".to_string(), "bytetrack".to_string()],
            quick: true,
        }
    }

    /// Full sweep
    pub fn full() -> Self {
        Self {
            models: vec![
                "yolo11n".to_string(),
                "yolo11s".to_string(),
                "yolo11m".to_string(),
            ],
            confs: vec![0.15, 0.20, 0.25, 0.30],
            num_players: 9,
            max_videos: 2,
            trackers: vec!["botsort".to_string(), "bytetrack".to_string()],
            quick: false,
        }
    }
}

/// Parameter combinations swept for `tracker`.
pub fn tracker_param_sets(tracker: &str, quick: bool) -> Vec<TrackerParams> {
    let buffers: &[i64] = if quick { &[25] } else { &[25, 50] };
    match tracker {
        "botsort" => {
            let mut sets = Vec::new();
            for &tb in buffers {
                for reid in [true, false] {
                    sets.push(TrackerParams::from([
                        ("track_buffer".to_string(), Some(ParamValue::Int(tb))),
                        ("with_reid".to_string(), Some(ParamValue::Bool(reid))),
                    ]));
                }
            }
            sets
        }
        "bytetrack" => {
            let low_thresh: &[f64] = if quick { &[0.05] } else { &[0.05, 0.1] };
            let mut sets = Vec::new();
            for &tb in buffers {
                for &lt in low_thresh {
                    sets.push(TrackerParams::from([
                        ("track_buffer".to_string(), Some(ParamValue::Int(tb))),
                        ("track_low_thresh".to_string(), Some(ParamValue::Float(lt))),
                    ]));
                }
            }
            sets
        }
        _ => vec![TrackerParams::new()],
    }
}

/// `<video stem>_<model>_<tracker>_conf<conf>_p<idx>[_<key><value>...]`
pub fn build_run_id(
    video_path: &Path,
    model: &str,
    tracker: &str,
    conf: f64,
    player_idx: usize,
    params: &TrackerParams,
) -> String {
    let stem = video_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("video");
    let mut parts = vec![
        stem.to_string(),
        model.to_string(),
        tracker.to_string(),
        format!("conf{}", format_float(conf)),
        format!("p{}", player_idx),
    ];
    // BTreeMap iterates in sorted key order
    for (key, value) in params {
        match value {
            Some(v) => parts.push(format!("{}{}", key, v)),
            None => parts.push(format!("{}None", key)),
        }
    }
    parts.join("_")
}

/// Expands the preset over `videos`, asking the detector how many players
/// each (video, model) pair actually has.
pub fn generate_configs(
    videos: &[PathBuf],
    preset: &MatrixPreset,
    backend: &mut dyn TrackingBackend,
) -> Vec<TestConfig> {
    let mut configs = Vec::new();

    for video in videos.iter().take(preset.max_videos) {
        for model in &preset.models {
            let detections = match backend.detect_players(video, model, 0) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(
                        "Could not detect players in {:?} with {}: {}",
                        video.file_name().unwrap_or_default(),
                        model,
                        e
                    );
                    continue;
                }
            };
            let max_players = preset.num_players.min(detections.len());

            for &conf in &preset.confs {
                for tracker in &preset.trackers {
                    for params in tracker_param_sets(tracker, preset.quick) {
                        for player_idx in 0..max_players {
                            configs.push(TestConfig {
                                video_path: video.clone(),
                                model_name: model.clone(),
                                tracker: tracker.clone(),
                                tracker_params: params.clone(),
                                conf_threshold: conf,
                                player_idx,
                                run_id: build_run_id(
                                    video, model, tracker, conf, player_idx, &params,
                                ),
                            });
                        }
                    }
                }
            }
        }
    }

    configs
}

/// Reproducibly picks `sample_size` configs; keeps all when the sample is not smaller.
pub fn sample_configs(
    configs: Vec<TestConfig>,
    sample_size: Option<usize>,
    seed: u64,
) -> Vec<TestConfig> {
    let total = configs.len();
    match sample_size {
        Some(n) if n < total => {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut picked = rand::seq::index::sample(&mut rng, total, n).into_vec();
            picked.sort_unstable();
            tracing::info!("Sampling {} of {} configs (seed={})", n, total, seed);
            let mut slots: Vec<Option<TestConfig>> = configs.into_iter().map(Some).collect();
            picked
                .into_iter()
                .filter_map(|i| slots[i].take())
                .collect()
        }
        Some(_) => {
            tracing::info!("Sample size >= total configs; running all {}", total);
            configs
        }
        None => configs,
    }
}
