// Run artifact struct definitions
//
// This module contains the data model shared by the tracking pass, the
// analysis stages and the persisted outputs of a bulk evaluation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Axis-aligned box in pixel coordinates, serialized as `[x1, y1, x2, y2]`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn area(&self) -> f64 {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }

    /// Euclidean distance between the centers of two boxes.
    pub fn center_distance(&self, other: &BoundingBox) -> f64 {
        point_distance(self.center(), other.center())
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

pub fn point_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

/// A person found by the detector on the selection frame
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f64,
}

/// A person reported by the tracker on one frame, carrying its persistent id
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TrackedCandidate {
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub track_id: i64,
}

/// Outcome of the target lookup on a single frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameState {
    Tracked {
        bbox: BoundingBox,
        confidence: f64,
        track_id: i64,
    },
    Lost,
}

impl From<Option<TrackedCandidate>> for FrameState {
    fn from(matched: Option<TrackedCandidate>) -> Self {
        match matched {
            Some(c) => FrameState::Tracked {
                bbox: c.bbox,
                confidence: c.confidence,
                track_id: c.track_id,
            },
            None => FrameState::Lost,
        }
    }
}

/// One entry of the frame log.
///
/// Persisted flat (`tracked`, `bbox`, `confidence`, `track_id`) with nulls for
/// lost frames; a row claiming `tracked` without a box is rejected on load.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(into = "FrameRecordRow", try_from = "FrameRecordRow")]
pub struct FrameRecord {
    pub frame: usize,
    pub time_sec: f64,
    pub state: FrameState,
}

impl FrameRecord {
    pub fn is_tracked(&self) -> bool {
        matches!(self.state, FrameState::Tracked { .. })
    }
}

#[derive(Serialize, Deserialize)]
struct FrameRecordRow {
    frame: usize,
    time_sec: f64,
    tracked: bool,
    bbox: Option<BoundingBox>,
    confidence: Option<f64>,
    track_id: Option<i64>,
}

impl From<FrameRecord> for FrameRecordRow {
    fn from(r: FrameRecord) -> Self {
        match r.state {
            FrameState::Tracked {
                bbox,
                confidence,
                track_id,
            } => Self {
                frame: r.frame,
                time_sec: r.time_sec,
                tracked: true,
                bbox: Some(bbox),
                confidence: Some(confidence),
                track_id: Some(track_id),
            },
            FrameState::Lost => Self {
                frame: r.frame,
                time_sec: r.time_sec,
                tracked: false,
                bbox: None,
                confidence: None,
                track_id: None,
            },
        }
    }
}

impl TryFrom<FrameRecordRow> for FrameRecord {
    type Error = String;

    fn try_from(row: FrameRecordRow) -> Result<Self, Self::Error> {
        let state = match (row.tracked, row.bbox) {
            (true, Some(bbox)) => FrameState::Tracked {
                bbox,
                confidence: row
                    .confidence
                    .ok_or_else(|| format!("frame {} is tracked but has no confidence", row.frame))?,
                track_id: row
                    .track_id
                    .ok_or_else(|| format!("frame {} is tracked but has no track_id", row.frame))?,
            },
            (false, None) => FrameState::Lost,
            (true, None) => return Err(format!("frame {} is tracked but has no bbox", row.frame)),
            (false, Some(_)) => return Err(format!("frame {} is lost but has a bbox", row.frame)),
        };
        Ok(Self {
            frame: row.frame,
            time_sec: row.time_sec,
            state,
        })
    }
}

/// Per-frame tracking observations of one run, index-aligned with the video.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct FrameLog {
    records: Vec<FrameRecord>,
}

impl FrameLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the next frame. The frame index is the current length, so the
    /// log can never skip or reorder frames. `fps` must be positive.
    pub fn push(&mut self, state: FrameState, fps: u32) {
        let frame = self.records.len();
        self.records.push(FrameRecord {
            frame,
            time_sec: frame as f64 / fps as f64,
            state,
        });
    }

    pub fn records(&self) -> &[FrameRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn tracked_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_tracked()).count()
    }
}

/// A single tracker parameter override
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(true) => write!(f, "True"),
            ParamValue::Bool(false) => write!(f, "False"),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", format_float(*v)),
        }
    }
}

/// Renders a float in its shortest form but always with a decimal point
/// (`0.2`, `0.05`, `1.0`).
pub fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

/// Tracker parameter overrides; `None` keeps the tracker's default value.
pub type TrackerParams = BTreeMap<String, Option<ParamValue>>;

/// Configuration for a single test run
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TestConfig {
    pub video_path: PathBuf,
    pub model_name: String,
    pub tracker: String,
    pub tracker_params: TrackerParams,
    pub conf_threshold: f64,
    pub player_idx: usize,
    pub run_id: String,
}

/// Results from a single test run
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunResult {
    // Metadata
    pub run_id: String,
    pub video: String,
    pub model: String,
    pub tracker: String,
    pub tracker_params: TrackerParams,
    pub conf: f64,
    pub player_idx: usize,
    pub run_start_ts: String,
    pub run_end_ts: String,
    pub run_elapsed_sec: f64,

    // Primary metrics (first seconds of the clip)
    pub continuous_tracking_from_start_sec: f64,
    pub first_loss_time_sec: Option<f64>,
    pub success_first_5sec: bool,
    pub success_first_10sec: bool,

    // Overall metrics
    pub total_frames: usize,
    pub tracked_frames: usize,
    pub success_rate: f64,
    pub max_consecutive_loss_frames: usize,
    pub max_consecutive_loss_sec: f64,
    pub max_consecutive_tracked_frames: usize,
    pub longest_tracked_streak_sec: f64,
    pub id_switches: usize,

    // Quality indicators
    pub avg_confidence: f64,
    pub bbox_variance: f64,
    pub bbox_size_variance: f64,
    pub position_jumps: usize,
    pub max_center_drift_px: f64,
    pub median_center_drift_px: f64,
    pub center_drift_ratio: f64,
    pub suspicious_frames: usize,
    pub frozen_track: bool,
    pub likely_wrong_player: bool,
    pub quality_score: u32,

    // Performance
    pub processing_time_sec: f64,
    pub processing_speed_x_realtime: f64,
    pub avg_frame_latency_sec: f64,
    pub peak_rss_mb: Option<f64>,
    pub detection_count_first_frame: usize,
    pub target_initial_confidence: Option<f64>,

    // Source geometry
    pub fps: u32,
    pub frame_width: u32,
    pub frame_height: u32,

    pub frame_log: FrameLog,
}

/// A configuration that did not produce a result
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunFailure {
    pub run_id: String,
    pub error: String,
}
