pub mod subprocess;

use crate::error::Result;
use crate::run_artifacts::{BoundingBox, Detection, TrackedCandidate};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::path::Path;

/// COCO class id of "person"
pub const PERSON_CLASS_ID: usize = 0;

/// Properties of a source video as reported by the external reader
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct VideoProperties {
    /// Whole frames per second; fractional rates such as 29.97 are truncated
    #[serde(deserialize_with = "whole_fps")]
    pub fps: u32,
    pub frame_count: usize,
    pub width: u32,
    pub height: u32,
}

impl VideoProperties {
    pub fn duration_sec(&self) -> f64 {
        if self.fps == 0 {
            0.0
        } else {
            self.frame_count as f64 / self.fps as f64
        }
    }
}

fn whole_fps<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let fps = f64::deserialize(deserializer)?;
    if !fps.is_finite() || fps < 0.0 {
        return Err(de::Error::custom(format!("invalid fps {}", fps)));
    }
    Ok(fps as u32)
}

/// One object on one frame of the external tracker's output
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TrackedObject {
    pub class_id: usize,
    pub bbox: BoundingBox,
    pub confidence: f64,
    #[serde(default)]
    pub track_id: Option<i64>,
}

impl TrackedObject {
    pub fn is_person(&self) -> bool {
        self.class_id == PERSON_CLASS_ID
    }
}

/// Keeps people that carry a track id, in input order.
pub fn person_candidates(objects: &[TrackedObject]) -> Vec<TrackedCandidate> {
    objects
        .iter()
        .filter(|o| o.is_person())
        .filter_map(|o| {
            o.track_id.map(|track_id| TrackedCandidate {
                bbox: o.bbox,
                confidence: o.confidence,
                track_id,
            })
        })
        .collect()
}

/// Everything the tracker needs to follow people through one video
#[derive(Debug, Clone, Copy)]
pub struct TrackRequest<'a> {
    pub video_path: &'a Path,
    pub model_name: &'a str,
    pub tracker_config: &'a Path,
    pub conf_threshold: f64,
}

/// Per-frame object sets, in frame order
pub type FrameStream<'a> = Box<dyn Iterator<Item = Result<Vec<TrackedObject>>> + 'a>;

/// The external detector/tracker. Each worker owns its own instance.
pub trait TrackingBackend: Send {
    fn probe(&mut self, video_path: &Path) -> Result<VideoProperties>;

    /// People detected on `frame_index`, in the detector's order.
    fn detect_players(
        &mut self,
        video_path: &Path,
        model_name: &str,
        frame_index: usize,
    ) -> Result<Vec<Detection>>;

    fn track<'a>(&'a mut self, request: &TrackRequest<'_>) -> Result<FrameStream<'a>>;
}
