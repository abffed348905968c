use crate::run_artifacts::{point_distance, BoundingBox, FrameLog, FrameState};
use serde::Serialize;

/// Center-to-center distance between consecutive tracked frames that counts as a jump.
const JUMP_THRESHOLD_PX: f64 = 200.0;
/// Logs need more than this many frames before a motionless track is called frozen.
const FROZEN_MIN_FRAMES: usize = 30;
const FROZEN_MAX_DRIFT_PX: f64 = 1.0;

const WRONG_PLAYER_MAX_JUMPS: usize = 5;
const WRONG_PLAYER_MAX_BBOX_VARIANCE: f64 = 10_000.0;
const WRONG_PLAYER_MAX_SIZE_VARIATION: f64 = 0.5;
const WRONG_PLAYER_MAX_DRIFT_RATIO: f64 = 0.25;
const WRONG_PLAYER_MAX_MEDIAN_DRIFT_RATIO: f64 = 0.15;

/// Stability and plausibility indicators of one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityStats {
    pub avg_confidence: f64,
    pub bbox_variance: f64,
    pub bbox_size_variance: f64,
    pub position_jumps: usize,
    pub max_center_drift_px: f64,
    pub median_center_drift_px: f64,
    pub center_drift_ratio: f64,
    pub frozen_track: bool,
    pub likely_wrong_player: bool,
    pub quality_score: u32,
}

/// Frame diagonal in pixels, or 1.0 when the dimensions are unknown.
pub fn frame_diag(width: u32, height: u32) -> f64 {
    if width == 0 || height == 0 {
        1.0
    } else {
        (width as f64).hypot(height as f64)
    }
}

/// Scores how plausible it is that the tracker followed one player.
///
/// `initial_center` is the center of the box the run locked onto.
pub fn evaluate(frame_log: &FrameLog, frame_diag: f64, initial_center: (f64, f64)) -> QualityStats {
    let mut confidences = Vec::new();
    let mut centers = Vec::new();
    let mut sizes = Vec::new();
    let mut center_drifts = Vec::new();
    let mut position_jumps = 0;
    let mut prev_bbox: Option<BoundingBox> = None;

    for record in frame_log.iter() {
        let FrameState::Tracked {
            bbox, confidence, ..
        } = record.state
        else {
            // No jump is measured across a gap
            prev_bbox = None;
            continue;
        };

        let center = bbox.center();
        confidences.push(confidence);
        centers.push(center);
        sizes.push(bbox.area());
        center_drifts.push(point_distance(center, initial_center));

        if let Some(prev) = prev_bbox {
            if bbox.center_distance(&prev) > JUMP_THRESHOLD_PX {
                position_jumps += 1;
            }
        }
        prev_bbox = Some(bbox);
    }

    let avg_confidence = mean(&confidences);

    let bbox_variance = if centers.len() > 1 {
        let xs: Vec<f64> = centers.iter().map(|c| c.0).collect();
        let ys: Vec<f64> = centers.iter().map(|c| c.1).collect();
        variance(&xs) + variance(&ys)
    } else {
        0.0
    };

    let bbox_size_variance = if sizes.len() > 1 {
        variance(&sizes)
    } else {
        0.0
    };

    let max_center_drift_px = center_drifts.iter().copied().fold(0.0, f64::max);
    let median_center_drift_px = median(&center_drifts);
    let center_drift_ratio = safe_div(max_center_drift_px, frame_diag);

    let frozen_track =
        frame_log.len() > FROZEN_MIN_FRAMES && max_center_drift_px < FROZEN_MAX_DRIFT_PX;

    let size_variation = if sizes.len() > 1 {
        safe_div(bbox_size_variance, mean(&sizes))
    } else {
        0.0
    };
    let median_drift_ratio = if frame_diag > 0.0 {
        median_center_drift_px / frame_diag
    } else {
        0.0
    };

    let likely_wrong_player = position_jumps > WRONG_PLAYER_MAX_JUMPS
        || bbox_variance > WRONG_PLAYER_MAX_BBOX_VARIANCE
        || size_variation > WRONG_PLAYER_MAX_SIZE_VARIATION
        || center_drift_ratio > WRONG_PLAYER_MAX_DRIFT_RATIO
        || median_drift_ratio > WRONG_PLAYER_MAX_MEDIAN_DRIFT_RATIO
        || frozen_track;

    let mut score: i64 = 100;
    score -= (position_jumps as i64 * 5).min(30);
    score -= ((bbox_variance / 100.0) as i64).min(30);
    score -= ((center_drift_ratio * 200.0) as i64).min(40);
    if frozen_track {
        score -= 30;
    }
    if likely_wrong_player {
        score -= 40;
    }

    QualityStats {
        avg_confidence,
        bbox_variance,
        bbox_size_variance,
        position_jumps,
        max_center_drift_px,
        median_center_drift_px,
        center_drift_ratio,
        frozen_track,
        likely_wrong_player,
        quality_score: score.clamp(0, 100) as u32,
    }
}

fn safe_div(num: f64, denom: f64) -> f64 {
    if denom == 0.0 {
        0.0
    } else {
        num / denom
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance
fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked(cx: f64, cy: f64) -> FrameState {
        FrameState::Tracked {
            bbox: BoundingBox::new(cx - 20.0, cy - 40.0, cx + 20.0, cy + 40.0),
            confidence: 0.8,
            track_id: 1,
        }
    }

    fn build(states: &[FrameState]) -> FrameLog {
        let mut log = FrameLog::new();
        for s in states {
            log.push(*s, 30);
        }
        log
    }

    #[test]
    fn test_single_jump_between_consecutive_frames() {
        // 205 px straight-line move
        let log = build(&[tracked(100.0, 100.0), tracked(305.0, 100.0)]);
        let stats = evaluate(&log, frame_diag(1920, 1080), (100.0, 100.0));
        assert_eq!(stats.position_jumps, 1);
    }

    #[test]
    fn test_no_jump_across_lost_frame() {
        let log = build(&[tracked(100.0, 100.0), FrameState::Lost, tracked(305.0, 100.0)]);
        let stats = evaluate(&log, frame_diag(1920, 1080), (100.0, 100.0));
        assert_eq!(stats.position_jumps, 0);
    }

    #[test]
    fn test_frozen_track() {
        let states: Vec<FrameState> = (0..40)
            .map(|i| tracked(500.0 + if i % 2 == 0 { 0.3 } else { -0.3 }, 400.0))
            .collect();
        let log = build(&states);
        let stats = evaluate(&log, frame_diag(1920, 1080), (500.0, 400.0));

        assert!(stats.frozen_track);
        assert!(stats.likely_wrong_player);
        assert!(stats.max_center_drift_px < 0.5);
        // Only the frozen and wrong-player deductions apply
        assert_eq!(stats.quality_score, 30);
    }

    #[test]
    fn test_short_static_log_is_not_frozen() {
        let states = vec![tracked(500.0, 400.0); 30];
        let stats = evaluate(&build(&states), frame_diag(1920, 1080), (500.0, 400.0));
        assert!(!stats.frozen_track);
        assert!(!stats.likely_wrong_player);
        assert_eq!(stats.quality_score, 100);
    }

    #[test]
    fn test_smooth_motion_scores_high() {
        let states: Vec<FrameState> = (0..60)
            .map(|i| tracked(500.0 + i as f64, 400.0))
            .collect();
        let stats = evaluate(&build(&states), frame_diag(1920, 1080), (500.0, 400.0));

        assert_eq!(stats.position_jumps, 0);
        assert!((stats.avg_confidence - 0.8).abs() < 1e-12);
        assert_eq!(stats.bbox_size_variance, 0.0);
        assert_eq!(stats.max_center_drift_px, 59.0);
        assert_eq!(stats.median_center_drift_px, 29.5);
        assert!(!stats.frozen_track);
        assert!(!stats.likely_wrong_player);
        // variance of 0..59 is 299.91..., drift ratio 59/2202.9 -> 5 points
        assert_eq!(stats.quality_score, 100 - 2 - 5);
    }

    #[test]
    fn test_many_jumps_flag_wrong_player() {
        let states: Vec<FrameState> = (0..8)
            .map(|i| tracked(if i % 2 == 0 { 100.0 } else { 400.0 }, 300.0))
            .collect();
        let stats = evaluate(&build(&states), frame_diag(1920, 1080), (100.0, 300.0));
        assert_eq!(stats.position_jumps, 7);
        assert!(stats.likely_wrong_player);
        assert_eq!(stats.quality_score, 0);
    }

    #[test]
    fn test_size_change_alone_flags_wrong_player() {
        // Same center, areas 100 and 10000
        let small = FrameState::Tracked {
            bbox: BoundingBox::new(495.0, 395.0, 505.0, 405.0),
            confidence: 0.8,
            track_id: 1,
        };
        let large = FrameState::Tracked {
            bbox: BoundingBox::new(450.0, 350.0, 550.0, 450.0),
            confidence: 0.8,
            track_id: 1,
        };
        let stats = evaluate(&build(&[small, large]), frame_diag(1920, 1080), (500.0, 400.0));

        assert_eq!(stats.position_jumps, 0);
        assert_eq!(stats.bbox_variance, 0.0);
        assert_eq!(stats.max_center_drift_px, 0.0);
        assert!(stats.bbox_size_variance / 5050.0 > 0.5);
        assert!(stats.likely_wrong_player);
        assert_eq!(stats.quality_score, 60);
    }

    #[test]
    fn test_max_drift_alone_flags_wrong_player() {
        // 40 frames on the start point, then one 60 px away on a 200x100 frame
        let mut states = vec![tracked(100.0, 50.0); 40];
        states.push(tracked(160.0, 50.0));
        let diag = frame_diag(200, 100);
        let stats = evaluate(&build(&states), diag, (100.0, 50.0));

        assert_eq!(stats.position_jumps, 0);
        assert!(stats.bbox_variance < 100.0);
        assert_eq!(stats.bbox_size_variance, 0.0);
        assert_eq!(stats.median_center_drift_px, 0.0);
        assert!(stats.center_drift_ratio > 0.25);
        assert!(!stats.frozen_track);
        assert!(stats.likely_wrong_player);
        // Drift deduction capped at 40, plus 40 for the flag
        assert_eq!(stats.quality_score, 20);
    }

    #[test]
    fn test_median_drift_alone_flags_wrong_player() {
        // Constant 400 px offset: median ratio ~0.18, max ratio below 0.25
        let states = vec![tracked(900.0, 400.0); 5];
        let stats = evaluate(&build(&states), frame_diag(1920, 1080), (500.0, 400.0));

        assert_eq!(stats.position_jumps, 0);
        assert_eq!(stats.bbox_variance, 0.0);
        assert!(stats.center_drift_ratio <= 0.25);
        assert!(stats.median_center_drift_px / frame_diag(1920, 1080) > 0.15);
        assert!(stats.likely_wrong_player);
        assert_eq!(stats.quality_score, 100 - 36 - 40);
    }

    #[test]
    fn test_center_variance_alone_flags_wrong_player() {
        // Sweep 320..=680 in 10 px steps around the start point
        let states: Vec<FrameState> = (0..=36)
            .map(|i| tracked(320.0 + 10.0 * i as f64, 400.0))
            .collect();
        let stats = evaluate(&build(&states), frame_diag(1920, 1080), (500.0, 400.0));

        assert_eq!(stats.position_jumps, 0);
        assert!((stats.bbox_variance - 11_400.0).abs() < 1e-6);
        assert_eq!(stats.max_center_drift_px, 180.0);
        assert!(stats.center_drift_ratio <= 0.25);
        assert!(!stats.frozen_track);
        assert!(stats.likely_wrong_player);
        assert_eq!(stats.quality_score, 100 - 30 - 16 - 40);
    }

    #[test]
    fn test_long_all_lost_log_is_frozen() {
        let states = vec![FrameState::Lost; 31];
        let stats = evaluate(&build(&states), frame_diag(1920, 1080), (500.0, 400.0));
        assert!(stats.frozen_track);
        assert!(stats.likely_wrong_player);
        assert_eq!(stats.quality_score, 30);
    }

    #[test]
    fn test_empty_log_edge_cases() {
        let stats = evaluate(&FrameLog::new(), 0.0, (0.0, 0.0));
        assert_eq!(stats.avg_confidence, 0.0);
        assert_eq!(stats.bbox_variance, 0.0);
        assert_eq!(stats.bbox_size_variance, 0.0);
        assert_eq!(stats.max_center_drift_px, 0.0);
        assert_eq!(stats.median_center_drift_px, 0.0);
        assert_eq!(stats.center_drift_ratio, 0.0);
        assert!(!stats.frozen_track);
        assert_eq!(stats.quality_score, 100);
    }

    #[test]
    fn test_frame_diag_fallback() {
        assert_eq!(frame_diag(0, 1080), 1.0);
        assert_eq!(frame_diag(3, 4), 5.0);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_score_always_in_range_and_idempotent() {
        let patterns: Vec<Vec<FrameState>> = vec![
            vec![FrameState::Lost; 50],
            (0..50).map(|i| tracked(i as f64 * 250.0, 0.0)).collect(),
            (0..50)
                .map(|i| {
                    if i % 3 == 0 {
                        FrameState::Lost
                    } else {
                        tracked(i as f64 * 13.0, i as f64 * 7.0)
                    }
                })
                .collect(),
        ];
        for states in patterns {
            let log = build(&states);
            let stats = evaluate(&log, frame_diag(640, 480), (0.0, 0.0));
            assert!(stats.quality_score <= 100);
            assert_eq!(evaluate(&log, frame_diag(640, 480), (0.0, 0.0)), stats);
        }
    }
}
