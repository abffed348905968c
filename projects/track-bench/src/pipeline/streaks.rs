use crate::error::{EvalError, Result};
use crate::run_artifacts::FrameLog;
use serde::Serialize;

/// Continuity statistics of a frame log
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StreakStats {
    pub continuous_from_start_frames: usize,
    pub continuous_from_start_sec: f64,
    pub first_loss_time_sec: Option<f64>,
    pub max_consecutive_loss_frames: usize,
    pub max_consecutive_loss_sec: f64,
    pub max_consecutive_tracked_frames: usize,
    pub longest_tracked_streak_sec: f64,
}

/// Compute streak and loss metrics from a frame log.
pub fn summarize(frame_log: &FrameLog, fps: f64) -> Result<StreakStats> {
    if fps <= 0.0 || fps.is_nan() {
        return Err(EvalError::invalid_argument(format!(
            "fps must be positive, got {}",
            fps
        )));
    }

    let continuous_from_start_frames = frame_log.iter().take_while(|r| r.is_tracked()).count();

    let first_loss_time_sec = frame_log
        .iter()
        .find(|r| !r.is_tracked())
        .map(|r| r.time_sec);

    let mut max_loss = 0;
    let mut max_tracked = 0;
    let mut current_loss = 0;
    let mut current_tracked = 0;
    for record in frame_log.iter() {
        if record.is_tracked() {
            current_tracked += 1;
            current_loss = 0;
        } else {
            current_loss += 1;
            current_tracked = 0;
        }
        max_loss = max_loss.max(current_loss);
        max_tracked = max_tracked.max(current_tracked);
    }

    Ok(StreakStats {
        continuous_from_start_frames,
        continuous_from_start_sec: continuous_from_start_frames as f64 / fps,
        first_loss_time_sec,
        max_consecutive_loss_frames: max_loss,
        max_consecutive_loss_sec: max_loss as f64 / fps,
        max_consecutive_tracked_frames: max_tracked,
        longest_tracked_streak_sec: max_tracked as f64 / fps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_artifacts::{BoundingBox, FrameState};
    use assert_matches::assert_matches;

    fn log_from_flags(flags: &[bool], fps: u32) -> FrameLog {
        let mut log = FrameLog::new();
        for &tracked in flags {
            let state = if tracked {
                FrameState::Tracked {
                    bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
                    confidence: 0.9,
                    track_id: 1,
                }
            } else {
                FrameState::Lost
            };
            log.push(state, fps);
        }
        log
    }

    #[test]
    fn test_summarize_mixed_log() {
        let log = log_from_flags(&[true, true, false, true, true, false], 10);
        let stats = summarize(&log, 10.0).unwrap();

        assert_eq!(stats.continuous_from_start_frames, 2);
        assert_eq!(stats.continuous_from_start_sec, 0.2);
        assert_eq!(stats.first_loss_time_sec, Some(0.2));
        assert_eq!(stats.max_consecutive_loss_frames, 1);
        assert_eq!(stats.max_consecutive_loss_sec, 0.1);
        assert_eq!(stats.max_consecutive_tracked_frames, 2);
        assert_eq!(stats.longest_tracked_streak_sec, 0.2);
    }

    #[test]
    fn test_summarize_all_tracked() {
        let log = log_from_flags(&[true; 10], 30);
        let stats = summarize(&log, 30.0).unwrap();

        assert_eq!(stats.continuous_from_start_frames, 10);
        assert_eq!(stats.continuous_from_start_sec, 10.0 / 30.0);
        assert_eq!(stats.first_loss_time_sec, None);
        assert_eq!(stats.max_consecutive_loss_frames, 0);
        assert_eq!(stats.max_consecutive_tracked_frames, 10);
        assert_eq!(stats.longest_tracked_streak_sec, 10.0 / 30.0);
    }

    #[test]
    fn test_summarize_zero_fps_is_invalid() {
        assert_matches!(
            summarize(&FrameLog::new(), 0.0),
            Err(EvalError::InvalidArgument(_))
        );
        assert_matches!(
            summarize(&FrameLog::new(), -5.0),
            Err(EvalError::InvalidArgument(_))
        );
    }

    #[test]
    fn test_summarize_empty_log() {
        let stats = summarize(&FrameLog::new(), 25.0).unwrap();
        assert_eq!(stats.continuous_from_start_frames, 0);
        assert_eq!(stats.continuous_from_start_sec, 0.0);
        assert_eq!(stats.first_loss_time_sec, None);
        assert_eq!(stats.max_consecutive_loss_frames, 0);
        assert_eq!(stats.max_consecutive_loss_sec, 0.0);
        assert_eq!(stats.max_consecutive_tracked_frames, 0);
        assert_eq!(stats.longest_tracked_streak_sec, 0.0);
    }

    #[test]
    fn test_longest_streak_after_early_loss() {
        let log = log_from_flags(&[false, false, false, true, true, true, true, false], 4);
        let stats = summarize(&log, 4.0).unwrap();
        assert_eq!(stats.continuous_from_start_frames, 0);
        assert_eq!(stats.first_loss_time_sec, Some(0.0));
        assert_eq!(stats.max_consecutive_loss_frames, 3);
        assert_eq!(stats.max_consecutive_tracked_frames, 4);
        assert_eq!(stats.longest_tracked_streak_sec, 1.0);
    }

    #[test]
    fn test_streak_properties_hold_for_patterns() {
        // Every 8-frame tracked/lost pattern
        for mask in 0u32..256 {
            let flags: Vec<bool> = (0..8).map(|i| mask & (1 << i) != 0).collect();
            let log = log_from_flags(&flags, 10);
            let stats = summarize(&log, 10.0).unwrap();

            let prefix = flags.iter().take_while(|&&t| t).count();
            assert_eq!(stats.continuous_from_start_frames, prefix);
            assert_eq!(
                stats.continuous_from_start_frames == flags.len(),
                flags.iter().all(|&t| t)
            );
            assert!(stats.max_consecutive_tracked_frames >= stats.continuous_from_start_frames);
            assert_eq!(summarize(&log, 10.0).unwrap(), stats);
        }
    }
}
