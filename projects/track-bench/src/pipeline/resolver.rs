use crate::run_artifacts::{BoundingBox, TrackedCandidate};

/// Follows the user-selected player through the tracker's output.
///
/// The first frame that has any candidate locks onto the candidate whose
/// center is closest to the selected box. From then on only that track id is
/// accepted; a different id is never substituted, so the target may be "lost"
/// for a while and recognised again when the id reappears.
///
/// One instance belongs to exactly one run.
#[derive(Debug, Clone)]
pub struct TrackTargetResolver {
    target_bbox: BoundingBox,
    locked_track_id: Option<i64>,
    previous_track_id: Option<i64>,
    id_switches: usize,
}

impl TrackTargetResolver {
    pub fn new(target_bbox: BoundingBox) -> Self {
        Self {
            target_bbox,
            locked_track_id: None,
            previous_track_id: None,
            id_switches: 0,
        }
    }

    /// Picks this frame's target among `candidates`, or `None` if it is absent.
    pub fn resolve(&mut self, candidates: &[TrackedCandidate]) -> Option<TrackedCandidate> {
        let matched = match self.locked_track_id {
            None => {
                let closest = closest_to(candidates, &self.target_bbox)?;
                self.locked_track_id = Some(closest.track_id);
                Some(closest)
            }
            Some(locked) => candidates.iter().find(|c| c.track_id == locked).copied(),
        }?;

        // Cannot fire while the lock is sticky; counted as-is.
        if let Some(prev) = self.previous_track_id {
            if prev != matched.track_id {
                self.id_switches += 1;
            }
        }
        self.previous_track_id = Some(matched.track_id);

        Some(matched)
    }

    pub fn locked_track_id(&self) -> Option<i64> {
        self.locked_track_id
    }

    pub fn id_switches(&self) -> usize {
        self.id_switches
    }
}

/// Candidate with the center nearest to `target`; the first one wins a tie.
fn closest_to(candidates: &[TrackedCandidate], target: &BoundingBox) -> Option<TrackedCandidate> {
    let mut best: Option<(f64, TrackedCandidate)> = None;
    for c in candidates {
        let dist = c.bbox.center_distance(target);
        match best {
            Some((min_dist, _)) if dist >= min_dist => {}
            _ => best = Some((dist, *c)),
        }
    }
    best.map(|(_, c)| c)
}
