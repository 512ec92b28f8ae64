//! Confidence-tiered tracker (ByteTrack-style).

use tracing::trace;

use crate::config::{StrategyKind, TrackingConfig};
use crate::tracker::matching::{self, AssignmentResult, Detection};
use crate::tracker::population::{TrackPool, TrackerStatistics};
use crate::tracker::strategy::TrackingStrategy;
use crate::tracker::track::TrackedPerson;

/// Detections at or above this score may match in stage 1 and create tracks.
pub const HIGH_CONFIDENCE: f32 = 0.6;
/// Detections below this score are ignored.
pub const LOW_CONFIDENCE: f32 = 0.1;
/// Lost tracks survive this many multiples of the disappearance budget.
const LOST_BUDGET_FACTOR: u32 = 2;

/// Two-stage association: high-confidence detections first, then
/// low-confidence detections against the leftovers, so weak detections keep
/// established identities alive without ever spawning new ones.
#[derive(Debug)]
pub struct ByteTracker {
    config: TrackingConfig,
    pool: TrackPool,
}

impl ByteTracker {
    pub fn new(config: TrackingConfig) -> Self {
        let pool = TrackPool::new(config.history_length);
        Self { config, pool }
    }

    fn iou_match(
        &self,
        tracks: &[usize],
        detections: &[usize],
        all: &[Detection],
        threshold: f32,
    ) -> AssignmentResult {
        let active = &self.pool.active;
        matching::associate_subset(
            tracks,
            detections,
            |t, d| active[t].predicted.iou(&all[d].bbox),
            threshold,
        )
    }
}

impl TrackingStrategy for ByteTracker {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ByteTrack
    }

    fn update(&mut self, detections: &[Detection], camera_id: &str) -> Vec<TrackedPerson> {
        self.pool.begin_frame();
        let budget = self.config.max_disappeared_frames;
        let threshold = self.config.iou_threshold;

        // Step 1: Split detections into high-score and low-score
        let mut high = Vec::new();
        let mut low = Vec::new();
        for (i, det) in detections.iter().enumerate() {
            if det.score >= HIGH_CONFIDENCE {
                high.push(i);
            } else if det.score >= LOW_CONFIDENCE {
                low.push(i);
            }
        }

        for track in self.pool.active.iter_mut().chain(self.pool.lost.iter_mut()) {
            track.predict(None);
        }

        // Step 2: First association, with high score detections
        let all_tracks: Vec<usize> = (0..self.pool.active.len()).collect();
        let first = self.iou_match(&all_tracks, &high, detections, threshold);
        for &(ti, di) in &first.matches {
            self.pool.active[ti].update(&detections[di], None);
        }

        // Step 3: Second association, low score detections against leftovers
        let second = self.iou_match(&first.unmatched_tracks, &low, detections, threshold);
        for &(ti, di) in &second.matches {
            trace!(
                track_id = self.pool.active[ti].track_id,
                score = detections[di].score,
                "recovered by low-confidence detection"
            );
            self.pool.active[ti].update(&detections[di], None);
        }

        // Tracks still unmatched coast while within budget, else become lost
        self.pool.lose_stale(&second.unmatched_tracks, budget);

        // Step 4: Offer remaining high score detections to the lost pool at a
        // relaxed threshold before creating new identities
        let mut remaining = first.unmatched_detections;
        if self.config.reid_enabled && !self.pool.lost.is_empty() && !remaining.is_empty() {
            let lost = &self.pool.lost;
            let all_lost: Vec<usize> = (0..lost.len()).collect();
            let refind = matching::associate_subset(
                &all_lost,
                &remaining,
                |t, d| lost[t].predicted.iou(&detections[d].bbox),
                threshold * 0.5,
            );
            self.pool.revive(&refind.matches, detections, None);
            remaining = refind.unmatched_detections;
        }

        for di in remaining {
            self.pool.spawn(&detections[di], false, None);
        }

        // Step 5: Purge lost tracks past the extended budget
        self.pool.purge_lost(budget.saturating_mul(LOST_BUDGET_FACTOR));

        self.tracked_persons(camera_id)
    }

    fn tracked_persons(&self, camera_id: &str) -> Vec<TrackedPerson> {
        self.pool.persons(camera_id, self.config.multi_camera)
    }

    fn statistics(&self) -> TrackerStatistics {
        self.pool.statistics(self.kind())
    }

    fn reset(&mut self) {
        self.pool.reset();
    }
}
