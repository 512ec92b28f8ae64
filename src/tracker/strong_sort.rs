//! Motion, appearance and re-identification tracker (StrongSORT-style).

use std::sync::Arc;

use crate::config::{StrategyKind, TrackingConfig};
use crate::tracker::appearance::AppearanceModel;
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::{self, Detection};
use crate::tracker::population::{TrackPool, TrackerStatistics};
use crate::tracker::strategy::TrackingStrategy;
use crate::tracker::track::{Track, TrackedPerson};

/// (iou, appearance, motion) weights of the first round.
const FIRST_WEIGHTS: (f32, f32, f32) = (0.2, 0.5, 0.3);
const FIRST_THRESHOLD: f32 = 0.7;
/// (motion, appearance) weights of the second round.
const SECOND_WEIGHTS: (f32, f32) = (0.6, 0.4);
const SECOND_THRESHOLD: f32 = 0.5;
/// Appearance alone must clear this to revive an inactive track.
const REID_THRESHOLD: f32 = 0.8;
const INACTIVE_BUDGET_FACTOR: u32 = 3;

#[derive(Debug)]
pub struct StrongSortTracker {
    config: TrackingConfig,
    pool: TrackPool,
    appearance: Arc<dyn AppearanceModel>,
    kalman_filter: KalmanFilter,
}

impl StrongSortTracker {
    pub fn new(config: TrackingConfig, appearance: Arc<dyn AppearanceModel>) -> Self {
        let pool = TrackPool::new(config.history_length);
        Self {
            config,
            pool,
            appearance,
            kalman_filter: KalmanFilter::new(),
        }
    }

    /// `max(0, 1 - distance(predicted center, detection center) / max distance)`.
    fn motion_similarity(&self, track: &Track, detection: &Detection) -> f32 {
        let distance = track.predicted.center_distance(&detection.bbox);
        (1.0 - distance / self.config.max_tracking_distance).max(0.0)
    }

    fn appearance_similarity(&self, track: &Track, detection: &Detection) -> f32 {
        track
            .features()
            .map_or(0.0, |bank| self.appearance.similarity(bank, detection))
    }

    fn first_score(&self, track: &Track, detection: &Detection) -> f32 {
        let (w_iou, w_app, w_motion) = FIRST_WEIGHTS;
        w_iou * track.predicted.iou(&detection.bbox)
            + w_app * self.appearance_similarity(track, detection)
            + w_motion * self.motion_similarity(track, detection)
    }

    fn second_score(&self, track: &Track, detection: &Detection) -> f32 {
        let (w_motion, w_app) = SECOND_WEIGHTS;
        w_motion * self.motion_similarity(track, detection)
            + w_app * self.appearance_similarity(track, detection)
    }
}

impl TrackingStrategy for StrongSortTracker {
    fn kind(&self) -> StrategyKind {
        StrategyKind::StrongSort
    }

    fn update(&mut self, detections: &[Detection], camera_id: &str) -> Vec<TrackedPerson> {
        self.pool.begin_frame();
        let budget = self.config.max_disappeared_frames;
        let kf = &self.kalman_filter;

        for track in self.pool.active.iter_mut().chain(self.pool.lost.iter_mut()) {
            track.predict(Some(kf));
        }

        let all_tracks: Vec<usize> = (0..self.pool.active.len()).collect();
        let all_detections: Vec<usize> = (0..detections.len()).collect();

        let active = &self.pool.active;
        let first = matching::associate_subset(
            &all_tracks,
            &all_detections,
            |t, d| self.first_score(&active[t], &detections[d]),
            FIRST_THRESHOLD,
        );
        let second = matching::associate_subset(
            &first.unmatched_tracks,
            &first.unmatched_detections,
            |t, d| self.second_score(&active[t], &detections[d]),
            SECOND_THRESHOLD,
        );

        for &(ti, di) in first.matches.iter().chain(&second.matches) {
            self.pool.active[ti].update(&detections[di], Some(&self.kalman_filter));
        }

        self.pool.lose_stale(&second.unmatched_tracks, budget);

        let mut remaining = second.unmatched_detections;
        if self.config.reid_enabled && !self.pool.lost.is_empty() && !remaining.is_empty() {
            let inactive = &self.pool.lost;
            let all_inactive: Vec<usize> = (0..inactive.len()).collect();
            let reid = matching::associate_subset(
                &all_inactive,
                &remaining,
                |t, d| self.appearance_similarity(&inactive[t], &detections[d]),
                REID_THRESHOLD,
            );
            self.pool.revive(&reid.matches, detections, Some(&self.kalman_filter));
            remaining = reid.unmatched_detections;
        }

        for di in remaining {
            self.pool.spawn(&detections[di], true, Some(&self.kalman_filter));
        }

        self.pool.purge_lost(budget.saturating_mul(INACTIVE_BUDGET_FACTOR));

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::appearance::BoxStatistics;
    use crate::tracker::rect::Rect;
    use approx::assert_relative_eq;

    fn det(x: f32, y: f32) -> Detection {
        Detection::from_rect(Rect::new(x, y, 40.0, 100.0), 0.9)
    }

    fn tracker(budget: u32) -> StrongSortTracker {
        StrongSortTracker::new(
            TrackingConfig {
                max_disappeared_frames: budget,
                ..TrackingConfig::with_strategy(StrategyKind::StrongSort)
            },
            Arc::new(BoxStatistics),
        )
    }

    #[test]
    fn test_motion_similarity() {
        let ss = tracker(5);
        let track = Track::new(1, &det(0.0, 0.0), 5);
        assert_relative_eq!(ss.motion_similarity(&track, &det(0.0, 0.0)), 1.0);
        assert_relative_eq!(ss.motion_similarity(&track, &det(30.0, 40.0)), 0.5);
        assert_eq!(ss.motion_similarity(&track, &det(300.0, 0.0)), 0.0);
    }

    #[test]
    fn test_follows_steady_walker() {
        let mut ss = tracker(5);
        for i in 0..40 {
            let tracks = ss.update(&[det(6.0 * i as f32, 0.0)], "cam");
            assert_eq!(tracks.len(), 1);
            assert_eq!(tracks[0].track_id, 1);
        }
        let tracks = ss.update(&[], "cam");
        // Coasting continues the learned motion.
        assert!(tracks[0].predicted.x > 6.0 * 39.0 + 3.0);
    }

    #[test]
    fn test_second_round_recovers_fast_mover() {
        let mut ss = tracker(5);
        ss.update(&[det(0.0, 0.0)], "cam");
        // No overlap after a 45px jump: the first round falls short, motion
        // plus appearance still pair them in the second.
        let tracks = ss.update(&[det(45.0, 0.0)], "cam");
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].track_id, 1);
    }

    #[test]
    fn test_global_reidentification_of_inactive_track() {
        let mut ss = tracker(1);
        ss.update(&[det(0.0, 0.0)], "cam");
        ss.update(&[], "cam");
        assert!(ss.update(&[], "cam").is_empty());
        assert_eq!(ss.statistics().lost_tracks, 1);

        // Reappears far away with the same shape.
        let tracks = ss.update(&[det(600.0, 300.0)], "cam");
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].track_id, 1);
        assert_eq!(tracks[0].bbox.x, 600.0);
    }

    #[test]
    fn test_inactive_purged_after_three_budgets() {
        let mut ss = tracker(1);
        ss.update(&[det(0.0, 0.0)], "cam");
        for _ in 0..3 {
            ss.update(&[], "cam");
        }
        assert_eq!(ss.statistics().lost_tracks, 1);
        ss.update(&[], "cam");
        assert_eq!(ss.statistics().lost_tracks, 0);
        assert_eq!(ss.statistics().total_created, 1);
    }
}
