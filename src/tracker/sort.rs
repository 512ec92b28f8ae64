//! Single-stage IOU tracker (SORT-style).

use crate::config::{StrategyKind, TrackingConfig};
use crate::tracker::matching::{self, Detection};
use crate::tracker::population::{TrackPool, TrackerStatistics};
use crate::tracker::strategy::TrackingStrategy;
use crate::tracker::track::TrackedPerson;

/// Predict, IOU-match, create, retire. Tracks over budget are dropped
/// immediately; there is no lost pool.
#[derive(Debug)]
pub struct SortTracker {
    config: TrackingConfig,
    pool: TrackPool,
}

impl SortTracker {
    pub fn new(config: TrackingConfig) -> Self {
        let pool = TrackPool::new(config.history_length);
        Self { config, pool }
    }
}

impl TrackingStrategy for SortTracker {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sort
    }

    fn update(&mut self, detections: &[Detection], camera_id: &str) -> Vec<TrackedPerson> {
        self.pool.begin_frame();

        for track in &mut self.pool.active {
            track.predict(None);
        }

        let result = matching::associate(
            &self.pool.active,
            detections,
            |t, d| t.predicted.iou(&d.bbox),
            self.config.iou_threshold,
        );

        for &(ti, di) in &result.matches {
            self.pool.active[ti].update(&detections[di], None);
        }
        for &di in &result.unmatched_detections {
            self.pool.spawn(&detections[di], false, None);
        }
        self.pool.remove_stale(self.config.max_disappeared_frames);

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
    use crate::tracker::rect::Rect;

    fn tracker(budget: u32) -> SortTracker {
        SortTracker::new(TrackingConfig {
            max_disappeared_frames: budget,
            ..TrackingConfig::with_strategy(StrategyKind::Sort)
        })
    }

    fn person(x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection::from_rect(Rect::new(x, y, w, h), 0.9)
    }

    #[test]
    fn test_identity_persists_then_expires() {
        let mut sort = tracker(2);

        let frame1 = sort.update(&[person(10.0, 10.0, 50.0, 50.0)], "cam");
        assert_eq!(frame1.len(), 1);
        assert_eq!(frame1[0].track_id, 1);

        let frame2 = sort.update(&[person(12.0, 11.0, 50.0, 50.0)], "cam");
        assert_eq!(frame2.len(), 1);
        assert_eq!(frame2[0].track_id, 1);
        assert_eq!(frame2[0].frames_since_update, 0);

        let frame3 = sort.update(&[], "cam");
        assert_eq!(frame3.len(), 1);
        assert_eq!(frame3[0].frames_since_update, 1);

        assert_eq!(sort.update(&[], "cam")[0].frames_since_update, 2);
        assert!(sort.update(&[], "cam").is_empty());
        assert_eq!(sort.statistics().lost_tracks, 0);
    }

    #[test]
    fn test_far_detection_spawns_new_track() {
        let mut sort = tracker(5);
        sort.update(&[person(0.0, 0.0, 20.0, 20.0)], "cam");
        let tracks = sort.update(&[person(300.0, 0.0, 20.0, 20.0)], "cam");
        let mut ids: Vec<u64> = tracks.iter().map(|t| t.track_id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_reset_clears_tracks_but_not_ids() {
        let mut sort = tracker(5);
        sort.update(&[person(0.0, 0.0, 20.0, 20.0)], "cam");
        sort.reset();
        assert!(sort.tracked_persons("cam").is_empty());
        let tracks = sort.update(&[person(0.0, 0.0, 20.0, 20.0)], "cam");
        assert_eq!(tracks[0].track_id, 2);
    }
}
