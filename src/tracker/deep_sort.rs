//! Appearance-weighted tracker (DeepSORT-style).

use std::sync::Arc;

use tracing::trace;

use crate::config::{StrategyKind, TrackingConfig};
use crate::tracker::appearance::AppearanceModel;
use crate::tracker::matching::{self, Detection};
use crate::tracker::population::{TrackPool, TrackerStatistics};
use crate::tracker::strategy::TrackingStrategy;
use crate::tracker::track::{Track, TrackedPerson};

const IOU_WEIGHT: f32 = 0.3;
const APPEARANCE_WEIGHT: f32 = 0.7;

/// Blends IOU with appearance similarity in a single association round.
///
/// Retired tracks are archived for re-identification only when the
/// appearance model can tell people apart; with [`BoxStatistics`] the
/// re-identification hook never matches.
///
/// [`BoxStatistics`]: crate::tracker::appearance::BoxStatistics
#[derive(Debug)]
pub struct DeepSortTracker {
    config: TrackingConfig,
    pool: TrackPool,
    appearance: Arc<dyn AppearanceModel>,
}

impl DeepSortTracker {
    pub fn new(config: TrackingConfig, appearance: Arc<dyn AppearanceModel>) -> Self {
        let pool = TrackPool::new(config.history_length);
        Self {
            config,
            pool,
            appearance,
        }
    }

    fn score(&self, track: &Track, detection: &Detection) -> f32 {
        if track.predicted.center_distance(&detection.bbox) > self.config.max_tracking_distance {
            return 0.0;
        }
        let appearance = track
            .features()
            .map_or(0.0, |bank| self.appearance.similarity(bank, detection));
        IOU_WEIGHT * track.predicted.iou(&detection.bbox) + APPEARANCE_WEIGHT * appearance
    }

    fn reidentification_enabled(&self) -> bool {
        self.config.reid_enabled && self.appearance.supports_reidentification()
    }

    /// Match leftover detections against archived appearance. Returns the
    /// detections nobody claimed.
    fn reidentify(&mut self, unmatched: Vec<usize>, detections: &[Detection]) -> Vec<usize> {
        if !self.reidentification_enabled() || self.pool.lost.is_empty() || unmatched.is_empty() {
            return unmatched;
        }
        let archive = &self.pool.lost;
        let appearance = &self.appearance;
        let all: Vec<usize> = (0..archive.len()).collect();
        let result = matching::associate_subset(
            &all,
            &unmatched,
            |t, d| {
                archive[t]
                    .features()
                    .map_or(0.0, |bank| appearance.similarity(bank, &detections[d]))
            },
            self.config.similarity_threshold,
        );
        self.pool.revive(&result.matches, detections, None);
        result.unmatched_detections
    }
}

impl TrackingStrategy for DeepSortTracker {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DeepSort
    }

    fn update(&mut self, detections: &[Detection], camera_id: &str) -> Vec<TrackedPerson> {
        self.pool.begin_frame();
        let budget = self.config.max_disappeared_frames;

        for track in self.pool.active.iter_mut().chain(self.pool.lost.iter_mut()) {
            track.predict(None);
        }

        let result = matching::associate(
            &self.pool.active,
            detections,
            |t, d| self.score(t, d),
            self.config.similarity_threshold,
        );
        for &(ti, di) in &result.matches {
            self.pool.active[ti].update(&detections[di], None);
        }

        let remaining = self.reidentify(result.unmatched_detections, detections);
        for di in remaining {
            self.pool.spawn(&detections[di], true, None);
        }

        let retired = self.pool.remove_stale(budget);
        if self.reidentification_enabled() {
            for mut track in retired {
                trace!(track_id = track.track_id, "archiving appearance");
                track.mark_lost();
                self.pool.lost.push(track);
            }
            self.pool.purge_lost(budget.saturating_mul(2));
        }

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
    use crate::tracker::appearance::{BoxStatistics, FeatureBank};
    use crate::tracker::rect::{Rect, ratio_similarity};

    fn det(x: f32, w: f32, h: f32) -> Detection {
        Detection::from_rect(Rect::new(x, 0.0, w, h), 0.9)
    }

    fn tracker(config: TrackingConfig) -> DeepSortTracker {
        DeepSortTracker::new(config, Arc::new(BoxStatistics))
    }

    /// Compares widths only and claims to be distinctive.
    #[derive(Debug)]
    struct WidthEmbedding;

    impl AppearanceModel for WidthEmbedding {
        fn similarity(&self, bank: &FeatureBank, detection: &Detection) -> f32 {
            bank.average_width()
                .map_or(0.0, |w| ratio_similarity(w, detection.bbox.width))
        }

        fn supports_reidentification(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_matches_on_blended_score() {
        let mut ds = tracker(TrackingConfig::with_strategy(StrategyKind::DeepSort));
        ds.update(&[det(0.0, 40.0, 100.0), det(30.0, 80.0, 100.0)], "cam");

        // Each detection overlaps both tracks; the blended score pairs by shape.
        let tracks = ds.update(&[det(32.0, 80.0, 100.0), det(8.0, 40.0, 100.0)], "cam");
        assert_eq!(tracks.len(), 2);
        let narrow = tracks.iter().find(|t| t.track_id == 1).unwrap();
        assert_eq!(narrow.bbox.width, 40.0);
        let wide = tracks.iter().find(|t| t.track_id == 2).unwrap();
        assert_eq!(wide.bbox.width, 80.0);
    }

    #[test]
    fn test_distance_gate() {
        let mut ds = tracker(TrackingConfig::with_strategy(StrategyKind::DeepSort));
        ds.update(&[det(0.0, 40.0, 100.0)], "cam");
        // Same shape far away: appearance alone would score above threshold.
        let tracks = ds.update(&[det(500.0, 40.0, 100.0)], "cam");
        assert_eq!(tracks.len(), 2);
    }

    #[test]
    fn test_stale_tracks_retired_without_lost_pool() {
        let mut ds = tracker(TrackingConfig {
            max_disappeared_frames: 1,
            ..TrackingConfig::with_strategy(StrategyKind::DeepSort)
        });
        ds.update(&[det(0.0, 40.0, 100.0)], "cam");
        assert_eq!(ds.update(&[], "cam").len(), 1);
        assert!(ds.update(&[], "cam").is_empty());
        assert_eq!(ds.statistics().lost_tracks, 0);

        // The default model never re-identifies.
        let tracks = ds.update(&[det(0.0, 40.0, 100.0)], "cam");
        assert_eq!(tracks[0].track_id, 2);
    }

    #[test]
    fn test_distinctive_model_reidentifies_archived_track() {
        let mut ds = DeepSortTracker::new(
            TrackingConfig {
                max_disappeared_frames: 1,
                ..TrackingConfig::with_strategy(StrategyKind::DeepSort)
            },
            Arc::new(WidthEmbedding),
        );
        ds.update(&[det(0.0, 40.0, 100.0)], "cam");
        ds.update(&[], "cam");
        assert!(ds.update(&[], "cam").is_empty());
        assert_eq!(ds.statistics().lost_tracks, 1);

        let tracks = ds.update(&[det(300.0, 40.0, 100.0)], "cam");
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].track_id, 1);
    }
}
