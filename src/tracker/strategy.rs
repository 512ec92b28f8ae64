//! The shared tracking contract and enum dispatch over the four strategies.

use std::sync::Arc;

use crate::config::{StrategyKind, TrackingConfig};
use crate::tracker::appearance::{AppearanceModel, BoxStatistics};
use crate::tracker::byte_tracker::ByteTracker;
use crate::tracker::deep_sort::DeepSortTracker;
use crate::tracker::matching::Detection;
use crate::tracker::population::TrackerStatistics;
use crate::tracker::sort::SortTracker;
use crate::tracker::strong_sort::StrongSortTracker;
use crate::tracker::track::TrackedPerson;

/// Contract every association strategy implements.
///
/// A strategy owns its track population outright; callers serialize access
/// per camera, so no interior locking is needed.
pub trait TrackingStrategy {
    fn kind(&self) -> StrategyKind;

    /// Run one frame: predict, associate, create and retire tracks. Returns
    /// the active set after the update.
    fn update(&mut self, detections: &[Detection], camera_id: &str) -> Vec<TrackedPerson>;

    /// The current active set.
    fn tracked_persons(&self, camera_id: &str) -> Vec<TrackedPerson>;

    fn statistics(&self) -> TrackerStatistics;

    /// Discard every track.
    fn reset(&mut self);
}

/// One of the four strategies, chosen by [`TrackingConfig::strategy`].
#[derive(Debug)]
pub enum Strategy {
    Sort(SortTracker),
    ByteTrack(ByteTracker),
    DeepSort(DeepSortTracker),
    StrongSort(StrongSortTracker),
}

impl Strategy {
    pub fn new(config: &TrackingConfig) -> Self {
        Self::with_appearance_model(config, Arc::new(BoxStatistics))
    }

    /// Build the configured strategy; appearance-aware strategies score with `model`.
    pub fn with_appearance_model(config: &TrackingConfig, model: Arc<dyn AppearanceModel>) -> Self {
        match config.strategy {
            StrategyKind::Sort => Strategy::Sort(SortTracker::new(config.clone())),
            StrategyKind::ByteTrack => Strategy::ByteTrack(ByteTracker::new(config.clone())),
            StrategyKind::DeepSort => {
                Strategy::DeepSort(DeepSortTracker::new(config.clone(), model))
            }
            StrategyKind::StrongSort => {
                Strategy::StrongSort(StrongSortTracker::new(config.clone(), model))
            }
        }
    }

    fn inner(&self) -> &dyn TrackingStrategy {
        match self {
            Strategy::Sort(t) => t,
            Strategy::ByteTrack(t) => t,
            Strategy::DeepSort(t) => t,
            Strategy::StrongSort(t) => t,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn TrackingStrategy {
        match self {
            Strategy::Sort(t) => t,
            Strategy::ByteTrack(t) => t,
            Strategy::DeepSort(t) => t,
            Strategy::StrongSort(t) => t,
        }
    }
}

impl TrackingStrategy for Strategy {
    fn kind(&self) -> StrategyKind {
        self.inner().kind()
    }

    fn update(&mut self, detections: &[Detection], camera_id: &str) -> Vec<TrackedPerson> {
        self.inner_mut().update(detections, camera_id)
    }

    fn tracked_persons(&self, camera_id: &str) -> Vec<TrackedPerson> {
        self.inner().tracked_persons(camera_id)
    }

    fn statistics(&self) -> TrackerStatistics {
        self.inner().statistics()
    }

    fn reset(&mut self) {
        self.inner_mut().reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_configured_kind() {
        for kind in [
            StrategyKind::Sort,
            StrategyKind::ByteTrack,
            StrategyKind::DeepSort,
            StrategyKind::StrongSort,
        ] {
            let strategy = Strategy::new(&TrackingConfig::with_strategy(kind));
            assert_eq!(strategy.kind(), kind);
            assert_eq!(strategy.statistics().strategy, kind);
        }
    }
}
