//! Track bookkeeping shared by every strategy: id allocation, the active set,
//! the lost pool and statistics.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StrategyKind;
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::Detection;
use crate::tracker::track::{Track, TrackedPerson};

/// Aggregate view of one session's tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerStatistics {
    pub strategy: StrategyKind,
    pub active_tracks: usize,
    /// Tracks held for re-identification
    pub lost_tracks: usize,
    pub total_created: u64,
    /// Mean age in frames of the active tracks, 0 when there are none
    pub average_age: f32,
    pub frames_processed: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct TrackPool {
    pub active: Vec<Track>,
    pub lost: Vec<Track>,
    next_id: u64,
    frames: u64,
    history_length: usize,
}

impl TrackPool {
    pub fn new(history_length: usize) -> Self {
        Self {
            active: Vec::new(),
            lost: Vec::new(),
            next_id: 1,
            frames: 0,
            history_length,
        }
    }

    pub fn begin_frame(&mut self) {
        self.frames += 1;
    }

    /// Ids handed out so far. Never decreases, not even on reset.
    pub fn total_created(&self) -> u64 {
        self.next_id - 1
    }

    /// Create a track for `detection` and add it to the active set.
    pub fn spawn(
        &mut self,
        detection: &Detection,
        with_features: bool,
        kalman_filter: Option<&KalmanFilter>,
    ) -> u64 {
        let track_id = self.next_id;
        self.next_id += 1;

        let mut track = Track::new(track_id, detection, self.history_length);
        if with_features {
            track = track.with_feature_bank();
        }
        if let Some(kf) = kalman_filter {
            track = track.with_motion_model(kf);
        }
        debug!(track_id, score = detection.score, "created track");
        self.active.push(track);
        track_id
    }

    /// Drop active tracks unmatched for more than `budget` frames.
    pub fn remove_stale(&mut self, budget: u32) -> Vec<Track> {
        let (stale, keep): (Vec<Track>, Vec<Track>) = self
            .active
            .drain(..)
            .partition(|t| t.frames_since_update > budget);
        self.active = keep;
        stale
            .into_iter()
            .map(|mut t| {
                debug!(track_id = t.track_id, "removed track");
                t.mark_removed();
                t
            })
            .collect()
    }

    /// Move the given active tracks to the lost pool if they are over budget.
    pub fn lose_stale(&mut self, candidates: &[usize], budget: u32) {
        let mut over: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| self.active[i].frames_since_update > budget)
            .collect();
        // Highest index first so earlier removals don't shift later ones.
        over.sort_unstable_by(|a, b| b.cmp(a));
        for i in over {
            let mut track = self.active.swap_remove(i);
            debug!(track_id = track.track_id, "track lost");
            track.mark_lost();
            self.lost.push(track);
        }
    }

    /// Move lost tracks back into the active set, re-activated by the given
    /// detections. `pairs` holds (lost index, detection index).
    pub fn revive(
        &mut self,
        pairs: &[(usize, usize)],
        detections: &[Detection],
        kalman_filter: Option<&KalmanFilter>,
    ) {
        let mut pairs = pairs.to_vec();
        pairs.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        for (li, di) in pairs {
            let mut track = self.lost.swap_remove(li);
            debug!(track_id = track.track_id, "re-identified track");
            track.re_activate(&detections[di], kalman_filter);
            self.active.push(track);
        }
    }

    /// Discard lost tracks unmatched for more than `limit` frames.
    pub fn purge_lost(&mut self, limit: u32) {
        self.lost.retain(|t| {
            let keep = t.frames_since_update <= limit;
            if !keep {
                debug!(track_id = t.track_id, "removed lost track");
            }
            keep
        });
    }

    pub fn persons(&self, camera_id: &str, multi_camera: bool) -> Vec<TrackedPerson> {
        self.active
            .iter()
            .map(|t| t.to_person(camera_id, multi_camera))
            .collect()
    }

    pub fn statistics(&self, strategy: StrategyKind) -> TrackerStatistics {
        let average_age = if self.active.is_empty() {
            0.0
        } else {
            self.active.iter().map(|t| t.age as f32).sum::<f32>() / self.active.len() as f32
        };
        TrackerStatistics {
            strategy,
            active_tracks: self.active.len(),
            lost_tracks: self.lost.len(),
            total_created: self.total_created(),
            average_age,
            frames_processed: self.frames,
        }
    }

    /// Forget every track. Id allocation continues where it left off.
    pub fn reset(&mut self) {
        self.active.clear();
        self.lost.clear();
        self.frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::rect::Rect;
    use crate::tracker::track_state::TrackState;

    fn det(x: f32) -> Detection {
        Detection::from_rect(Rect::new(x, 0.0, 10.0, 20.0), 0.9)
    }

    #[test]
    fn test_ids_are_monotonic_across_reset() {
        let mut pool = TrackPool::new(10);
        assert_eq!(pool.spawn(&det(0.0), false, None), 1);
        assert_eq!(pool.spawn(&det(50.0), false, None), 2);
        pool.reset();
        assert_eq!(pool.spawn(&det(0.0), false, None), 3);
        assert_eq!(pool.total_created(), 3);
        assert_eq!(pool.active.len(), 1);
    }

    #[test]
    fn test_lose_and_revive() {
        let mut pool = TrackPool::new(10);
        for x in [0.0, 100.0, 200.0] {
            pool.spawn(&det(x), false, None);
        }
        for t in &mut pool.active {
            t.predict(None);
            t.predict(None);
        }
        pool.active[1].frames_since_update = 0;
        pool.lose_stale(&[0, 1, 2], 1);
        assert_eq!(pool.active.len(), 1);
        assert_eq!(pool.active[0].track_id, 2);
        assert_eq!(pool.lost.len(), 2);
        assert!(pool.lost.iter().all(|t| t.state == TrackState::Lost));

        let dets = vec![det(201.0)];
        let idx = pool.lost.iter().position(|t| t.track_id == 3).unwrap();
        pool.revive(&[(idx, 0)], &dets, None);
        assert_eq!(pool.lost.len(), 1);
        assert!(pool.active.iter().any(|t| t.track_id == 3 && t.frames_since_update == 0));
    }

    #[test]
    fn test_statistics() {
        let mut pool = TrackPool::new(10);
        assert_eq!(pool.statistics(StrategyKind::Sort).average_age, 0.0);
        pool.begin_frame();
        pool.spawn(&det(0.0), false, None);
        pool.spawn(&det(100.0), false, None);
        pool.active[0].predict(None);
        let stats = pool.statistics(StrategyKind::Sort);
        assert_eq!(stats.active_tracks, 2);
        assert_eq!(stats.total_created, 2);
        assert_eq!(stats.average_age, 1.5);
        assert_eq!(stats.frames_processed, 1);
    }
}
