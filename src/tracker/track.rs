//! A single tracked identity.

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::tracker::appearance::FeatureBank;
use crate::tracker::kalman_filter::{KalmanFilter, MotionState};
use crate::tracker::matching::Detection;
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;

/// Weight of the newest displacement in the smoothed velocity.
const VELOCITY_SMOOTHING: f32 = 0.5;

/// Single object track.
#[derive(Debug, Clone)]
pub struct Track {
    /// Identifier, unique within the owning session
    pub track_id: u64,
    pub state: TrackState,
    /// Last observed bounding box
    pub bbox: Rect,
    /// Where the track is expected in the current frame
    pub predicted: Rect,
    /// Confidence of the last matched detection
    pub score: f32,
    pub class_label: String,
    pub created_at: Instant,
    /// Frames alive, including the creation frame
    pub age: u32,
    /// Predict-only cycles since the last match
    pub frames_since_update: u32,
    /// Number of matched detections, including the creating one
    pub hits: u32,
    history: VecDeque<(f32, f32)>,
    history_capacity: usize,
    velocity: (f32, f32),
    features: Option<FeatureBank>,
    motion: Option<MotionState>,
}

impl Track {
    /// Create a track from an unmatched detection.
    pub fn new(track_id: u64, detection: &Detection, history_capacity: usize) -> Self {
        let history_capacity = history_capacity.max(1);
        let mut history = VecDeque::with_capacity(history_capacity);
        history.push_back(detection.bbox.center());
        Self {
            track_id,
            state: TrackState::New,
            bbox: detection.bbox,
            predicted: detection.bbox,
            score: detection.score,
            class_label: detection.class_label.clone(),
            created_at: Instant::now(),
            age: 1,
            frames_since_update: 0,
            hits: 1,
            history,
            history_capacity,
            velocity: (0.0, 0.0),
            features: None,
            motion: None,
        }
    }

    /// Keep a rolling appearance descriptor, seeded with the creating box.
    pub fn with_feature_bank(mut self) -> Self {
        let mut bank = FeatureBank::default();
        bank.push(&self.bbox);
        self.features = Some(bank);
        self
    }

    /// Predict with a Kalman filter instead of plain extrapolation.
    pub fn with_motion_model(mut self, kalman_filter: &KalmanFilter) -> Self {
        self.motion = Some(kalman_filter.initiate(&self.bbox));
        self
    }

    pub fn features(&self) -> Option<&FeatureBank> {
        self.features.as_ref()
    }

    /// Center velocity in pixels per frame.
    pub fn velocity(&self) -> (f32, f32) {
        match &self.motion {
            Some(motion) => motion.velocity(),
            None => self.velocity,
        }
    }

    /// Past center points, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &(f32, f32)> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Advance one frame without a measurement.
    ///
    /// The Kalman filter is used when the track was built with a motion model
    /// and a filter is supplied; otherwise the box moves at constant velocity.
    pub fn predict(&mut self, kalman_filter: Option<&KalmanFilter>) {
        self.age += 1;
        self.frames_since_update += 1;
        if self.state == TrackState::New {
            self.state = TrackState::Active;
        }

        match (&mut self.motion, kalman_filter) {
            (Some(motion), Some(kf)) => {
                *motion = kf.predict(motion);
                self.predicted = motion.rect();
            }
            _ => {
                self.predicted = self.predicted.translate(self.velocity.0, self.velocity.1);
            }
        }
    }

    /// Absorb a matched detection.
    pub fn update(&mut self, detection: &Detection, kalman_filter: Option<&KalmanFilter>) {
        let gap = self.frames_since_update.max(1) as f32;
        let (old_x, old_y) = self.bbox.center();
        let (new_x, new_y) = detection.bbox.center();
        let step = ((new_x - old_x) / gap, (new_y - old_y) / gap);
        self.velocity = if self.hits == 1 {
            step
        } else {
            (
                self.velocity.0 + VELOCITY_SMOOTHING * (step.0 - self.velocity.0),
                self.velocity.1 + VELOCITY_SMOOTHING * (step.1 - self.velocity.1),
            )
        };

        self.predicted = detection.bbox;
        if let (Some(motion), Some(kf)) = (&mut self.motion, kalman_filter) {
            *motion = kf.update(motion, &detection.bbox);
            self.predicted = motion.rect();
        }

        self.bbox = detection.bbox;
        self.score = detection.score;
        self.class_label.clone_from(&detection.class_label);
        self.frames_since_update = 0;
        self.hits += 1;
        self.state = TrackState::Active;

        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back((new_x, new_y));

        if let Some(bank) = &mut self.features {
            bank.push(&detection.bbox);
        }
    }

    /// Bring a lost track back with a new observation, keeping its id.
    pub fn re_activate(&mut self, detection: &Detection, kalman_filter: Option<&KalmanFilter>) {
        trace!(
            track_id = self.track_id,
            lost_for = self.frames_since_update,
            "re-activating track"
        );
        // Motion before the loss says nothing about where it went, and neither
        // does the jump from the last seen box.
        self.velocity = (0.0, 0.0);
        self.bbox = detection.bbox;
        if let Some(kf) = kalman_filter {
            if self.motion.is_some() {
                self.motion = Some(kf.initiate(&detection.bbox));
            }
        }
        self.update(detection, None);
    }

    /// Move out of the active population. The box stops moving.
    pub fn mark_lost(&mut self) {
        self.state = TrackState::Lost;
        self.velocity = (0.0, 0.0);
        if let Some(motion) = &mut self.motion {
            motion.freeze();
        }
        self.predicted = self.bbox;
    }

    pub fn mark_removed(&mut self) {
        self.state = TrackState::Removed;
    }

    pub fn to_person(&self, camera_id: &str, multi_camera: bool) -> TrackedPerson {
        TrackedPerson {
            track_id: self.track_id,
            camera_id: camera_id.to_string(),
            global_key: multi_camera.then(|| format!("{camera_id}:{}", self.track_id)),
            bbox: self.bbox,
            predicted: self.predicted,
            confidence: self.score,
            class_label: self.class_label.clone(),
            age: self.age,
            frames_since_update: self.frames_since_update,
            state: self.state,
            history: self.history.iter().copied().collect(),
        }
    }
}

/// Snapshot of a track handed out of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPerson {
    pub track_id: u64,
    pub camera_id: String,
    /// `"<camera>:<track>"`, set when cross-camera keys are enabled
    pub global_key: Option<String>,
    pub bbox: Rect,
    pub predicted: Rect,
    pub confidence: f32,
    pub class_label: String,
    pub age: u32,
    pub frames_since_update: u32,
    pub state: TrackState,
    /// Center points, oldest first
    pub history: Vec<(f32, f32)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn det(x: f32, y: f32) -> Detection {
        Detection::from_rect(Rect::new(x, y, 50.0, 50.0), 0.9)
    }

    #[test]
    fn test_new_track() {
        let track = Track::new(7, &det(10.0, 10.0), 5);
        assert_eq!(track.track_id, 7);
        assert_eq!(track.state, TrackState::New);
        assert_eq!(track.age, 1);
        assert_eq!(track.frames_since_update, 0);
        assert_eq!(track.history_len(), 1);
        assert!(track.features().is_none());
    }

    #[test]
    fn test_predict_counts_and_extrapolates() {
        let mut track = Track::new(1, &det(0.0, 0.0), 5);
        track.predict(None);
        track.update(&det(10.0, 0.0), None);
        assert_eq!(track.frames_since_update, 0);
        assert_eq!(track.velocity(), (10.0, 0.0));

        track.predict(None);
        assert_eq!(track.frames_since_update, 1);
        assert_eq!(track.predicted.x, 20.0);
        track.predict(None);
        assert_eq!(track.frames_since_update, 2);
        assert_eq!(track.predicted.x, 30.0);
        assert_eq!(track.age, 4);
        assert_eq!(track.state, TrackState::Active);
    }

    #[test]
    fn test_velocity_spreads_over_gap() {
        let mut track = Track::new(1, &det(0.0, 0.0), 5);
        track.predict(None);
        track.predict(None);
        track.update(&det(20.0, 10.0), None);
        assert_eq!(track.velocity(), (10.0, 5.0));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut track = Track::new(1, &det(0.0, 0.0), 3);
        for i in 1..10 {
            track.predict(None);
            track.update(&det(i as f32, 0.0), None);
            assert!(track.history_len() <= 3);
        }
        let xs: Vec<f32> = track.history().map(|p| p.0).collect();
        assert_eq!(xs, vec![32.0, 33.0, 34.0]);
    }

    #[test]
    fn test_mark_lost_freezes_box() {
        let mut track = Track::new(1, &det(0.0, 0.0), 5).with_feature_bank();
        track.predict(None);
        track.update(&det(10.0, 0.0), None);
        track.mark_lost();
        track.predict(None);
        assert_eq!(track.predicted, track.bbox);
        assert!(!track.is_active());
        assert_eq!(track.features().map(|b| b.len()), Some(2));
    }

    #[test]
    fn test_re_activate_starts_at_rest() {
        let mut track = Track::new(1, &det(0.0, 0.0), 5);
        track.predict(None);
        track.update(&det(10.0, 0.0), None);
        track.mark_lost();
        for _ in 0..4 {
            track.predict(None);
        }

        track.re_activate(&det(300.0, 40.0), None);
        assert_eq!(track.velocity(), (0.0, 0.0));
        assert_eq!(track.frames_since_update, 0);
        assert_eq!(track.bbox, Rect::new(300.0, 40.0, 50.0, 50.0));
        assert!(track.is_active());

        track.predict(None);
        assert_eq!(track.predicted, track.bbox);
    }

    #[test]
    fn test_kalman_predict() {
        let kf = KalmanFilter::new();
        let mut track = Track::new(1, &det(0.0, 0.0), 5).with_motion_model(&kf);
        for i in 1..20 {
            track.predict(Some(&kf));
            track.update(&det(4.0 * i as f32, 0.0), Some(&kf));
        }
        track.predict(Some(&kf));
        assert_relative_eq!(track.predicted.x, 80.0, epsilon = 2.0);
    }

    #[test]
    fn test_to_person_global_key() {
        let track = Track::new(3, &det(0.0, 0.0), 5);
        assert_eq!(track.to_person("cam-a", false).global_key, None);
        let person = track.to_person("cam-a", true);
        assert_eq!(person.global_key.as_deref(), Some("cam-a:3"));
        assert_eq!(person.camera_id, "cam-a");
        assert_eq!(person.history, vec![(25.0, 25.0)]);
    }
}
