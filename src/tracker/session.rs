//! Per-camera tracking session.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::TrackingConfig;
use crate::error::ConfigError;
use crate::tracker::appearance::{AppearanceModel, BoxStatistics};
use crate::tracker::matching::Detection;
use crate::tracker::population::TrackerStatistics;
use crate::tracker::strategy::{Strategy, TrackingStrategy};
use crate::tracker::track::TrackedPerson;

/// Owns one camera's strategy and therefore its whole track population.
#[derive(Debug)]
pub struct TrackingSession {
    camera_id: String,
    config: TrackingConfig,
    appearance: Arc<dyn AppearanceModel>,
    strategy: Strategy,
}

impl TrackingSession {
    pub fn new(camera_id: impl Into<String>, config: TrackingConfig) -> Result<Self, ConfigError> {
        Self::with_appearance_model(camera_id, config, Arc::new(BoxStatistics))
    }

    pub fn with_appearance_model(
        camera_id: impl Into<String>,
        config: TrackingConfig,
        appearance: Arc<dyn AppearanceModel>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let camera_id = camera_id.into();
        info!(camera = %camera_id, strategy = %config.strategy, "tracking session created");
        Ok(Self {
            strategy: Strategy::with_appearance_model(&config, Arc::clone(&appearance)),
            camera_id,
            config,
            appearance,
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Feed one frame's detections. An empty slice is a predict-only cycle.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<TrackedPerson> {
        let persons = self.strategy.update(detections, &self.camera_id);
        debug!(
            camera = %self.camera_id,
            detections = detections.len(),
            tracked = persons.len(),
            "session updated"
        );
        persons
    }

    /// The current active set.
    pub fn tracked_persons(&self) -> Vec<TrackedPerson> {
        self.strategy.tracked_persons(&self.camera_id)
    }

    pub fn statistics(&self) -> TrackerStatistics {
        self.strategy.statistics()
    }

    /// Discard all tracks, keeping the configuration.
    pub fn reset(&mut self) {
        self.strategy.reset();
    }

    /// Replace the configuration wholesale. The session restarts with a fresh
    /// strategy instance; existing tracks and ids are discarded.
    pub fn reconfigure(&mut self, config: TrackingConfig) -> Result<(), ConfigError> {
        config.validate()?;
        info!(
            camera = %self.camera_id,
            from = %self.config.strategy,
            to = %config.strategy,
            "tracking session reconfigured"
        );
        self.strategy = Strategy::with_appearance_model(&config, Arc::clone(&self.appearance));
        self.config = config;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyKind;
    use crate::tracker::rect::Rect;

    #[test]
    fn test_rejects_invalid_config() {
        let config = TrackingConfig {
            history_length: 0,
            ..Default::default()
        };
        assert!(TrackingSession::new("cam", config).is_err());
    }

    #[test]
    fn test_reconfigure_replaces_strategy() {
        let mut session =
            TrackingSession::new("cam", TrackingConfig::with_strategy(StrategyKind::Sort)).unwrap();
        session.update(&[Detection::from_rect(Rect::new(0.0, 0.0, 10.0, 20.0), 0.9)]);
        assert_eq!(session.tracked_persons().len(), 1);

        session
            .reconfigure(TrackingConfig::with_strategy(StrategyKind::StrongSort))
            .unwrap();
        assert!(session.tracked_persons().is_empty());
        assert_eq!(session.statistics().strategy, StrategyKind::StrongSort);
        assert_eq!(session.config().strategy, StrategyKind::StrongSort);

        // A rejected snapshot leaves the session untouched.
        let bad = TrackingConfig {
            iou_threshold: -1.0,
            ..Default::default()
        };
        assert!(session.reconfigure(bad).is_err());
        assert_eq!(session.config().strategy, StrategyKind::StrongSort);
    }

    #[test]
    fn test_persons_carry_camera() {
        let mut session = TrackingSession::new(
            "lobby",
            TrackingConfig {
                multi_camera: true,
                ..TrackingConfig::with_strategy(StrategyKind::Sort)
            },
        )
        .unwrap();
        let persons = session.update(&[Detection::from_rect(Rect::new(0.0, 0.0, 10.0, 20.0), 0.9)]);
        assert_eq!(persons[0].camera_id, "lobby");
        assert_eq!(persons[0].global_key.as_deref(), Some("lobby:1"));
        assert_eq!(session.camera_id(), "lobby");
    }
}
