use serde::{Deserialize, Serialize};

/// Track state enumeration for the identity lifecycle:
/// `New -> Active -> (Lost ->) Removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    /// Created this frame from an unmatched detection
    #[default]
    New,
    /// Matched at least once after creation, or still within its disappearance budget
    Active,
    /// Out of budget but kept for re-identification
    Lost,
    /// Permanently discarded
    Removed,
}

impl TrackState {
    /// Whether the track belongs to the active population.
    pub fn is_active(&self) -> bool {
        matches!(self, TrackState::New | TrackState::Active)
    }
}
