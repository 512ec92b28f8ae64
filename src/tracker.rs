mod appearance;
mod byte_tracker;
mod deep_sort;
mod kalman_filter;
mod matching;
mod population;
mod rect;
mod session;
mod sort;
mod strategy;
mod strong_sort;
mod track;
mod track_state;

pub use appearance::{AppearanceModel, BoxStatistics, FEATURE_BANK_CAPACITY, FeatureBank};
pub use byte_tracker::{ByteTracker, HIGH_CONFIDENCE, LOW_CONFIDENCE};
pub use deep_sort::DeepSortTracker;
pub use kalman_filter::{KalmanFilter, MotionState};
pub use matching::{
    AssignmentResult, DEFAULT_CLASS, Detection, associate, associate_subset, greedy_assignment,
    score_matrix,
};
pub use population::TrackerStatistics;
pub use rect::{Rect, ratio_similarity};
pub use session::TrackingSession;
pub use sort::SortTracker;
pub use strategy::{Strategy, TrackingStrategy};
pub use strong_sort::StrongSortTracker;
pub use track::{Track, TrackedPerson};
pub use track_state::TrackState;
