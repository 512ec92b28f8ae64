//! Multi-camera person tracking.
//!
//! Two halves:
//! - [`tracker`]: geometry, greedy association, tracks and four interchangeable
//!   tracking strategies behind a per-camera [`TrackingSession`].
//! - [`integration`]: the detector seam and the bounded, backpressure-aware
//!   [`FramePipeline`] that schedules inference across cameras.

pub mod config;
pub mod error;
pub mod integration;
pub mod logging;
pub mod tracker;

pub use config::{PipelineConfig, StrategyKind, TrackingConfig};
pub use error::{ConfigError, PipelineError};
pub use integration::{
    DetectionBuilder, DetectionSource, Frame, FramePipeline, PipelineEvent, PipelineMetrics,
    Priority, ShutdownReport,
};
pub use tracker::{
    AppearanceModel, BoxStatistics, Detection, Rect, Strategy, TrackState, TrackedPerson,
    TrackerStatistics, TrackingSession, TrackingStrategy,
};
