//! Integration module for connecting object detection backends with the
//! per-camera trackers.
//!
//! This module provides the detector trait and the multi-camera
//! [`FramePipeline`] that schedules inference and tracking across a worker
//! pool.

mod builder;
mod detector;
mod events;
mod frame;
mod metrics;
mod pipeline;

pub use builder::DetectionBuilder;
pub use detector::DetectionSource;
pub use events::PipelineEvent;
pub use frame::{Frame, Priority};
pub use metrics::PipelineMetrics;
pub use pipeline::{FramePipeline, ShutdownReport};
