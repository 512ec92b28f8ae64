//! Trait for object detection inference backends.

use std::fmt;

use crate::tracker::Detection;

/// Object detection backend consumed by the [`FramePipeline`].
///
/// The detector is shared by every worker, so `detect` takes `&self` and
/// must be safe to call for different cameras at the same time. A failed
/// call is not fatal: the pipeline logs it and runs a predict-only cycle.
///
/// # Example
///
/// ```ignore
/// use multicam_track::{Detection, DetectionSource, Frame};
///
/// struct MyDetector {
///     // Your model here
/// }
///
/// impl DetectionSource for MyDetector {
///     type Frame = Frame;
///     type Error = std::io::Error;
///
///     fn detect(&self, camera_id: &str, frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
///         // Run inference and return detections
///         Ok(vec![])
///     }
/// }
/// ```
///
/// [`FramePipeline`]: super::FramePipeline
pub trait DetectionSource: Send + Sync + 'static {
    /// Frame buffer type. Cloned once when the pipeline admits a frame.
    type Frame: Clone + Send + 'static;

    /// Error type for detection failures.
    type Error: fmt::Display;

    /// Run inference on one camera frame.
    fn detect(&self, camera_id: &str, frame: &Self::Frame) -> Result<Vec<Detection>, Self::Error>;
}
