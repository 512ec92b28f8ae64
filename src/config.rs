//! Tracking and pipeline configuration snapshots.
//!
//! Both structs load from JSON and are validated after loading. A snapshot is
//! never patched in place: reconfiguring a camera replaces its whole
//! [`TrackingConfig`].

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which association strategy a tracking session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Single-stage IOU matching.
    Sort,
    /// Two-stage confidence-tiered matching with a lost pool.
    #[default]
    ByteTrack,
    /// IOU blended with appearance similarity.
    DeepSort,
    /// Motion, appearance and global re-identification.
    StrongSort,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Sort => "sort",
            StrategyKind::ByteTrack => "bytetrack",
            StrategyKind::DeepSort => "deepsort",
            StrategyKind::StrongSort => "strongsort",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sort" | "simple" => Ok(StrategyKind::Sort),
            "bytetrack" | "tiered" => Ok(StrategyKind::ByteTrack),
            "deepsort" | "appearance" => Ok(StrategyKind::DeepSort),
            "strongsort" | "full" => Ok(StrategyKind::StrongSort),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Per-session tracking configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Minimum IOU for a geometric match.
    pub iou_threshold: f32,
    /// Minimum blended score for the appearance-weighted strategy.
    pub similarity_threshold: f32,
    /// Distance in pixels at which motion similarity falls to zero.
    pub max_tracking_distance: f32,
    /// Frames a track may go unmatched before it leaves the active set.
    pub max_disappeared_frames: u32,
    /// Allow re-identification against lost or inactive tracks.
    pub reid_enabled: bool,
    /// Tag tracked persons with a camera-qualified global key.
    pub multi_camera: bool,
    /// Capacity of each track's center-point history.
    pub history_length: usize,
    pub strategy: StrategyKind,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            similarity_threshold: 0.5,
            max_tracking_distance: 100.0,
            max_disappeared_frames: 30,
            reid_enabled: true,
            multi_camera: false,
            history_length: 30,
            strategy: StrategyKind::default(),
        }
    }
}

impl TrackingConfig {
    /// Default configuration running the given strategy.
    pub fn with_strategy(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("iou_threshold", self.iou_threshold)?;
        check_unit("similarity_threshold", self.similarity_threshold)?;
        if self.max_tracking_distance.is_nan() || self.max_tracking_distance <= 0.0 {
            return Err(ConfigError::NotPositive {
                field: "max_tracking_distance",
            });
        }
        if self.history_length == 0 {
            return Err(ConfigError::NotPositive {
                field: "history_length",
            });
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }
}

/// Frame pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Size of the worker pool.
    pub workers: usize,
    /// Capacity of the bounded task queue.
    pub queue_capacity: usize,
    /// Only every Nth arrival per camera is a processing candidate.
    pub frame_skip: u32,
    /// Emit a performance update every this many processed frames.
    pub performance_interval: u64,
    pub shutdown_grace_ms: u64,
    pub shutdown_timeout_ms: u64,
    /// Configuration for cameras that were never registered explicitly.
    pub tracking: TrackingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 8,
            frame_skip: 2,
            performance_interval: 60,
            shutdown_grace_ms: 5_000,
            shutdown_timeout_ms: 10_000,
            tracking: TrackingConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NotPositive { field: "workers" });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::NotPositive {
                field: "queue_capacity",
            });
        }
        if self.frame_skip == 0 {
            return Err(ConfigError::NotPositive {
                field: "frame_skip",
            });
        }
        if self.performance_interval == 0 {
            return Err(ConfigError::NotPositive {
                field: "performance_interval",
            });
        }
        self.tracking.validate()
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }
}

fn check_unit(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ThresholdOutOfRange { field, value })
    }
}
