//! Appearance descriptors and the pluggable similarity seam.
//!
//! The built-in descriptor is a rolling window of box width and height/width
//! ratio, a cheap stand-in for a learned re-identification embedding. A real
//! embedding model plugs in through [`AppearanceModel`] without touching the
//! association code.

use std::collections::VecDeque;
use std::fmt;

use crate::tracker::matching::Detection;
use crate::tracker::rect::{Rect, ratio_similarity};

/// Number of observations kept by a [`FeatureBank`].
pub const FEATURE_BANK_CAPACITY: usize = 30;

/// Rolling window of recent box statistics with running averages.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBank {
    samples: VecDeque<(f32, f32)>,
    capacity: usize,
    width_sum: f32,
    ratio_sum: f32,
}

impl Default for FeatureBank {
    fn default() -> Self {
        Self::with_capacity(FEATURE_BANK_CAPACITY)
    }
}

impl FeatureBank {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            width_sum: 0.0,
            ratio_sum: 0.0,
        }
    }

    /// Record the box of a matched detection, evicting the oldest sample once full.
    pub fn push(&mut self, bbox: &Rect) {
        if self.samples.len() == self.capacity {
            if let Some((w, r)) = self.samples.pop_front() {
                self.width_sum -= w;
                self.ratio_sum -= r;
            }
        }
        let sample = (bbox.width, bbox.height_ratio());
        self.width_sum += sample.0;
        self.ratio_sum += sample.1;
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn average_width(&self) -> Option<f32> {
        (!self.is_empty()).then(|| self.width_sum / self.samples.len() as f32)
    }

    pub fn average_height_ratio(&self) -> Option<f32> {
        (!self.is_empty()).then(|| self.ratio_sum / self.samples.len() as f32)
    }
}

/// Appearance similarity between a track's descriptor and a detection.
pub trait AppearanceModel: fmt::Debug + Send + Sync {
    /// Similarity in `[0, 1]`.
    fn similarity(&self, bank: &FeatureBank, detection: &Detection) -> f32;

    /// Whether descriptors are distinctive enough to re-identify retired
    /// tracks. Size statistics are not.
    fn supports_reidentification(&self) -> bool {
        false
    }
}

/// Averages width closeness, aspect closeness and detection confidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxStatistics;

impl AppearanceModel for BoxStatistics {
    fn similarity(&self, bank: &FeatureBank, detection: &Detection) -> f32 {
        let (Some(width), Some(ratio)) = (bank.average_width(), bank.average_height_ratio()) else {
            return 0.0;
        };
        let size = ratio_similarity(width, detection.bbox.width);
        let aspect = ratio_similarity(ratio, detection.bbox.height_ratio());
        ((size + aspect + detection.score.clamp(0.0, 1.0)) / 3.0).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn det(w: f32, h: f32, score: f32) -> Detection {
        Detection::from_rect(Rect::new(0.0, 0.0, w, h), score)
    }

    #[test]
    fn test_bank_is_bounded() {
        let mut bank = FeatureBank::default();
        for i in 0..100 {
            bank.push(&Rect::new(0.0, 0.0, 10.0 + i as f32, 20.0));
        }
        assert_eq!(bank.len(), FEATURE_BANK_CAPACITY);
        // Widths 80..=109 remain.
        assert_relative_eq!(bank.average_width().unwrap(), 94.5, epsilon = 1e-3);
    }

    #[test]
    fn test_empty_bank_has_no_similarity() {
        let bank = FeatureBank::default();
        assert!(bank.average_width().is_none());
        assert_eq!(BoxStatistics.similarity(&bank, &det(10.0, 20.0, 1.0)), 0.0);
    }

    #[test]
    fn test_box_statistics_similarity() {
        let mut bank = FeatureBank::default();
        bank.push(&Rect::new(0.0, 0.0, 40.0, 80.0));

        let same = BoxStatistics.similarity(&bank, &det(40.0, 80.0, 0.9));
        assert_relative_eq!(same, 2.9 / 3.0, epsilon = 1e-6);

        // Half the width, same aspect ratio.
        let half = BoxStatistics.similarity(&bank, &det(20.0, 40.0, 1.0));
        assert_relative_eq!(half, 2.5 / 3.0, epsilon = 1e-6);

        assert!(!BoxStatistics.supports_reidentification());
    }
}
