//! Detections and the greedy association engine.
//!
//! Association builds a dense (tracks x detections) score matrix and then
//! repeatedly commits the highest remaining cell until the best one falls
//! below the threshold. This is a greedy approximation of the optimal
//! assignment; it trades optimality for simplicity and predictable latency.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::tracker::rect::Rect;

/// Label given to detections that do not carry one.
pub const DEFAULT_CLASS: &str = "person";

/// Detection input for the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding box
    pub bbox: Rect,
    /// Detection confidence score in `[0, 1]`
    pub score: f32,
    pub class_label: String,
}

impl Detection {
    /// Detection from TLBR coordinates.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        Self::from_rect(Rect::from_tlbr(x1, y1, x2, y2), score)
    }

    pub fn from_rect(bbox: Rect, score: f32) -> Self {
        Self {
            bbox,
            score,
            class_label: DEFAULT_CLASS.to_string(),
        }
    }

    pub fn with_class(mut self, class_label: impl Into<String>) -> Self {
        self.class_label = class_label.into();
        self
    }
}

/// Outcome of one association round. Indices refer to the slices passed in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Score every (row, column) pair.
pub fn score_matrix<T, D, F>(tracks: &[T], detections: &[D], score: F) -> Array2<f32>
where
    F: Fn(&T, &D) -> f32,
{
    let mut scores = Array2::zeros((tracks.len(), detections.len()));
    for (i, t) in tracks.iter().enumerate() {
        for (j, d) in detections.iter().enumerate() {
            scores[[i, j]] = score(t, d);
        }
    }
    scores
}

/// Greedy highest-score-first assignment.
///
/// Cells scoring below `threshold` (or NaN) are never committed. Ties are
/// broken by row, then column, so the result is deterministic.
pub fn greedy_assignment(scores: &Array2<f32>, threshold: f32) -> AssignmentResult {
    let (num_rows, num_cols) = scores.dim();

    let mut candidates: Vec<(f32, usize, usize)> = scores
        .indexed_iter()
        .filter(|(_, s)| **s >= threshold)
        .map(|((i, j), s)| (*s, i, j))
        .collect();
    candidates.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.cmp(&b.2))
    });

    let mut row_taken = vec![false; num_rows];
    let mut col_taken = vec![false; num_cols];
    let mut matches = Vec::new();

    for (_, i, j) in candidates {
        if row_taken[i] || col_taken[j] {
            continue;
        }
        row_taken[i] = true;
        col_taken[j] = true;
        matches.push((i, j));
        if matches.len() == num_rows.min(num_cols) {
            break;
        }
    }

    AssignmentResult {
        matches,
        unmatched_tracks: untaken(&row_taken),
        unmatched_detections: untaken(&col_taken),
    }
}

/// Score and greedily match `tracks` against `detections`.
pub fn associate<T, D, F>(tracks: &[T], detections: &[D], score: F, threshold: f32) -> AssignmentResult
where
    F: Fn(&T, &D) -> f32,
{
    greedy_assignment(&score_matrix(tracks, detections, score), threshold)
}

/// Like [`associate`], but over index subsets of larger collections. The
/// returned indices are the original ones, not positions in the subsets.
pub fn associate_subset<F>(
    track_indices: &[usize],
    detection_indices: &[usize],
    score: F,
    threshold: f32,
) -> AssignmentResult
where
    F: Fn(usize, usize) -> f32,
{
    let result = associate(
        track_indices,
        detection_indices,
        |&t, &d| score(t, d),
        threshold,
    );
    AssignmentResult {
        matches: result
            .matches
            .into_iter()
            .map(|(t, d)| (track_indices[t], detection_indices[d]))
            .collect(),
        unmatched_tracks: result
            .unmatched_tracks
            .into_iter()
            .map(|t| track_indices[t])
            .collect(),
        unmatched_detections: result
            .unmatched_detections
            .into_iter()
            .map(|d| detection_indices[d])
            .collect(),
    }
}

fn untaken(taken: &[bool]) -> Vec<usize> {
    taken
        .iter()
        .enumerate()
        .filter_map(|(i, &t)| if t { None } else { Some(i) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::collections::HashSet;

    #[test]
    fn test_greedy_picks_global_maximum_first() {
        // Optimal assignment would be (0,1),(1,0) with total 1.6; greedy takes
        // the 0.9 cell first and is left with (1,1).
        let scores = array![[0.9, 0.8], [0.8, 0.1]];
        let result = greedy_assignment(&scores, 0.05);
        assert_eq!(result.matches, vec![(0, 0), (1, 1)]);
        assert!(result.unmatched_tracks.is_empty());
        assert!(result.unmatched_detections.is_empty());
    }

    #[test]
    fn test_threshold_stops_matching() {
        let scores = array![[0.9, 0.0], [0.0, 0.2]];
        let result = greedy_assignment(&scores, 0.3);
        assert_eq!(result.matches, vec![(0, 0)]);
        assert_eq!(result.unmatched_tracks, vec![1]);
        assert_eq!(result.unmatched_detections, vec![1]);
    }

    #[test]
    fn test_empty_inputs() {
        let result = associate::<Rect, Rect, _>(&[], &[Rect::default()], |a, b| a.iou(b), 0.3);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_detections, vec![0]);

        let result = associate::<Rect, Rect, _>(&[Rect::default()], &[], |a, b| a.iou(b), 0.3);
        assert_eq!(result.unmatched_tracks, vec![0]);
    }

    #[test]
    fn test_nan_scores_never_match() {
        let scores = array![[f32::NAN]];
        let result = greedy_assignment(&scores, 0.0);
        assert!(result.matches.is_empty());
    }

    #[test]
    fn test_no_duplicate_pairs() {
        // Every cell scores the same; each row and column still appears once.
        let scores = Array2::from_elem((4, 6), 0.5);
        let result = greedy_assignment(&scores, 0.1);
        assert_eq!(result.matches.len(), 4);
        let rows: HashSet<_> = result.matches.iter().map(|m| m.0).collect();
        let cols: HashSet<_> = result.matches.iter().map(|m| m.1).collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(cols.len(), 4);
        assert_eq!(result.unmatched_detections.len(), 2);
    }

    #[test]
    fn test_subset_indices_map_back() {
        let boxes = [
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(100.0, 100.0, 10.0, 10.0),
            Rect::new(200.0, 200.0, 10.0, 10.0),
        ];
        let dets = [Rect::new(201.0, 200.0, 10.0, 10.0), Rect::new(1.0, 0.0, 10.0, 10.0)];
        let result = associate_subset(&[0, 2], &[0, 1], |t, d| boxes[t].iou(&dets[d]), 0.3);
        let mut matches = result.matches.clone();
        matches.sort();
        assert_eq!(matches, vec![(0, 1), (2, 0)]);
    }

    #[test]
    fn test_detection_constructors() {
        let det = Detection::new(10.0, 20.0, 50.0, 80.0, 0.9).with_class("car");
        assert_eq!(det.bbox, Rect::new(10.0, 20.0, 40.0, 60.0));
        assert_eq!(det.class_label, "car");
        assert_eq!(Detection::from_rect(Rect::default(), 0.5).class_label, DEFAULT_CLASS);
    }
}
