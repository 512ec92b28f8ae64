//! Constant-velocity Kalman filter over box state `(cx, cy, a, h)` and its
//! velocities, using ndarray for the algebra and nalgebra for the 4x4 inverse.

use ndarray::{Array1, Array2};

use crate::tracker::rect::Rect;

/// Filter state of one track: 8-dim mean and 8x8 covariance.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionState {
    pub mean: Array1<f64>,
    pub covariance: Array2<f64>,
}

impl MotionState {
    /// Box described by the position part of the mean.
    pub fn rect(&self) -> Rect {
        Rect::from_xyah(
            self.mean[0] as f32,
            self.mean[1] as f32,
            self.mean[2] as f32,
            self.mean[3] as f32,
        )
    }

    /// Center velocity in pixels per frame.
    pub fn velocity(&self) -> (f32, f32) {
        (self.mean[4] as f32, self.mean[5] as f32)
    }

    /// Drop all velocity components so the box stays in place.
    pub fn freeze(&mut self) {
        for i in 4..8 {
            self.mean[i] = 0.0;
        }
    }
}

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: Array2<f64>,
    update_mat: Array2<f64>,
    std_weight_position: f64,
    std_weight_velocity: f64,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    pub fn new() -> Self {
        let ndim = 4;
        let mut motion_mat = Array2::eye(2 * ndim);
        for i in 0..ndim {
            motion_mat[[i, ndim + i]] = 1.0;
        }

        let mut update_mat = Array2::zeros((ndim, 2 * ndim));
        for i in 0..ndim {
            update_mat[[i, i]] = 1.0;
        }

        Self {
            motion_mat,
            update_mat,
            std_weight_position: 1.0 / 20.0,
            std_weight_velocity: 1.0 / 160.0,
        }
    }

    /// Start a track at `bbox` with zero velocity.
    pub fn initiate(&self, bbox: &Rect) -> MotionState {
        let measurement = measurement(bbox);
        let mut mean = Array1::zeros(8);
        for i in 0..4 {
            mean[i] = measurement[i];
        }

        let h = measurement[3];
        let std = [
            2.0 * self.std_weight_position * h,
            2.0 * self.std_weight_position * h,
            1e-2,
            2.0 * self.std_weight_position * h,
            10.0 * self.std_weight_velocity * h,
            10.0 * self.std_weight_velocity * h,
            1e-5,
            10.0 * self.std_weight_velocity * h,
        ];

        MotionState {
            mean,
            covariance: diagonal(&std),
        }
    }

    /// Advance the state by one frame.
    pub fn predict(&self, state: &MotionState) -> MotionState {
        let h = state.mean[3];
        let std = [
            self.std_weight_position * h,
            self.std_weight_position * h,
            1e-2,
            self.std_weight_position * h,
            self.std_weight_velocity * h,
            self.std_weight_velocity * h,
            1e-5,
            self.std_weight_velocity * h,
        ];

        let mean = self.motion_mat.dot(&state.mean);
        let covariance = self
            .motion_mat
            .dot(&state.covariance)
            .dot(&self.motion_mat.t())
            + diagonal(&std);

        MotionState { mean, covariance }
    }

    fn project(&self, state: &MotionState) -> (Array1<f64>, Array2<f64>) {
        let h = state.mean[3];
        let std = [
            self.std_weight_position * h,
            self.std_weight_position * h,
            1e-1,
            self.std_weight_position * h,
        ];

        let mean_proj = self.update_mat.dot(&state.mean);
        let covariance_proj = self
            .update_mat
            .dot(&state.covariance)
            .dot(&self.update_mat.t())
            + diagonal(&std);

        (mean_proj, covariance_proj)
    }

    /// Correct the state with an observed box. A singular innovation
    /// covariance restarts the filter at the observation.
    pub fn update(&self, state: &MotionState, bbox: &Rect) -> MotionState {
        let (projected_mean, projected_cov) = self.project(state);

        let Some(s_inv) = invert_4x4(&projected_cov) else {
            return self.initiate(bbox);
        };

        let innovation = Array1::from_vec(measurement(bbox).to_vec()) - projected_mean;

        // K = P * H^T * S^-1
        let pht = state.covariance.dot(&self.update_mat.t()); // 8x4
        let kalman_gain = pht.dot(&s_inv); // 8x4

        let mean = &state.mean + &kalman_gain.dot(&innovation);
        let covariance =
            &state.covariance - &kalman_gain.dot(&projected_cov).dot(&kalman_gain.t());

        MotionState { mean, covariance }
    }
}

fn measurement(bbox: &Rect) -> [f64; 4] {
    let xyah = bbox.to_xyah();
    [
        xyah[0] as f64,
        xyah[1] as f64,
        xyah[2] as f64,
        xyah[3] as f64,
    ]
}

fn diagonal(std: &[f64]) -> Array2<f64> {
    let mut m = Array2::zeros((std.len(), std.len()));
    for (i, s) in std.iter().enumerate() {
        m[[i, i]] = s * s;
    }
    m
}

fn invert_4x4(m: &Array2<f64>) -> Option<Array2<f64>> {
    let nm = nalgebra::Matrix4::from_fn(|i, j| m[[i, j]]);
    let inv = nm.try_inverse()?;
    Some(Array2::from_shape_fn((4, 4), |(i, j)| inv[(i, j)]))
}
