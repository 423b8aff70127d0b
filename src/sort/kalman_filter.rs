use crate::sort::{BBox, Xyah};
use nalgebra::{Cholesky, SMatrix, SVector, Vector2, Vector4};

pub type StateMean = SVector<f32, 8>;
pub type StateCovariance = SMatrix<f32, 8, 8>;
pub type Measurement = SVector<f32, 4>;

///
/// Table for the 0.95 quantile of the chi-square distribution with N degrees of
/// freedom (contains values for N=1, ..., 9). Taken from MATLAB/Octave's chi2inv
/// function and used as Mahalanobis gating threshold.
///
pub const CHI_2_INV_95: [f32; 9] = [
    3.8415, // 1
    5.9915, // 2
    7.8147, // 3
    9.4877, // 4
    11.070, // 5
    12.592, // 6
    14.067, // 7
    15.507, // 8
    16.919, // 9
];

/// A simple Kalman filter for tracking bounding boxes in image space.
///
/// ```text
/// The 8-dimensional state space
///
///     x, y, a, h, vx, vy, va, vh
///
/// contains the bounding box center position (x, y), aspect ratio a, height h,
/// and their respective velocities.
///
/// Object motion follows a constant velocity model. The bounding box location
/// (x, y, a, h) is taken as direct observation of the state space (linear
/// observation model).
/// ```
///
#[derive(Clone, Debug)]
pub struct KalmanFilter {
    motion_mat: SMatrix<f32, 8, 8>,
    update_mat: SMatrix<f32, 4, 8>,
    std_weight_position: f32,
    std_weight_velocity: f32,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        let (ndim, dt) = (4, 1.);

        // Create Kalman filter model matrices.
        let mut motion_mat = SMatrix::<f32, 8, 8>::identity();

        for i in 0..ndim {
            motion_mat[(i, ndim + i)] = dt;
        }

        let mut update_mat = SMatrix::<f32, 4, 8>::zeros();

        for i in 0..ndim {
            update_mat[(i, i)] = 1.0;
        }

        // Motion and observation uncertainty are chosen relative to the current
        // state estimate. These weights control the amount of uncertainty in
        // the model.
        let std_weight_position = 1.0 / 20.0;
        let std_weight_velocity = 1.0 / 160.0;

        Self {
            motion_mat,
            update_mat,
            std_weight_position,
            std_weight_velocity,
        }
    }
}

impl KalmanFilter {
    ///
    /// Create track from unassociated measurement `(x, y, a, h)`.
    ///
    /// Returns the mean vector (8 dimensional) and covariance matrix (8x8
    /// dimensional) of the new track. Unobserved velocities are initialized
    /// to 0 mean.
    ///
    pub fn initiate(&self, measurement: &BBox<Xyah>) -> (StateMean, StateCovariance) {
        let [x, y, a, h] = measurement.as_array();
        let mean = StateMean::from_column_slice(&[x, y, a, h, 0.0, 0.0, 0.0, 0.0]);

        let std = StateMean::from_column_slice(&[
            2.0 * self.std_weight_position * h,
            2.0 * self.std_weight_position * h,
            1.0e-2,
            2.0 * self.std_weight_position * h,
            10.0 * self.std_weight_velocity * h,
            10.0 * self.std_weight_velocity * h,
            1.0e-5,
            10.0 * self.std_weight_velocity * h,
        ]);

        let covariance = StateCovariance::from_diagonal(&std.component_mul(&std));

        (mean, covariance)
    }

    /// Run Kalman filter prediction step.
    ///
    /// Returns the mean vector and covariance matrix of the predicted state.
    ///
    pub fn predict(&self, mean: &StateMean, covariance: &StateCovariance) -> (StateMean, StateCovariance) {
        let h = mean[3];
        let std = StateMean::from_column_slice(&[
            // position
            self.std_weight_position * h,
            self.std_weight_position * h,
            1e-2,
            self.std_weight_position * h,

            // velocity
            self.std_weight_velocity * h,
            self.std_weight_velocity * h,
            1e-5,
            self.std_weight_velocity * h,
        ]);

        let motion_cov = StateCovariance::from_diagonal(&std.component_mul(&std));
        let mean = self.motion_mat * mean;
        let covariance = self.motion_mat * covariance * self.motion_mat.transpose();

        (mean, covariance + motion_cov)
    }

    // Project state distribution to measurement space.
    fn project(&self, mean: &StateMean, covariance: &StateCovariance) -> (Measurement, SMatrix<f32, 4, 4>) {
        let h = mean[3];
        let std = Vector4::new(
            self.std_weight_position * h,
            self.std_weight_position * h,
            1e-1,
            self.std_weight_position * h,
        );

        let innovation_cov = SMatrix::<f32, 4, 4>::from_diagonal(&std.component_mul(&std));
        let mean = self.update_mat * mean;
        let covariance = self.update_mat * covariance * self.update_mat.transpose();

        (mean, covariance + innovation_cov)
    }

    /// Run Kalman filter correction step with measurement `(x, y, a, h)`.
    ///
    /// Returns the measurement-corrected state distribution, or `None` when the
    /// projected covariance is not positive definite.
    ///
    pub fn update(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
        measurement: &Measurement,
    ) -> Option<(StateMean, StateCovariance)> {
        let (projected_mean, projected_cov) = self.project(mean, covariance);

        let chol = Cholesky::new(projected_cov)?;

        // S^-1 * H * P, shape (4, 8); P and S are symmetric so this is K^T.
        let kalman_gain = chol.solve(&(self.update_mat * covariance)).transpose();

        let innovation = measurement - projected_mean;
        let new_mean = mean + kalman_gain * innovation;
        let new_covariance = covariance - kalman_gain * projected_cov * kalman_gain.transpose();

        Some((new_mean, new_covariance))
    }

    /// Compute gating distance between state distribution and measurements.
    ///
    /// ```text
    /// A suitable distance threshold can be obtained from `CHI_2_INV_95`. If
    /// `only_position` is false, the chi-square distribution has 4 degrees of
    /// freedom, otherwise 2.
    ///
    /// Returns one squared Mahalanobis distance per measurement. When the
    /// projected covariance is degenerate every distance is zero, which
    /// leaves the cost matrix ungated.
    /// ```
    ///
    pub fn gating_distance(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
        measurements: &[Measurement],
        only_position: bool,
    ) -> Vec<f32> {
        let (mean, covariance) = self.project(mean, covariance);

        if only_position {
            let cov = covariance.fixed_view::<2, 2>(0, 0).into_owned();
            let mean = Vector2::new(mean[0], mean[1]);

            match Cholesky::new(cov) {
                Some(chol) => measurements
                    .iter()
                    .map(|m| {
                        let d = Vector2::new(m[0], m[1]) - mean;
                        d.dot(&chol.solve(&d))
                    })
                    .collect(),
                None => vec![0.0; measurements.len()],
            }
        } else {
            match Cholesky::new(covariance) {
                Some(chol) => measurements
                    .iter()
                    .map(|m| {
                        let d = m - mean;
                        d.dot(&chol.solve(&d))
                    })
                    .collect(),
                None => vec![0.0; measurements.len()],
            }
        }
    }
}
