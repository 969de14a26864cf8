use crate::{Error, Result};
use nalgebra::{Matrix3, Matrix4, Vector3, Vector6};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Fixed robot description for product-of-exponentials forward kinematics.
///
/// Holds the end-effector home configuration (the pose at all-zero joint
/// angles) and one space-frame screw axis per actuated joint, in joint
/// order. A model is loaded once at startup and shared read-only across
/// worker threads; it is never mutated per episode.
#[derive(Debug, Clone)]
pub struct KinematicModel {
    home: Matrix4<f64>,
    screw_axes: Vec<Vector6<f64>>,
}

/// On-disk model description (YAML).
#[derive(Debug, Serialize, Deserialize)]
struct ModelFile {
    /// Home configuration, row-major 4x4.
    home: [[f64; 4]; 4],
    /// One `[wx, wy, wz, vx, vy, vz]` screw axis per joint, space frame.
    screw_axes: Vec<[f64; 6]>,
}

impl KinematicModel {
    pub fn new(home: Matrix4<f64>, screw_axes: Vec<Vector6<f64>>) -> Result<Self> {
        if screw_axes.is_empty() {
            return Err(Error::Parse("model has no screw axes".into()));
        }
        Ok(Self { home, screw_axes })
    }

    /// Built-in six-DOF ViperX-300s arm (meters, radians, space-frame axes).
    pub fn vx300s() -> Self {
        let home = Matrix4::new(
            1.0, 0.0, 0.0, 0.536494, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.42705, //
            0.0, 0.0, 0.0, 1.0,
        );
        let screw_axes = vec![
            Vector6::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0),
            Vector6::new(0.0, 1.0, 0.0, -0.12705, 0.0, 0.0),
            Vector6::new(0.0, 1.0, 0.0, -0.42705, 0.0, 0.05955),
            Vector6::new(1.0, 0.0, 0.0, 0.0, 0.42705, 0.0),
            Vector6::new(0.0, 1.0, 0.0, -0.42705, 0.0, 0.35955),
            Vector6::new(1.0, 0.0, 0.0, 0.0, 0.42705, 0.0),
        ];
        Self { home, screw_axes }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let file: ModelFile = serde_yaml::from_str(raw).map_err(|e| Error::Parse(e.to_string()))?;
        let home = Matrix4::from_fn(|r, c| file.home[r][c]);
        let screw_axes = file
            .screw_axes
            .iter()
            .map(|s| Vector6::from_row_slice(s))
            .collect();
        Self::new(home, screw_axes)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("reading model {}: {e}", path.display())))?;
        let model = Self::from_yaml_str(&raw)?;
        tracing::debug!(path = %path.display(), dof = model.dof(), "loaded kinematic model");
        Ok(model)
    }

    /// Number of actuated joints.
    pub fn dof(&self) -> usize {
        self.screw_axes.len()
    }

    pub fn home(&self) -> &Matrix4<f64> {
        &self.home
    }

    /// End-effector pose for one joint-angle vector, space-form
    /// product of exponentials: `exp([S1]t1) ... exp([Sn]tn) * M`.
    ///
    /// Pure in `(angles, model)`; angles in radians.
    pub fn forward_kinematics(&self, angles: &[f64]) -> Result<Matrix4<f64>> {
        if angles.len() != self.screw_axes.len() {
            return Err(Error::ShapeMismatch {
                expected: self.screw_axes.len(),
                got: angles.len(),
            });
        }
        let mut pose: Matrix4<f64> = Matrix4::identity();
        for (axis, &theta) in self.screw_axes.iter().zip(angles) {
            pose *= twist_exp(axis, theta);
        }
        Ok(pose * self.home)
    }

    /// One pose per input angle vector, in order.
    pub fn pose_sequence(&self, angle_rows: &[Vec<f64>]) -> Result<Vec<Matrix4<f64>>> {
        angle_rows
            .iter()
            .map(|row| self.forward_kinematics(row))
            .collect()
    }
}

/// Translation component of a homogeneous transform.
pub fn pose_position(pose: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(pose[(0, 3)], pose[(1, 3)], pose[(2, 3)])
}

/// Closed-form exponential of a scaled twist `[S] * theta`.
///
/// Axes follow the usual normalization: unit angular velocity for revolute
/// joints, zero angular part and unit linear velocity for prismatic ones.
fn twist_exp(axis: &Vector6<f64>, theta: f64) -> Matrix4<f64> {
    let w = Vector3::new(axis[0], axis[1], axis[2]);
    let v = Vector3::new(axis[3], axis[4], axis[5]);
    let mut out = Matrix4::identity();

    if w.norm() < 1e-9 {
        out.fixed_view_mut::<3, 1>(0, 3).copy_from(&(v * theta));
        return out;
    }

    let w_hat = skew(&w);
    let w_hat_sq = w_hat * w_hat;
    let rot = Matrix3::identity() + w_hat * theta.sin() + w_hat_sq * (1.0 - theta.cos());
    let trans = (Matrix3::identity() * theta
        + w_hat * (1.0 - theta.cos())
        + w_hat_sq * (theta - theta.sin()))
        * v;
    out.fixed_view_mut::<3, 3>(0, 0).copy_from(&rot);
    out.fixed_view_mut::<3, 1>(0, 3).copy_from(&trans);
    out
}

fn skew(w: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -w[2], w[1], //
        w[2], 0.0, -w[0], //
        -w[1], w[0], 0.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn single_revolute_z() -> KinematicModel {
        // One joint rotating about base z, tool 1 m out along x.
        let mut home = Matrix4::identity();
        home[(0, 3)] = 1.0;
        KinematicModel::new(home, vec![Vector6::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0)]).unwrap()
    }

    #[test]
    fn test_zero_angles_reproduce_home() {
        let model = KinematicModel::vx300s();
        let pose = model.forward_kinematics(&[0.0; 6]).unwrap();
        let p = pose_position(&pose);
        assert_relative_eq!(p[0], 0.536494, epsilon = 1e-12);
        assert_relative_eq!(p[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(p[2], 0.42705, epsilon = 1e-12);
    }

    #[test]
    fn test_one_pose_per_angle_vector() {
        let model = KinematicModel::vx300s();
        let rows = vec![vec![0.0; 6], vec![0.1; 6], vec![-0.2; 6]];
        let poses = model.pose_sequence(&rows).unwrap();
        assert_eq!(poses.len(), rows.len());
    }

    #[test]
    fn test_revolute_quarter_turn() {
        let model = single_revolute_z();
        let pose = model.forward_kinematics(&[FRAC_PI_2]).unwrap();
        let p = pose_position(&pose);
        assert_relative_eq!(p[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(p[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(p[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_prismatic_axis_translates() {
        let model = KinematicModel::new(
            Matrix4::identity(),
            vec![Vector6::new(0.0, 0.0, 0.0, 0.0, 0.0, 1.0)],
        )
        .unwrap();
        let pose = model.forward_kinematics(&[0.25]).unwrap();
        assert_relative_eq!(pose_position(&pose)[2], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let model = KinematicModel::vx300s();
        let err = model.forward_kinematics(&[0.0; 4]).unwrap_err();
        match err {
            Error::ShapeMismatch { expected, got } => {
                assert_eq!(expected, 6);
                assert_eq!(got, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_yaml_model_round_trip() {
        let raw = r#"
home:
  - [1.0, 0.0, 0.0, 0.5]
  - [0.0, 1.0, 0.0, 0.0]
  - [0.0, 0.0, 1.0, 0.4]
  - [0.0, 0.0, 0.0, 1.0]
screw_axes:
  - [0.0, 0.0, 1.0, 0.0, 0.0, 0.0]
  - [0.0, 1.0, 0.0, -0.1, 0.0, 0.0]
"#;
        let model = KinematicModel::from_yaml_str(raw).unwrap();
        assert_eq!(model.dof(), 2);
        let p = pose_position(&model.forward_kinematics(&[0.0, 0.0]).unwrap());
        assert_relative_eq!(p[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(p[2], 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_model_rejected() {
        assert!(KinematicModel::new(Matrix4::identity(), Vec::new()).is_err());
    }
}
