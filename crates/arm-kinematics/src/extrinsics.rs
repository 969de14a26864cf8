use crate::{Error, Result};
use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Rigid transform taking robot-base-frame points into a camera frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtrinsicCalibration {
    /// Row-major 3x3 rotation.
    pub rotation: [[f64; 3]; 3],
    /// Translation, meters.
    pub translation: [f64; 3],
}

impl ExtrinsicCalibration {
    pub fn from_parts(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let mut r = [[0.0; 3]; 3];
        for (i, row) in r.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = rotation[(i, j)];
            }
        }
        Self {
            rotation: r,
            translation: [translation[0], translation[1], translation[2]],
        }
    }

    pub fn rotation(&self) -> Matrix3<f64> {
        Matrix3::from_fn(|r, c| self.rotation[r][c])
    }

    pub fn translation(&self) -> Vector3<f64> {
        Vector3::from_row_slice(&self.translation)
    }

    /// Re-express one base-frame point in the camera frame.
    pub fn apply(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation() * point + self.translation()
    }

    /// Re-express a sequence of base-frame points, independently per point.
    pub fn transform_points(&self, points: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        let rot = self.rotation();
        let t = self.translation();
        points.iter().map(|p| rot * p + t).collect()
    }

    /// Inverse rigid transform (camera frame back into the base frame).
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation().transpose();
        let t_inv = -(rot_inv * self.translation());
        Self::from_parts(rot_inv, t_inv)
    }
}

/// Named extrinsic calibrations, one per capture rig.
///
/// Built at startup (built-in rigs, optionally extended from a YAML file)
/// and threaded through calls as a plain value; never process-global.
#[derive(Debug, Clone, Default)]
pub struct CalibrationRegistry {
    rigs: BTreeMap<String, ExtrinsicCalibration>,
}

impl CalibrationRegistry {
    /// Registry of the known capture rigs.
    pub fn builtin() -> Self {
        let mut reg = Self::default();
        reg.insert(
            "overhead_v1",
            rig_from_euler(-2.0944, 0.0, -1.5708, [0.152, -0.036, 0.712]),
        );
        reg.insert(
            "overhead_v2",
            rig_from_euler(-2.0106, 0.0, -1.5708, [0.148, -0.031, 0.705]),
        );
        reg
    }

    pub fn insert(&mut self, name: impl Into<String>, calib: ExtrinsicCalibration) {
        self.rigs.insert(name.into(), calib);
    }

    pub fn get(&self, key: &str) -> Result<&ExtrinsicCalibration> {
        self.rigs.get(key).ok_or_else(|| Error::UnknownCalibration {
            key: key.to_string(),
            known: self.keys().join(", "),
        })
    }

    pub fn keys(&self) -> Vec<&str> {
        self.rigs.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.rigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rigs.is_empty()
    }

    /// Add (or override) rigs from a YAML map of name -> calibration.
    pub fn merge_yaml_str(&mut self, raw: &str) -> Result<()> {
        let rigs: BTreeMap<String, ExtrinsicCalibration> =
            serde_yaml::from_str(raw).map_err(|e| Error::Parse(e.to_string()))?;
        for (name, calib) in rigs {
            self.rigs.insert(name, calib);
        }
        Ok(())
    }

    pub fn merge_yaml_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("reading calibrations {}: {e}", path.display())))?;
        self.merge_yaml_str(&raw)?;
        tracing::debug!(path = %path.display(), rigs = self.rigs.len(), "merged calibration file");
        Ok(())
    }
}

fn rig_from_euler(roll: f64, pitch: f64, yaw: f64, translation: [f64; 3]) -> ExtrinsicCalibration {
    let rot = Rotation3::from_euler_angles(roll, pitch, yaw);
    ExtrinsicCalibration::from_parts(rot.into_inner(), Vector3::from_row_slice(&translation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_round_trip_through_inverse() {
        let reg = CalibrationRegistry::builtin();
        let calib = reg.get("overhead_v1").unwrap();
        let inv = calib.inverse();
        for p in [
            Vector3::new(0.3, -0.1, 0.2),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(-0.5, 0.7, 1.1),
        ] {
            let back = inv.apply(&calib.apply(&p));
            assert_relative_eq!(back[0], p[0], epsilon = 1e-12);
            assert_relative_eq!(back[1], p[1], epsilon = 1e-12);
            assert_relative_eq!(back[2], p[2], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_points_transform_independently() {
        let reg = CalibrationRegistry::builtin();
        let calib = reg.get("overhead_v2").unwrap();
        let pts = vec![Vector3::new(0.1, 0.2, 0.3), Vector3::new(-0.4, 0.0, 0.9)];
        let out = calib.transform_points(&pts);
        assert_eq!(out.len(), 2);
        for (single, batched) in pts.iter().map(|p| calib.apply(p)).zip(&out) {
            assert_relative_eq!(single[0], batched[0], epsilon = 1e-15);
            assert_relative_eq!(single[1], batched[1], epsilon = 1e-15);
            assert_relative_eq!(single[2], batched[2], epsilon = 1e-15);
        }
    }

    #[test]
    fn test_unknown_key_is_fatal_and_names_known_rigs() {
        let reg = CalibrationRegistry::builtin();
        let err = reg.get("garage_cam").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("garage_cam"));
        assert!(msg.contains("overhead_v1"));
    }

    #[test]
    fn test_yaml_merge_overrides_and_extends() {
        let mut reg = CalibrationRegistry::builtin();
        let raw = r#"
bench_cam:
  rotation:
    - [1.0, 0.0, 0.0]
    - [0.0, 1.0, 0.0]
    - [0.0, 0.0, 1.0]
  translation: [0.1, 0.2, 0.3]
"#;
        reg.merge_yaml_str(raw).unwrap();
        assert!(reg.get("bench_cam").is_ok());
        assert_eq!(reg.len(), 3);
        let p = reg.get("bench_cam").unwrap().apply(&Vector3::zeros());
        assert_relative_eq!(p[0], 0.1, epsilon = 1e-15);
    }
}
