use crate::source::{ArmSide, SourceKind, ARM_COLUMNS};
use crate::trajectory::future_trajectories;
use crate::{Error, Result};
use arm_kinematics::{pose_position, ExtrinsicCalibration, KinematicModel};
use episode_store::{load_joint_series, EpisodeFile};
use nalgebra::Vector3;
use ndarray::{s, Array2};

/// Numeric features derived from one episode's joint series.
///
/// `ee_pose` comes from the *measured* joint positions, `actions_xyz` from
/// the *commanded* targets; the two kinematics passes are intentionally
/// separate (commanded targets lead measured state in time, and collapsing
/// them would change the training labels).
#[derive(Debug, Clone)]
pub struct EpisodeFeatures {
    pub index: u64,
    pub num_samples: usize,
    pub joint_positions: Array2<f64>,
    pub ee_pose: Array2<f64>,
    pub actions: Array2<f64>,
    pub actions_joints: Array2<f64>,
    pub actions_xyz: Array2<f64>,
}

/// Run kinematics, frame transform, and window labeling for one episode.
///
/// Reads only the joint series; image streams are left for the container
/// writer. Safe to call from parallel workers: `model` and `calib` are
/// shared read-only.
pub fn derive_features(
    file: &EpisodeFile,
    model: &KinematicModel,
    calib: &ExtrinsicCalibration,
    source: SourceKind,
    arm: ArmSide,
) -> Result<EpisodeFeatures> {
    let dof = model.dof();
    if dof > ARM_COLUMNS {
        return Err(Error::Config(format!(
            "model has {dof} joints, arm block holds {ARM_COLUMNS}"
        )));
    }

    let (qpos, action) = load_joint_series(&file.path)?;
    let offset = arm.column_offset();
    let cols = qpos.ncols();
    if cols < offset + ARM_COLUMNS {
        return Err(Error::Store(episode_store::Error::CorruptInput {
            path: file.path.clone(),
            reason: format!(
                "{cols} joint columns cannot hold the {} arm block ({}..{})",
                arm.as_str(),
                offset,
                offset + ARM_COLUMNS
            ),
        }));
    }

    let measured = camera_positions(&qpos, offset, model, calib)?;
    let commanded = camera_positions(&action, offset, model, calib)?;
    let actions = future_trajectories(&measured, source.sampling());

    Ok(EpisodeFeatures {
        index: file.index,
        num_samples: qpos.nrows(),
        joint_positions: arm_block(&qpos, offset),
        ee_pose: positions_to_array(&measured),
        actions,
        actions_joints: arm_block(&action, offset),
        actions_xyz: positions_to_array(&commanded),
    })
}

/// FK over the arm's actuated joints, re-expressed in the camera frame.
fn camera_positions(
    joints: &Array2<f64>,
    offset: usize,
    model: &KinematicModel,
    calib: &ExtrinsicCalibration,
) -> Result<Vec<Vector3<f64>>> {
    let dof = model.dof();
    let mut out = Vec::with_capacity(joints.nrows());
    for row in joints.rows() {
        let angles: Vec<f64> = row.iter().skip(offset).take(dof).copied().collect();
        let pose = model.forward_kinematics(&angles)?;
        out.push(calib.apply(&pose_position(&pose)));
    }
    Ok(out)
}

/// The selected arm's column block, gripper included.
fn arm_block(joints: &Array2<f64>, offset: usize) -> Array2<f64> {
    joints.slice(s![.., offset..offset + ARM_COLUMNS]).to_owned()
}

fn positions_to_array(positions: &[Vector3<f64>]) -> Array2<f64> {
    Array2::from_shape_fn((positions.len(), 3), |(i, j)| positions[i][j])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use arm_kinematics::CalibrationRegistry;
    use episode_store::RawEpisode;
    use ndarray::Array4;
    use std::collections::BTreeMap;

    fn episode_on_disk(dir: &std::path::Path, index: u64, t: usize) -> EpisodeFile {
        let path = dir.join(format!("episode_{index}.npz"));
        let qpos = Array2::from_shape_fn((t, 14), |(r, c)| 0.01 * r as f64 + 0.001 * c as f64);
        let action = &qpos + 0.005;
        let mut camera_images = BTreeMap::new();
        camera_images.insert("cam_high".to_string(), Array4::zeros((t, 4, 6, 3)));
        RawEpisode {
            commanded_actions: action,
            joint_positions: qpos.clone(),
            joint_velocities: Array2::zeros((t, 14)),
            joint_efforts: Array2::zeros((t, 14)),
            camera_images,
        }
        .save(&path)
        .unwrap();
        EpisodeFile { index, path }
    }

    #[test]
    fn test_features_use_right_arm_block() {
        let dir = tempfile::tempdir().unwrap();
        let file = episode_on_disk(dir.path(), 0, 6);
        let model = KinematicModel::vx300s();
        let registry = CalibrationRegistry::builtin();
        let calib = registry.get("overhead_v1").unwrap();

        let feat =
            derive_features(&file, &model, calib, SourceKind::Robot, ArmSide::Right).unwrap();
        assert_eq!(feat.num_samples, 6);
        assert_eq!(feat.joint_positions.dim(), (6, 7));
        assert_eq!(feat.ee_pose.dim(), (6, 3));
        assert_eq!(feat.actions.dim(), (6, 30));
        assert_eq!(feat.actions_joints.dim(), (6, 7));
        assert_eq!(feat.actions_xyz.dim(), (6, 3));

        // Right-arm block starts at column 7.
        assert_relative_eq!(feat.joint_positions[(0, 0)], 0.007, epsilon = 1e-12);

        // ee_pose row 0 must match FK + transform over qpos[0, 7..13].
        let angles: Vec<f64> = (7..13).map(|c| 0.001 * c as f64).collect();
        let expected = calib.apply(&pose_position(
            &model.forward_kinematics(&angles).unwrap(),
        ));
        for j in 0..3 {
            assert_relative_eq!(feat.ee_pose[(0, j)], expected[j], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_measured_and_commanded_passes_differ() {
        let dir = tempfile::tempdir().unwrap();
        let file = episode_on_disk(dir.path(), 1, 4);
        let model = KinematicModel::vx300s();
        let registry = CalibrationRegistry::builtin();
        let calib = registry.get("overhead_v1").unwrap();

        let feat = derive_features(&file, &model, calib, SourceKind::Hand, ArmSide::Right).unwrap();
        // Commanded targets are offset from measured joints, so the two
        // kinematics passes cannot coincide.
        assert_ne!(feat.ee_pose, feat.actions_xyz);
    }

    #[test]
    fn test_narrow_episode_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode_2.npz");
        let mut camera_images = BTreeMap::new();
        camera_images.insert("cam_high".to_string(), Array4::zeros((3, 4, 6, 3)));
        RawEpisode {
            commanded_actions: Array2::zeros((3, 8)),
            joint_positions: Array2::zeros((3, 8)),
            joint_velocities: Array2::zeros((3, 8)),
            joint_efforts: Array2::zeros((3, 8)),
            camera_images,
        }
        .save(&path)
        .unwrap();
        let file = EpisodeFile { index: 2, path };

        let model = KinematicModel::vx300s();
        let registry = CalibrationRegistry::builtin();
        let calib = registry.get("overhead_v1").unwrap();
        let err =
            derive_features(&file, &model, calib, SourceKind::Robot, ArmSide::Right).unwrap_err();
        assert!(matches!(
            err,
            Error::Store(episode_store::Error::CorruptInput { .. })
        ));
    }
}
