//! arm-kinematics: robot kinematic model, forward kinematics, and camera extrinsics

mod error;
pub use error::{Error, Result};

mod model;
pub use model::{pose_position, KinematicModel};

mod extrinsics;
pub use extrinsics::{CalibrationRegistry, ExtrinsicCalibration};
