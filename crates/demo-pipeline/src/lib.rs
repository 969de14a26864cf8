//! demo-pipeline: per-episode feature derivation and dataset conversion

mod error;
pub use error::{Error, Result};

mod source;
pub use source::{ArmSide, SourceKind, ARM_COLUMNS};

mod trajectory;
pub use trajectory::{future_trajectories, TrajectoryWindows, WindowParams};

mod features;
pub use features::{derive_features, EpisodeFeatures};

mod convert;
pub use convert::{convert, ConvertOptions, ConvertReport};
