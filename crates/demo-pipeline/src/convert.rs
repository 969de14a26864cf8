use crate::features::{derive_features, EpisodeFeatures};
use crate::source::{ArmSide, SourceKind};
use crate::Result;
use arm_kinematics::{CalibrationRegistry, KinematicModel};
use episode_store::{
    load_image_stream, scan_episode_dir, split_train_val, validate_episodes, DatasetWriter,
    DemoRecord, DEFAULT_SPLIT_SEED,
};
use rayon::prelude::*;
use std::path::PathBuf;

/// Everything one conversion run needs besides the shared model and
/// calibration registry.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub dataset_dir: PathBuf,
    pub out_path: PathBuf,
    pub source: SourceKind,
    pub arm: ArmSide,
    pub calibration_key: String,
    /// Input stream names for the two exported cameras.
    pub front_camera: String,
    pub wrist_camera: String,
    pub val_ratio: f64,
    pub split_seed: u64,
    /// Opaque environment arguments recorded with the dataset.
    pub env_args: serde_json::Value,
}

impl ConvertOptions {
    pub fn new(
        dataset_dir: impl Into<PathBuf>,
        out_path: impl Into<PathBuf>,
        source: SourceKind,
        arm: ArmSide,
        calibration_key: impl Into<String>,
    ) -> Self {
        Self {
            dataset_dir: dataset_dir.into(),
            out_path: out_path.into(),
            source,
            arm,
            calibration_key: calibration_key.into(),
            front_camera: "cam_high".to_string(),
            wrist_camera: "cam_right_wrist".to_string(),
            val_ratio: 0.2,
            split_seed: DEFAULT_SPLIT_SEED,
            env_args: serde_json::json!({}),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConvertReport {
    pub out_path: PathBuf,
    pub demos: usize,
    pub train: usize,
    pub val: usize,
}

/// Run the full conversion: validate every episode, derive features in
/// parallel, funnel demos through the single container writer, then
/// partition.
///
/// All-or-nothing: the first failure anywhere aborts the run, and no
/// container appears at `out_path` unless every stage succeeded.
pub fn convert(
    opts: &ConvertOptions,
    model: &KinematicModel,
    registry: &CalibrationRegistry,
) -> Result<ConvertReport> {
    // Resolve the rig before touching any input.
    let calib = registry.get(&opts.calibration_key)?;
    let cameras = [opts.front_camera.clone(), opts.wrist_camera.clone()];

    let files = scan_episode_dir(&opts.dataset_dir)?;
    tracing::info!(
        candidates = files.len(),
        dir = %opts.dataset_dir.display(),
        source = opts.source.tag(),
        arm = opts.arm.as_str(),
        "starting conversion"
    );

    // Every episode must open and shape-check before any output exists.
    validate_episodes(&files, &cameras)?;

    // Data-parallel feature pass over the joint series; image streams are
    // not touched here.
    let features: Vec<EpisodeFeatures> = files
        .par_iter()
        .map(|file| derive_features(file, model, calib, opts.source, opts.arm))
        .collect::<Result<_>>()?;

    // Single-writer funnel; one episode's images in memory at a time.
    let mut writer = DatasetWriter::create(&opts.out_path, opts.env_args.clone())?;
    for (file, features) in files.iter().zip(features) {
        let front_img = load_image_stream(&file.path, &opts.front_camera)?;
        let wrist_img = load_image_stream(&file.path, &opts.wrist_camera)?;
        writer.write_demo(&DemoRecord {
            index: file.index,
            label: opts.source.label(),
            label_tag: opts.source.tag().to_string(),
            num_samples: features.num_samples,
            front_img,
            wrist_img,
            joint_positions: features.joint_positions,
            ee_pose: features.ee_pose,
            actions: features.actions,
            actions_joints: features.actions_joints,
            actions_xyz: features.actions_xyz,
        })?;
    }

    // The partition needs the final demo set, so it runs strictly last.
    let indices = writer.demo_indices();
    let split = split_train_val(&indices, opts.val_ratio, opts.split_seed)?;
    let out_path = writer.finish(&split)?;

    let report = ConvertReport {
        out_path,
        demos: indices.len(),
        train: split.train.len(),
        val: split.val.len(),
    };
    tracing::info!(
        demos = report.demos,
        train = report.train,
        val = report.val,
        "conversion complete"
    );
    Ok(report)
}
