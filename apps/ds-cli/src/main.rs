use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use arm_kinematics::{CalibrationRegistry, KinematicModel};
use demo_pipeline::{convert, ArmSide, ConvertOptions, SourceKind};
use episode_store::DEFAULT_SPLIT_SEED;

#[derive(Parser, Debug)]
#[command(
    name = "ds",
    version,
    about = "Demoset: convert raw teleoperation captures into a training dataset",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum DataType {
    Hand,
    Robot,
}

impl From<DataType> for SourceKind {
    fn from(value: DataType) -> Self {
        match value {
            DataType::Hand => SourceKind::Hand,
            DataType::Robot => SourceKind::Robot,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Arm {
    Left,
    Right,
}

impl From<Arm> for ArmSide {
    fn from(value: Arm) -> Self {
        match value {
            Arm::Left => ArmSide::Left,
            Arm::Right => ArmSide::Right,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a directory of raw episode captures into one dataset container
    Convert {
        /// Directory holding episode_<n>.npz capture files
        #[arg(long)]
        dataset: PathBuf,
        /// Which arm's joint block to convert
        #[arg(long, value_enum)]
        arm: Arm,
        /// Calibration key naming the capture rig
        #[arg(long)]
        extrinsics: String,
        /// Output container path (.npz)
        #[arg(long)]
        out: PathBuf,
        /// Source of the captures
        #[arg(long = "data-type", value_enum)]
        data_type: DataType,
        /// Validation fraction of the demo set
        #[arg(long, default_value_t = 0.2, value_parser = parse_ratio)]
        val_ratio: f64,
        /// Seed for the train/val partition
        #[arg(long, default_value_t = DEFAULT_SPLIT_SEED)]
        split_seed: u64,
        /// Input stream name for the front camera
        #[arg(long, default_value = "cam_high")]
        front_camera: String,
        /// Input stream name for the wrist camera
        #[arg(long, default_value = "cam_right_wrist")]
        wrist_camera: String,
        /// Environment arguments recorded with the dataset (JSON)
        #[arg(long, default_value = "{}")]
        env_args: String,
        /// YAML file extending or overriding the built-in calibrations
        #[arg(long)]
        calib_file: Option<PathBuf>,
        /// YAML kinematic model instead of the built-in arm
        #[arg(long)]
        model_file: Option<PathBuf>,
    },
    /// List the known calibration keys
    CalibList {
        /// YAML file extending or overriding the built-in calibrations
        #[arg(long)]
        calib_file: Option<PathBuf>,
    },
}

fn parse_ratio(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    if value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(format!("validation ratio must be in (0, 1), got {value}"))
    }
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

fn load_registry(calib_file: Option<&PathBuf>) -> Result<CalibrationRegistry> {
    let mut registry = CalibrationRegistry::builtin();
    if let Some(path) = calib_file {
        registry
            .merge_yaml_file(path)
            .with_context(|| format!("loading calibrations from {}", path.display()))?;
    }
    Ok(registry)
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            dataset,
            arm,
            extrinsics,
            out,
            data_type,
            val_ratio,
            split_seed,
            front_camera,
            wrist_camera,
            env_args,
            calib_file,
            model_file,
        } => {
            let model = match model_file {
                Some(path) => KinematicModel::from_yaml_file(&path)
                    .with_context(|| format!("loading model from {}", path.display()))?,
                None => KinematicModel::vx300s(),
            };
            let registry = load_registry(calib_file.as_ref())?;
            let env_args: serde_json::Value =
                serde_json::from_str(&env_args).context("parsing --env-args")?;

            let mut opts = ConvertOptions::new(
                dataset,
                out,
                SourceKind::from(data_type),
                ArmSide::from(arm),
                extrinsics,
            );
            opts.val_ratio = val_ratio;
            opts.split_seed = split_seed;
            opts.front_camera = front_camera;
            opts.wrist_camera = wrist_camera;
            opts.env_args = env_args;

            let report = convert(&opts, &model, &registry)?;
            info!(container = %report.out_path.display(), "dataset written");
            println!(
                "Successful conversion: {} demos ({} train / {} val) -> {}",
                report.demos,
                report.train,
                report.val,
                report.out_path.display()
            );
        }
        Commands::CalibList { calib_file } => {
            let registry = load_registry(calib_file.as_ref())?;
            for key in registry.keys() {
                println!("{key}");
            }
        }
    }
    Ok(())
}
