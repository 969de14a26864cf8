use crate::{Error, Result};
use ndarray::{Array2, Array4};
use ndarray_npy::{NpzReader, NpzWriter};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Filename prefix that marks a capture file as an episode.
pub const EPISODE_PREFIX: &str = "episode_";

const EPISODE_SUFFIX: &str = ".npz";

const ACTION_ENTRY: &str = "action";
const QPOS_ENTRY: &str = "observations/qpos";
const QVEL_ENTRY: &str = "observations/qvel";
const EFFORT_ENTRY: &str = "observations/effort";
const IMAGES_PREFIX: &str = "observations/images";

/// A candidate episode file, keyed by the index parsed from its filename.
#[derive(Debug, Clone)]
pub struct EpisodeFile {
    pub index: u64,
    pub path: PathBuf,
}

/// Parse the demo index out of an episode filename.
///
/// Accepts only `episode_<number>.npz`; anything else is not a candidate.
pub fn episode_index_from_name(name: &str) -> Option<u64> {
    let digits = name
        .strip_prefix(EPISODE_PREFIX)?
        .strip_suffix(EPISODE_SUFFIX)?;
    digits.parse().ok()
}

/// One capture session, loaded whole. Immutable after loading; all
/// time-indexed arrays share the leading length `T`.
#[derive(Debug, Clone)]
pub struct RawEpisode {
    pub commanded_actions: Array2<f64>,
    pub joint_positions: Array2<f64>,
    pub joint_velocities: Array2<f64>,
    pub joint_efforts: Array2<f64>,
    pub camera_images: BTreeMap<String, Array4<u8>>,
}

impl RawEpisode {
    /// Open and fully shape-check one episode container.
    ///
    /// `cameras` names the image streams that must be present.
    pub fn load(path: &Path, cameras: &[String]) -> Result<Self> {
        let mut npz = open_npz(path)?;
        let names = entry_names(&mut npz, path)?;

        let commanded_actions = read_f64_2d(&mut npz, &names, ACTION_ENTRY, path)?;
        let joint_positions = read_f64_2d(&mut npz, &names, QPOS_ENTRY, path)?;
        let joint_velocities = read_f64_2d(&mut npz, &names, QVEL_ENTRY, path)?;
        let joint_efforts = read_f64_2d(&mut npz, &names, EFFORT_ENTRY, path)?;

        let mut camera_images = BTreeMap::new();
        for cam in cameras {
            let entry = format!("{IMAGES_PREFIX}/{cam}");
            let images = read_u8_4d(&mut npz, &names, &entry, path)?;
            camera_images.insert(cam.clone(), images);
        }

        let episode = Self {
            commanded_actions,
            joint_positions,
            joint_velocities,
            joint_efforts,
            camera_images,
        };
        episode.check_shapes(path)?;
        Ok(episode)
    }

    /// Write an episode container (fixture generation and capture tooling).
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| io_err(path, &e))?;
        let mut npz = NpzWriter::new(BufWriter::new(file));
        npz.add_array(ACTION_ENTRY, &self.commanded_actions)
            .map_err(|e| io_err(path, &e))?;
        npz.add_array(QPOS_ENTRY, &self.joint_positions)
            .map_err(|e| io_err(path, &e))?;
        npz.add_array(QVEL_ENTRY, &self.joint_velocities)
            .map_err(|e| io_err(path, &e))?;
        npz.add_array(EFFORT_ENTRY, &self.joint_efforts)
            .map_err(|e| io_err(path, &e))?;
        for (cam, images) in &self.camera_images {
            npz.add_array(format!("{IMAGES_PREFIX}/{cam}").as_str(), images)
                .map_err(|e| io_err(path, &e))?;
        }
        let mut out = npz.finish().map_err(|e| io_err(path, &e))?;
        out.flush().map_err(|e| io_err(path, &e))?;
        Ok(())
    }

    pub fn num_samples(&self) -> usize {
        self.commanded_actions.nrows()
    }

    pub fn image(&self, camera: &str) -> Option<&Array4<u8>> {
        self.camera_images.get(camera)
    }

    fn check_shapes(&self, path: &Path) -> Result<()> {
        let t = self.commanded_actions.nrows();
        let j = self.commanded_actions.ncols();
        if t == 0 {
            return Err(corrupt(path, "episode has zero timesteps"));
        }
        for (name, arr) in [
            ("observations/qpos", &self.joint_positions),
            ("observations/qvel", &self.joint_velocities),
            ("observations/effort", &self.joint_efforts),
        ] {
            if arr.nrows() != t || arr.ncols() != j {
                return Err(corrupt(
                    path,
                    &format!(
                        "{name} is {}x{}, expected {t}x{j}",
                        arr.nrows(),
                        arr.ncols()
                    ),
                ));
            }
        }
        for (cam, images) in &self.camera_images {
            let shape = images.shape();
            if shape[0] != t {
                return Err(corrupt(
                    path,
                    &format!("camera '{cam}' has {} frames, expected {t}", shape[0]),
                ));
            }
            if shape[3] != 3 {
                return Err(corrupt(
                    path,
                    &format!("camera '{cam}' has {} channels, expected 3", shape[3]),
                ));
            }
        }
        Ok(())
    }
}

/// Read only the measured and commanded joint series of an episode.
///
/// The feature pass runs on `(qpos, action)` alone; image streams stay on
/// disk until the container write.
pub fn load_joint_series(path: &Path) -> Result<(Array2<f64>, Array2<f64>)> {
    let mut npz = open_npz(path)?;
    let names = entry_names(&mut npz, path)?;
    let qpos = read_f64_2d(&mut npz, &names, QPOS_ENTRY, path)?;
    let action = read_f64_2d(&mut npz, &names, ACTION_ENTRY, path)?;
    if qpos.nrows() != action.nrows() || qpos.ncols() != action.ncols() {
        return Err(corrupt(path, "qpos and action shapes disagree"));
    }
    if qpos.nrows() == 0 {
        return Err(corrupt(path, "episode has zero timesteps"));
    }
    Ok((qpos, action))
}

/// Load a named image stream from an episode container.
pub fn load_image_stream(path: &Path, camera: &str) -> Result<Array4<u8>> {
    let mut npz = open_npz(path)?;
    let names = entry_names(&mut npz, path)?;
    read_u8_4d(&mut npz, &names, &format!("{IMAGES_PREFIX}/{camera}"), path)
}

fn open_npz(path: &Path) -> Result<NpzReader<File>> {
    let file = File::open(path).map_err(|e| io_err(path, &e))?;
    NpzReader::new(file).map_err(|e| corrupt(path, &e.to_string()))
}

fn entry_names(npz: &mut NpzReader<File>, path: &Path) -> Result<Vec<String>> {
    npz.names().map_err(|e| corrupt(path, &e.to_string()))
}

/// Match a logical entry name against the archive listing, tolerating the
/// `.npy` suffix numpy-style archives carry.
pub(crate) fn find_entry(names: &[String], want: &str) -> Option<String> {
    names
        .iter()
        .find(|n| n.as_str() == want || n.strip_suffix(".npy") == Some(want))
        .cloned()
}

fn read_f64_2d(
    npz: &mut NpzReader<File>,
    names: &[String],
    entry: &str,
    path: &Path,
) -> Result<Array2<f64>> {
    let name =
        find_entry(names, entry).ok_or_else(|| corrupt(path, &format!("missing entry '{entry}'")))?;
    npz.by_name(&name)
        .map_err(|e| corrupt(path, &format!("entry '{entry}': {e}")))
}

fn read_u8_4d(
    npz: &mut NpzReader<File>,
    names: &[String],
    entry: &str,
    path: &Path,
) -> Result<Array4<u8>> {
    let name =
        find_entry(names, entry).ok_or_else(|| corrupt(path, &format!("missing entry '{entry}'")))?;
    npz.by_name(&name)
        .map_err(|e| corrupt(path, &format!("entry '{entry}': {e}")))
}

pub(crate) fn corrupt(path: &Path, reason: &str) -> Error {
    Error::CorruptInput {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

pub(crate) fn io_err(path: &Path, err: &dyn std::fmt::Display) -> Error {
    Error::Io {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Small synthetic episode for filesystem tests.
#[cfg(test)]
pub(crate) fn synthetic_episode(t: usize, j: usize, cameras: &[&str]) -> RawEpisode {
    let ramp =
        |offset: f64| Array2::from_shape_fn((t, j), move |(r, c)| offset + r as f64 * 0.01 + c as f64);
    let mut camera_images = BTreeMap::new();
    for cam in cameras {
        camera_images.insert(
            cam.to_string(),
            Array4::from_shape_fn((t, 4, 6, 3), |(f, h, w, c)| (f + h + w + c) as u8),
        );
    }
    RawEpisode {
        commanded_actions: ramp(100.0),
        joint_positions: ramp(0.0),
        joint_velocities: ramp(10.0),
        joint_efforts: ramp(50.0),
        camera_images,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_parsing() {
        assert_eq!(episode_index_from_name("episode_3.npz"), Some(3));
        assert_eq!(episode_index_from_name("episode_41.npz"), Some(41));
        assert_eq!(episode_index_from_name("episode_03.npz"), Some(3));
        assert_eq!(episode_index_from_name("notes.txt"), None);
        assert_eq!(episode_index_from_name("episode_x.npz"), None);
        assert_eq!(episode_index_from_name("episode_3.hdf5"), None);
        assert_eq!(episode_index_from_name("episode_.npz"), None);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode_0.npz");
        let cams = vec!["cam_high".to_string(), "cam_right_wrist".to_string()];
        let episode = synthetic_episode(5, 14, &["cam_high", "cam_right_wrist"]);
        episode.save(&path).unwrap();

        let loaded = RawEpisode::load(&path, &cams).unwrap();
        assert_eq!(loaded.num_samples(), 5);
        assert_eq!(loaded.joint_positions, episode.joint_positions);
        assert_eq!(loaded.image("cam_high").unwrap().shape(), &[5, 4, 6, 3]);
    }

    #[test]
    fn test_joint_series_skips_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode_1.npz");
        synthetic_episode(7, 14, &["cam_high"]).save(&path).unwrap();
        let (qpos, action) = load_joint_series(&path).unwrap();
        assert_eq!(qpos.dim(), (7, 14));
        assert_eq!(action.dim(), (7, 14));
    }

    #[test]
    fn test_unparseable_file_is_corrupt_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode_2.npz");
        std::fs::write(&path, b"not an archive").unwrap();
        let err = RawEpisode::load(&path, &[]).unwrap_err();
        assert!(matches!(err, Error::CorruptInput { .. }));
    }

    #[test]
    fn test_missing_camera_is_corrupt_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode_3.npz");
        synthetic_episode(4, 14, &["cam_high"]).save(&path).unwrap();
        let err = RawEpisode::load(&path, &["cam_left_wrist".to_string()]).unwrap_err();
        match err {
            Error::CorruptInput { reason, .. } => assert!(reason.contains("cam_left_wrist")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
