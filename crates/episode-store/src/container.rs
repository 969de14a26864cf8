use crate::episode::{corrupt, find_entry, io_err};
use crate::split::SplitAssignment;
use crate::{Error, Result};
use ndarray::{arr1, Array1, Array2, Array4};
use ndarray_npy::{NpzReader, NpzWriter};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// One converted episode, ready to be written to the output container.
///
/// `ee_pose` carries camera-frame end-effector positions derived from
/// *measured* joints; `actions_xyz` is the same derivation re-run over the
/// *commanded* joints. Records are never mutated after assembly.
#[derive(Debug, Clone)]
pub struct DemoRecord {
    pub index: u64,
    /// Stored source label: hand = 1, robot = 0.
    pub label: i64,
    /// Human-readable source tag for the metadata sidecar.
    pub label_tag: String,
    pub num_samples: usize,
    pub front_img: Array4<u8>,
    pub wrist_img: Array4<u8>,
    pub joint_positions: Array2<f64>,
    pub ee_pose: Array2<f64>,
    pub actions: Array2<f64>,
    pub actions_joints: Array2<f64>,
    pub actions_xyz: Array2<f64>,
}

/// Per-demo attributes kept in the metadata sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoMeta {
    pub num_samples: usize,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitMeta {
    pub seed: u64,
    pub val_ratio: f64,
    pub train: usize,
    pub val: usize,
}

/// Container attributes: what the archive itself cannot hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// Opaque environment-arguments pass-through for the training side.
    pub env_args: serde_json::Value,
    pub demos: BTreeMap<String, DemoMeta>,
    pub split: Option<SplitMeta>,
}

/// Sidecar path for a container: `foo.npz` -> `foo.meta.json`.
pub fn sidecar_path(out: &Path) -> PathBuf {
    out.with_extension("meta.json")
}

/// Single-writer output container.
///
/// Entries go into a stored (uncompressed) `.npz` archive, so every image
/// frame sits at a fixed byte stride and is seekable without unpacking the
/// stream. The archive is written to a temp path and renamed into place on
/// `finish`; an aborted run leaves nothing at the output path.
pub struct DatasetWriter {
    npz: Option<NpzWriter<BufWriter<File>>>,
    tmp_path: PathBuf,
    out_path: PathBuf,
    meta: DatasetMetadata,
    indices: BTreeSet<u64>,
}

impl DatasetWriter {
    pub fn create(out_path: &Path, env_args: serde_json::Value) -> Result<Self> {
        let tmp_path = out_path.with_extension("npz.tmp");
        let file = File::create(&tmp_path).map_err(|e| io_err(&tmp_path, &e))?;
        Ok(Self {
            npz: Some(NpzWriter::new(BufWriter::new(file))),
            tmp_path,
            out_path: out_path.to_path_buf(),
            meta: DatasetMetadata {
                env_args,
                demos: BTreeMap::new(),
                split: None,
            },
            indices: BTreeSet::new(),
        })
    }

    /// Append one demo group. Writing an index that already exists in the
    /// container is fatal; groups are never overwritten.
    pub fn write_demo(&mut self, demo: &DemoRecord) -> Result<()> {
        if !self.indices.insert(demo.index) {
            return Err(Error::DuplicateDemoIndex { index: demo.index });
        }
        let group = format!("data/demo_{}", demo.index);
        {
            let tmp = self.tmp_path.clone();
            let npz = self.writer()?;
            npz.add_array(format!("{group}/label").as_str(), &arr1(&[demo.label]))
                .map_err(|e| io_err(&tmp, &e))?;
            npz.add_array(format!("{group}/obs/front_img").as_str(), &demo.front_img)
                .map_err(|e| io_err(&tmp, &e))?;
            npz.add_array(format!("{group}/obs/wrist_img").as_str(), &demo.wrist_img)
                .map_err(|e| io_err(&tmp, &e))?;
            let planes: [(&str, &Array2<f64>); 5] = [
                ("obs/joint_positions", &demo.joint_positions),
                ("obs/ee_pose", &demo.ee_pose),
                ("actions", &demo.actions),
                ("actions_joints", &demo.actions_joints),
                ("actions_xyz", &demo.actions_xyz),
            ];
            for (name, arr) in planes {
                npz.add_array(format!("{group}/{name}").as_str(), arr)
                    .map_err(|e| io_err(&tmp, &e))?;
            }
        }
        self.meta.demos.insert(
            format!("demo_{}", demo.index),
            DemoMeta {
                num_samples: demo.num_samples,
                label: demo.label_tag.clone(),
            },
        );
        tracing::info!(group = %group, samples = demo.num_samples, "wrote demo");
        Ok(())
    }

    /// Indices of all demos written so far, ascending.
    pub fn demo_indices(&self) -> Vec<u64> {
        self.indices.iter().copied().collect()
    }

    /// Attach the split filter lists, seal the archive, and move it into
    /// place. The sidecar is written last, next to the container.
    pub fn finish(mut self, split: &SplitAssignment) -> Result<PathBuf> {
        match self.finish_inner(split) {
            Ok(path) => Ok(path),
            Err(e) => {
                let _ = fs::remove_file(&self.tmp_path);
                let _ = fs::remove_file(sidecar_path(&self.out_path));
                Err(e)
            }
        }
    }

    fn finish_inner(&mut self, split: &SplitAssignment) -> Result<PathBuf> {
        {
            let tmp = self.tmp_path.clone();
            let npz = self.writer()?;
            npz.add_array("mask/train", &Array1::from(split.train.clone()))
                .map_err(|e| io_err(&tmp, &e))?;
            npz.add_array("mask/val", &Array1::from(split.val.clone()))
                .map_err(|e| io_err(&tmp, &e))?;
        }
        let npz = self.npz.take().ok_or_else(|| Error::Io {
            path: self.tmp_path.clone(),
            reason: "container already sealed".into(),
        })?;
        let buf = npz.finish().map_err(|e| io_err(&self.tmp_path, &e))?;
        buf.into_inner().map_err(|e| io_err(&self.tmp_path, &e))?;

        self.meta.split = Some(SplitMeta {
            seed: split.seed,
            val_ratio: split.ratio,
            train: split.train.len(),
            val: split.val.len(),
        });

        // Sidecar first, rename last: the container only appears at the
        // output path once everything around it is in place.
        let meta_path = sidecar_path(&self.out_path);
        let json = serde_json::to_string_pretty(&self.meta)
            .map_err(|e| io_err(&meta_path, &e))?;
        fs::write(&meta_path, json).map_err(|e| io_err(&meta_path, &e))?;
        fs::rename(&self.tmp_path, &self.out_path).map_err(|e| io_err(&self.out_path, &e))?;
        tracing::info!(
            container = %self.out_path.display(),
            demos = self.indices.len(),
            "dataset sealed"
        );
        Ok(self.out_path.clone())
    }

    fn writer(&mut self) -> Result<&mut NpzWriter<BufWriter<File>>> {
        self.npz.as_mut().ok_or_else(|| Error::Io {
            path: self.tmp_path.clone(),
            reason: "container already sealed".into(),
        })
    }
}

impl Drop for DatasetWriter {
    fn drop(&mut self) {
        // An unsealed writer means the run aborted; drop the partial archive.
        if let Some(npz) = self.npz.take() {
            drop(npz);
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// Read-side view of a sealed container (downstream loaders and tests).
pub struct DatasetReader {
    npz: NpzReader<File>,
    names: Vec<String>,
    path: PathBuf,
}

impl DatasetReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| io_err(path, &e))?;
        let mut npz = NpzReader::new(file).map_err(|e| corrupt(path, &e.to_string()))?;
        let names = npz.names().map_err(|e| corrupt(path, &e.to_string()))?;
        Ok(Self {
            npz,
            names,
            path: path.to_path_buf(),
        })
    }

    /// Logical entry names, `.npy` suffixes stripped.
    pub fn entry_names(&self) -> Vec<String> {
        self.names
            .iter()
            .map(|n| n.strip_suffix(".npy").unwrap_or(n).to_string())
            .collect()
    }

    /// Demo indices present under `data/`, ascending.
    pub fn demo_indices(&self) -> Vec<u64> {
        self.entry_names()
            .iter()
            .filter_map(|n| n.strip_prefix("data/demo_"))
            .filter_map(|rest| rest.split('/').next())
            .filter_map(|digits| digits.parse().ok())
            .collect::<BTreeSet<u64>>()
            .into_iter()
            .collect()
    }

    pub fn array2_f64(&mut self, entry: &str) -> Result<Array2<f64>> {
        let name = self.resolve(entry)?;
        self.npz
            .by_name(&name)
            .map_err(|e| corrupt(&self.path, &format!("entry '{entry}': {e}")))
    }

    pub fn array1_i64(&mut self, entry: &str) -> Result<Array1<i64>> {
        let name = self.resolve(entry)?;
        self.npz
            .by_name(&name)
            .map_err(|e| corrupt(&self.path, &format!("entry '{entry}': {e}")))
    }

    pub fn array1_u64(&mut self, entry: &str) -> Result<Array1<u64>> {
        let name = self.resolve(entry)?;
        self.npz
            .by_name(&name)
            .map_err(|e| corrupt(&self.path, &format!("entry '{entry}': {e}")))
    }

    pub fn array4_u8(&mut self, entry: &str) -> Result<Array4<u8>> {
        let name = self.resolve(entry)?;
        self.npz
            .by_name(&name)
            .map_err(|e| corrupt(&self.path, &format!("entry '{entry}': {e}")))
    }

    /// Load the metadata sidecar for this container.
    pub fn metadata(&self) -> Result<DatasetMetadata> {
        let meta_path = sidecar_path(&self.path);
        let raw = fs::read_to_string(&meta_path).map_err(|e| io_err(&meta_path, &e))?;
        serde_json::from_str(&raw).map_err(|e| corrupt(&meta_path, &e.to_string()))
    }

    fn resolve(&self, entry: &str) -> Result<String> {
        find_entry(&self.names, entry)
            .ok_or_else(|| corrupt(&self.path, &format!("missing entry '{entry}'")))
    }
}
