use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("corrupt input {}: {reason}", path.display())]
    CorruptInput { path: PathBuf, reason: String },
    #[error("duplicate demo index {index}")]
    DuplicateDemoIndex { index: u64 },
    #[error("no demos in dataset, nothing to split")]
    EmptyDataset,
    #[error("I/O error at {}: {reason}", path.display())]
    Io { path: PathBuf, reason: String },
}
