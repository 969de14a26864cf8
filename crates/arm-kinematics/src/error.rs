use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("joint vector has {got} entries, model expects {expected}")]
    ShapeMismatch { expected: usize, got: usize },
    #[error("unknown calibration '{key}' (known: {known})")]
    UnknownCalibration { key: String, known: String },
    #[error("I/O error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
}
