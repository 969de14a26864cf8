use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Kinematics(#[from] arm_kinematics::Error),
    #[error(transparent)]
    Store(#[from] episode_store::Error),
    #[error("configuration error: {0}")]
    Config(String),
}
