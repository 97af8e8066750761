use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("device disconnected: {0}")]
    Disconnected(String),
    #[error("pump stalled: {0}")]
    Stalled(String),
    #[error("value out of range: {0}")]
    OutOfRange(String),
}

pub type Result<T> = std::result::Result<T, HwError>;
