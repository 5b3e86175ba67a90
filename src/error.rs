use std::time::Duration;
use thiserror::Error;

/// Reasons a dial reading could not be obtained.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("failed to run dial reader: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("dial reader did not finish within {0:?}")]
    Timeout(Duration),
    #[error("dial reader exited with status {0}")]
    Status(i32),
    #[error("dial reader returned unusable payload {0:?}")]
    InvalidPayload(String),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed snapshot {0:?}")]
    Malformed(String),
}
