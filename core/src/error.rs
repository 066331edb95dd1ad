use thiserror::Error;

/// Status taxonomy shared by every layer of the engine.
///
/// Parsing code reports structural problems as `VolumeCorrupted`; expected
/// misses are `NotFound`. Mutating entry points of the read-only handle
/// layer report `WriteProtected`, `AccessDenied` or `DeleteFailure`.
#[derive(Debug, Error)]
pub enum NtfsError {
    #[error("Volume corrupted: {0}")]
    VolumeCorrupted(String),

    #[error("Out of resources: {0}")]
    OutOfResources(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Volume is write protected")]
    WriteProtected,

    #[error("Access denied")]
    AccessDenied,

    #[error("Handle closed but the file was not deleted")]
    DeleteFailure,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Buffer too small: {needed} bytes needed")]
    BufferTooSmall { needed: usize },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Device error: {0}")]
    DeviceError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl NtfsError {
    pub fn corrupted(msg: impl Into<String>) -> Self {
        NtfsError::VolumeCorrupted(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        NtfsError::NotFound(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        NtfsError::InvalidParameter(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NtfsError::NotFound(_))
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, NtfsError::VolumeCorrupted(_))
    }
}
