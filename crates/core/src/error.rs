use std::time::Duration;

/// Result alias that carries the custom [`LipSyncError`] type.
pub type Result<T> = std::result::Result<T, LipSyncError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum LipSyncError {
    /// A map, rig or configuration file is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
    /// A sequence with the same clip identity is already registered.
    #[error("duplicate: {0}")]
    Duplicate(String),
    /// The requested sequence, clip, shape key or driver does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A phoneme label has no entry in the phoneme map. Bulk operations log
    /// and skip these instead of returning them.
    #[error("no mapping for phoneme `{0}`")]
    MappingMiss(String),
    /// The recognizer produced no usable output.
    #[error("recognition failed: {0}")]
    RecognitionFailure(String),
    /// The recognizer did not answer within the allotted time.
    #[error("recognition timed out after {0:?}")]
    RecognitionTimeout(Duration),
    /// A required selection or rig object is absent.
    #[error("precondition failed: {0}")]
    Precondition(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl LipSyncError {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }
}
