use thiserror::Error;

/// Result type used throughout the crate.
pub type FlagsyncResult<T> = Result<T, FlagsyncError>;

#[derive(Debug, Error)]
pub enum FlagsyncError {
    /// A stored value is not valid JSON.
    #[error("failed to decode stored feature value: {0}")]
    Decode(#[from] serde_json::Error),

    /// A required collaborator or setting is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The value store rejected or could not complete an operation.
    #[error("store error: {0}")]
    Store(String),

    #[cfg(feature = "sled")]
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}
