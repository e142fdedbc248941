//! Domain-level error taxonomy for configuration, rule loading and artifact sinks.

/// datasquad domain errors.
#[derive(Debug, thiserror::Error)]
pub enum SquadError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid rule {rule}: {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for datasquad domain operations.
pub type Result<T> = std::result::Result<T, SquadError>;
