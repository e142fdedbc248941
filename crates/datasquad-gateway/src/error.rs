//! Error types for datasquad-gateway

use thiserror::Error;

/// Errors building a gateway client. Call-time failures are `ModelError`s.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Required environment variable not set
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    /// Configuration value out of range or malformed
    #[error("invalid gateway configuration: {0}")]
    InvalidConfig(String),

    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for gateway construction
pub type Result<T> = std::result::Result<T, GatewayError>;
