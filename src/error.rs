//! Error types for bpq-auth-proxy

use thiserror::Error;

/// Main error type for bpq-auth-proxy
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Credential source error: {0}")]
    Credentials(String),

    #[error("Backend not available: {0}")]
    BackendUnavailable(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;
