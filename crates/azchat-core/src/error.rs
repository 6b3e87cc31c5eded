//! Error types for azchat-core

use thiserror::Error;

/// Main error type for azchat-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Api(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session store error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short name of the error kind, used as the prefix of client-facing
    /// error payloads (`"<kind>: <message>"`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::Api(_) => "ApiError",
            Self::Http(_) => "HttpError",
            Self::Json(_) => "JsonError",
            Self::Database(_) => "SessionStoreError",
            Self::Config(_) => "ConfigError",
            Self::Io(_) => "IoError",
            Self::Other(_) => "Error",
        }
    }

    /// Whether the caller sent bad input (as opposed to a server-side failure)
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type alias for azchat-core
pub type Result<T> = std::result::Result<T, Error>;
