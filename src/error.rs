//! Error types for the stream engine.
//!
//! None of these are fatal: fetch errors become per-direction flags on the
//! coordinator, protocol errors are logged and the payload dropped, and
//! config errors are reported once at startup.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while fetching a page of history.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("history request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("history service answered with status {0}")]
    Status(u16),

    #[error("invalid history url: {0}")]
    Url(String),
}

impl FetchError {
    /// Whether a retry of the same request could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status(code) => *code >= 500 || *code == 429,
            FetchError::Url(_) => false,
        }
    }
}

/// A live-channel payload that could not be decoded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message of type '{0}' is missing its data field")]
    MissingData(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
