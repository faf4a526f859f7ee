use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limited: source API calls are paused until {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("Source API returned {status}: {body}")]
    SourceApi { status: u16, body: String },

    #[error("Malformed audit-log response: {0}")]
    MalformedResponse(String),

    #[error("Bootstrap failed: source API returned no forward cursor")]
    BootstrapFailed,

    #[error("Collector rejected batch with status {status} (expected {expected}): {body}")]
    ForwardRejected {
        status: u16,
        expected: u16,
        body: String,
    },

    #[error("Failed to persist {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Name of the pipeline stage that produced the error, for operator-facing messages.
    pub fn stage(&self) -> &'static str {
        match self {
            RelayError::Config(_) => "config",
            RelayError::RateLimited { .. } => "rate-limit",
            RelayError::SourceApi { .. } | RelayError::MalformedResponse(_) => "fetch",
            RelayError::BootstrapFailed => "bootstrap",
            RelayError::ForwardRejected { .. } => "forward",
            RelayError::Persistence { .. } => "persist",
            RelayError::Http(_) | RelayError::Json(_) => "transport",
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RelayError::Persistence {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
