//! Error types for LeaseWarden.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, LeaseError>;

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    /// Non-2xx answer from the control plane. `body` is kept verbatim.
    #[error("Control plane returned {status}: {body}")]
    ControlPlane { status: u16, body: String },

    #[error("Control plane has no server {0}")]
    ControlPlaneNotFound(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Resource {0} has no external id")]
    MissingExternalId(String),

    #[error("Cancelled after {processed}/{total} items")]
    Cancelled { processed: u64, total: u64 },

    #[error("Job '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Version error: {0}")]
    Version(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LeaseError {
    pub fn database(msg: impl std::fmt::Display) -> Self {
        Self::Database(msg.to_string())
    }

    pub fn http(msg: impl std::fmt::Display) -> Self {
        Self::Http(msg.to_string())
    }

    /// True for cooperative-stop aborts.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
