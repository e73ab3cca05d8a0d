//! Engine error types

use thiserror::Error;

/// Errors raised by provider integrations.
///
/// The transient/terminal split drives the executor's retry policy:
/// transient failures are retried with backoff, everything else fails the
/// node immediately.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("transient provider failure: {0}")]
    Transient(String),

    #[error("provider failure: {0}")]
    Terminal(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    /// Whether the executor should retry the operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Reconciliation engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Manifest(#[from] kumo_core::ManifestError),

    #[error("provider not registered: {0}")]
    ProviderNotFound(String),

    #[error("provider '{provider}' failed on {address}: {source}")]
    Provider {
        provider: String,
        address: String,
        source: ProviderError,
    },

    #[error("'{from}' references '{to}' which has no applied value")]
    UnresolvedReference { from: String, to: String },

    #[error("state file error: {0}")]
    State(String),

    #[error("lock acquisition failed: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
