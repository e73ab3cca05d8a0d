//! Local provider error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalProviderError {
    #[error("invalid immutable declaration for '{resource_type}': expected attribute names")]
    InvalidImmutable { resource_type: String },

    #[error("object root is not a directory: {0}")]
    InvalidRoot(String),

    #[error("corrupt object document: {path}\nreason: {message}")]
    CorruptDocument { path: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LocalProviderError>;
