//! Error handling for the conversion engine.
//!
//! Structural failures (unreadable bytes, missing files, an unreachable
//! remote service) surface as [`EngineError`]. Validation findings are not
//! errors; they travel as [`Violation`](crate::profile::Violation) values
//! from a successful run.

use std::fmt;
use std::path::Path;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The source or target descriptor names a format no adapter handles.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Input bytes could not be decoded into the workbook model.
    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },

    /// A file, sheet, or remote document that was asked for does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote sheet service rejected or failed an operation.
    #[error("remote service error for document {document_id}: {reason}")]
    Remote {
        document_id: String,
        reason: String,
    },

    /// The remote sheet service could not be reached at all.
    #[error("remote sheet service unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn decode(path: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::Decode {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub fn decode_path(path: &Path, reason: impl Into<String>) -> Self {
        Self::decode(path.display(), reason)
    }

    pub fn remote(document_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Remote {
            document_id: document_id.into(),
            reason: reason.into(),
        }
    }

    /// Coarse grouping used in log fields.
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::Decode { .. } => "decode_error",
            Self::NotFound(_) => "not_found",
            Self::Remote { .. } | Self::RemoteUnavailable(_) => "remote_error",
            Self::Io(_) => "io_error",
        }
    }

    /// Whether retrying the same operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Remote { .. } | Self::RemoteUnavailable(_) | Self::Io(_)
        )
    }
}
