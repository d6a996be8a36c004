//! Error types for the transfer engine.
//!
//! Every variant carries the context (URL, path, limit) needed to explain the
//! failure to the person waiting on the transfer.

use std::path::PathBuf;

use thiserror::Error;

use super::progress::Phase;

/// Errors raised by the download phase, the upload phase or the retry loop.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The source answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    RemoteError {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Connection-level failure (DNS, refused, reset, TLS, broken body stream).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL (or sink name) being talked to.
        url: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A single attempt exceeded the overall wall-clock ceiling.
    #[error("timeout transferring {url}")]
    Timeout {
        /// The URL (or sink name) that timed out.
        url: String,
    },

    /// The destination refused the file (size or type).
    #[error("destination rejected upload: {reason}")]
    SinkRejected {
        /// Reason given by the destination.
        reason: String,
    },

    /// The retry budget for one phase is spent.
    #[error("{phase} failed after {attempts} attempts: {last}")]
    ExhaustedRetries {
        /// Phase that ran out of attempts.
        phase: Phase,
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        last: Box<TransferError>,
    },

    /// The artifact is larger than the upload ceiling.
    #[error("size {actual} bytes exceeds limit of {limit} bytes")]
    SizeExceeded {
        /// Configured ceiling in bytes.
        limit: u64,
        /// Observed (or announced) size in bytes.
        actual: u64,
    },

    /// The caller cancelled the transfer.
    #[error("transfer cancelled")]
    Cancelled,

    /// Local file system error (create, write, read, metadata).
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The source URL is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl TransferError {
    /// Creates a remote status error.
    pub fn remote(url: impl Into<String>, status: u16) -> Self {
        Self::RemoteError {
            url: url.into(),
            status,
        }
    }

    /// Creates a network error from any transport error.
    pub fn network(
        url: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Network {
            url: url.into(),
            source: source.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a sink rejection.
    pub fn sink_rejected(reason: impl Into<String>) -> Self {
        Self::SinkRejected {
            reason: reason.into(),
        }
    }

    /// Wraps the last error of a spent retry budget.
    pub fn exhausted(phase: Phase, attempts: u32, last: TransferError) -> Self {
        Self::ExhaustedRetries {
            phase,
            attempts,
            last: Box::new(last),
        }
    }

    /// Creates a size gating error.
    pub fn size_exceeded(limit: u64, actual: u64) -> Self {
        Self::SizeExceeded { limit, actual }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns true for [`TransferError::Cancelled`], including when wrapped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::ExhaustedRetries { last, .. } => last.is_cancelled(),
            _ => false,
        }
    }

    /// Returns the innermost error, unwrapping [`TransferError::ExhaustedRetries`].
    #[must_use]
    pub fn root(&self) -> &TransferError {
        match self {
            Self::ExhaustedRetries { last, .. } => last.root(),
            other => other,
        }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: the variants need a URL
// or path the source errors do not carry, so callers use the constructors.
