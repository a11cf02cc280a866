//! Error types for segput.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors reported by an [`ObjectStore`](crate::ObjectStore) implementation.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The request could not be completed (network failure, 5xx, reset).
    #[error("request failed: {message}")]
    Request {
        /// Backend-provided description.
        message: String,
    },

    /// The container or object does not exist.
    #[error("not found: {container}/{object}")]
    NotFound {
        /// Container that was addressed.
        container: String,
        /// Object that was addressed (empty for container-level requests).
        object: String,
    },

    /// The backend refused the request with a definite status.
    #[error("rejected with status {status}: {message}")]
    Rejected {
        /// HTTP-style status code.
        status: u16,
        /// Backend-provided description.
        message: String,
    },
}

impl StorageError {
    /// Returns true if repeating the request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Request { .. } => true,
            StorageError::NotFound { .. } => false,
            // 422 is what Swift answers when the request ETag does not match the body.
            StorageError::Rejected { status, .. } => {
                *status == 422 || *status == 429 || *status >= 500
            }
        }
    }
}

/// Errors surfaced by a segmented upload.
///
/// The type is `Clone` so that the first terminal failure can be handed back
/// from every later `write` and from `close`.
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// `write` or `close` was called after the upload was closed.
    #[error("upload is closed")]
    Closed,

    /// `close` was called before any byte was written.
    #[error("0 bytes written")]
    Empty,

    /// The backend reported an error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The backend stored different bytes than were sent.
    #[error("response etag does not match for {object}: remote {remote}, calculated {calculated}")]
    ChecksumMismatch {
        /// Object name of the segment.
        object: String,
        /// ETag returned by the backend.
        remote: String,
        /// Locally computed MD5 (hex).
        calculated: String,
    },

    /// A single request exceeded the configured timeout.
    #[error("request for {object} timed out after {limit:?}")]
    Timeout {
        /// Object the request addressed.
        object: String,
        /// Configured per-request limit.
        limit: Duration,
    },

    /// The buffer pool was shut down while a buffer was requested.
    #[error("buffer pool is shut down")]
    PoolShutdown,

    /// The segment queue closed before the segment could be handed over.
    #[error("upload workers stopped unexpectedly")]
    WorkersStopped,

    /// The destination path could not be parsed.
    #[error("invalid target: {message}")]
    InvalidTarget {
        /// Description of what was invalid.
        message: &'static str,
    },

    /// Invalid configuration parameter.
    #[error("invalid config: {message}")]
    InvalidConfig {
        /// Description of what was invalid.
        message: &'static str,
    },

    /// Reading the source stream failed.
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),
}

impl UploadError {
    /// Returns true if the failed operation is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Storage(e) => e.is_transient(),
            UploadError::ChecksumMismatch { .. } | UploadError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Returns true if this error indicates the backend holds corrupt data.
    pub fn is_corruption(&self) -> bool {
        matches!(self, UploadError::ChecksumMismatch { .. })
    }
}

impl From<std::io::Error> for UploadError {
    fn from(e: std::io::Error) -> Self {
        UploadError::Io(Arc::new(e))
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = UploadError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: UploadError = io_err.into();
        assert!(matches!(err, UploadError::Io(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_classification() {
        let transient = UploadError::from(StorageError::Request {
            message: "connection reset".into(),
        });
        assert!(transient.is_retryable());

        let missing = UploadError::from(StorageError::NotFound {
            container: "photos_segments".into(),
            object: "a/1/00000001".into(),
        });
        assert!(!missing.is_retryable());

        let mismatch = UploadError::ChecksumMismatch {
            object: "a".into(),
            remote: "00".into(),
            calculated: "11".into(),
        };
        assert!(mismatch.is_retryable());
        assert!(mismatch.is_corruption());

        assert!(!UploadError::Closed.is_retryable());
        assert!(!UploadError::Empty.is_retryable());
    }

    #[test]
    fn test_rejected_status() {
        let unprocessable = StorageError::Rejected {
            status: 422,
            message: "etag mismatch".into(),
        };
        assert!(unprocessable.is_transient());

        let forbidden = StorageError::Rejected {
            status: 403,
            message: "forbidden".into(),
        };
        assert!(!forbidden.is_transient());
    }

    #[test]
    fn test_display() {
        assert_eq!(UploadError::Empty.to_string(), "0 bytes written");
        let err = UploadError::Timeout {
            object: "big/1/00000002".into(),
            limit: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("timed out"));
    }
}
