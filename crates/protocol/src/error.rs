use std::io;

use thiserror::Error;

/// Error returned by remote store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O failure while serving the operation.
    #[error("failed to {context} '{path}': {source}")]
    Io {
        /// Operation being served when the error occurred.
        context: &'static str,
        /// Logical path named by the request.
        path: String,
        /// Underlying error emitted by the operating system.
        #[source]
        source: io::Error,
    },
    /// The request was malformed or named a path outside the served tree.
    #[error("invalid request for '{path}': {reason}")]
    InvalidRequest {
        /// Logical path named by the request.
        path: String,
        /// Why the request was rejected.
        reason: &'static str,
    },
    /// Transport-level failure reported by the RPC layer.
    #[error("remote call failed for '{path}': {message}")]
    Remote {
        /// Logical path named by the request.
        path: String,
        /// Transport diagnostic.
        message: String,
    },
}

impl StoreError {
    /// Wraps an [`io::Error`] with the operation and path it occurred on.
    #[must_use]
    pub fn io(context: &'static str, path: &str, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_string(),
            source,
        }
    }

    /// Rejects a request as malformed.
    #[must_use]
    pub fn invalid(path: &str, reason: &'static str) -> Self {
        Self::InvalidRequest {
            path: path.to_string(),
            reason,
        }
    }

    /// Returns `true` when the error stems from a missing entry.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::StoreError;
    use std::io;

    #[test]
    fn io_error_formats_context_and_path() {
        let error = StoreError::io(
            "read chunk of",
            "/a/b",
            io::Error::new(io::ErrorKind::Other, "boom"),
        );
        let rendered = error.to_string();
        assert!(rendered.contains("read chunk of"));
        assert!(rendered.contains("/a/b"));
    }

    #[test]
    fn not_found_detection() {
        let missing = StoreError::io(
            "stat",
            "/gone",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(missing.is_not_found());
        assert!(!StoreError::invalid("/x", "bad").is_not_found());
    }
}
