use std::io;

use protocol::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that abort a replication run.
///
/// Per-entry failures are logged and skipped; only failures against the
/// remote root surface here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The remote store rejected an operation the run cannot proceed without.
    #[error("remote store error: {0}")]
    Store(
        #[from]
        #[source]
        StoreError,
    ),
    /// A local I/O failure outside the per-entry skip paths.
    #[error("I/O error: {0}")]
    Io(
        #[from]
        #[source]
        io::Error,
    ),
    /// An internal work queue shut down while the run still needed it.
    #[error("synchronization queue closed unexpectedly")]
    QueueClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_convert() {
        let source = StoreError::invalid("/x", "bad");
        let error = EngineError::from(source);
        assert!(error.to_string().contains("remote store error"));
    }
}
