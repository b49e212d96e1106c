use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Error produced when reading or applying filesystem metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// An operating-system call failed for a specific path.
    #[error("failed to {context} '{}': {source}", path.display())]
    Io {
        /// Operation being performed when the error occurred.
        context: &'static str,
        /// Path involved in the failing operation.
        path: PathBuf,
        /// Underlying error emitted by the operating system.
        #[source]
        source: io::Error,
    },
    /// The requested operation has no implementation on this platform.
    #[error("{operation} is not supported on this platform")]
    Unsupported {
        /// Operation that cannot be performed here.
        operation: &'static str,
    },
}

impl MetadataError {
    pub(crate) fn new(context: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) const fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }

    /// Returns `true` when the error stems from a missing filesystem entry.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    /// Returns `true` when the operation is unavailable on this platform.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}
