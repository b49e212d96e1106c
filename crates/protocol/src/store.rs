use metadata::FileMeta;

use crate::error::StoreError;
use crate::types::{ChunkArgs, ListResponse};

/// One-level view of a remote file tree, addressed by `/`-rooted logical
/// paths (`"/"` names the served root itself).
///
/// Implementations must be safe for concurrent use: every worker thread of
/// the synchronization engine issues calls through one shared instance.
pub trait RemoteStore: Send + Sync {
    /// Returns the record for a single entry, without recursion.
    fn stat(&self, path: &str) -> Result<FileMeta, StoreError>;

    /// Returns the direct children of a directory, one level deep.
    fn list(&self, path: &str) -> Result<ListResponse, StoreError>;

    /// Brackets chunk access to a file; the store may cache a handle.
    ///
    /// Idempotent from the caller's point of view.
    fn open(&self, path: &str) -> Result<(), StoreError>;

    /// Returns exactly `args.size` bytes at `args.offset`, or the shorter
    /// tail when the range extends past the end of the file.
    fn get_chunk(&self, args: &ChunkArgs) -> Result<Vec<u8>, StoreError>;

    /// Returns the 64-bit content digest of the same byte range
    /// [`get_chunk`](Self::get_chunk) would serve.
    ///
    /// Both peers must use [`chunk_digest`](crate::chunk_digest); the
    /// comparison is only meaningful when the digests agree byte-for-byte.
    fn checksum_chunk(&self, args: &ChunkArgs) -> Result<u64, StoreError>;

    /// Releases any handle cached by [`open`](Self::open).
    ///
    /// Failures are diagnostic only; callers log and continue.
    fn close(&self, path: &str) -> Result<(), StoreError>;
}
