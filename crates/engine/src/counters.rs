use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic transfer counters updated live by the worker pools.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) files_processed: AtomicU64,
    pub(crate) bytes_processed: AtomicU64,
    pub(crate) directories_processed: AtomicU64,
    pub(crate) entries_deleted: AtomicU64,
    pub(crate) read_bytes: AtomicU64,
    pub(crate) written_bytes: AtomicU64,
}

impl Counters {
    pub(crate) fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            files_processed: self.files_processed.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            directories_processed: self.directories_processed.load(Ordering::Relaxed),
            entries_deleted: self.entries_deleted.load(Ordering::Relaxed),
            read_bytes: self.read_bytes.load(Ordering::Relaxed),
            written_bytes: self.written_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the transfer counters.
///
/// Snapshots can be taken while a run is in flight; each field is
/// individually consistent.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CounterSnapshot {
    /// Files pulled from the file queue, including skipped ones.
    pub files_processed: u64,
    /// Total remote size of processed files.
    pub bytes_processed: u64,
    /// Directory listings applied.
    pub directories_processed: u64,
    /// Local-only entries removed by deletion mode.
    pub entries_deleted: u64,
    /// Local bytes read for block verification.
    pub read_bytes: u64,
    /// Bytes written into local files from fetched chunks.
    pub written_bytes: u64,
}

/// Sizes of the in-flight work queues and caches.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct QueueStats {
    /// Hardlink groups currently tracked.
    pub inode_entries: usize,
    /// Directories awaiting finalization.
    pub directory_entries: usize,
    /// Files queued for a worker.
    pub queued_files: usize,
    /// Directories queued for a listing.
    pub queued_directories: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_additions() {
        let counters = Counters::default();
        counters.files_processed.fetch_add(3, Ordering::Relaxed);
        counters.written_bytes.fetch_add(4096, Ordering::Relaxed);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.files_processed, 3);
        assert_eq!(snapshot.written_bytes, 4096);
        assert_eq!(snapshot.entries_deleted, 0);
    }
}
