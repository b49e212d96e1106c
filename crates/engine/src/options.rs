use std::path::{Path, PathBuf};

/// Default number of concurrent file workers.
pub const DEFAULT_PARALLEL_FILE: usize = 4096;

/// Default number of concurrent directory workers.
pub const DEFAULT_PARALLEL_DIR: usize = 512;

/// Default block size for checksum comparison and transfer, in bytes.
///
/// Both peers must use the same value; changing it requires a coordinated
/// version bump.
pub const DEFAULT_BLOCK_SIZE: usize = 128 * 1024;

/// Options that control a replication run.
#[derive(Clone, Debug)]
pub struct SyncOptions {
    base_path: PathBuf,
    always_checksum: bool,
    send_acl: bool,
    delete: bool,
    parallel_file: usize,
    parallel_dir: usize,
    preserve_hardlinks: bool,
    block_size: usize,
}

impl SyncOptions {
    /// Creates options that materialize the remote tree under `base_path`,
    /// with defaults applied: hardlink preservation on, deletion off, 4096
    /// file workers, 512 directory workers, 128 KiB blocks.
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            always_checksum: false,
            send_acl: false,
            delete: false,
            parallel_file: DEFAULT_PARALLEL_FILE,
            parallel_dir: DEFAULT_PARALLEL_DIR,
            preserve_hardlinks: true,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Forces block-by-block verification even when size, time, and mode
    /// all match.
    #[must_use]
    pub const fn with_always_checksum(mut self, enabled: bool) -> Self {
        self.always_checksum = enabled;
        self
    }

    /// Requests that ACLs take part in comparison and application.
    #[must_use]
    pub const fn with_acls(mut self, enabled: bool) -> Self {
        self.send_acl = enabled;
        self
    }

    /// Removes local-only entries in each visited directory.
    #[must_use]
    pub const fn with_delete(mut self, enabled: bool) -> Self {
        self.delete = enabled;
        self
    }

    /// Sets the file worker count (minimum 1).
    #[must_use]
    pub const fn with_parallel_file(mut self, workers: usize) -> Self {
        self.parallel_file = if workers == 0 { 1 } else { workers };
        self
    }

    /// Sets the directory worker count (minimum 1).
    #[must_use]
    pub const fn with_parallel_dir(mut self, workers: usize) -> Self {
        self.parallel_dir = if workers == 0 { 1 } else { workers };
        self
    }

    /// Maintains the inode cache and recreates hardlinks locally.
    #[must_use]
    pub const fn with_preserve_hardlinks(mut self, enabled: bool) -> Self {
        self.preserve_hardlinks = enabled;
        self
    }

    /// Sets the fixed block size for checksum and transfer (minimum 1).
    #[must_use]
    pub const fn with_block_size(mut self, bytes: usize) -> Self {
        self.block_size = if bytes == 0 { 1 } else { bytes };
        self
    }

    /// Local root under which `/`-relative remote names are materialized.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Whether blocks are verified even when metadata matches.
    #[must_use]
    pub const fn always_checksum(&self) -> bool {
        self.always_checksum
    }

    /// Whether ACLs take part in comparison and application.
    #[must_use]
    pub const fn send_acl(&self) -> bool {
        self.send_acl
    }

    /// Whether local-only entries are removed.
    #[must_use]
    pub const fn delete(&self) -> bool {
        self.delete
    }

    /// File worker count.
    #[must_use]
    pub const fn parallel_file(&self) -> usize {
        self.parallel_file
    }

    /// Directory worker count.
    #[must_use]
    pub const fn parallel_dir(&self) -> usize {
        self.parallel_dir
    }

    /// Whether hardlink groups are recreated locally.
    #[must_use]
    pub const fn preserve_hardlinks(&self) -> bool {
        self.preserve_hardlinks
    }

    /// Fixed block size in bytes.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = SyncOptions::new("/tmp/dest");
        assert_eq!(options.parallel_file(), DEFAULT_PARALLEL_FILE);
        assert_eq!(options.parallel_dir(), DEFAULT_PARALLEL_DIR);
        assert_eq!(options.block_size(), DEFAULT_BLOCK_SIZE);
        assert!(options.preserve_hardlinks());
        assert!(!options.delete());
        assert!(!options.always_checksum());
        assert!(!options.send_acl());
    }

    #[test]
    fn builder_overrides_stick() {
        let options = SyncOptions::new("/tmp/dest")
            .with_always_checksum(true)
            .with_delete(true)
            .with_parallel_file(8)
            .with_parallel_dir(2)
            .with_block_size(4096)
            .with_preserve_hardlinks(false);
        assert!(options.always_checksum());
        assert!(options.delete());
        assert_eq!(options.parallel_file(), 8);
        assert_eq!(options.parallel_dir(), 2);
        assert_eq!(options.block_size(), 4096);
        assert!(!options.preserve_hardlinks());
    }

    #[test]
    fn zero_worker_counts_are_clamped() {
        let options = SyncOptions::new("/tmp/dest")
            .with_parallel_file(0)
            .with_parallel_dir(0)
            .with_block_size(0);
        assert_eq!(options.parallel_file(), 1);
        assert_eq!(options.parallel_dir(), 1);
        assert_eq!(options.block_size(), 1);
    }
}
