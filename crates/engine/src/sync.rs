//! The replication engine: concurrent discovery of the remote tree,
//! per-file reconciliation, and counter-driven bottom-up finalization.

use std::cmp;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use metadata::{FileMeta, apply_metadata, create_entry, read_metadata};
use protocol::path::{child_name, parent_dir};
use protocol::{ChunkArgs, ListResponse, RemoteStore, chunk_digest};
use tracing::{debug, error, info, trace, warn};

use crate::counters::{CounterSnapshot, Counters, QueueStats};
use crate::dircache::{DirCache, DirState};
use crate::error::{EngineError, EngineResult};
use crate::inode::{InodeCache, InodeEntry, InodeKey};
use crate::options::SyncOptions;
use crate::stage::{StageSender, stage};

/// Attempts to stat a hardlink leader that a sibling worker is still
/// creating, and the pause between attempts.
const LEADER_STAT_ATTEMPTS: u32 = 100;
const LEADER_STAT_DELAY: Duration = Duration::from_millis(10);

/// Attempts to link against a leader that is still being created, and the
/// pause between attempts.
const LINK_ATTEMPTS: u32 = 25;
const LINK_RETRY_DELAY: Duration = Duration::from_millis(100);

/// One-way tree replicator.
///
/// Pulls the directory hierarchy exposed by a [`RemoteStore`] onto a local
/// path, making the local tree content- and metadata-equivalent to the
/// remote view. Discovery, per-file reconciliation, and directory
/// finalization run on two fixed-width worker pools; see [`SyncOptions`]
/// for the knobs.
pub struct Syncer {
    store: Arc<dyn RemoteStore>,
    options: SyncOptions,
    inodes: InodeCache,
    dirs: DirCache,
    counters: Counters,
    pending_listings: PendingListings,
    abort: AtomicBool,
    fatal: Mutex<Option<EngineError>>,
    progress: Progress,
}

impl Syncer {
    /// Creates a replicator pulling from `store` according to `options`.
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>, options: SyncOptions) -> Self {
        Self {
            store,
            options,
            inodes: InodeCache::new(),
            dirs: DirCache::new(),
            counters: Counters::default(),
            pending_listings: PendingListings::default(),
            abort: AtomicBool::new(false),
            fatal: Mutex::new(None),
            progress: Progress::default(),
        }
    }

    /// Requests a cooperative abort.
    ///
    /// Workers notice the flag at the top of their loops, stop mutating the
    /// local tree, and drain their queues so the run terminates cleanly.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// Live transfer counters.
    #[must_use]
    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Sizes of the in-flight queues and caches, observable while a run is
    /// in progress.
    #[must_use]
    pub fn queue_stats(&self) -> QueueStats {
        QueueStats {
            inode_entries: self.inodes.len(),
            directory_entries: self.dirs.len(),
            queued_files: lock(&self.progress.file_queue)
                .as_ref()
                .map_or(0, Sender::len),
            queued_directories: lock(&self.progress.stage_depth)
                .as_ref()
                .map_or(0, |depth| depth.load(Ordering::Relaxed)),
        }
    }

    /// Runs the replication to completion and returns the final counters.
    ///
    /// Fails only on errors against the remote root; per-entry failures are
    /// logged and skipped so the rest of the tree still replicates.
    pub fn run(&self) -> EngineResult<CounterSnapshot> {
        let root = self.store.stat("/")?;
        fs::create_dir_all(self.options.base_path())?;

        let stage_capacity = cmp::max(self.options.parallel_dir() * 2, 2);
        let (dir_tx, dir_rx, mut stage_control) = stage::<FileMeta>(stage_capacity);
        let file_capacity = cmp::max(self.options.parallel_file() * 16, 16);
        let (file_tx, file_rx) = bounded::<FileMeta>(file_capacity);

        *lock(&self.progress.file_queue) = Some(file_tx.clone());
        *lock(&self.progress.stage_depth) = Some(stage_control.depth_handle());

        debug!("queueing directory / from remote");
        self.pending_listings.add(1);
        self.dirs.store(root.name.clone(), DirState::pending(root.clone()));
        if dir_tx.send(root).is_err() {
            return Err(EngineError::QueueClosed);
        }

        thread::scope(|scope| {
            let mut dir_workers = Vec::with_capacity(self.options.parallel_dir());
            for _ in 0..self.options.parallel_dir() {
                let rx = dir_rx.clone();
                let dir_tx = dir_tx.clone();
                let file_tx = file_tx.clone();
                dir_workers.push(scope.spawn(move || self.dir_worker(&rx, &dir_tx, &file_tx)));
            }

            let mut file_workers = Vec::with_capacity(self.options.parallel_file());
            for _ in 0..self.options.parallel_file() {
                let rx = file_rx.clone();
                file_workers.push(scope.spawn(move || self.file_worker(&rx)));
            }

            // Once every queued directory has had its listing applied, no
            // new directory can ever be enqueued; the stage can close.
            self.pending_listings.wait();
            debug!("no more directories to list");
            stage_control.close();
            for worker in dir_workers {
                let _ = worker.join();
            }

            // With the directory workers gone, dropping the remaining file
            // senders lets the file workers drain and exit.
            *lock(&self.progress.file_queue) = None;
            drop(file_tx);
            drop(dir_tx);
            for worker in file_workers {
                let _ = worker.join();
            }
        });

        *lock(&self.progress.stage_depth) = None;
        debug!("replication pass complete");

        if let Some(error) = lock(&self.fatal).take() {
            return Err(error);
        }
        Ok(self.counters.snapshot())
    }

    // ----- directory workers -----

    fn dir_worker(
        &self,
        rx: &Receiver<FileMeta>,
        dir_tx: &StageSender<FileMeta>,
        file_tx: &Sender<FileMeta>,
    ) {
        trace!("starting directory worker");
        for item in rx.iter() {
            if self.aborted() {
                self.settle_unlisted_dir(&item.name);
                continue;
            }
            trace!(dir = %item.name, "processing directory queue item");

            match self.store.list(&item.name) {
                Ok(listing) => {
                    self.apply_listing(&item, listing, dir_tx, file_tx);
                    self.counters
                        .directories_processed
                        .fetch_add(1, Ordering::Relaxed);
                    self.pending_listings.done();
                }
                Err(store_error) => {
                    error!(dir = %item.name, error = %store_error, "error listing remote files");
                    if item.name == "/" {
                        self.record_fatal(EngineError::Store(store_error));
                    }
                    self.settle_unlisted_dir(&item.name);
                }
            }
        }
        trace!("shutting down directory worker");
    }

    fn apply_listing(
        &self,
        item: &FileMeta,
        listing: ListResponse,
        dir_tx: &StageSender<FileMeta>,
        file_tx: &Sender<FileMeta>,
    ) {
        let total = listing.files.len();
        trace!(dir = %item.name, entries = total, "listing received");

        let mut extra_entries = Vec::new();
        if self.options.delete() {
            let expected: HashSet<&str> = listing.files.iter().map(|f| f.name.as_str()).collect();
            let local_dir = self.local_path(&item.name);
            match fs::read_dir(&local_dir) {
                Ok(entries) => {
                    for entry in entries.flatten() {
                        let basename = entry.file_name().to_string_lossy().into_owned();
                        if !expected.contains(child_name(&item.name, &basename).as_str()) {
                            extra_entries.push(basename);
                        }
                    }
                }
                Err(err) => {
                    error!(dir = %local_dir.display(), error = %err, "error listing local files");
                }
            }
        }

        let found = self
            .dirs
            .mutate(&item.name, |state| {
                state.remaining = total as i64;
                state.extra_entries = extra_entries;
            })
            .is_some();
        if !found {
            error!(dir = %item.name, "directory not found in directory cache");
        }

        if total == 0 {
            trace!(dir = %item.name, "no contents detected");
            self.finished_entry(&item.name);
            return;
        }

        // Files go first so the head of the file queue favors work that
        // releases this directory's counter.
        for child in &listing.files {
            if child.kind.is_dir() {
                continue;
            }
            trace!(file = %child.name, "queueing file");
            if file_tx.send(child.clone()).is_err() {
                error!(file = %child.name, "file queue closed, dropping entry");
                self.finished_entry(&item.name);
            }
        }

        for child in listing.files {
            if !child.kind.is_dir() {
                continue;
            }
            if !self.prepare_local_dir(&child) {
                // The child cannot be replicated; account for it so the
                // parent still finalizes.
                self.finished_entry(&item.name);
                continue;
            }
            trace!(dir = %child.name, "queueing directory");
            let name = child.name.clone();
            self.pending_listings.add(1);
            self.dirs.store(name.clone(), DirState::pending(child.clone()));
            if dir_tx.send(child).is_err() {
                error!(dir = %name, "directory queue closed, dropping entry");
                self.settle_unlisted_dir(&name);
            }
        }
    }

    /// Ensures the local counterpart of a remote directory exists and is a
    /// directory. Returns `false` when the entry cannot be replicated.
    fn prepare_local_dir(&self, child: &FileMeta) -> bool {
        let local = self.local_path(&child.name);
        match fs::symlink_metadata(&local) {
            Ok(md) if md.is_dir() => true,
            Ok(_) => {
                debug!(path = %local.display(), "existing target for directory is not a directory, replacing it");
                if let Err(err) = remove_entry_at(&local) {
                    error!(path = %local.display(), error = %err, "error removing path");
                    return false;
                }
                self.create_local_dir(&local)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => self.create_local_dir(&local),
            Err(err) => {
                warn!(path = %local.display(), error = %err, "error getting information about path");
                true
            }
        }
    }

    fn create_local_dir(&self, path: &Path) -> bool {
        trace!(path = %path.display(), "creating directory");
        let result = {
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                fs::DirBuilder::new().recursive(true).mode(0o755).create(path)
            }
            #[cfg(not(unix))]
            {
                fs::create_dir_all(path)
            }
        };
        if let Err(err) = result {
            error!(path = %path.display(), error = %err, "error creating directory");
            return false;
        }
        true
    }

    /// Resolves a directory whose listing never arrived: its counter is
    /// zeroed and the finalization cascade runs so the parent chain is
    /// still released.
    fn settle_unlisted_dir(&self, name: &str) {
        let found = self
            .dirs
            .mutate(&name.to_string(), |state| state.remaining = 0)
            .is_some();
        if !found {
            error!(dir = %name, "directory not found in directory cache");
        }
        self.finished_entry(name);
        self.pending_listings.done();
    }

    // ----- file workers -----

    fn file_worker(&self, rx: &Receiver<FileMeta>) {
        trace!("starting file worker");
        for remote in rx.iter() {
            let parent = parent_dir(&remote.name).to_string();
            let size = remote.size;
            if !self.aborted() {
                self.process_file(remote);
            }
            self.counters.files_processed.fetch_add(1, Ordering::Relaxed);
            self.counters.bytes_processed.fetch_add(size, Ordering::Relaxed);
            // The parent's counter is released even when the entry was
            // skipped or abandoned; otherwise the directory would never
            // finalize.
            self.finished_entry(&parent);
        }
        trace!("shutting down file worker");
    }

    fn process_file(&self, remote: FileMeta) {
        let mut links = HardlinkTicket::default();
        self.reconcile_file(remote, &mut links);

        if links.remaining == 0 {
            if let Some(key) = links.key {
                trace!("no more references to this inode, removing it from the inode cache");
                self.inodes.remove(&key);
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    fn reconcile_file(&self, mut remote: FileMeta, links: &mut HardlinkTicket) {
        let local_path = self.local_path(&remote.name);
        trace!(path = %local_path.display(), "processing file");

        let mut create_file = false;
        let mut copy_verify_file = false;
        let mut apply_attributes = false;

        let mut local = match read_metadata(&local_path) {
            Ok(meta) => Some(meta),
            Err(err) if err.is_not_found() => {
                debug!(path = %local_path.display(), "file does not exist");
                create_file = true;
                None
            }
            Err(err) => {
                error!(path = %local_path.display(), error = %err, "error reading local file metadata");
                return;
            }
        };

        // Without ACL propagation the blobs must not influence comparison.
        if !self.options.send_acl() {
            remote.acl = None;
            if let Some(local) = local.as_mut() {
                local.acl = None;
            }
        }

        let mut just_added_to_cache = false;
        if self.options.preserve_hardlinks() && remote.nlink > 1 {
            let key = InodeKey::new(remote.dev, remote.inode);
            links.key = Some(key);
            trace!(
                dev = remote.dev,
                inode = remote.inode,
                nlink = remote.nlink,
                file = %remote.name,
                "registering hardlink group member",
            );
            let nlink = remote.nlink as i64;
            let local_identity = local.as_ref().map(|l| (l.dev, l.inode));
            let leader_path = local_path.clone();
            links.remaining = self.inodes.mutate_or_insert(
                key,
                move || InodeEntry::new(leader_path, nlink),
                |entry| {
                    entry.remaining -= 1;
                    if let Some((dev, inode)) = local_identity {
                        entry.publish_local(dev, inode);
                    }
                    entry.remaining
                },
            );
            just_added_to_cache = links.remaining == nlink - 1;
        }

        // A later group member must point at the same inode the leader
        // materialized; a mismatched link is broken and recreated.
        if !create_file && !just_added_to_cache {
            if let Some(key) = links.key {
                if let Some(mut entry) = self.inodes.load(&key) {
                    if entry.local_inode == 0 {
                        entry = self.resolve_group_leader(key, entry);
                    }
                    let mismatched = local.as_ref().is_some_and(|current| {
                        current.inode != entry.local_inode || current.dev != entry.local_dev
                    });
                    if mismatched {
                        debug!(
                            path = %local_path.display(),
                            leader = %entry.leader_path.display(),
                            "hardlink inodes differ but should match, unlinking file",
                        );
                        if let Err(err) = remove_entry_at(&local_path) {
                            error!(path = %local_path.display(), error = %err, "error unlinking");
                            return;
                        }
                        create_file = true;
                        local = None;
                    }
                }
            }
        }

        if !create_file {
            if let Some(current) = local.as_ref() {
                if current.kind != remote.kind {
                    debug!(
                        path = %local_path.display(),
                        "entry type changed from {:?} to {:?}, unlinking",
                        current.kind,
                        remote.kind,
                    );
                    if let Err(err) = remove_entry_at(&local_path) {
                        error!(path = %local_path.display(), error = %err, "error unlinking");
                        return;
                    }
                    create_file = true;
                    local = None;
                }
            }
        }

        if !create_file {
            if let Some(current) = local.as_ref() {
                if current.size > remote.size && !remote.kind.is_symlink() {
                    debug!(
                        path = %local_path.display(),
                        from = current.size,
                        to = remote.size,
                        "local file larger than remote, truncating",
                    );
                    if let Err(err) = truncate_file(&local_path, remote.size) {
                        error!(path = %local_path.display(), error = %err, "error truncating to match remote");
                        return;
                    }
                    apply_attributes = true;
                }
                if current.mtime != remote.mtime {
                    debug!(path = %local_path.display(), "modification time differs, applying attribute changes");
                    apply_attributes = true;
                }
                if current.perm != remote.perm
                    || current.uid != remote.uid
                    || current.gid != remote.gid
                {
                    debug!(path = %local_path.display(), "permissions differ, applying attribute changes");
                    apply_attributes = true;
                }
            }
        }

        if create_file {
            apply_attributes = true;
        }

        if remote.size > 0
            && !remote.kind.is_symlink()
            && (apply_attributes || self.options.always_checksum())
        {
            debug!(path = %local_path.display(), "content validation scheduled");
            copy_verify_file = true;
        }

        // A missing group member materializes as a hard link against the
        // leader instead of a fresh copy.
        if create_file && !just_added_to_cache {
            if let Some(key) = links.key {
                match self.inodes.load(&key) {
                    Some(entry) => {
                        if entry.leader_path != local_path {
                            debug!(
                                path = %local_path.display(),
                                leader = %entry.leader_path.display(),
                                "hardlinking to group leader",
                            );
                            match link_with_retry(&entry.leader_path, &local_path) {
                                Ok(()) => {
                                    create_file = false;
                                    copy_verify_file = false;
                                    apply_attributes = true;
                                }
                                Err(err) => {
                                    error!(
                                        path = %local_path.display(),
                                        leader = %entry.leader_path.display(),
                                        error = %err,
                                        "error hardlinking",
                                    );
                                    return;
                                }
                            }
                        }
                    }
                    None => {
                        error!(
                            file = %remote.name,
                            nlink = remote.nlink,
                            "file should be hardlinked with its group, but no leader is known locally",
                        );
                    }
                }
            }
        }

        if create_file {
            info!(path = %local_path.display(), "creating");
        } else if copy_verify_file {
            info!(path = %local_path.display(), "updating/verifying");
        } else if apply_attributes {
            info!(path = %local_path.display(), "applying attributes");
        }

        if create_file {
            match create_entry(&local_path, &remote) {
                Ok(()) => {}
                Err(err) if err.is_unsupported() => {
                    warn!(path = %local_path.display(), error = %err, "skipping");
                    return;
                }
                Err(err) => {
                    error!(path = %local_path.display(), error = %err, "error creating");
                    return;
                }
            }
        }

        let mut transfer_ok = true;
        if copy_verify_file {
            transfer_ok = self.transfer_blocks(&remote, &local_path, &mut apply_attributes);
        }

        if apply_attributes && transfer_ok {
            debug!(file = %remote.name, "updating metadata");
            if let Err(err) = apply_metadata(&local_path, &remote, self.options.send_acl()) {
                error!(file = %remote.name, error = %err, "error applying metadata");
            }
        }
    }

    /// Publishes the group leader's local inode identity, waiting briefly
    /// for a sibling worker that is still creating the leader.
    fn resolve_group_leader(&self, key: InodeKey, entry: InodeEntry) -> InodeEntry {
        let mut resolved = entry;
        for _ in 0..LEADER_STAT_ATTEMPTS {
            match read_metadata(&resolved.leader_path) {
                Ok(leader) => {
                    self.inodes.mutate(&key, |cached| {
                        cached.publish_local(leader.dev, leader.inode);
                        resolved = cached.clone();
                    });
                    break;
                }
                Err(err) if err.is_not_found() => {
                    warn!(
                        path = %resolved.leader_path.display(),
                        "hardlink leader does not exist yet, delaying a bit",
                    );
                    thread::sleep(LEADER_STAT_DELAY);
                }
                Err(err) => {
                    error!(
                        path = %resolved.leader_path.display(),
                        error = %err,
                        "error reading hardlink leader metadata",
                    );
                    break;
                }
            }
        }
        resolved
    }

    /// Verifies and transfers a file block by block. Returns `false` when
    /// the transfer was abandoned partway; attributes must not be applied
    /// then, so the next run re-detects the inconsistency.
    fn transfer_blocks(
        &self,
        remote: &FileMeta,
        local_path: &Path,
        apply_attributes: &mut bool,
    ) -> bool {
        debug!(file = %remote.name, "processing blocks");

        let mut file = match OpenOptions::new().read(true).write(true).open(local_path) {
            Ok(file) => file,
            Err(err) => {
                error!(path = %local_path.display(), error = %err, "error opening existing local file");
                return false;
            }
        };
        let existing_size = match file.metadata() {
            Ok(md) => md.len(),
            Err(err) => {
                error!(path = %local_path.display(), error = %err, "error reading local file size");
                return false;
            }
        };

        if let Err(err) = self.store.open(&remote.name) {
            error!(file = %remote.name, error = %err, "error opening remote file");
            return false;
        }

        let block_size = self.options.block_size() as u64;
        let mut success = true;
        let mut offset = 0u64;
        while offset < remote.size {
            let length = cmp::min(block_size, remote.size - offset);
            let args = ChunkArgs {
                path: remote.name.clone(),
                offset,
                size: length,
            };

            if offset + length <= existing_size {
                match self.verify_block(&mut file, &args) {
                    BlockCheck::Matches => {
                        offset += length;
                        continue;
                    }
                    BlockCheck::Differs => {}
                    BlockCheck::Failed => {
                        success = false;
                        break;
                    }
                }
            }

            debug!(file = %remote.name, offset, "transferring chunk");
            match self.store.get_chunk(&args) {
                Ok(data) if data.len() as u64 == length => {
                    if let Err(err) = write_block(&mut file, offset, &data) {
                        error!(path = %local_path.display(), offset, error = %err, "error writing chunk");
                        success = false;
                        break;
                    }
                    self.counters.written_bytes.fetch_add(length, Ordering::Relaxed);
                    *apply_attributes = true;
                }
                Ok(data) => {
                    error!(
                        file = %remote.name,
                        offset,
                        expected = length,
                        received = data.len(),
                        "remote returned a short chunk",
                    );
                    success = false;
                    break;
                }
                Err(err) => {
                    error!(file = %remote.name, offset, error = %err, "error transferring chunk");
                    success = false;
                    break;
                }
            }
            offset += length;
        }

        if let Err(err) = self.store.close(&remote.name) {
            error!(file = %remote.name, error = %err, "error closing remote file");
        }
        success
    }

    fn verify_block(&self, file: &mut File, args: &ChunkArgs) -> BlockCheck {
        let remote_digest = match self.store.checksum_chunk(args) {
            Ok(digest) => digest,
            Err(err) => {
                error!(file = %args.path, offset = args.offset, error = %err, "error getting remote checksum");
                return BlockCheck::Failed;
            }
        };

        let mut buffer = vec![0u8; args.size as usize];
        if let Err(err) = read_block(file, args.offset, &mut buffer) {
            error!(file = %args.path, offset = args.offset, error = %err, "error reading existing local chunk");
            return BlockCheck::Failed;
        }
        self.counters.read_bytes.fetch_add(args.size, Ordering::Relaxed);

        let local_digest = chunk_digest(&buffer);
        trace!(
            file = %args.path,
            offset = args.offset,
            "block digest is {local_digest:016X}, remote is {remote_digest:016X}",
        );
        if local_digest == remote_digest {
            BlockCheck::Matches
        } else {
            BlockCheck::Differs
        }
    }

    // ----- finalization cascade -----

    /// Reports one completed entry under `path` and finalizes every
    /// directory whose counter reaches zero, walking toward the root.
    ///
    /// The atomic decrement inside the directory cache is the single
    /// serialization point deciding which caller finalizes a directory.
    fn finished_entry(&self, path: &str) {
        let mut current = path.to_string();
        loop {
            let mut ready: Option<DirState> = None;
            let decremented = self.dirs.mutate(&current, |state| {
                state.remaining -= 1;
                trace!(dir = %current, left = state.remaining, "directory usage decremented");
                // Zero for directories with contents, below zero for ones
                // finalized by their own listing step.
                if state.remaining <= 0 {
                    ready = Some(state.clone());
                }
            });
            if decremented.is_none() {
                error!(dir = %current, "failed to find directory info for postprocessing");
                return;
            }

            let Some(state) = ready else { return };
            // Deletion and attribute application run outside the critical
            // section; the decrement above already picked the single winner.
            self.finalize_dir(&state);
            self.dirs.remove(&current);

            if current == "/" {
                return;
            }
            current = parent_dir(&current).to_string();
        }
    }

    /// Deletes local-only entries and applies the directory's own
    /// attributes. Runs once per directory, after all of its children.
    fn finalize_dir(&self, state: &DirState) {
        if self.aborted() {
            return;
        }

        let local_dir = self.local_path(&state.meta.name);
        if self.options.delete() {
            for extra in &state.extra_entries {
                let target = local_dir.join(extra);
                debug!(path = %target.display(), "removing local-only entry");
                match remove_entry_at(&target) {
                    Ok(()) => {
                        self.counters.entries_deleted.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        error!(path = %target.display(), error = %err, "error removing local-only entry");
                    }
                }
            }
        }

        // Child mutations touched the directory mtime, so the directory's
        // own attributes go last.
        if let Err(err) = apply_metadata(&local_dir, &state.meta, self.options.send_acl()) {
            error!(dir = %local_dir.display(), error = %err, "error applying directory metadata");
        }
    }

    fn record_fatal(&self, error: EngineError) {
        self.abort();
        let mut slot = lock(&self.fatal);
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    fn local_path(&self, name: &str) -> PathBuf {
        self.options.base_path().join(name.trim_start_matches('/'))
    }
}

/// Outcome of comparing one local block against the remote digest.
enum BlockCheck {
    Matches,
    Differs,
    Failed,
}

/// Hardlink bookkeeping carried across one file's reconciliation.
#[derive(Debug)]
struct HardlinkTicket {
    key: Option<InodeKey>,
    remaining: i64,
}

impl Default for HardlinkTicket {
    fn default() -> Self {
        Self {
            key: None,
            remaining: -1,
        }
    }
}

/// Wait-group for outstanding directory listings: incremented when a
/// directory is queued, decremented when its listing has been applied.
/// Reaching zero means no further directory can ever be enqueued.
#[derive(Debug, Default)]
struct PendingListings {
    count: Mutex<u64>,
    idle: Condvar,
}

impl PendingListings {
    fn add(&self, n: u64) {
        *lock(&self.count) += n;
    }

    fn done(&self) {
        let mut count = lock(&self.count);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait(&self) {
        let mut count = lock(&self.count);
        while *count > 0 {
            count = self
                .idle
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// In-flight queue handles exposed for progress reporting.
#[derive(Debug, Default)]
struct Progress {
    file_queue: Mutex<Option<Sender<FileMeta>>>,
    stage_depth: Mutex<Option<Arc<AtomicUsize>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn remove_entry_at(path: &Path) -> io::Result<()> {
    let md = fs::symlink_metadata(path)?;
    if md.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn truncate_file(path: &Path, size: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(size)
}

fn read_block(file: &mut File, offset: u64, buffer: &mut [u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buffer)
}

fn write_block(file: &mut File, offset: u64, data: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(data)
}

fn link_with_retry(leader: &Path, destination: &Path) -> io::Result<()> {
    let mut attempts = 0;
    loop {
        match fs::hard_link(leader, destination) {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound && attempts < LINK_ATTEMPTS => {
                attempts += 1;
                thread::sleep(LINK_RETRY_DELAY);
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_listings_wait_returns_at_zero() {
        let pending = PendingListings::default();
        pending.add(2);

        thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(10));
                pending.done();
                pending.done();
            });
            pending.wait();
        });
        assert_eq!(*lock(&pending.count), 0);
    }

    #[test]
    fn pending_listings_wait_is_immediate_when_idle() {
        let pending = PendingListings::default();
        pending.wait();
    }

    #[test]
    fn remove_entry_handles_files_and_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("f");
        fs::write(&file, b"x").expect("write");
        remove_entry_at(&file).expect("remove file");
        assert!(!file.exists());

        let dir = temp.path().join("d");
        fs::create_dir(&dir).expect("mkdir");
        fs::write(dir.join("inner"), b"x").expect("write inner");
        remove_entry_at(&dir).expect("remove dir");
        assert!(!dir.exists());
    }

    #[test]
    fn link_retry_succeeds_immediately_when_leader_exists() {
        let temp = tempfile::tempdir().expect("tempdir");
        let leader = temp.path().join("leader");
        let link = temp.path().join("link");
        fs::write(&leader, b"content").expect("write");

        link_with_retry(&leader, &link).expect("link");
        assert_eq!(fs::read(&link).expect("read"), b"content");
    }

    #[test]
    fn block_io_round_trips_at_offsets() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("blocks");
        fs::write(&path, vec![0u8; 16]).expect("seed");

        let mut file = OpenOptions::new().read(true).write(true).open(&path).expect("open");
        write_block(&mut file, 4, b"abcd").expect("write block");

        let mut buffer = [0u8; 4];
        read_block(&mut file, 4, &mut buffer).expect("read block");
        assert_eq!(&buffer, b"abcd");
    }
}
