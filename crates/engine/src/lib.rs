#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `engine` hosts the client-side synchronization engine of oc-mirror: it
//! pulls a remote directory hierarchy onto a local path, making the local
//! tree content- and metadata-equivalent to the view a
//! [`RemoteStore`](protocol::RemoteStore) exposes.
//!
//! # Design
//!
//! Discovery and reconciliation run on two fixed-width worker pools.
//! Directory workers list remote directories, reconcile sub-directory
//! existence locally, and fan entries out; file workers reconcile one
//! remote file each against its local counterpart, with content-level
//! delta transfer using fixed-size block checksums and hardlink
//! recreation across the tree. Completion flows back up through a
//! counter-driven finalization cascade that removes stray local entries
//! and applies each directory's own attributes only after all of its
//! children settled.
//!
//! - [`Syncer`] owns a run: queues, caches, counters, and the worker loops.
//! - [`stage`] is the unbounded FIFO decoupling bursty directory discovery
//!   from the bounded worker pool, so wide directories cannot deadlock the
//!   workers feeding themselves.
//! - [`SharedMap`] is the sharded concurrent store beneath the inode cache
//!   ([`InodeCache`]) and the directory cache ([`DirCache`]), providing
//!   the atomic upsert-and-mutate both depend on.
//! - [`SyncOptions`] carries the run configuration; [`CounterSnapshot`]
//!   and [`QueueStats`] expose progress while a run is in flight.
//!
//! # Invariants
//!
//! - Every directory queued for listing has a cache entry (counter
//!   [`LISTING_PENDING`]) inserted before it is enqueued, and is finalized
//!   exactly once, by the cascade.
//! - A directory is finalized strictly after every one of its children has
//!   reported completion; attribute application on a directory
//!   happens-after all child mutations.
//! - A hardlink group transfers content exactly once; the remaining
//!   members materialize as hard links against the first-seen member.
//! - Per-entry failures never wedge a parent directory: an abandoned entry
//!   still releases its parent's counter.
//!
//! # Errors
//!
//! Only failures against the remote root abort a run and surface as
//! [`EngineError`]; everything else is logged with path and cause, skipped,
//! and accounted for.

mod counters;
mod dircache;
mod error;
mod inode;
mod options;
mod stage;
mod store;
mod sync;

pub use counters::{CounterSnapshot, QueueStats};
pub use dircache::{DirCache, DirState, LISTING_PENDING};
pub use error::{EngineError, EngineResult};
pub use inode::{InodeCache, InodeEntry, InodeKey};
pub use options::{DEFAULT_BLOCK_SIZE, DEFAULT_PARALLEL_DIR, DEFAULT_PARALLEL_FILE, SyncOptions};
pub use stage::{StageController, StageSendError, StageSender, stage};
pub use store::SharedMap;
pub use sync::Syncer;
