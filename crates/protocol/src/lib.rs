#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `protocol` defines the operation surface between the oc-mirror
//! synchronization engine and a store exposing a remote file tree:
//! the [`RemoteStore`] trait with its six request/response operations, the
//! block digest both peers must agree on, helpers for the `/`-rooted
//! logical paths that address every request, and stream adapters for
//! transports.
//!
//! # Design
//!
//! - [`RemoteStore`] is the seam the engine drives: `stat`, `list`,
//!   `open`/`close`, `get_chunk`, and `checksum_chunk`, all addressed by
//!   logical paths relative to the served root.
//! - [`DirStore`] implements the trait directly over a local directory. It
//!   powers the CLI's local replication mode and the integration suite, so
//!   engine behaviour can be exercised without a network peer.
//! - [`chunk_digest`] pins the 64-bit block digest (XXH64, seed 0).
//!   Fixed-offset block equality is the only comparison the engine
//!   performs, so digest agreement is a hard compatibility requirement.
//! - [`CountingStream`] and [`CompressedStream`] wrap transport byte
//!   streams; the wire format below them stays opaque to this crate.
//!
//! # Errors
//!
//! Operations return [`StoreError`]. Callers treat per-entry failures as
//! skip-and-continue; only failures against the served root abort a run.

mod digest;
mod error;
mod local;
pub mod path;
mod store;
mod stream;
mod types;

pub use digest::chunk_digest;
pub use error::StoreError;
pub use local::DirStore;
pub use store::RemoteStore;
pub use stream::{CompressedStream, CountingStream};
pub use types::{ChunkArgs, ListResponse};
