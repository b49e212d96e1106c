use metadata::FileMeta;

use crate::store::SharedMap;

/// `remaining` value meaning the remote listing has not arrived yet.
pub const LISTING_PENDING: i64 = -1;

/// Deferred finalization payload for one remote directory.
#[derive(Clone, Debug)]
pub struct DirState {
    /// Remote record for the directory, applied during finalization.
    pub meta: FileMeta,
    /// Local-only child basenames, removed during finalization when
    /// deletion mode is enabled.
    pub extra_entries: Vec<String>,
    /// Children still outstanding. [`LISTING_PENDING`] until the remote
    /// listing is applied; then the number of returned children, counted
    /// down once per completed child.
    pub remaining: i64,
}

impl DirState {
    /// Creates the pre-listing state inserted before a directory is queued.
    #[must_use]
    pub fn pending(meta: FileMeta) -> Self {
        Self {
            meta,
            extra_entries: Vec::new(),
            remaining: LISTING_PENDING,
        }
    }
}

/// Directories awaiting finalization, keyed by logical path.
pub type DirCache = SharedMap<String, DirState>;
