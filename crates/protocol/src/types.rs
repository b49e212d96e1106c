use metadata::FileMeta;

/// Byte-range addressing for [`get_chunk`](crate::RemoteStore::get_chunk)
/// and [`checksum_chunk`](crate::RemoteStore::checksum_chunk).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChunkArgs {
    /// Logical path of the file, rooted at the remote root.
    pub path: String,
    /// Byte offset of the block.
    pub offset: u64,
    /// Requested block length in bytes.
    pub size: u64,
}

/// Response to a one-level directory listing.
#[derive(Clone, Debug)]
pub struct ListResponse {
    /// The directory that was listed.
    pub parent: String,
    /// Direct children. Each child's `name` is its full path relative to
    /// the remote root, not a bare basename.
    pub files: Vec<FileMeta>,
}
