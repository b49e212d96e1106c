//! In-process store serving a local directory tree.
//!
//! [`DirStore`] implements the full [`RemoteStore`](crate::RemoteStore)
//! operation set directly against a directory on this machine. It backs the
//! local replication mode of the CLI and every integration test, standing in
//! for a network peer without any transport underneath.

use std::cmp;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use metadata::{FileMeta, read_metadata};
use tracing::warn;

use crate::digest::chunk_digest;
use crate::error::StoreError;
use crate::path::{child_name, normalize};
use crate::store::RemoteStore;
use crate::types::{ChunkArgs, ListResponse};

/// Serves a local directory through the remote store operations.
///
/// `open` caches a read handle per logical path so repeated chunk requests
/// against the same file skip the per-call open; `close` drops the cached
/// handle. Chunk reads also work without a preceding `open`.
#[derive(Debug)]
pub struct DirStore {
    root: PathBuf,
    handles: DashMap<String, Arc<File>>,
}

impl DirStore {
    /// Creates a store serving the tree rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            handles: DashMap::new(),
        }
    }

    /// Returns the directory this store serves.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let mut resolved = self.root.clone();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => return Err(StoreError::invalid(path, "path escapes the served root")),
                name => resolved.push(name),
            }
        }
        Ok(resolved)
    }

    fn read_range(&self, args: &ChunkArgs) -> Result<Vec<u8>, StoreError> {
        let handle = match self.handles.get(&args.path) {
            Some(cached) => Arc::clone(&cached),
            None => {
                let fs_path = self.resolve(&args.path)?;
                let file = File::open(&fs_path)
                    .map_err(|error| StoreError::io("open", &args.path, error))?;
                Arc::new(file)
            }
        };

        let len = handle
            .metadata()
            .map_err(|error| StoreError::io("stat open file for", &args.path, error))?
            .len();
        if args.offset >= len {
            return Ok(Vec::new());
        }

        let take = cmp::min(args.size, len - args.offset);
        let mut buf = vec![0u8; take as usize];
        read_at(&handle, &mut buf, args.offset)
            .map_err(|error| StoreError::io("read chunk of", &args.path, error))?;
        Ok(buf)
    }
}

impl RemoteStore for DirStore {
    fn stat(&self, path: &str) -> Result<FileMeta, StoreError> {
        let fs_path = self.resolve(path)?;
        let mut meta = read_metadata(&fs_path).map_err(into_store_error(path))?;
        meta.name = normalize(path);
        Ok(meta)
    }

    fn list(&self, path: &str) -> Result<ListResponse, StoreError> {
        let parent = normalize(path);
        let fs_path = self.resolve(path)?;

        let mut names = Vec::new();
        let entries =
            fs::read_dir(&fs_path).map_err(|error| StoreError::io("list", path, error))?;
        for entry in entries {
            let entry = entry.map_err(|error| StoreError::io("list", path, error))?;
            names.push(entry.file_name());
        }
        names.sort();

        let mut files = Vec::with_capacity(names.len());
        for name in names {
            let child_path = fs_path.join(&name);
            match read_metadata(&child_path) {
                Ok(mut meta) => {
                    meta.name = child_name(&parent, &name.to_string_lossy());
                    files.push(meta);
                }
                Err(error) => {
                    // An entry that vanished between readdir and stat is
                    // dropped from the listing rather than failing it.
                    warn!(path = %child_path.display(), %error, "skipping unreadable directory entry");
                }
            }
        }

        Ok(ListResponse { parent, files })
    }

    fn open(&self, path: &str) -> Result<(), StoreError> {
        let fs_path = self.resolve(path)?;
        let file = File::open(&fs_path).map_err(|error| StoreError::io("open", path, error))?;
        self.handles.insert(path.to_string(), Arc::new(file));
        Ok(())
    }

    fn get_chunk(&self, args: &ChunkArgs) -> Result<Vec<u8>, StoreError> {
        self.read_range(args)
    }

    fn checksum_chunk(&self, args: &ChunkArgs) -> Result<u64, StoreError> {
        Ok(chunk_digest(&self.read_range(args)?))
    }

    fn close(&self, path: &str) -> Result<(), StoreError> {
        self.handles.remove(path);
        Ok(())
    }
}

fn into_store_error(path: &str) -> impl FnOnce(metadata::MetadataError) -> StoreError + '_ {
    move |error| match error {
        metadata::MetadataError::Io {
            context, source, ..
        } => StoreError::io(context, path, source),
        other => StoreError::io(
            "read metadata for",
            path,
            io::Error::new(io::ErrorKind::Unsupported, other.to_string()),
        ),
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;

    file.read_exact_at(buf, offset)
}

#[cfg(not(unix))]
fn read_at(mut file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::io::{Read, Seek, SeekFrom};

    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use metadata::FileKind;

    fn chunk(path: &str, offset: u64, size: u64) -> ChunkArgs {
        ChunkArgs {
            path: path.to_string(),
            offset,
            size,
        }
    }

    #[test]
    fn stat_normalizes_root_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = DirStore::new(temp.path());

        let root = store.stat("/").expect("stat root");
        assert_eq!(root.name, "/");
        assert!(root.kind.is_dir());
    }

    #[test]
    fn list_returns_full_child_paths_sorted() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("b.txt"), b"b").expect("write");
        fs::write(temp.path().join("a.txt"), b"a").expect("write");
        fs::create_dir(temp.path().join("sub")).expect("mkdir");

        let store = DirStore::new(temp.path());
        let listing = store.list("/").expect("list root");
        assert_eq!(listing.parent, "/");
        let names: Vec<&str> = listing.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["/a.txt", "/b.txt", "/sub"]);

        let nested = store.list("/sub").expect("list sub");
        assert_eq!(nested.parent, "/sub");
        assert!(nested.files.is_empty());
    }

    #[test]
    fn get_chunk_serves_exact_and_tail_ranges() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("data"), b"0123456789").expect("write");
        let store = DirStore::new(temp.path());

        assert_eq!(store.get_chunk(&chunk("/data", 0, 4)).expect("chunk"), b"0123");
        assert_eq!(store.get_chunk(&chunk("/data", 8, 4)).expect("tail"), b"89");
        assert!(store.get_chunk(&chunk("/data", 20, 4)).expect("past end").is_empty());
    }

    #[test]
    fn checksum_chunk_agrees_with_served_bytes() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("data"), b"0123456789").expect("write");
        let store = DirStore::new(temp.path());

        let args = chunk("/data", 2, 5);
        let bytes = store.get_chunk(&args).expect("chunk");
        assert_eq!(store.checksum_chunk(&args).expect("digest"), chunk_digest(&bytes));
    }

    #[test]
    fn open_close_bracket_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("data"), b"abc").expect("write");
        let store = DirStore::new(temp.path());

        store.open("/data").expect("open");
        store.open("/data").expect("reopen");
        assert_eq!(store.get_chunk(&chunk("/data", 0, 3)).expect("chunk"), b"abc");
        store.close("/data").expect("close");
        store.close("/data").expect("re-close");
    }

    #[test]
    fn escaping_paths_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = DirStore::new(temp.path());
        assert!(store.stat("/../outside").is_err());
    }

    #[test]
    fn stat_on_missing_entry_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = DirStore::new(temp.path());
        assert!(store.stat("/absent").unwrap_err().is_not_found());
    }

    #[test]
    fn symlink_children_keep_their_kind() {
        #[cfg(unix)]
        {
            let temp = tempfile::tempdir().expect("tempdir");
            fs::write(temp.path().join("target"), b"x").expect("write");
            std::os::unix::fs::symlink("target", temp.path().join("link")).expect("symlink");

            let store = DirStore::new(temp.path());
            let listing = store.list("/").expect("list");
            let link = listing
                .files
                .iter()
                .find(|f| f.name == "/link")
                .expect("link listed");
            assert_eq!(link.kind, FileKind::Symlink);
            assert_eq!(link.link_to.as_deref(), Some("target"));
        }
    }
}
