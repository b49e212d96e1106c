use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::MetadataError;

/// Nanosecond-resolution timestamp, independent of the platform `timespec`
/// width.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TimeSpec {
    /// Whole seconds since the Unix epoch.
    pub sec: i64,
    /// Nanosecond remainder, `0..1_000_000_000`.
    pub nsec: u32,
}

impl TimeSpec {
    /// Creates a timestamp from seconds and nanoseconds.
    #[must_use]
    pub const fn new(sec: i64, nsec: u32) -> Self {
        Self { sec, nsec }
    }

    /// Returns the timestamp as nanoseconds since the Unix epoch.
    #[must_use]
    pub const fn as_nanos(self) -> i128 {
        self.sec as i128 * 1_000_000_000 + self.nsec as i128
    }
}

/// Filesystem entry kinds understood by the replicator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileKind {
    /// Regular file.
    Regular,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Named pipe.
    Fifo,
    /// Unix domain socket.
    Socket,
    /// Character device.
    CharDevice,
    /// Block device.
    BlockDevice,
}

impl FileKind {
    /// Returns `true` for directories.
    #[must_use]
    pub const fn is_dir(self) -> bool {
        matches!(self, Self::Directory)
    }

    /// Returns `true` for symbolic links.
    #[must_use]
    pub const fn is_symlink(self) -> bool {
        matches!(self, Self::Symlink)
    }
}

/// Normalized description of one filesystem entry.
///
/// `name` is the logical path of the entry relative to the tree root the
/// record was read against. Equality is field-wise, which makes the record
/// directly usable for change detection between a remote view and the local
/// tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileMeta {
    /// Logical path relative to the tree root.
    pub name: String,
    /// Entry kind.
    pub kind: FileKind,
    /// Size in bytes.
    pub size: u64,
    /// Permission bits (the `0o7777` portion of the mode).
    pub perm: u32,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Inode number on the originating filesystem.
    pub inode: u64,
    /// Device id of the originating filesystem.
    pub dev: u64,
    /// Hardlink count.
    pub nlink: u64,
    /// Raw device number, for character and block devices.
    pub rdev: u64,
    /// Symlink target, for symbolic links.
    pub link_to: Option<String>,
    /// Last access time.
    pub atime: TimeSpec,
    /// Last modification time.
    pub mtime: TimeSpec,
    /// Last status change time.
    pub ctime: TimeSpec,
    /// Opaque access-control blob, when the platform driver provides one.
    pub acl: Option<Vec<u8>>,
    /// Extended attributes by name.
    pub xattrs: Option<BTreeMap<String, Vec<u8>>>,
}

impl FileMeta {
    /// Creates a zero-filled record with the given name and kind.
    ///
    /// Intended for construction sites that fill in fields incrementally;
    /// records describing real entries come from [`read_metadata`].
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FileKind) -> Self {
        Self {
            name: name.into(),
            kind,
            size: 0,
            perm: 0,
            uid: 0,
            gid: 0,
            inode: 0,
            dev: 0,
            nlink: 1,
            rdev: 0,
            link_to: None,
            atime: TimeSpec::default(),
            mtime: TimeSpec::default(),
            ctime: TimeSpec::default(),
            acl: None,
            xattrs: None,
        }
    }
}

/// Reads the metadata record for `path` without following symlinks.
pub fn read_metadata(path: &Path) -> Result<FileMeta, MetadataError> {
    let md =
        fs::symlink_metadata(path).map_err(|error| MetadataError::new("stat", path, error))?;
    Ok(record_from(path, &md))
}

/// Builds a record from already-fetched [`fs::Metadata`].
///
/// The record's `name` is the lossy string form of `path`; callers mapping a
/// filesystem path to a logical tree path rewrite the field afterwards.
#[cfg(unix)]
#[must_use]
pub fn record_from(path: &Path, md: &fs::Metadata) -> FileMeta {
    use std::os::unix::fs::{FileTypeExt, MetadataExt};

    let ft = md.file_type();
    let kind = if ft.is_dir() {
        FileKind::Directory
    } else if ft.is_symlink() {
        FileKind::Symlink
    } else if ft.is_fifo() {
        FileKind::Fifo
    } else if ft.is_socket() {
        FileKind::Socket
    } else if ft.is_char_device() {
        FileKind::CharDevice
    } else if ft.is_block_device() {
        FileKind::BlockDevice
    } else {
        FileKind::Regular
    };

    let link_to = if kind.is_symlink() {
        match fs::read_link(path) {
            Ok(target) => Some(target.to_string_lossy().into_owned()),
            Err(error) => {
                tracing::error!(path = %path.display(), %error, "failed to read symlink target");
                None
            }
        }
    } else {
        None
    };

    // ACLs and extended attributes are never attached to the link itself.
    let (acl, xattrs) = if kind.is_symlink() {
        (None, None)
    } else {
        (crate::acl::read_acl(path), crate::xattr::read_xattrs(path))
    };

    FileMeta {
        name: path.to_string_lossy().into_owned(),
        kind,
        size: md.size(),
        perm: md.mode() & 0o7777,
        uid: md.uid(),
        gid: md.gid(),
        inode: md.ino(),
        dev: md.dev(),
        nlink: md.nlink(),
        rdev: md.rdev(),
        link_to,
        atime: TimeSpec::new(md.atime(), clamp_nsec(md.atime_nsec())),
        mtime: TimeSpec::new(md.mtime(), clamp_nsec(md.mtime_nsec())),
        ctime: TimeSpec::new(md.ctime(), clamp_nsec(md.ctime_nsec())),
        acl,
        xattrs,
    }
}

/// Builds a record from already-fetched [`fs::Metadata`].
///
/// Non-Unix fallback: entry kind, size, and second-resolution timestamps
/// only.
#[cfg(not(unix))]
#[must_use]
pub fn record_from(path: &Path, md: &fs::Metadata) -> FileMeta {
    use std::time::UNIX_EPOCH;

    let ft = md.file_type();
    let kind = if ft.is_dir() {
        FileKind::Directory
    } else if ft.is_symlink() {
        FileKind::Symlink
    } else {
        FileKind::Regular
    };

    let mut meta = FileMeta::new(path.to_string_lossy().into_owned(), kind);
    meta.size = md.len();
    if let Ok(modified) = md.modified() {
        if let Ok(since_epoch) = modified.duration_since(UNIX_EPOCH) {
            meta.mtime = TimeSpec::new(since_epoch.as_secs() as i64, since_epoch.subsec_nanos());
        }
    }
    meta
}

#[cfg(unix)]
fn clamp_nsec(nsec: i64) -> u32 {
    nsec.clamp(0, 999_999_999) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn timespec_nanos() {
        let ts = TimeSpec::new(5, 250_000_000);
        assert_eq!(ts.as_nanos(), 5_250_000_000);
        assert_eq!(TimeSpec::default().as_nanos(), 0);
    }

    #[test]
    fn regular_file_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("data.bin");
        fs::write(&file, b"0123456789").expect("write");

        let meta = read_metadata(&file).expect("read record");
        assert_eq!(meta.kind, FileKind::Regular);
        assert_eq!(meta.size, 10);
        assert!(meta.link_to.is_none());
    }

    #[test]
    fn directory_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let meta = read_metadata(temp.path()).expect("read record");
        assert!(meta.kind.is_dir());
    }

    #[test]
    fn missing_entry_reports_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let error = read_metadata(&temp.path().join("absent")).unwrap_err();
        assert!(error.is_not_found());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_record_captures_target() {
        use std::os::unix::fs::symlink;

        let temp = tempfile::tempdir().expect("tempdir");
        let link = temp.path().join("link");
        symlink("somewhere/else", &link).expect("symlink");

        let meta = read_metadata(&link).expect("read record");
        assert!(meta.kind.is_symlink());
        assert_eq!(meta.link_to.as_deref(), Some("somewhere/else"));
    }

    #[cfg(unix)]
    #[test]
    fn hardlinked_files_share_inode() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = temp.path().join("first");
        let second = temp.path().join("second");
        fs::write(&first, b"payload").expect("write");
        fs::hard_link(&first, &second).expect("hard link");

        let a = read_metadata(&first).expect("read first");
        let b = read_metadata(&second).expect("read second");
        assert_eq!(a.inode, b.inode);
        assert_eq!(a.dev, b.dev);
        assert_eq!(a.nlink, 2);
    }
}
