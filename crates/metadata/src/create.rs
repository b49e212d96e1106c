use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

use crate::error::MetadataError;
use crate::record::{FileKind, FileMeta};

/// Creates the filesystem entry described by `meta` at `destination`.
///
/// Regular files are created empty (content transfer happens separately) and
/// existing regular files are left in place. Returns
/// [`MetadataError::Unsupported`] for entry kinds this platform cannot
/// create, which callers treat as a soft skip.
pub fn create_entry(destination: &Path, meta: &FileMeta) -> Result<(), MetadataError> {
    match meta.kind {
        FileKind::Regular => OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(destination)
            .map(drop)
            .map_err(|error| MetadataError::new("create file", destination, error)),
        FileKind::Directory => fs::create_dir_all(destination)
            .map_err(|error| MetadataError::new("create directory", destination, error)),
        FileKind::Symlink => create_symlink(destination, meta),
        FileKind::Fifo | FileKind::Socket | FileKind::CharDevice | FileKind::BlockDevice => {
            create_node(destination, meta.kind, meta.perm, meta.rdev)
        }
    }
}

#[cfg(unix)]
fn create_symlink(destination: &Path, meta: &FileMeta) -> Result<(), MetadataError> {
    let target = meta.link_to.as_deref().ok_or_else(|| {
        MetadataError::new(
            "create symlink",
            destination,
            io::Error::new(io::ErrorKind::InvalidInput, "record carries no link target"),
        )
    })?;
    std::os::unix::fs::symlink(target, destination)
        .map_err(|error| MetadataError::new("create symlink", destination, error))
}

#[cfg(not(unix))]
fn create_symlink(_destination: &Path, _meta: &FileMeta) -> Result<(), MetadataError> {
    Err(MetadataError::unsupported("symlink creation"))
}

#[cfg(unix)]
fn create_node(
    destination: &Path,
    kind: FileKind,
    perm: u32,
    rdev: u64,
) -> Result<(), MetadataError> {
    use rustix::fs::{CWD, FileType, Mode, mknodat};

    let file_type = match kind {
        FileKind::Fifo => FileType::Fifo,
        FileKind::Socket => FileType::Socket,
        FileKind::CharDevice => FileType::CharacterDevice,
        _ => FileType::BlockDevice,
    };

    mknodat(
        CWD,
        destination,
        file_type,
        Mode::from_raw_mode(perm),
        rdev,
    )
    .map_err(|error| {
        MetadataError::new("create special file", destination, io::Error::from(error))
    })
}

#[cfg(not(unix))]
fn create_node(
    _destination: &Path,
    _kind: FileKind,
    _perm: u32,
    _rdev: u64,
) -> Result<(), MetadataError> {
    Err(MetadataError::unsupported("special file creation"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::read_metadata;

    #[test]
    fn creates_empty_regular_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("fresh");
        let meta = FileMeta::new("fresh", FileKind::Regular);

        create_entry(&file, &meta).expect("create");
        let created = read_metadata(&file).expect("read back");
        assert_eq!(created.kind, FileKind::Regular);
        assert_eq!(created.size, 0);
    }

    #[test]
    fn existing_file_content_survives_create() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("kept");
        fs::write(&file, b"existing content").expect("seed");

        create_entry(&file, &FileMeta::new("kept", FileKind::Regular)).expect("create");
        assert_eq!(fs::read(&file).expect("read"), b"existing content");
    }

    #[test]
    fn creates_nested_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("a/b/c");

        create_entry(&dir, &FileMeta::new("a/b/c", FileKind::Directory)).expect("create");
        assert!(dir.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn creates_symlink_with_target() {
        let temp = tempfile::tempdir().expect("tempdir");
        let link = temp.path().join("link");
        let mut meta = FileMeta::new("link", FileKind::Symlink);
        meta.link_to = Some("over/there".to_string());

        create_entry(&link, &meta).expect("create");
        assert_eq!(
            fs::read_link(&link).expect("read link").to_str(),
            Some("over/there")
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlink_without_target_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let link = temp.path().join("untargeted");
        let meta = FileMeta::new("untargeted", FileKind::Symlink);
        assert!(create_entry(&link, &meta).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn creates_fifo() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fifo = temp.path().join("pipe");
        let mut meta = FileMeta::new("pipe", FileKind::Fifo);
        meta.perm = 0o644;

        create_entry(&fifo, &meta).expect("create");
        assert_eq!(read_metadata(&fifo).expect("read back").kind, FileKind::Fifo);
    }
}
