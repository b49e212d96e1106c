use std::path::Path;

use filetime::{FileTime, set_file_times, set_symlink_file_times};
use tracing::{debug, error};

use crate::acl;
use crate::error::MetadataError;
use crate::record::{FileMeta, TimeSpec, read_metadata};
use crate::xattr;

/// Reconciles ownership, permission bits, ACL, extended attributes, and
/// timestamps on `destination` to match `meta`.
///
/// Attribute classes are applied independently: a failure in one class is
/// logged and does not prevent the remaining classes from being attempted,
/// and classes the platform cannot express are skipped. The only hard
/// failure is being unable to stat `destination` at all.
///
/// Mode, ACL, and extended attributes are never applied to symlinks; for
/// those, ownership and timestamps use the no-follow variants.
pub fn apply_metadata(
    destination: &Path,
    meta: &FileMeta,
    apply_acls: bool,
) -> Result<(), MetadataError> {
    let local = read_metadata(destination)?;

    if local.uid != meta.uid || local.gid != meta.gid {
        if let Err(err) = set_ownership(destination, meta.uid, meta.gid) {
            if err.is_unsupported() {
                debug!(path = %destination.display(), "skipping ownership change: {err}");
            } else {
                error!(path = %destination.display(), "failed to change ownership: {err}");
            }
        }
    }

    if !meta.kind.is_symlink() {
        if local.perm != meta.perm {
            if let Err(err) = set_permissions(destination, meta.perm) {
                error!(path = %destination.display(), "failed to change mode: {err}");
            }
        }

        if apply_acls {
            if let Some(blob) = &meta.acl {
                if let Err(err) = acl::apply_acl(destination, blob) {
                    if !err.is_unsupported() {
                        error!(path = %destination.display(), "failed to apply ACL: {err}");
                    }
                }
            }
        }

        if let Some(attrs) = &meta.xattrs {
            if let Err(err) = xattr::apply_xattrs(destination, attrs) {
                if err.is_unsupported() {
                    debug!(path = %destination.display(), "skipping extended attributes: {err}");
                } else {
                    error!(path = %destination.display(), "failed to apply extended attributes: {err}");
                }
            }
        }
    }

    if local.mtime != meta.mtime {
        if let Err(err) =
            set_timestamps(destination, meta.atime, meta.mtime, meta.kind.is_symlink())
        {
            error!(path = %destination.display(), "failed to change times: {err}");
        }
    }

    Ok(())
}

#[cfg(unix)]
fn set_ownership(path: &Path, uid: u32, gid: u32) -> Result<(), MetadataError> {
    use rustix::fs::{AtFlags, CWD, Gid, Uid, chownat};
    use rustix::process::{RawGid, RawUid};

    // Records carry the numeric ids straight off the wire; no validation
    // is possible until the kernel rejects the chown.
    let (record_owner, record_group) =
        unsafe { (Uid::from_raw(uid as RawUid), Gid::from_raw(gid as RawGid)) };

    chownat(
        CWD,
        path,
        Some(record_owner),
        Some(record_group),
        AtFlags::SYMLINK_NOFOLLOW,
    )
    .map_err(|error| MetadataError::new("change ownership of", path, std::io::Error::from(error)))
}

#[cfg(not(unix))]
fn set_ownership(_path: &Path, _uid: u32, _gid: u32) -> Result<(), MetadataError> {
    Err(MetadataError::unsupported("ownership changes"))
}

#[cfg(unix)]
fn set_permissions(path: &Path, perm: u32) -> Result<(), MetadataError> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = PermissionsExt::from_mode(perm);
    std::fs::set_permissions(path, permissions)
        .map_err(|error| MetadataError::new("change mode of", path, error))
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _perm: u32) -> Result<(), MetadataError> {
    Err(MetadataError::unsupported("permission changes"))
}

fn set_timestamps(
    path: &Path,
    atime: TimeSpec,
    mtime: TimeSpec,
    symlink: bool,
) -> Result<(), MetadataError> {
    let accessed = FileTime::from_unix_time(atime.sec, atime.nsec);
    let modified = FileTime::from_unix_time(mtime.sec, mtime.nsec);

    let result = if symlink {
        set_symlink_file_times(path, accessed, modified)
    } else {
        set_file_times(path, accessed, modified)
    };
    result.map_err(|error| MetadataError::new("change times of", path, error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::read_metadata;
    use std::fs;

    #[test]
    fn applies_timestamps() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("stamped");
        fs::write(&file, b"data").expect("write");

        let mut desired = read_metadata(&file).expect("read");
        desired.mtime = TimeSpec::new(1_600_000_000, 123_456_789);
        desired.atime = TimeSpec::new(1_600_000_000, 0);

        apply_metadata(&file, &desired, false).expect("apply");

        let applied = read_metadata(&file).expect("read back");
        assert_eq!(applied.mtime, desired.mtime);
    }

    #[cfg(unix)]
    #[test]
    fn applies_permission_bits() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("modes");
        fs::write(&file, b"data").expect("write");

        let mut desired = read_metadata(&file).expect("read");
        desired.perm = 0o640;

        apply_metadata(&file, &desired, false).expect("apply");
        assert_eq!(read_metadata(&file).expect("read back").perm, 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_timestamps_do_not_follow() {
        use std::os::unix::fs::symlink;

        let temp = tempfile::tempdir().expect("tempdir");
        let target = temp.path().join("target");
        let link = temp.path().join("link");
        fs::write(&target, b"data").expect("write");
        symlink(&target, &link).expect("symlink");

        let target_before = read_metadata(&target).expect("read target").mtime;

        let mut desired = read_metadata(&link).expect("read link");
        desired.mtime = TimeSpec::new(1_500_000_000, 0);
        apply_metadata(&link, &desired, false).expect("apply");

        assert_eq!(read_metadata(&target).expect("target after").mtime, target_before);
    }

    #[test]
    fn missing_destination_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ghost = temp.path().join("ghost");
        let desired = FileMeta::new("ghost", crate::record::FileKind::Regular);
        let error = apply_metadata(&ghost, &desired, false).unwrap_err();
        assert!(error.is_not_found());
    }
}
