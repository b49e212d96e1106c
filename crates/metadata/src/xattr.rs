use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use crate::error::MetadataError;

#[cfg(unix)]
fn map_xattr_error(context: &'static str, path: &Path, error: io::Error) -> MetadataError {
    if error.kind() == io::ErrorKind::Unsupported {
        MetadataError::unsupported("extended attributes")
    } else {
        MetadataError::new(context, path, error)
    }
}

/// Reads all extended attributes of `path` without following symlinks.
///
/// Returns `None` when the filesystem does not support extended attributes;
/// individual unreadable attributes are logged and omitted.
#[cfg(unix)]
#[must_use]
pub(crate) fn read_xattrs(path: &Path) -> Option<BTreeMap<String, Vec<u8>>> {
    let names = match xattr::list(path) {
        Ok(names) => names,
        Err(error) => {
            if error.kind() != io::ErrorKind::Unsupported {
                tracing::warn!(path = %path.display(), %error, "failed to list extended attributes");
            }
            return None;
        }
    };

    let mut attrs = BTreeMap::new();
    for name in names {
        let key = name.to_string_lossy().into_owned();
        match xattr::get(path, &name) {
            Ok(Some(value)) => {
                attrs.insert(key, value);
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(path = %path.display(), attr = %key, %error, "failed to read extended attribute");
            }
        }
    }
    Some(attrs)
}

#[cfg(not(unix))]
#[must_use]
pub(crate) fn read_xattrs(_path: &Path) -> Option<BTreeMap<String, Vec<u8>>> {
    None
}

/// Reconciles the extended attributes on `path` to match `desired`.
///
/// Attributes absent from `desired` are removed, differing or missing values
/// are rewritten, matching values are left untouched.
#[cfg(unix)]
pub(crate) fn apply_xattrs(
    path: &Path,
    desired: &BTreeMap<String, Vec<u8>>,
) -> Result<(), MetadataError> {
    let current = read_xattrs(path).unwrap_or_default();

    for name in current.keys() {
        if !desired.contains_key(name) {
            xattr::remove(path, name)
                .map_err(|error| map_xattr_error("remove extended attribute", path, error))?;
        }
    }

    for (name, value) in desired {
        if current.get(name).is_some_and(|existing| existing == value) {
            continue;
        }
        xattr::set(path, name, value)
            .map_err(|error| map_xattr_error("write extended attribute", path, error))?;
    }

    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn apply_xattrs(
    _path: &Path,
    _desired: &BTreeMap<String, Vec<u8>>,
) -> Result<(), MetadataError> {
    Err(MetadataError::unsupported("extended attributes"))
}
