//! Access-control-list plumbing.
//!
//! ACLs travel through the replicator as an opaque byte blob so records
//! survive a round trip unchanged. Reading and applying native ACLs requires
//! a platform driver; targets without one use these stubs, which report no
//! ACL on read and decline application.

use std::path::Path;
use std::sync::Once;

use crate::error::MetadataError;

/// Reads the ACL blob for `path`.
#[must_use]
pub(crate) fn read_acl(_path: &Path) -> Option<Vec<u8>> {
    None
}

/// Applies an ACL blob to `path`.
pub(crate) fn apply_acl(_path: &Path, _acl: &[u8]) -> Result<(), MetadataError> {
    warn_acl_unsupported();
    Err(MetadataError::unsupported("ACL application"))
}

fn warn_acl_unsupported() {
    static WARN_ONCE: Once = Once::new();
    WARN_ONCE.call_once(|| {
        tracing::warn!("ACLs are not supported on this platform, skipping ACL application");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_reports_no_acl() {
        assert!(read_acl(Path::new("/tmp")).is_none());
    }

    #[test]
    fn stub_declines_application() {
        let error = apply_acl(Path::new("/tmp"), b"blob").unwrap_err();
        assert!(error.is_unsupported());
    }
}
