use std::path::PathBuf;

use crate::store::SharedMap;

/// Identity of one remote inode: the key of a hardlink group.
///
/// Entries on different devices are never the same group, even when the
/// inode numbers collide, so both halves take part in equality and
/// ordering.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InodeKey {
    /// Device id on the remote filesystem.
    pub dev: u64,
    /// Inode number on the remote filesystem.
    pub inode: u64,
}

impl InodeKey {
    /// Creates a key from a remote device and inode pair.
    #[must_use]
    pub const fn new(dev: u64, inode: u64) -> Self {
        Self { dev, inode }
    }
}

/// Coordinator state for one hardlink group.
///
/// `leader_path` is fixed at insertion: it names the local path of the
/// first-seen group member, which every later member links against. The
/// local identity fields start at zero and are published once, when the
/// leader's on-disk inode becomes known.
#[derive(Clone, Debug)]
pub struct InodeEntry {
    /// Local path of the first-seen member of the group.
    pub leader_path: PathBuf,
    /// Device id of the materialized leader; zero until published.
    pub local_dev: u64,
    /// Inode number of the materialized leader; zero until published.
    pub local_inode: u64,
    /// Group members not yet processed; starts at the remote hardlink count.
    pub remaining: i64,
}

impl InodeEntry {
    /// Creates the entry inserted when the first group member is seen.
    #[must_use]
    pub fn new(leader_path: PathBuf, nlink: i64) -> Self {
        Self {
            leader_path,
            local_dev: 0,
            local_inode: 0,
            remaining: nlink,
        }
    }

    /// Publishes the leader's local identity.
    ///
    /// Only the first effective call changes the entry; later calls are
    /// no-ops, keeping the published pair stable for every group member.
    pub fn publish_local(&mut self, dev: u64, inode: u64) {
        if self.local_inode == 0 && inode != 0 {
            self.local_inode = inode;
            self.local_dev = dev;
        }
    }
}

/// Cross-file hardlink coordination cache, keyed by remote inode identity.
pub type InodeCache = SharedMap<InodeKey, InodeEntry>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_separates_devices() {
        assert_ne!(InodeKey::new(1, 42), InodeKey::new(2, 42));
        assert_eq!(InodeKey::new(1, 42), InodeKey::new(1, 42));
    }

    #[test]
    fn key_orders_by_device_then_inode() {
        assert!(InodeKey::new(1, 99) < InodeKey::new(2, 1));
        assert!(InodeKey::new(1, 1) < InodeKey::new(1, 2));
    }

    #[test]
    fn local_identity_publishes_once() {
        let mut entry = InodeEntry::new(PathBuf::from("/dest/a"), 3);
        assert_eq!(entry.local_inode, 0);

        entry.publish_local(10, 1234);
        assert_eq!((entry.local_dev, entry.local_inode), (10, 1234));

        entry.publish_local(11, 5678);
        assert_eq!((entry.local_dev, entry.local_inode), (10, 1234));
    }

    #[test]
    fn zero_inode_is_never_published() {
        let mut entry = InodeEntry::new(PathBuf::from("/dest/a"), 2);
        entry.publish_local(10, 0);
        assert_eq!(entry.local_inode, 0);
    }
}
