//! Stable inode numbers for catalog entries.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Inode of the mount root.
pub const ROOT_INODE: u64 = 1;

/// Name to inode mapping for a flat directory.
///
/// Inodes are assigned on first use and never reused within a mount, so a
/// name keeps its inode across catalog rebuilds.
pub struct InodeTable {
    by_name: DashMap<String, u64>,
    by_inode: DashMap<u64, String>,
    next: AtomicU64,
}

impl InodeTable {
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            by_inode: DashMap::new(),
            next: AtomicU64::new(ROOT_INODE + 1),
        }
    }

    /// Inode for `name`, assigning one if needed.
    pub fn inode_for(&self, name: &str) -> u64 {
        if let Some(ino) = self.by_name.get(name) {
            return *ino;
        }
        let ino = *self
            .by_name
            .entry(name.to_string())
            .or_insert_with(|| self.next.fetch_add(1, Ordering::Relaxed));
        self.by_inode.insert(ino, name.to_string());
        ino
    }

    /// Name previously assigned `ino`.
    pub fn name_of(&self, ino: u64) -> Option<String> {
        self.by_inode.get(&ino).map(|name| name.clone())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inodes_are_stable_and_unique() {
        let table = InodeTable::new();
        let a = table.inode_for("frame-000000.dng");
        let b = table.inode_for("frame-000001.dng");

        assert!(a > ROOT_INODE);
        assert_ne!(a, b);
        assert_eq!(table.inode_for("frame-000000.dng"), a);
        assert_eq!(table.name_of(b).as_deref(), Some("frame-000001.dng"));
        assert_eq!(table.name_of(999), None);
        assert_eq!(table.len(), 2);
    }
}
