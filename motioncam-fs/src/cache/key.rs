//! Cache keys.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CATALOG_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one catalog generation.
///
/// Every (re)initialization of any engine gets a fresh id, so cached bytes
/// from another mount or from before an options change are unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CatalogId(u64);

impl CatalogId {
    /// Allocate a process-wide unique id.
    pub fn next() -> Self {
        Self(NEXT_CATALOG_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "catalog#{}", self.0)
    }
}

/// Key of one cached frame: the entry name within a catalog generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub catalog: CatalogId,
    pub name: String,
}

impl CacheKey {
    pub fn new(catalog: CatalogId, name: impl Into<String>) -> Self {
        Self {
            catalog,
            name: name.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.catalog, self.name)
    }
}
