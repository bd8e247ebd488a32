//! Shared frame cache.
//!
//! Rendered frames are expensive, so every mount shares one byte-budgeted
//! LRU cache. Keys combine the catalog generation with the entry name:
//!
//! ```text
//! CacheKey { catalog: CatalogId, name: "frame-000042.dng" }
//! ```
//!
//! A new [`CatalogId`] is allocated whenever an engine (re)builds its
//! catalog, so bytes rendered under other options or for another mount are
//! never served.

mod frame_cache;
mod key;

pub use frame_cache::{FrameCache, FrameCacheStats, DEFAULT_FAILURE_BACKOFF};
pub use key::{CacheKey, CatalogId};
