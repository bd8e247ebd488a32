//! Virtual filesystem engine.
//!
//! One engine per mounted container. It owns the catalog snapshot and
//! answers listing, lookup and reads; frame bytes come from the shared cache
//! or the shared [`FramePipeline`](crate::pipeline::FramePipeline).

mod engine;

use bytes::Bytes;
use thiserror::Error;

pub use engine::McrawFileSystem;

use crate::catalog::{CatalogError, DraftScale, Entry, RenderOptions};
use crate::pipeline::PipelineError;

/// Failure to (re)initialize an engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Failed to build catalog: {0}")]
    Catalog(#[from] CatalogError),
}

/// Failure of a single read.
#[derive(Debug, Clone, Error)]
pub enum ReadError {
    /// The entry is not part of the current catalog.
    #[error("No such entry: {0}")]
    NotFound(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The pipeline went away before delivering a result.
    #[error("Read interrupted before completion")]
    Interrupted,
}

/// Result of a non-blocking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes available immediately.
    Ready(Bytes),
    /// The result will be delivered to the callback.
    Pending,
}

/// Read-only view of one mounted container.
pub trait VirtualFileSystem: Send + Sync {
    /// Every entry of the current catalog, in listing order.
    fn list_files(&self) -> Vec<Entry>;

    /// Look up an entry by name; leading slashes are ignored.
    fn find_entry(&self, path: &str) -> Option<Entry>;

    /// Read up to `len` bytes of `entry` at `offset`, blocking until done.
    ///
    /// Returns fewer bytes near the end of the file and none past it.
    fn read_file(&self, entry: &Entry, offset: u64, len: usize) -> Result<Bytes, ReadError>;

    /// Rebuild the catalog for new render options.
    ///
    /// Bytes rendered under the previous options are never served again.
    fn update_options(&self, options: RenderOptions, draft_scale: DraftScale)
        -> Result<(), EngineError>;
}
