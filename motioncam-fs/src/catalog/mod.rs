//! Entry catalog of a mounted container.
//!
//! A catalog is a flat list of virtual files derived from the container:
//!
//! ```text
//! audio.wav            (only when the container has audio)
//! frame-000000.dng
//! frame-000001.dng     (backfilled with the next real frame if dropped)
//! ...
//! ```
//!
//! Catalogs are immutable [`CatalogSnapshot`]s built by [`CatalogBuilder`]
//! and replaced as a whole when render options change.

mod builder;
mod entry;
mod options;
mod timing;

use thiserror::Error;

pub use builder::{CatalogBuilder, CatalogSnapshot};
pub use entry::{
    frame_file_name, normalize_path, Entry, EntryKind, EntryTag, AUDIO_FILE_NAME,
    FRAME_FILE_PREFIX, FRAME_NUMBER_WIDTH,
};
pub use options::{DraftScale, InvalidDraftScale, RenderOptions};
pub use timing::{frame_number, frame_rate, number_frames};

use crate::decoder::DecodeError;
use crate::render::RenderError;

/// Failure to build a catalog.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Failed to read container: {0}")]
    Decode(#[from] DecodeError),

    #[error("Failed to render sample frame: {0}")]
    Render(#[from] RenderError),
}
