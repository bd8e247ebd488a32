//! On-demand frame generation.
//!
//! A frame read that misses the cache becomes a [`FrameJob`]. The job is
//! decoded on the I/O pool and rendered on the processing pool; the result
//! goes into the shared [`FrameCache`](crate::cache::FrameCache) and back to
//! every reader waiting on it.
//!
//! ```text
//! read ──► cache? ──hit──► bytes
//!            │
//!           miss
//!            ▼
//!      FramePipeline::submit ──► decode_stage (I/O) ──► render_stage (CPU)
//!                                                             │
//!                                  cache.put / mark_load_failed
//! ```

mod frame;
mod job;
mod pools;

use thiserror::Error;

pub use frame::{FramePipeline, PipelineStats};
pub use job::{decode_stage, render_stage, FrameJob};
pub use pools::{PoolBuildError, WorkerPools};

use crate::decoder::DecodeError;
use crate::render::RenderError;

/// Failure of one frame job, shared by every reader coalesced onto it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    /// The frame failed within the failure backoff window.
    #[error("Frame failed recently; not retrying yet")]
    RecentlyFailed,

    /// A pool dropped the job (e.g. during shutdown).
    #[error("Job aborted: {0}")]
    Aborted(String),
}
