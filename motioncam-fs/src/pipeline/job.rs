//! Frame jobs and the two pipeline stages.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::cache::CacheKey;
use crate::catalog::RenderOptions;
use crate::decoder::{ContainerMetadata, DecodeError, DecodedFrame, DecoderPool, Timestamp};
use crate::render::{render_unwinding, FrameRenderer, RenderError, RenderRequest};

/// Everything needed to regenerate one frame.
///
/// Holds only owned data so a job can outlive the engine that submitted it.
#[derive(Debug, Clone)]
pub struct FrameJob {
    /// Cache key the result is stored under; also the coalescing key.
    pub key: CacheKey,
    pub source: Arc<PathBuf>,
    pub timestamp: Timestamp,
    /// Position of `timestamp` in the container's frame list.
    pub frame_index: usize,
    pub fps: f32,
    pub options: RenderOptions,
    pub scale: u32,
    pub container: Arc<ContainerMetadata>,
}

/// Decode stage: load the raw frame through a pooled decoder.
///
/// Runs on the I/O pool. A decoder that fails with anything other than
/// "frame not found" is discarded rather than returned to the pool.
#[instrument(skip_all, fields(key = %job.key, timestamp = job.timestamp))]
pub fn decode_stage(job: &FrameJob, decoders: &DecoderPool) -> Result<DecodedFrame, DecodeError> {
    let mut lease = decoders.checkout(&job.source)?;
    let loaded = lease.decoder().load_frame(job.timestamp);
    match loaded {
        Ok(frame) => {
            debug!(
                raw_bytes = frame.raw.len(),
                width = frame.metadata.width(),
                height = frame.metadata.height(),
                "Decode stage complete"
            );
            Ok(frame)
        }
        Err(err @ DecodeError::FrameNotFound(_)) => Err(err),
        Err(err) => {
            lease.discard();
            Err(err)
        }
    }
}

/// Render stage: encode the decoded frame.
///
/// Runs on the processing pool. A renderer panic fails only this job.
#[instrument(skip_all, fields(key = %job.key, scale = job.scale))]
pub fn render_stage(
    job: &FrameJob,
    frame: &DecodedFrame,
    renderer: &dyn FrameRenderer,
) -> Result<Vec<u8>, RenderError> {
    let request = RenderRequest {
        raw: &frame.raw,
        frame: &frame.metadata,
        container: &job.container,
        fps: job.fps,
        frame_index: job.frame_index,
        options: job.options,
        scale: job.scale,
    };
    let rendered = render_unwinding(renderer, &request)?;
    debug!(size_bytes = rendered.len(), "Render stage complete");
    Ok(rendered)
}
