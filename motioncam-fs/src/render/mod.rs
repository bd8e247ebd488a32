//! Renderer service boundary.
//!
//! Turning raw sensor samples into an encoded image file (DNG) is done by an
//! external renderer. The core hands it everything it needs through
//! [`RenderRequest`] and treats the returned bytes as opaque.
//!
//! ```text
//! ┌──────────────────┐   RenderRequest   ┌─────────────────────┐
//! │  FramePipeline   │ ────────────────► │ Arc<dyn FrameRenderer>
//! │ (processing pool)│ ◄──────────────── │                     │
//! └──────────────────┘   Vec<u8> / err   └─────────────────────┘
//! ```

use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;
use tracing::error;

use crate::catalog::RenderOptions;
use crate::decoder::{ContainerMetadata, FrameMetadata};

/// Errors that can occur while rendering a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// Frame metadata is missing required fields or inconsistent.
    #[error("Invalid frame metadata: {0}")]
    InvalidMetadata(String),

    /// Encoding the output image failed.
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    /// The render stage could not run or the renderer panicked.
    #[error("Render stage aborted: {0}")]
    Aborted(String),
}

/// Everything needed to render one frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    /// Raw sample bytes of the frame.
    pub raw: &'a [u8],
    pub frame: &'a FrameMetadata,
    pub container: &'a ContainerMetadata,
    /// Effective frame rate of the container.
    pub fps: f32,
    /// Position of the frame in the container's frame list.
    pub frame_index: usize,
    pub options: RenderOptions,
    /// Downscale factor (1 when not in draft mode).
    pub scale: u32,
}

/// Produces encoded image files from raw frames.
///
/// Implementations must be thread-safe: renders run concurrently on the
/// processing pool.
pub trait FrameRenderer: Send + Sync {
    fn render(&self, request: &RenderRequest<'_>) -> Result<Vec<u8>, RenderError>;

    /// File extension of rendered frames, without the dot.
    fn extension(&self) -> &str {
        "dng"
    }
}

/// Call `renderer`, turning a panic into [`RenderError::Aborted`].
///
/// A failing renderer only fails the frame it was rendering.
pub fn render_unwinding(
    renderer: &dyn FrameRenderer,
    request: &RenderRequest<'_>,
) -> Result<Vec<u8>, RenderError> {
    panic::catch_unwind(AssertUnwindSafe(|| renderer.render(request))).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!(frame_index = request.frame_index, panic = %message, "Renderer panicked");
        Err(RenderError::Aborted(format!("renderer panicked: {}", message)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct EchoRenderer;

    impl FrameRenderer for EchoRenderer {
        fn render(&self, request: &RenderRequest<'_>) -> Result<Vec<u8>, RenderError> {
            if request.raw.is_empty() {
                return Err(RenderError::InvalidMetadata("empty frame".to_string()));
            }
            Ok(request.raw.iter().step_by(request.scale as usize).copied().collect())
        }
    }

    #[test]
    fn test_renderer_trait_object() {
        let renderer: Arc<dyn FrameRenderer> = Arc::new(EchoRenderer);
        let frame = FrameMetadata::default();
        let container = ContainerMetadata::default();
        let raw = [1u8, 2, 3, 4];

        let request = RenderRequest {
            raw: &raw,
            frame: &frame,
            container: &container,
            fps: 30.0,
            frame_index: 0,
            options: RenderOptions::new().with_draft(true),
            scale: 2,
        };

        assert_eq!(renderer.render(&request).unwrap(), vec![1, 3]);
        assert_eq!(renderer.extension(), "dng");
    }

    #[test]
    fn test_render_error_display() {
        let err = RenderError::EncodingFailed("buffer overflow".to_string());
        assert_eq!(err.to_string(), "Encoding failed: buffer overflow");
    }

    struct PanickingRenderer;

    impl FrameRenderer for PanickingRenderer {
        fn render(&self, _request: &RenderRequest<'_>) -> Result<Vec<u8>, RenderError> {
            panic!("bad shading map");
        }
    }

    #[test]
    fn test_render_unwinding_contains_panic() {
        let frame = FrameMetadata::default();
        let container = ContainerMetadata::default();
        let request = RenderRequest {
            raw: &[0u8; 4],
            frame: &frame,
            container: &container,
            fps: 30.0,
            frame_index: 3,
            options: RenderOptions::new(),
            scale: 1,
        };

        let err = render_unwinding(&PanickingRenderer, &request).unwrap_err();
        assert_eq!(
            err,
            RenderError::Aborted("renderer panicked: bad shading map".to_string())
        );
        assert_eq!(render_unwinding(&EchoRenderer, &request).unwrap(), vec![0, 0, 0, 0]);
    }
}
