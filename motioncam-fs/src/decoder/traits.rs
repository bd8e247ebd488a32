//! Decoder service traits.
//!
//! The container decoder is an external collaborator. The core only needs to
//! enumerate frame timestamps, load one frame's raw bytes and metadata, load
//! the audio track, and read container-level metadata.

use std::path::Path;

use serde_json::Value;

use super::DecodeError;

/// Monotonic source timestamp in nanoseconds.
pub type Timestamp = i64;

/// One chunk of interleaved 16-bit audio samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub timestamp: Timestamp,
    pub samples: Vec<i16>,
}

impl AudioChunk {
    pub fn new(timestamp: Timestamp, samples: Vec<i16>) -> Self {
        Self { timestamp, samples }
    }
}

/// Per-frame metadata as stored by the container (JSON).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameMetadata(pub Value);

impl FrameMetadata {
    pub fn width(&self) -> Option<u64> {
        self.0.get("width").and_then(Value::as_u64)
    }

    pub fn height(&self) -> Option<u64> {
        self.0.get("height").and_then(Value::as_u64)
    }
}

/// Container-level camera configuration (JSON).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerMetadata(pub Value);

impl ContainerMetadata {
    /// Camera model string if the container records one.
    pub fn camera_model(&self) -> Option<&str> {
        self.0.get("deviceModel").and_then(Value::as_str)
    }
}

/// Raw sample bytes and metadata of one decoded frame.
#[derive(Debug, Clone, Default)]
pub struct DecodedFrame {
    pub raw: Vec<u8>,
    pub metadata: FrameMetadata,
}

/// An open container.
///
/// Decoder instances are not assumed to be thread-safe: an instance is used
/// by one worker at a time (see [`super::DecoderPool`]), hence `Send` only.
pub trait ContainerDecoder: Send {
    /// All frame timestamps in container order.
    fn frames(&mut self) -> Result<Vec<Timestamp>, DecodeError>;

    /// Load the frame at `timestamp`.
    ///
    /// Returns [`DecodeError::FrameNotFound`] if no frame has that timestamp.
    fn load_frame(&mut self, timestamp: Timestamp) -> Result<DecodedFrame, DecodeError>;

    /// Load every audio chunk in container order. Empty if there is no audio.
    fn load_audio(&mut self) -> Result<Vec<AudioChunk>, DecodeError>;

    fn audio_channels(&self) -> u16;

    fn audio_sample_rate_hz(&self) -> u32;

    fn container_metadata(&self) -> ContainerMetadata;
}

/// Opens decoders for source paths.
pub trait DecoderFactory: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn ContainerDecoder>, DecodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_metadata_dimensions() {
        let meta = FrameMetadata(json!({ "width": 4032, "height": 3024 }));
        assert_eq!(meta.width(), Some(4032));
        assert_eq!(meta.height(), Some(3024));

        let empty = FrameMetadata::default();
        assert_eq!(empty.width(), None);
    }

    #[test]
    fn test_container_camera_model() {
        let meta = ContainerMetadata(json!({ "deviceModel": "Pixel 7" }));
        assert_eq!(meta.camera_model(), Some("Pixel 7"));
        assert_eq!(ContainerMetadata::default().camera_model(), None);
    }

    #[test]
    fn test_factory_is_object_safe() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn DecoderFactory>();
    }
}
