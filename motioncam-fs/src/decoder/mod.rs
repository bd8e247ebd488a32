//! Container decoder service boundary.
//!
//! The low-level MCRAW decoder is consumed through [`ContainerDecoder`] and
//! [`DecoderFactory`]. [`DecoderPool`] keeps opened decoders per source path
//! and hands them to I/O workers one at a time.

mod pool;
mod traits;

use thiserror::Error;

pub use pool::{DecoderLease, DecoderPool};
pub use traits::{
    AudioChunk, ContainerDecoder, ContainerMetadata, DecodedFrame, DecoderFactory, FrameMetadata,
    Timestamp,
};

/// Errors reported by the decoder service.
///
/// `Clone` so a single failed decode can be reported to every reader that
/// was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The container could not be opened.
    #[error("Failed to open {path}: {reason}")]
    Open { path: String, reason: String },

    /// No frame with this timestamp (e.g. the source changed).
    #[error("Frame not found: timestamp {0}")]
    FrameNotFound(Timestamp),

    /// The container data is malformed.
    #[error("Corrupt container data: {0}")]
    Corrupt(String),

    /// I/O error while reading the container.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        DecodeError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::FrameNotFound(42);
        assert_eq!(err.to_string(), "Frame not found: timestamp 42");

        let err = DecodeError::Open {
            path: "/a.mcraw".to_string(),
            reason: "bad magic".to_string(),
        };
        assert!(err.to_string().contains("/a.mcraw"));
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn test_decode_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: DecodeError = io_err.into();
        assert!(matches!(err, DecodeError::Io(_)));
    }
}
