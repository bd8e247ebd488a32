//! Align an audio track with the first video frame.

use tracing::{debug, warn};

use crate::decoder::{AudioChunk, Timestamp};

/// Drift beyond which the track is left unsynchronized.
pub const MAX_SYNC_DRIFT_MS: f64 = 1000.0;

const NANOS_PER_MILLI: f64 = 1e6;
const NANOS_PER_SECOND: f64 = 1e9;

/// What [`synchronize`] did to the chunk sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    /// Audio already starts with the video, or there is no audio.
    Unchanged,
    /// Audio started late: `frames` sample frames were cut from the front.
    Trimmed { frames: u64 },
    /// Audio started early: `frames` sample frames of silence were prepended.
    Padded { frames: u64 },
    /// Drift too large to be a plausible offset; nothing was changed.
    Abandoned { drift_ms: f64 },
}

/// Synchronize `chunks` to the video track starting at `first_video`.
///
/// Chunk samples are interleaved with `channels` channels at
/// `sample_rate_hz`. A positive drift trims whole chunks from the front and
/// partially trims the chunk straddling the cut, advancing its timestamp by
/// the trimmed duration. A negative drift prepends a silence chunk at
/// `first_video` and shifts every following chunk by the silence duration.
pub fn synchronize(
    chunks: &mut Vec<AudioChunk>,
    first_video: Timestamp,
    sample_rate_hz: u32,
    channels: u16,
) -> SyncOutcome {
    let Some(first_audio) = chunks.first().map(|chunk| chunk.timestamp) else {
        return SyncOutcome::Unchanged;
    };
    if sample_rate_hz == 0 || channels == 0 {
        return SyncOutcome::Unchanged;
    }

    let drift_ms = (first_audio - first_video) as f64 / NANOS_PER_MILLI;
    if drift_ms.abs() > MAX_SYNC_DRIFT_MS {
        warn!(drift_ms, "Audio drift too large, leaving audio unsynchronized");
        return SyncOutcome::Abandoned { drift_ms };
    }

    let frames = (drift_ms.abs() * sample_rate_hz as f64 / 1000.0).round() as u64;
    if frames == 0 {
        return SyncOutcome::Unchanged;
    }

    debug!(drift_ms, frames, "Synchronizing audio to first video frame");

    if drift_ms > 0.0 {
        trim_front(chunks, frames * channels as u64, sample_rate_hz, channels);
        SyncOutcome::Trimmed { frames }
    } else {
        let silence = vec![0i16; (frames * channels as u64) as usize];
        let shift = frames_to_nanos(frames, sample_rate_hz);
        for chunk in chunks.iter_mut() {
            chunk.timestamp += shift;
        }
        chunks.insert(0, AudioChunk::new(first_video, silence));
        SyncOutcome::Padded { frames }
    }
}

fn trim_front(chunks: &mut Vec<AudioChunk>, samples: u64, sample_rate_hz: u32, channels: u16) {
    let mut remaining = samples as usize;
    let mut whole_chunks = 0;

    for chunk in chunks.iter() {
        if chunk.samples.len() > remaining {
            break;
        }
        remaining -= chunk.samples.len();
        whole_chunks += 1;
    }
    chunks.drain(..whole_chunks);

    if remaining > 0 {
        if let Some(chunk) = chunks.first_mut() {
            chunk.samples.drain(..remaining);
            let trimmed_frames = (remaining / channels as usize) as u64;
            chunk.timestamp += frames_to_nanos(trimmed_frames, sample_rate_hz);
        }
    }
}

fn frames_to_nanos(frames: u64, sample_rate_hz: u32) -> Timestamp {
    (frames as f64 * NANOS_PER_SECOND / sample_rate_hz as f64).round() as Timestamp
}
