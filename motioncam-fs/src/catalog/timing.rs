//! Frame timing: effective frame rate and contiguous frame numbering.
//!
//! Source containers may drop frames, so timestamps are not evenly spaced.
//! The catalog still exposes a contiguous sequence of frame files: every
//! missing frame number is backfilled with the next real frame.

use crate::decoder::Timestamp;

const NANOS_PER_SECOND: f64 = 1e9;

/// Gaps larger than this multiple of the median gap are treated as drops.
const OUTLIER_GAP_FACTOR: f64 = 1.5;

/// Compute the effective frame rate of a sorted timestamp sequence.
///
/// Uses the average of the positive inter-frame gaps that are no larger than
/// 1.5x the median gap, so dropped frames do not drag the rate down.
/// Returns 0.0 when there are fewer than two frames or no positive gaps.
pub fn frame_rate(timestamps: &[Timestamp]) -> f32 {
    let mut gaps: Vec<f64> = timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64)
        .filter(|gap| *gap > 0.0)
        .collect();

    if gaps.is_empty() {
        return 0.0;
    }

    gaps.sort_by(|a, b| a.total_cmp(b));
    let median = gaps[gaps.len() / 2];
    let limit = median * OUTLIER_GAP_FACTOR;

    let (sum, count) = gaps
        .iter()
        .filter(|gap| **gap <= limit)
        .fold((0.0, 0usize), |(sum, count), gap| (sum + gap, count + 1));

    if count == 0 || sum <= 0.0 {
        return 0.0;
    }

    (NANOS_PER_SECOND / (sum / count as f64)) as f32
}

/// Map a timestamp to its frame number relative to `first`.
///
/// Timestamps before `first` and a non-positive frame rate map to frame 0.
pub fn frame_number(timestamp: Timestamp, first: Timestamp, fps: f32) -> u64 {
    if fps <= 0.0 {
        return 0;
    }
    let diff = timestamp - first;
    if diff <= 0 {
        return 0;
    }
    let nanos_per_frame = NANOS_PER_SECOND / fps as f64;
    (diff as f64 / nanos_per_frame).round() as u64
}

/// Assign contiguous frame numbers to a sorted timestamp sequence.
///
/// Returns `(frame_number, timestamp)` pairs starting at 0 and increasing by
/// exactly one. Missing numbers are filled with the next real timestamp;
/// timestamps that land on an already emitted number are skipped.
pub fn number_frames(timestamps: &[Timestamp], fps: f32) -> Vec<(u64, Timestamp)> {
    let Some(&first) = timestamps.first() else {
        return Vec::new();
    };

    let mut numbered = Vec::with_capacity(timestamps.len());
    let mut next = 0u64;

    for &timestamp in timestamps {
        let number = frame_number(timestamp, first, fps);
        while next <= number {
            numbered.push((next, timestamp));
            next += 1;
        }
    }

    numbered
}
