//! Audio track preparation.
//!
//! The audio track of a container is built once per (re)initialization:
//! chunks are aligned with the first video frame ([`synchronize`]) and then
//! packaged into a single in-memory WAV file ([`encode_wav`]) that reads are
//! served from by offset.

mod sync;
mod wav;

pub use sync::{synchronize, SyncOutcome, MAX_SYNC_DRIFT_MS};
pub use wav::{encode_wav, WAV_HEADER_LEN};
