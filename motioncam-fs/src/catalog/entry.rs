//! Catalog entries describing the virtual files of one mounted container.

use crate::decoder::Timestamp;

/// Name of the synthesized audio file.
pub const AUDIO_FILE_NAME: &str = "audio.wav";

/// Prefix shared by every frame file name.
pub const FRAME_FILE_PREFIX: &str = "frame-";

/// Zero padding width of the frame number in file names.
pub const FRAME_NUMBER_WIDTH: usize = 6;

/// Kind of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Opaque tag used to regenerate the bytes of an entry on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTag {
    /// A video frame rendered from the source frame at `timestamp`.
    Frame { timestamp: Timestamp },
    /// The pre-built audio track.
    Audio,
}

/// One virtual file exposed by a mount.
///
/// Entries are immutable once published into a catalog. The `size` of frame
/// entries is an estimate taken from a representative rendered frame, so
/// readers must tolerate the generated length differing from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub kind: EntryKind,
    pub name: String,
    pub size: u64,
    pub tag: EntryTag,
}

impl Entry {
    /// Create a frame entry for the given frame number.
    pub fn frame(index: u64, extension: &str, size: u64, timestamp: Timestamp) -> Self {
        Self {
            kind: EntryKind::File,
            name: frame_file_name(index, extension),
            size,
            tag: EntryTag::Frame { timestamp },
        }
    }

    /// Create the audio entry.
    pub fn audio(size: u64) -> Self {
        Self {
            kind: EntryKind::File,
            name: AUDIO_FILE_NAME.to_string(),
            size,
            tag: EntryTag::Audio,
        }
    }

    /// Path of the entry relative to the mount root.
    ///
    /// The tree is flat, so this is the file name.
    pub fn full_path(&self) -> &str {
        &self.name
    }

    pub fn is_frame(&self) -> bool {
        matches!(self.tag, EntryTag::Frame { .. })
    }
}

/// Build a zero-padded frame file name, e.g. `frame-000042.dng`.
pub fn frame_file_name(index: u64, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        format!(
            "{}{:0width$}",
            FRAME_FILE_PREFIX,
            index,
            width = FRAME_NUMBER_WIDTH
        )
    } else {
        format!(
            "{}{:0width$}.{}",
            FRAME_FILE_PREFIX,
            index,
            extension,
            width = FRAME_NUMBER_WIDTH
        )
    }
}

/// Normalize a path received from the kernel or a caller to a catalog name.
///
/// Accepts `name`, `/name` and `//name`.
pub fn normalize_path(path: &str) -> &str {
    path.trim_start_matches('/')
}
