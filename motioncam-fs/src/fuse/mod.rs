//! FUSE filesystem integration.
//!
//! Exposes one engine as a flat, read-only directory:
//!
//! ```text
//! /mnt/clip/
//! ├── audio.wav
//! ├── frame-000000.dng
//! ├── frame-000001.dng
//! └── ...
//! ```
//!
//! [`McrawFuse`] translates kernel callbacks into engine calls and
//! [`MountSession`] owns the loop thread and the mount lifecycle.
//!
//! # Example
//!
//! ```ignore
//! use motioncam_fs::fuse::{McrawFuse, MountSession};
//!
//! let fs = McrawFuse::new(engine, Duration::from_secs(1));
//! let mut session = MountSession::start(fs, Path::new("/mnt/clip"), true)?;
//! // ...
//! session.shutdown().wait();
//! ```

mod filesystem;
mod inode;
mod session;
mod types;

pub use filesystem::McrawFuse;
pub use inode::{InodeTable, ROOT_INODE};
pub use session::{
    remove_dir_if_empty, MountSession, SessionState, TeardownHandle, FS_NAME, FS_SUBTYPE,
};
pub use types::{force_unmount, is_mounted, MountError};
