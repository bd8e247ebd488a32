//! MotionCam FS - MotionCam `.mcraw` containers as a read-only filesystem
//!
//! Mounts a container as a flat directory of numbered DNG frames plus an
//! `audio.wav`, rendering each frame on demand when it is read. Nothing
//! decoded is ever written to disk.
//!
//! The container decoder and the DNG renderer are supplied by the caller
//! through [`decoder::DecoderFactory`] and [`render::FrameRenderer`].
//!
//! ```ignore
//! use motioncam_fs::{catalog::{DraftScale, RenderOptions}, config::HostConfig, host::FilesystemHost};
//!
//! let host = FilesystemHost::new(HostConfig::default(), decoder_factory, renderer)?;
//! let id = host.mount(
//!     RenderOptions::new().with_vignette_correction(true),
//!     DraftScale::Half,
//!     Path::new("/videos/clip.mcraw"),
//!     Path::new("/mnt/clip"),
//! )?;
//! // ...
//! host.unmount(id);
//! ```

pub mod audio;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod decoder;
pub mod fuse;
pub mod host;
pub mod logging;
pub mod pipeline;
pub mod render;
pub mod vfs;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
