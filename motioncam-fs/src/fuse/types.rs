//! Mount errors and kernel mount table helpers.

use std::io;
use std::path::Path;
use std::process::Command;

use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while mounting.
#[derive(Debug, Error)]
pub enum MountError {
    /// I/O error while preparing the mount point
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The kernel mount failed
    #[error("Mount failed: {0}")]
    MountFailed(String),

    /// The mount point is not usable
    #[error("Invalid mount point: {0}")]
    InvalidPath(String),
}

/// Whether `path` is listed in `/proc/mounts`.
pub fn is_mounted(path: &Path) -> bool {
    let Ok(mounts) = std::fs::read_to_string("/proc/mounts") else {
        return false;
    };
    let path = path.to_string_lossy();
    mounts
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|mounted| mounted == path)
}

/// Unmount with `fusermount`, escalating to a lazy unmount if busy.
///
/// Only used when the session did not unmount on its own.
pub fn force_unmount(path: &Path) {
    let mountpoint = path.to_string_lossy().to_string();

    if try_fusermount(&mountpoint, false) {
        debug!(mountpoint = %mountpoint, "fusermount unmount succeeded");
        return;
    }

    std::thread::sleep(std::time::Duration::from_millis(500));
    if !is_mounted(path) {
        return;
    }

    warn!(mountpoint = %mountpoint, "Unmount failed (likely busy), escalating to lazy unmount");
    if !try_fusermount(&mountpoint, true) {
        warn!(mountpoint = %mountpoint, "Lazy unmount also failed, mount may need manual cleanup");
    }
}

fn try_fusermount(mountpoint: &str, lazy: bool) -> bool {
    let args: &[&str] = if lazy {
        &["-uz", mountpoint]
    } else {
        &["-u", mountpoint]
    };

    let result = Command::new("fusermount3")
        .args(args)
        .output()
        .or_else(|_| Command::new("fusermount").args(args).output());

    match result {
        Ok(output) if output.status.success() => true,
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Already gone counts as success
            if stderr.contains("not found") || stderr.contains("not mounted") {
                true
            } else {
                debug!(mountpoint = %mountpoint, lazy, stderr = %stderr, "fusermount failed");
                false
            }
        }
        Err(err) => {
            debug!(mountpoint = %mountpoint, error = %err, "fusermount not available");
            false
        }
    }
}
