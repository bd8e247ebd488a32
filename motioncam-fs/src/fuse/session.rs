//! Lifecycle of one kernel mount.
//!
//! ```text
//! Created ──start──► Active ──shutdown()──► ShutdownRequested ──teardown──► Terminated
//! ```
//!
//! `shutdown` returns as soon as teardown is scheduled. The teardown thread
//! unmounts, joins the FUSE loop, falls back to `fusermount` if the kernel
//! still lists the mount, and removes the mount directory if it is empty.
//! Completion is observed through the returned [`TeardownHandle`].

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fuser::{BackgroundSession, MountOption};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use super::filesystem::McrawFuse;
use super::types::{force_unmount, is_mounted, MountError};

/// Name the mount shows in the kernel mount table.
pub const FS_NAME: &str = "motioncam-fs";

/// Mount subtype (`fuse.mcraw`).
pub const FS_SUBTYPE: &str = "mcraw";

/// State of a mount session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Active,
    ShutdownRequested,
    Terminated,
}

/// Completion signal of an asynchronous teardown.
#[derive(Clone)]
pub struct TeardownHandle {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl TeardownHandle {
    fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    fn finish(&self) {
        let (done, cond) = &*self.inner;
        *done.lock() = true;
        cond.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Block until teardown has completed.
    pub fn wait(&self) {
        let (done, cond) = &*self.inner;
        let mut finished = done.lock();
        while !*finished {
            cond.wait(&mut finished);
        }
    }

    /// Block until teardown completes or `timeout` elapses.
    ///
    /// Returns whether teardown completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (done, cond) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut finished = done.lock();
        while !*finished {
            if cond.wait_until(&mut finished, deadline).timed_out() {
                break;
            }
        }
        *finished
    }
}

/// Work done off the caller's thread once shutdown is requested.
struct Teardown {
    background: Option<BackgroundSession>,
    mountpoint: PathBuf,
    remove_dir: bool,
    state: Arc<Mutex<SessionState>>,
    handle: TeardownHandle,
}

impl Teardown {
    fn run(self) {
        let mountpoint = self.mountpoint.display().to_string();

        if let Some(background) = self.background {
            // join() unmounts, then joins the loop thread
            if panic::catch_unwind(AssertUnwindSafe(|| background.join())).is_err() {
                warn!(mountpoint = %mountpoint, "FUSE loop thread panicked during unmount");
            }
        }

        if is_mounted(&self.mountpoint) {
            debug!(mountpoint = %mountpoint, "Still mounted after session exit, using fusermount");
            force_unmount(&self.mountpoint);
        }

        if self.remove_dir {
            remove_dir_if_empty(&self.mountpoint);
        }

        *self.state.lock() = SessionState::Terminated;
        info!(mountpoint = %mountpoint, "Mount terminated");
        self.handle.finish();
    }
}

/// Remove `path` if it is an empty directory. Failure is logged, not fatal.
pub fn remove_dir_if_empty(path: &Path) {
    let is_empty = match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => return,
    };
    if !is_empty {
        debug!(path = %path.display(), "Mount directory not empty, leaving it");
        return;
    }
    if let Err(err) = std::fs::remove_dir(path) {
        warn!(path = %path.display(), error = %err, "Failed to remove mount directory");
    }
}

/// One FUSE mount running on its own loop thread.
pub struct MountSession {
    mountpoint: PathBuf,
    state: Arc<Mutex<SessionState>>,
    background: Option<BackgroundSession>,
    teardown: Option<TeardownHandle>,
    remove_dir: bool,
}

impl MountSession {
    /// Mount `fs` at `mountpoint` and start serving.
    ///
    /// With `remove_dir`, teardown deletes the mount directory when empty.
    pub fn start(fs: McrawFuse, mountpoint: &Path, remove_dir: bool) -> Result<Self, MountError> {
        if !mountpoint.is_dir() {
            return Err(MountError::InvalidPath(format!(
                "{} is not a directory",
                mountpoint.display()
            )));
        }

        let state = Arc::new(Mutex::new(SessionState::Created));
        let options = [
            MountOption::RO,
            MountOption::FSName(FS_NAME.to_string()),
            MountOption::Subtype(FS_SUBTYPE.to_string()),
        ];

        let background = fuser::spawn_mount2(fs, mountpoint, &options)
            .map_err(|err| MountError::MountFailed(err.to_string()))?;

        *state.lock() = SessionState::Active;
        info!(mountpoint = %mountpoint.display(), "Mounted");

        Ok(Self {
            mountpoint: mountpoint.to_path_buf(),
            state,
            background: Some(background),
            teardown: None,
            remove_dir,
        })
    }

    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Request shutdown and return immediately.
    ///
    /// Calling it again returns the handle of the teardown already running.
    pub fn shutdown(&mut self) -> TeardownHandle {
        if let Some(handle) = &self.teardown {
            return handle.clone();
        }

        *self.state.lock() = SessionState::ShutdownRequested;
        info!(mountpoint = %self.mountpoint.display(), "Shutdown requested");

        let handle = TeardownHandle::new();
        self.teardown = Some(handle.clone());

        let teardown = Teardown {
            background: self.background.take(),
            mountpoint: self.mountpoint.clone(),
            remove_dir: self.remove_dir,
            state: Arc::clone(&self.state),
            handle: handle.clone(),
        };

        // The closure is lost if spawning fails, so pass the work through a
        // slot the caller can still reach.
        let slot = Arc::new(Mutex::new(Some(teardown)));
        let thread_slot = Arc::clone(&slot);
        let spawned = std::thread::Builder::new()
            .name("mcfs-teardown".to_string())
            .spawn(move || {
                let teardown = thread_slot.lock().take();
                if let Some(teardown) = teardown {
                    teardown.run();
                }
            });

        if let Err(err) = spawned {
            warn!(error = %err, "Failed to spawn teardown thread, tearing down inline");
            let teardown = slot.lock().take();
            if let Some(teardown) = teardown {
                teardown.run();
            }
        }

        handle
    }
}

impl Drop for MountSession {
    fn drop(&mut self) {
        if self.teardown.is_none() {
            self.shutdown();
        }
    }
}
