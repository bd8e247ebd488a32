//! Process-wide filesystem host.
//!
//! The host owns the resources shared by every mount (frame cache, worker
//! pools, decoder pool, pipeline) and a registry of active mounts. It is the
//! API the UI layer drives:
//!
//! ```text
//! FilesystemHost
//! ├── FrameCache (shared, byte budget)
//! ├── WorkerPools (I/O + processing)
//! ├── FramePipeline
//! └── mounts: MountId ─► MountRecord { engine, session }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::cache::{FrameCache, FrameCacheStats};
use crate::catalog::{DraftScale, RenderOptions};
use crate::config::HostConfig;
use crate::decoder::{DecoderFactory, DecoderPool};
use crate::fuse::{remove_dir_if_empty, McrawFuse, MountError, MountSession, TeardownHandle};
use crate::pipeline::{FramePipeline, PipelineStats, PoolBuildError, WorkerPools};
use crate::render::FrameRenderer;
use crate::vfs::{EngineError, McrawFileSystem, VirtualFileSystem};

/// Source file extension accepted by [`FilesystemHost::mount`].
pub const SUPPORTED_EXTENSION: &str = "mcraw";

/// Identifier of one mount, unique for the lifetime of the host.
pub type MountId = u64;

/// Errors surfaced to the host's caller.
#[derive(Debug, Error)]
pub enum HostError {
    /// The source is not an `.mcraw` container.
    #[error("Unsupported source format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Mount(#[from] MountError),

    #[error(transparent)]
    Pools(#[from] PoolBuildError),
}

/// One active mount.
pub struct MountRecord {
    pub source: PathBuf,
    pub mountpoint: PathBuf,
    pub engine: Arc<McrawFileSystem>,
    session: MountSession,
}

impl MountRecord {
    pub fn session(&self) -> &MountSession {
        &self.session
    }
}

/// Summary of a mount for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub id: MountId,
    pub source: PathBuf,
    pub mountpoint: PathBuf,
}

/// Registry of mounts sharing one cache and one set of worker pools.
pub struct FilesystemHost {
    config: HostConfig,
    pipeline: FramePipeline,
    mounts: Mutex<BTreeMap<MountId, MountRecord>>,
    next_id: AtomicU64,
    // Dropped last: in-flight jobs still hold handles to the pools.
    _pools: WorkerPools,
}

impl FilesystemHost {
    /// Create the shared cache, pools and pipeline.
    pub fn new(
        config: HostConfig,
        decoder_factory: Arc<dyn DecoderFactory>,
        renderer: Arc<dyn FrameRenderer>,
    ) -> Result<Self, HostError> {
        let pools = WorkerPools::new(config.io_threads, config.processing_threads)?;
        let cache = Arc::new(FrameCache::with_failure_backoff(
            config.cache_size_bytes,
            config.failure_backoff,
        ));
        let decoders = Arc::new(DecoderPool::new(decoder_factory, config.io_threads));
        let pipeline = FramePipeline::new(&pools, decoders, renderer, cache);

        info!(
            cache_mb = config.cache_size_bytes / (1024 * 1024),
            io_threads = config.io_threads,
            processing_threads = config.processing_threads,
            "Filesystem host ready"
        );

        Ok(Self {
            config,
            pipeline,
            mounts: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            _pools: pools,
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Mount `source` at `mountpoint`.
    ///
    /// The mount directory is created if missing. On failure nothing is
    /// left behind: the engine is released and a directory created here is
    /// removed again.
    #[instrument(skip(self), fields(source = %source.display(), mountpoint = %mountpoint.display()))]
    pub fn mount(
        &self,
        options: RenderOptions,
        draft_scale: DraftScale,
        source: &Path,
        mountpoint: &Path,
    ) -> Result<MountId, HostError> {
        if !is_supported_source(source) {
            return Err(HostError::UnsupportedFormat(source.to_path_buf()));
        }

        let created_dir = if mountpoint.exists() {
            false
        } else {
            std::fs::create_dir_all(mountpoint).map_err(MountError::from)?;
            true
        };

        match self.start_mount(options, draft_scale, source, mountpoint) {
            Ok((engine, session)) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                self.mounts.lock().insert(
                    id,
                    MountRecord {
                        source: source.to_path_buf(),
                        mountpoint: mountpoint.to_path_buf(),
                        engine,
                        session,
                    },
                );
                info!(mount_id = id, options = %options, draft_scale = %draft_scale, "Mounted container");
                Ok(id)
            }
            Err(err) => {
                warn!(error = %err, "Mount failed");
                if created_dir {
                    remove_dir_if_empty(mountpoint);
                }
                Err(err)
            }
        }
    }

    fn start_mount(
        &self,
        options: RenderOptions,
        draft_scale: DraftScale,
        source: &Path,
        mountpoint: &Path,
    ) -> Result<(Arc<McrawFileSystem>, MountSession), HostError> {
        let engine = Arc::new(McrawFileSystem::new(
            source,
            options,
            draft_scale,
            self.pipeline.clone(),
        )?);

        let vfs: Arc<dyn VirtualFileSystem> = engine.clone();
        let fs = McrawFuse::new(vfs, self.config.attr_ttl);

        match MountSession::start(fs, mountpoint, true) {
            Ok(session) => Ok((engine, session)),
            Err(err) => {
                engine.release();
                Err(err.into())
            }
        }
    }

    /// Tear down a mount. Returns `None` for an unknown id.
    ///
    /// Returns as soon as teardown is scheduled; the handle reports when the
    /// kernel mount is gone and the directory cleaned up.
    pub fn unmount(&self, id: MountId) -> Option<TeardownHandle> {
        let mut record = self.mounts.lock().remove(&id)?;
        let handle = record.session.shutdown();
        record.engine.release();
        info!(mount_id = id, mountpoint = %record.mountpoint.display(), "Unmount requested");
        Some(handle)
    }

    /// Change the render options of a mount. No-op for an unknown id.
    pub fn update_options(
        &self,
        id: MountId,
        options: RenderOptions,
        draft_scale: DraftScale,
    ) -> Result<(), HostError> {
        // Rebuilding can take a while; don't hold the registry lock.
        let engine = match self.mounts.lock().get(&id) {
            Some(record) => Arc::clone(&record.engine),
            None => {
                debug!(mount_id = id, "update_options on unknown mount");
                return Ok(());
            }
        };
        engine.update_options(options, draft_scale)?;
        Ok(())
    }

    /// Active mounts in id order.
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.mounts
            .lock()
            .iter()
            .map(|(id, record)| MountInfo {
                id: *id,
                source: record.source.clone(),
                mountpoint: record.mountpoint.clone(),
            })
            .collect()
    }

    /// Engine of a mount, for callers that read without going through FUSE.
    pub fn engine(&self, id: MountId) -> Option<Arc<McrawFileSystem>> {
        self.mounts
            .lock()
            .get(&id)
            .map(|record| Arc::clone(&record.engine))
    }

    pub fn cache_stats(&self) -> FrameCacheStats {
        self.pipeline.cache().stats()
    }

    pub fn pipeline_stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    /// Unmount everything, returning the teardown handles.
    pub fn unmount_all(&self) -> Vec<TeardownHandle> {
        let ids: Vec<MountId> = self.mounts.lock().keys().copied().collect();
        ids.into_iter().filter_map(|id| self.unmount(id)).collect()
    }
}

impl Drop for FilesystemHost {
    fn drop(&mut self) {
        for handle in self.unmount_all() {
            handle.wait();
        }
    }
}

/// Whether `path` has the `.mcraw` extension (any case).
pub fn is_supported_source(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SUPPORTED_EXTENSION))
}
