//! Virtual filesystem engine for one `.mcraw` container.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument};

use super::{EngineError, ReadError, ReadOutcome, VirtualFileSystem};
use crate::cache::CacheKey;
use crate::catalog::{CatalogBuilder, CatalogSnapshot, DraftScale, Entry, EntryTag, RenderOptions};
use crate::pipeline::{FrameJob, FramePipeline};

/// Engine serving the catalog and bytes of one container.
///
/// The catalog is an immutable snapshot behind a read-write lock. Every call
/// works against the snapshot current at its start, so a concurrent options
/// change is observed either entirely or not at all.
pub struct McrawFileSystem {
    source: PathBuf,
    pipeline: FramePipeline,
    snapshot: RwLock<Arc<CatalogSnapshot>>,
    /// Serializes re-initializations; readers never wait on it.
    reinit: Mutex<()>,
}

impl McrawFileSystem {
    /// Open `source` and build its initial catalog.
    pub fn new(
        source: impl Into<PathBuf>,
        options: RenderOptions,
        draft_scale: DraftScale,
        pipeline: FramePipeline,
    ) -> Result<Self, EngineError> {
        let source = source.into();
        let snapshot = Self::build(&pipeline, &source, options, draft_scale)?;

        Ok(Self {
            source,
            pipeline,
            snapshot: RwLock::new(Arc::new(snapshot)),
            reinit: Mutex::new(()),
        })
    }

    fn build(
        pipeline: &FramePipeline,
        source: &Path,
        options: RenderOptions,
        draft_scale: DraftScale,
    ) -> Result<CatalogSnapshot, EngineError> {
        let builder = CatalogBuilder::new(pipeline.decoders(), pipeline.renderer().as_ref());
        Ok(builder.build(source, options, draft_scale)?)
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// The current catalog snapshot.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn options(&self) -> (RenderOptions, DraftScale) {
        let snapshot = self.snapshot.read();
        (snapshot.options(), snapshot.draft_scale())
    }

    /// Read up to `len` bytes of `entry` at `offset` without blocking.
    ///
    /// Returns [`ReadOutcome::Ready`] when the bytes are available right
    /// away (audio, cache hit, offset past the end); `callback` is then not
    /// called. Otherwise returns [`ReadOutcome::Pending`] and `callback`
    /// receives the result exactly once, possibly before this returns.
    pub fn read_file_async<F>(
        &self,
        entry: &Entry,
        offset: u64,
        len: usize,
        callback: F,
    ) -> Result<ReadOutcome, ReadError>
    where
        F: FnOnce(Result<Bytes, ReadError>) + Send + 'static,
    {
        let snapshot = self.snapshot();
        let Some(current) = snapshot.find(&entry.name) else {
            return Err(ReadError::NotFound(entry.name.clone()));
        };

        let timestamp = match current.tag {
            EntryTag::Audio => return Ok(ReadOutcome::Ready(slice(snapshot.audio(), offset, len))),
            EntryTag::Frame { timestamp } => timestamp,
        };

        let key = CacheKey::new(snapshot.id(), current.name.clone());
        if let Some(data) = self.pipeline.cache().get(&key) {
            return Ok(ReadOutcome::Ready(slice(&data, offset, len)));
        }

        let job = FrameJob {
            key,
            source: Arc::clone(snapshot.source()),
            timestamp,
            frame_index: snapshot.frame_position(timestamp).unwrap_or(0),
            fps: snapshot.fps(),
            options: snapshot.options(),
            scale: snapshot.scale(),
            container: Arc::clone(snapshot.container()),
        };

        debug!(entry = %current.name, offset, len, "Frame not cached, scheduling render");
        self.pipeline.submit(job, move |result| {
            callback(
                result
                    .map(|data| slice(&data, offset, len))
                    .map_err(ReadError::from),
            )
        });
        Ok(ReadOutcome::Pending)
    }

    /// Drop every cached frame of the current catalog and idle decoders of
    /// the source. Called when the mount goes away.
    pub fn release(&self) {
        let snapshot = self.snapshot();
        self.pipeline.cache().invalidate_catalog(snapshot.id());
        self.pipeline.decoders().evict(&self.source);
    }
}

impl VirtualFileSystem for McrawFileSystem {
    fn list_files(&self) -> Vec<Entry> {
        self.snapshot().entries().to_vec()
    }

    fn find_entry(&self, path: &str) -> Option<Entry> {
        self.snapshot().find(path).cloned()
    }

    /// Blocks until the frame is rendered.
    ///
    /// Must not be called from within an async runtime.
    fn read_file(&self, entry: &Entry, offset: u64, len: usize) -> Result<Bytes, ReadError> {
        let (tx, rx) = oneshot::channel();
        let outcome = self.read_file_async(entry, offset, len, move |result| {
            let _ = tx.send(result);
        })?;

        match outcome {
            ReadOutcome::Ready(data) => Ok(data),
            ReadOutcome::Pending => rx.blocking_recv().map_err(|_| ReadError::Interrupted)?,
        }
    }

    #[instrument(skip(self), fields(source = %self.source.display()))]
    fn update_options(
        &self,
        options: RenderOptions,
        draft_scale: DraftScale,
    ) -> Result<(), EngineError> {
        let _guard = self.reinit.lock();

        let snapshot = Self::build(&self.pipeline, &self.source, options, draft_scale)?;
        let new_id = snapshot.id();
        let old = std::mem::replace(&mut *self.snapshot.write(), Arc::new(snapshot));

        let evicted = self.pipeline.cache().invalidate_catalog(old.id());
        info!(
            old_catalog = %old.id(),
            new_catalog = %new_id,
            options = %options,
            draft_scale = %draft_scale,
            evicted,
            "Re-initialized catalog"
        );
        Ok(())
    }
}

/// The part of `data` covering `offset..offset + len`, clamped to its end.
fn slice(data: &Bytes, offset: u64, len: usize) -> Bytes {
    let size = data.len() as u64;
    if offset >= size {
        return Bytes::new();
    }
    let start = offset as usize;
    let end = start.saturating_add(len).min(data.len());
    data.slice(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_clamps() {
        let data = Bytes::from_static(b"0123456789");
        assert_eq!(slice(&data, 0, 4), Bytes::from_static(b"0123"));
        assert_eq!(slice(&data, 8, 100), Bytes::from_static(b"89"));
        assert!(slice(&data, 10, 4).is_empty());
        assert!(slice(&data, 50, 4).is_empty());
        assert_eq!(slice(&data, 2, usize::MAX), Bytes::from_static(b"23456789"));
    }
}
