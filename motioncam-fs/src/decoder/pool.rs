//! Pool of decoder instances keyed by source path.
//!
//! Decoders hold file handles and parser state and are not thread-safe.
//! Instead of one decoder per worker thread, the pool hands out exclusive
//! leases: a lease is used by exactly one worker and goes back to the idle
//! list when dropped, so open containers are reused across decode jobs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{ContainerDecoder, DecodeError, DecoderFactory};

/// Idle decoders and the eviction generation of each path.
#[derive(Default)]
struct IdleState {
    decoders: HashMap<PathBuf, Vec<Box<dyn ContainerDecoder>>>,
    generations: HashMap<PathBuf, u64>,
}

impl IdleState {
    fn generation(&self, path: &Path) -> u64 {
        self.generations.get(path).copied().unwrap_or(0)
    }
}

/// Decoder instances checked out and idle, keyed by source path.
pub struct DecoderPool {
    factory: Arc<dyn DecoderFactory>,
    idle: Arc<Mutex<IdleState>>,
    max_idle_per_source: usize,
}

impl DecoderPool {
    /// Create a pool.
    ///
    /// # Arguments
    ///
    /// * `factory` - Opens new decoders when no idle instance exists
    /// * `max_idle_per_source` - Idle instances kept per path (typically the
    ///   I/O pool size, since that bounds concurrent leases)
    pub fn new(factory: Arc<dyn DecoderFactory>, max_idle_per_source: usize) -> Self {
        Self {
            factory,
            idle: Arc::new(Mutex::new(IdleState::default())),
            max_idle_per_source: max_idle_per_source.max(1),
        }
    }

    /// Check out a decoder for `path`, opening one if none is idle.
    pub fn checkout(&self, path: &Path) -> Result<DecoderLease, DecodeError> {
        let (reused, generation) = {
            let mut idle = self.idle.lock();
            let generation = idle.generation(path);
            let reused = idle.decoders.get_mut(path).and_then(|decoders| decoders.pop());
            (reused, generation)
        };

        let decoder = match reused {
            Some(decoder) => decoder,
            None => {
                debug!(source = %path.display(), "Opening new decoder instance");
                self.factory.open(path)?
            }
        };

        Ok(DecoderLease {
            decoder: Some(decoder),
            path: path.to_path_buf(),
            generation,
            idle: Arc::clone(&self.idle),
            max_idle: self.max_idle_per_source,
        })
    }

    /// Drop every idle decoder of `path`, returning how many were dropped.
    ///
    /// Leases checked out at the time close their decoder on drop instead of
    /// returning it.
    pub fn evict(&self, path: &Path) -> usize {
        let mut idle = self.idle.lock();
        *idle.generations.entry(path.to_path_buf()).or_default() += 1;
        idle.decoders
            .remove(path)
            .map(|decoders| decoders.len())
            .unwrap_or(0)
    }

    /// Number of idle decoders for `path`.
    pub fn idle_count(&self, path: &Path) -> usize {
        self.idle
            .lock()
            .decoders
            .get(path)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Exclusive use of one decoder instance.
///
/// Returns the decoder to its pool on drop, unless the path was evicted
/// while the lease was out.
pub struct DecoderLease {
    decoder: Option<Box<dyn ContainerDecoder>>,
    path: PathBuf,
    generation: u64,
    idle: Arc<Mutex<IdleState>>,
    max_idle: usize,
}

impl DecoderLease {
    pub fn decoder(&mut self) -> &mut dyn ContainerDecoder {
        // Only `Drop` takes the decoder out.
        self.decoder
            .as_deref_mut()
            .unwrap_or_else(|| unreachable!("decoder lease used after release"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop the decoder instead of returning it to the pool.
    ///
    /// Used when the decoder reported an error that may have left it in a
    /// bad state.
    pub fn discard(mut self) {
        self.decoder = None;
    }
}

impl Drop for DecoderLease {
    fn drop(&mut self) {
        let Some(decoder) = self.decoder.take() else {
            return;
        };
        let mut idle = self.idle.lock();
        if idle.generation(&self.path) != self.generation {
            debug!(source = %self.path.display(), "Source evicted, closing returned decoder");
            // Close outside the lock
            drop(idle);
            drop(decoder);
            return;
        }
        let decoders = idle.decoders.entry(self.path.clone()).or_default();
        if decoders.len() < self.max_idle {
            decoders.push(decoder);
        }
    }
}
