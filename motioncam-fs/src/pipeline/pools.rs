//! Worker pools shared by every mount.
//!
//! ```text
//! ┌─────────────── I/O pool ───────────────┐   ┌──── processing pool ────┐
//! │ tokio runtime (mcfs-io)                │   │ rayon (mcfs-render-N)   │
//! │  async tasks: coalescing, completion   │   │  render stage           │
//! │  spawn_blocking: decode stage          │──►│                         │
//! │  (capped at io_threads)                │   │                         │
//! └────────────────────────────────────────┘   └─────────────────────────┘
//! ```
//!
//! Both pools are sized once from the host configuration and never grow with
//! the number of mounts.

use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{error, info};

/// Async worker threads driving the I/O runtime. They only await; the
/// blocking decode work runs on the runtime's blocking pool.
const IO_DRIVER_THREADS: usize = 2;

/// Failure to start a worker pool.
#[derive(Debug, Error)]
pub enum PoolBuildError {
    #[error("Failed to start I/O runtime: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start processing pool: {0}")]
    Processing(#[from] rayon::ThreadPoolBuildError),
}

/// The I/O pool (decode) and the processing pool (render).
pub struct WorkerPools {
    io: Option<Runtime>,
    io_handle: Handle,
    processing: Arc<rayon::ThreadPool>,
    io_threads: usize,
    processing_threads: usize,
}

impl WorkerPools {
    /// Start both pools.
    ///
    /// # Arguments
    ///
    /// * `io_threads` - Maximum concurrent decode stages
    /// * `processing_threads` - Render worker threads
    pub fn new(io_threads: usize, processing_threads: usize) -> Result<Self, PoolBuildError> {
        let io_threads = io_threads.max(1);
        let processing_threads = processing_threads.max(1);

        let io = Builder::new_multi_thread()
            .worker_threads(IO_DRIVER_THREADS)
            .max_blocking_threads(io_threads)
            .thread_name("mcfs-io")
            .enable_time()
            .build()?;
        let io_handle = io.handle().clone();

        let processing = rayon::ThreadPoolBuilder::new()
            .num_threads(processing_threads)
            .thread_name(|i| format!("mcfs-render-{}", i))
            // Without a handler rayon aborts the process on a job panic
            .panic_handler(|_| error!("Render worker job panicked"))
            .build()?;

        info!(io_threads, processing_threads, "Worker pools started");

        Ok(Self {
            io: Some(io),
            io_handle,
            processing: Arc::new(processing),
            io_threads,
            processing_threads,
        })
    }

    /// Handle to the I/O runtime.
    pub fn io(&self) -> &Handle {
        &self.io_handle
    }

    pub fn processing(&self) -> &Arc<rayon::ThreadPool> {
        &self.processing
    }

    pub fn io_threads(&self) -> usize {
        self.io_threads
    }

    pub fn processing_threads(&self) -> usize {
        self.processing_threads
    }
}

impl Drop for WorkerPools {
    fn drop(&mut self) {
        // May run inside another runtime; blocking decodes finish detached.
        if let Some(io) = self.io.take() {
            io.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_pools_run_work() {
        let pools = WorkerPools::new(2, 2).unwrap();

        let value = pools
            .io()
            .block_on(async { pools_spawn_blocking(pools.io()).await });
        assert_eq!(value, 42);

        let (tx, rx) = std::sync::mpsc::channel();
        pools.processing().spawn(move || {
            tx.send(rayon::current_thread_index().is_some()).unwrap();
        });
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    async fn pools_spawn_blocking(handle: &Handle) -> u32 {
        handle.spawn_blocking(|| 42).await.unwrap()
    }

    #[test]
    fn test_blocking_pool_is_capped() {
        let pools = WorkerPools::new(2, 1).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                pools.io().spawn_blocking(move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        pools.io().block_on(async {
            for task in tasks {
                task.await.unwrap();
            }
        });

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_sizes_are_at_least_one() {
        let pools = WorkerPools::new(0, 0).unwrap();
        assert_eq!(pools.io_threads(), 1);
        assert_eq!(pools.processing_threads(), 1);
    }
}
