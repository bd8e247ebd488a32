//! Frame pipeline: decode on the I/O pool, render on the processing pool.
//!
//! Concurrent submissions for the same cache key share one execution:
//!
//! ```text
//! submit(A) ─┐
//! submit(A) ─┼─► in-flight[A] = Shared<decode ─► render ─► cache.put>
//! submit(A) ─┘         │
//!                      └─► every submitter's callback gets the same Bytes
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::job::{decode_stage, render_stage, FrameJob};
use super::{PipelineError, WorkerPools};
use crate::cache::{CacheKey, FrameCache};
use crate::decoder::DecoderPool;
use crate::render::FrameRenderer;

type JobResult = Result<Bytes, PipelineError>;
type SharedJob = Shared<BoxFuture<'static, JobResult>>;

struct InFlight {
    execution: u64,
    job: SharedJob,
}

/// Pipeline counters.
#[derive(Debug, Default)]
struct PipelineCounters {
    submitted: AtomicU64,
    coalesced: AtomicU64,
    short_circuited: AtomicU64,
    executions: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time pipeline statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Calls to [`FramePipeline::submit`].
    pub submitted: u64,
    /// Submissions that joined an execution already in flight.
    pub coalesced: u64,
    /// Submissions rejected by a recent failure marker.
    pub short_circuited: u64,
    /// Decode+render executions started.
    pub executions: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: usize,
}

/// Shared two-stage frame pipeline.
///
/// Cheap to clone; all clones share pools, cache and in-flight state.
#[derive(Clone)]
pub struct FramePipeline {
    io: Handle,
    processing: Arc<rayon::ThreadPool>,
    decoders: Arc<DecoderPool>,
    renderer: Arc<dyn FrameRenderer>,
    cache: Arc<FrameCache>,
    in_flight: Arc<DashMap<CacheKey, InFlight>>,
    next_execution: Arc<AtomicU64>,
    counters: Arc<PipelineCounters>,
}

impl FramePipeline {
    pub fn new(
        pools: &WorkerPools,
        decoders: Arc<DecoderPool>,
        renderer: Arc<dyn FrameRenderer>,
        cache: Arc<FrameCache>,
    ) -> Self {
        Self {
            io: pools.io().clone(),
            processing: Arc::clone(pools.processing()),
            decoders,
            renderer,
            cache,
            in_flight: Arc::new(DashMap::new()),
            next_execution: Arc::new(AtomicU64::new(1)),
            counters: Arc::new(PipelineCounters::default()),
        }
    }

    /// Schedule `job` and return immediately.
    ///
    /// `on_complete` receives the full rendered frame or the failure. It runs
    /// on an I/O pool thread, or synchronously on the caller's thread when
    /// the result is already known (failure marker, or the frame landed in
    /// the cache while this call raced a finishing execution).
    pub fn submit<F>(&self, job: FrameJob, on_complete: F)
    where
        F: FnOnce(JobResult) + Send + 'static,
    {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        if self.cache.is_load_failed(&job.key) {
            self.counters.short_circuited.fetch_add(1, Ordering::Relaxed);
            debug!(key = %job.key, "Frame failed recently, not retrying");
            on_complete(Err(PipelineError::RecentlyFailed));
            return;
        }

        let shared = match self.in_flight.entry(job.key.clone()) {
            Entry::Occupied(existing) => {
                self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(key = %job.key, "Joining in-flight frame job");
                existing.get().job.clone()
            }
            Entry::Vacant(slot) => {
                // An execution may have finished between the caller's cache
                // lookup and here; it stores its result before leaving the map.
                if let Some(data) = self.cache.get(&job.key) {
                    drop(slot);
                    on_complete(Ok(data));
                    return;
                }
                let execution = self.next_execution.fetch_add(1, Ordering::Relaxed);
                let shared = self.execute(job, execution).boxed().shared();
                slot.insert(InFlight {
                    execution,
                    job: shared.clone(),
                });
                shared
            }
        };

        self.io.spawn(async move {
            on_complete(shared.await);
        });
    }

    /// Build the future of one execution. Nothing runs until it is polled.
    async fn execute_inner(self, job: FrameJob) -> JobResult {
        let decoders = Arc::clone(&self.decoders);
        let decode_job = job.clone();
        let frame = self
            .io
            .spawn_blocking(move || decode_stage(&decode_job, &decoders))
            .await
            .map_err(|err| PipelineError::Aborted(err.to_string()))??;

        // Render starts only once decode is done.
        let (tx, rx) = oneshot::channel();
        let renderer = Arc::clone(&self.renderer);
        let render_job = job.clone();
        self.processing.spawn(move || {
            let _ = tx.send(render_stage(&render_job, &frame, renderer.as_ref()));
        });
        let rendered = rx
            .await
            .map_err(|_| PipelineError::Aborted("render worker dropped the job".to_string()))??;

        Ok(Bytes::from(rendered))
    }

    fn execute(&self, job: FrameJob, execution: u64) -> impl std::future::Future<Output = JobResult> {
        let pipeline = self.clone();
        async move {
            pipeline.counters.executions.fetch_add(1, Ordering::Relaxed);
            let key = job.key.clone();
            let result = pipeline.clone().execute_inner(job).await;

            match &result {
                Ok(data) => {
                    pipeline.cache.put(key.clone(), data.clone());
                    pipeline.counters.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "Frame generation failed");
                    pipeline.cache.mark_load_failed(&key);
                    pipeline.counters.failed.fetch_add(1, Ordering::Relaxed);
                }
            }

            pipeline
                .in_flight
                .remove_if(&key, |_, in_flight| in_flight.execution == execution);
            result
        }
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            short_circuited: self.counters.short_circuited.load(Ordering::Relaxed),
            executions: self.counters.executions.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            in_flight: self.in_flight.len(),
        }
    }

    pub fn cache(&self) -> &Arc<FrameCache> {
        &self.cache
    }

    pub fn decoders(&self) -> &Arc<DecoderPool> {
        &self.decoders
    }

    pub fn renderer(&self) -> &Arc<dyn FrameRenderer> {
        &self.renderer
    }
}
