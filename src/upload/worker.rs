//! Concurrent segment upload workers.
//!
//! The manager hands cut segments to a bounded MPMC queue; `concurrency`
//! tokio tasks drain it. The queue bound is what throttles the producer: a
//! cut suspends until a worker has room for it.

use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_channel::{Receiver, Sender};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, warn};

use super::retry::{retry_with_backoff, with_timeout};
use crate::buffer::BufferPool;
use crate::config::RetryPolicy;
use crate::error::{Result, UploadError};
use crate::segment::{Segment, SegmentLayout};
use crate::storage::{CONTENT_MD5_HEADER, ETAG_HEADER, Headers, ObjectStore};

/// Count of dispatched segments that have not reached a terminal outcome.
#[derive(Debug, Default)]
struct Outstanding {
    count: AtomicUsize,
    idle: Notify,
}

impl Outstanding {
    fn begin(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.idle.notified());
            notified.as_mut().enable();
            if self.get() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Marks one segment done when dropped, whatever path the worker took.
struct Completion<'a>(&'a Outstanding);

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        self.0.done();
    }
}

/// State shared between the manager and its workers.
pub(crate) struct WorkerContext {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) layout: SegmentLayout,
    pub(crate) retry: RetryPolicy,
    pub(crate) timeout: Option<Duration>,
    pub(crate) pool: Arc<BufferPool>,
    outstanding: Outstanding,
    failure: OnceLock<UploadError>,
}

impl WorkerContext {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        layout: SegmentLayout,
        retry: RetryPolicy,
        timeout: Option<Duration>,
        pool: Arc<BufferPool>,
    ) -> Self {
        Self {
            store,
            layout,
            retry,
            timeout,
            pool,
            outstanding: Outstanding::default(),
            failure: OnceLock::new(),
        }
    }

    /// Records `error` unless another failure was recorded first.
    fn record_failure(&self, error: UploadError) {
        if self.failure.set(error).is_err() {
            debug!("upload already failed, keeping first error");
        }
    }
}

/// Pool of workers uploading the segments of one upload attempt.
pub(crate) struct SegmentUploader {
    queue: Sender<Segment>,
    workers: Vec<JoinHandle<()>>,
    ctx: Arc<WorkerContext>,
}

impl SegmentUploader {
    /// Spawns `concurrency` workers reading from a queue holding `queue_depth` segments.
    pub(crate) fn spawn(
        ctx: Arc<WorkerContext>,
        concurrency: usize,
        queue_depth: usize,
        span: &Span,
    ) -> Self {
        let (queue, segments) = async_channel::bounded(queue_depth.max(1));
        let workers = (0..concurrency.max(1))
            .map(|id| {
                let worker = run_worker(id, Arc::clone(&ctx), segments.clone());
                tokio::spawn(worker.instrument(span.clone()))
            })
            .collect();

        Self { queue, workers, ctx }
    }

    /// Queues `segment`, waiting while the queue is full.
    pub(crate) async fn dispatch(&self, segment: Segment) -> Result<()> {
        self.ctx.outstanding.begin();
        if let Err(rejected) = self.queue.send(segment).await {
            self.ctx.pool.release(rejected.into_inner().into_buffer());
            self.ctx.outstanding.done();
            return Err(UploadError::WorkersStopped);
        }
        Ok(())
    }

    /// First terminal failure recorded by any worker.
    pub(crate) fn failure(&self) -> Option<UploadError> {
        self.ctx.failure.get().cloned()
    }

    /// Segments dispatched but not yet finished.
    pub(crate) fn outstanding(&self) -> usize {
        self.ctx.outstanding.get()
    }

    /// Waits for every dispatched segment, then stops the workers.
    ///
    /// Returns the first recorded failure. Calling it again is a no-op.
    pub(crate) async fn finish(&mut self) -> Option<UploadError> {
        self.ctx.outstanding.wait_idle().await;
        self.queue.close();
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                warn!(error = %e, "upload worker panicked");
                self.ctx.record_failure(UploadError::WorkersStopped);
            }
        }
        self.failure()
    }
}

async fn run_worker(id: usize, ctx: Arc<WorkerContext>, segments: Receiver<Segment>) {
    while let Ok(segment) = segments.recv().await {
        let _done = Completion(&ctx.outstanding);

        if ctx.failure.get().is_some() {
            debug!(worker = id, segment = segment.number(), "upload failed, skipping segment");
            ctx.pool.release(segment.into_buffer());
            continue;
        }

        if let Err(e) = upload_segment(&ctx, &segment).await {
            warn!(worker = id, segment = segment.number(), error = %e, "segment upload failed");
            ctx.record_failure(e);
        }
        ctx.pool.release(segment.into_buffer());
    }
    debug!(worker = id, "upload worker stopped");
}

async fn upload_segment(ctx: &WorkerContext, segment: &Segment) -> Result<()> {
    let container = ctx.layout.container();
    let name = ctx.layout.segment_name(segment.number());
    let calculated = segment.hash().to_hex();

    let mut headers = Headers::new();
    headers.insert(ETAG_HEADER.to_string(), calculated.clone());
    headers.insert(CONTENT_MD5_HEADER.to_string(), segment.hash().to_base64());

    retry_with_backoff(&ctx.retry, &name, |_| {
        let (name, headers, calculated) = (&name, &headers, &calculated);
        async move {
            let put = async {
                ctx.store
                    .put_object(container, name, segment.data(), headers)
                    .await
                    .map_err(UploadError::from)
            };
            let response = with_timeout(ctx.timeout, name, put).await?;
            if !segment.hash().matches_etag(&response.etag) {
                return Err(UploadError::ChecksumMismatch {
                    object: name.clone(),
                    remote: response.etag,
                    calculated: calculated.clone(),
                });
            }
            Ok(())
        }
    })
    .await?;

    debug!(segment = segment.number(), bytes = segment.len(), "segment uploaded");
    Ok(())
}
