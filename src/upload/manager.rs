//! The write/close surface of a segmented upload.
//!
//! [`SegmentedUpload`] accepts bytes from a single writer, cuts them into
//! segments, hands the segments to the worker pool and, on `close`, publishes
//! a manifest object that stitches them together:
//!
//! ```text
//! write ─▶ buffer ─(threshold)─▶ Segment ─▶ queue ─▶ workers ─▶ <container>_segments
//!                                                                  │
//! close ─▶ wait for workers ─▶ PUT <container>/<object>  (X-Object-Manifest) ◀┘
//! ```
//!
//! # State machine
//!
//! ```text
//! Open ──close──▶ Flushing ──▶ Completed
//!   │                 │
//!   └───failure───────┴──────▶ Failed
//! ```
//!
//! Nothing leaves `Completed` or `Failed`. On every failure path except an
//! empty upload, the segments written under this attempt's namespace key are
//! deleted on a best-effort basis.

use std::fmt;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{Instrument, Span, debug, info, info_span, warn};

use super::retry::{retry_with_backoff, with_timeout};
use super::sizer::SegmentSizer;
use super::worker::{SegmentUploader, WorkerContext};
use crate::buffer::BufferPool;
use crate::config::UploadConfig;
use crate::error::{Result, UploadError};
use crate::hash::ChecksumAccumulator;
use crate::segment::{ContentHash, Segment, SegmentLayout, UploadTarget};
use crate::storage::{DELETE_AFTER_HEADER, Headers, MANIFEST_HEADER, ObjectStore};
use crate::util::namespace_key;

/// Read size used by [`SegmentedUpload::copy_from`].
const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Lifecycle of a [`SegmentedUpload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    /// Accepting writes.
    Open,
    /// `close` was called; outstanding segments are draining.
    Flushing,
    /// The manifest was published.
    Completed,
    /// The upload failed and will not be published.
    Failed,
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    /// Number of segments uploaded.
    pub segments: u64,
    /// Total bytes written.
    pub bytes: u64,
    /// Value of the manifest header: `<container>_segments/<object>/<key>`.
    pub manifest: String,
    /// Namespace key of this attempt.
    pub namespace_key: String,
    /// MD5 of the whole content.
    pub content_md5: ContentHash,
    /// MD5 over the raw MD5 digests of every segment, in segment order.
    pub segments_md5: ContentHash,
}

impl fmt::Display for UploadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes in {} segments ({}), md5={}",
            self.bytes, self.segments, self.manifest, self.content_md5
        )
    }
}

/// A single upload of one object, written sequentially and published on close.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use segput::{MemoryStore, SegmentedUpload, UploadConfig, UploadTarget};
///
/// # tokio_test::block_on(async {
/// let store = Arc::new(MemoryStore::new());
/// store_container(&store).await;
/// let target = UploadTarget::parse("backups/db.dump")?;
/// let config = UploadConfig::new(4, 1024)?;
///
/// let mut upload = SegmentedUpload::start(store.clone(), target, config).await?;
/// upload.write(b"hello world").await?;
/// let summary = upload.close().await?;
///
/// assert_eq!(summary.segments, 3);
/// assert_eq!(store.get_object("backups", "db.dump")?, b"hello world");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # }).unwrap();
/// # async fn store_container(store: &MemoryStore) {
/// #     use segput::ObjectStore;
/// #     store.create_container("backups").await.unwrap();
/// # }
/// ```
pub struct SegmentedUpload {
    store: Arc<dyn ObjectStore>,
    target: UploadTarget,
    layout: SegmentLayout,
    namespace_key: String,
    config: UploadConfig,
    pool: Arc<BufferPool>,
    uploader: SegmentUploader,
    buffer: Option<BytesMut>,
    sizer: SegmentSizer,
    checksums: ChecksumAccumulator,
    bytes: u64,
    state: UploadState,
    error: Option<UploadError>,
    span: Span,
}

impl SegmentedUpload {
    /// Starts an upload to `target` under a fresh namespace key.
    ///
    /// Creates the segments container if needed and spawns the workers, so it
    /// must run inside a tokio runtime.
    pub async fn start(
        store: Arc<dyn ObjectStore>,
        target: UploadTarget,
        config: UploadConfig,
    ) -> Result<Self> {
        Self::start_with_key(store, target, config, namespace_key()).await
    }

    /// Starts an upload whose segments are written under `namespace_key`.
    ///
    /// The key must be unique among attempts to upload the same object.
    pub async fn start_with_key(
        store: Arc<dyn ObjectStore>,
        target: UploadTarget,
        config: UploadConfig,
        namespace_key: impl Into<String>,
    ) -> Result<Self> {
        config.validate()?;
        let namespace_key = namespace_key.into();
        if namespace_key.is_empty() || namespace_key.contains('/') {
            return Err(UploadError::InvalidTarget {
                message: "namespace key must be non-empty and contain no '/'",
            });
        }

        let layout = SegmentLayout::new(&target, &namespace_key);
        let span = info_span!(
            "segmented_upload",
            container = target.container(),
            object = target.object(),
            key = namespace_key.as_str()
        );

        let create = store.create_container(layout.container());
        with_timeout(config.request_timeout(), layout.container(), async {
            create.await.map_err(UploadError::from)
        })
        .instrument(span.clone())
        .await?;

        let pool = BufferPool::new(config.pool_buffers(), config.segment_size());
        let ctx = Arc::new(WorkerContext::new(
            Arc::clone(&store),
            layout.clone(),
            *config.segment_retry(),
            config.request_timeout(),
            Arc::clone(&pool),
        ));
        let uploader =
            SegmentUploader::spawn(ctx, config.concurrency(), config.queue_depth(), &span);
        let sizer = SegmentSizer::new(
            config.segment_size(),
            config.max_segment_size(),
            config.growth_interval(),
        );

        span.in_scope(|| {
            debug!(
                concurrency = config.concurrency(),
                segment_size = config.segment_size(),
                "upload started"
            )
        });

        Ok(Self {
            store,
            target,
            layout,
            namespace_key,
            config,
            pool,
            uploader,
            buffer: None,
            sizer,
            checksums: ChecksumAccumulator::new(),
            bytes: 0,
            state: UploadState::Open,
            error: None,
            span,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Destination of the upload.
    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    /// Namespace key of this attempt.
    pub fn namespace_key(&self) -> &str {
        &self.namespace_key
    }

    /// Size at which the next segment will be cut.
    pub fn threshold(&self) -> usize {
        self.sizer.threshold()
    }

    /// Number of segments cut so far.
    pub fn segments_cut(&self) -> u64 {
        self.checksums.segment_count()
    }

    /// Bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Appends `data` to the object.
    ///
    /// Full buffers are cut into segments and queued for upload; this
    /// suspends while the upload queue is full. Returns `data.len()`.
    ///
    /// # Errors
    ///
    /// [`UploadError::Closed`] after `close`. If a segment upload already
    /// failed, the upload is aborted and that failure is returned, from this
    /// call and every later one.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        match self.state {
            UploadState::Open => {}
            UploadState::Failed => return Err(self.error.clone().unwrap_or(UploadError::Closed)),
            UploadState::Flushing | UploadState::Completed => return Err(UploadError::Closed),
        }

        if let Some(e) = self.uploader.failure() {
            return Err(self.fail(e).await);
        }

        let span = self.span.clone();
        match self.fill(data).instrument(span).await {
            Ok(()) => Ok(data.len()),
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Writes everything `reader` yields, returning the number of bytes copied.
    pub async fn copy_from<R>(&mut self, reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut chunk = vec![0u8; COPY_CHUNK_SIZE];
        let mut copied = 0u64;
        loop {
            let n = match reader.read(&mut chunk).await {
                Ok(0) => return Ok(copied),
                Ok(n) => n,
                Err(e) if self.state == UploadState::Open => return Err(self.fail(e.into()).await),
                Err(e) => return Err(e.into()),
            };
            self.write(&chunk[..n]).await?;
            copied += n as u64;
        }
    }

    /// Flushes the last segment, waits for every upload and publishes the manifest.
    ///
    /// # Errors
    ///
    /// - [`UploadError::Closed`] if `close` was already called or the upload failed
    /// - [`UploadError::Empty`] if nothing was written; nothing is uploaded
    /// - the first segment failure, or the manifest publish failure, after
    ///   the attempt's segments have been deleted
    pub async fn close(&mut self) -> Result<UploadSummary> {
        if self.state != UploadState::Open {
            return Err(UploadError::Closed);
        }
        self.state = UploadState::Flushing;

        let span = self.span.clone();
        match self.finish().instrument(span).await {
            Ok(summary) => {
                self.state = UploadState::Completed;
                Ok(summary)
            }
            Err(UploadError::Empty) => {
                self.state = UploadState::Failed;
                self.error = Some(UploadError::Empty);
                Err(UploadError::Empty)
            }
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn fill(&mut self, mut data: &[u8]) -> Result<()> {
        self.checksums.absorb(data);
        self.bytes += data.len() as u64;

        while !data.is_empty() {
            let threshold = self.sizer.threshold();
            let mut buffer = match self.buffer.take() {
                Some(buffer) => buffer,
                None => self.pool.acquire().await?,
            };

            let take = (threshold - buffer.len()).min(data.len());
            buffer.extend_from_slice(&data[..take]);
            data = &data[take..];

            if buffer.len() >= threshold {
                self.cut(buffer).await?;
            } else {
                self.buffer = Some(buffer);
            }
        }
        Ok(())
    }

    /// Turns `buffer` into the next segment and queues it.
    async fn cut(&mut self, buffer: BytesMut) -> Result<()> {
        if buffer.is_empty() {
            self.pool.release(buffer);
            return Ok(());
        }

        let hash = self.checksums.seal_segment(&buffer);
        let number = self.checksums.segment_count();
        let segment = Segment::new(number, buffer, hash);
        debug!(segment = number, bytes = segment.len(), "segment cut");

        if self.sizer.record_cut(number) {
            debug!(threshold = self.sizer.threshold(), "segment size increased");
        }
        self.uploader.dispatch(segment).await
    }

    async fn finish(&mut self) -> Result<UploadSummary> {
        if let Some(buffer) = self.buffer.take() {
            self.cut(buffer).await?;
        }
        let failure = self.uploader.finish().await;
        self.pool.shutdown();

        if self.checksums.segment_count() == 0 {
            debug!("nothing written, skipping publish");
            return Err(UploadError::Empty);
        }
        if let Some(e) = failure {
            return Err(e);
        }

        self.publish().await?;

        let summary = UploadSummary {
            segments: self.checksums.segment_count(),
            bytes: self.bytes,
            manifest: self.layout.manifest_value(),
            namespace_key: self.namespace_key.clone(),
            content_md5: self.checksums.content_hash(),
            segments_md5: self.checksums.segments_hash(),
        };
        info!(
            segments = summary.segments,
            bytes = summary.bytes,
            md5 = %summary.content_md5,
            "upload published"
        );

        if self.config.checksum_object() {
            self.put_checksum_object(&summary.content_md5).await;
        }
        Ok(summary)
    }

    /// PUTs the zero-length manifest object.
    async fn publish(&self) -> Result<()> {
        let container = self.target.container();
        let object = self.target.object();
        let timeout = self.config.request_timeout();

        let mut headers = Headers::new();
        headers.insert(MANIFEST_HEADER.to_string(), self.layout.manifest_value());
        if let Some(expire) = self.config.expire_after() {
            headers.insert(DELETE_AFTER_HEADER.to_string(), expire.as_secs().to_string());
        }

        let store = &self.store;
        let headers = &headers;
        retry_with_backoff(self.config.publish_retry(), object, |_| async move {
            let put = async {
                store
                    .put_object(container, object, &[], headers)
                    .await
                    .map_err(UploadError::from)
            };
            with_timeout(timeout, object, put).await
        })
        .await?;
        Ok(())
    }

    /// Stores the hex MD5 of the content as `<object>.md5`; failures are only logged.
    async fn put_checksum_object(&self, content_md5: &ContentHash) {
        let name = format!("{}.md5", self.target.object());
        let body = content_md5.to_hex();
        let put = async {
            self.store
                .put_object(self.target.container(), &name, body.as_bytes(), &Headers::new())
                .await
                .map_err(UploadError::from)
        };
        if let Err(e) = with_timeout(self.config.request_timeout(), &name, put).await {
            warn!(object = %name, error = %e, "failed to store checksum object");
        }
    }

    /// Moves to `Failed`, cleaning up after `error`. Returns the error to report.
    async fn fail(&mut self, error: UploadError) -> UploadError {
        let span = self.span.clone();
        async {
            warn!(error = %error, "upload failed, aborting");
            if let Some(buffer) = self.buffer.take() {
                self.pool.release(buffer);
            }
            self.uploader.finish().await;
            self.pool.shutdown();
            self.abort().await;
        }
        .instrument(span)
        .await;

        self.state = UploadState::Failed;
        self.error = Some(error.clone());
        error
    }

    /// Deletes every segment of this attempt. Best effort: failures are logged.
    async fn abort(&self) {
        let container = self.layout.container();
        let timeout = self.config.request_timeout();

        let list = async {
            self.store
                .list_object_names(container)
                .await
                .map_err(UploadError::from)
        };
        let names = match with_timeout(timeout, container, list).await {
            Ok(names) => names,
            Err(e) => {
                warn!(container, error = %e, "abort: cannot list segments");
                return;
            }
        };

        let mut deleted = 0usize;
        for name in names.iter().filter(|name| self.layout.owns(name)) {
            let delete = async {
                self.store
                    .delete_object(container, name)
                    .await
                    .map_err(UploadError::from)
            };
            match with_timeout(timeout, name, delete).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!(segment = %name, error = %e, "abort: cannot delete segment"),
            }
        }
        info!(deleted, "aborted upload");
    }
}

impl fmt::Debug for SegmentedUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentedUpload")
            .field("target", &self.target)
            .field("namespace_key", &self.namespace_key)
            .field("state", &self.state)
            .field("segments", &self.checksums.segment_count())
            .field("bytes", &self.bytes)
            .field("outstanding", &self.uploader.outstanding())
            .finish()
    }
}

/// Uploads everything `reader` yields to `target` in one call.
pub async fn upload<R>(
    store: Arc<dyn ObjectStore>,
    target: UploadTarget,
    reader: &mut R,
    config: UploadConfig,
) -> Result<UploadSummary>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut upload = SegmentedUpload::start(store, target, config).await?;
    upload.copy_from(reader).await?;
    upload.close().await
}
