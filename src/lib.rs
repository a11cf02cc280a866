//! segput
//!
//! Bounded-memory segmented uploads to Swift-style object storage.
//!
//! Object stores cap the size of a single PUT. `segput` takes a byte stream
//! of any length from a single writer and:
//!
//! - cuts it into numbered segments
//! - uploads the segments concurrently, verifying each against the ETag the
//!   backend returns and retrying transient failures
//! - publishes a zero-length manifest object (`X-Object-Manifest`) naming the
//!   segment prefix, so a GET of the object returns the whole stream
//!
//! Memory is bounded by a fixed pool of segment buffers, independent of the
//! object size. A failed upload is never published, and its segments are
//! deleted on a best-effort basis.
//!
//! The crate does NOT talk to a real service itself. Storage is reached through
//! the [`ObjectStore`] trait; [`MemoryStore`] is an in-process implementation.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use segput::{MemoryStore, ObjectStore, UploadConfig, UploadTarget, upload};
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! store.create_container("logs").await?;
//!
//! let config = UploadConfig::new(1024, 1024 * 1024)?.with_concurrency(4);
//! let mut reader: &[u8] = &[7u8; 10_000];
//! let target = UploadTarget::parse("logs/app.log")?;
//! let summary = upload(store.clone(), target, &mut reader, config).await?;
//!
//! assert_eq!(summary.segments, 10);
//! assert_eq!(store.get_object("logs", "app.log")?.len(), 10_000);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod config;
mod error;
mod hash;
mod segment;
mod storage;
mod upload;
mod util;

//
// Public surface
//

pub use buffer::BufferPool;
pub use config::{
    DEFAULT_ATTEMPTS, DEFAULT_CONCURRENCY, DEFAULT_GROWTH_INTERVAL, DEFAULT_INITIAL_BACKOFF,
    DEFAULT_QUEUE_DEPTH, DEFAULT_SEGMENT_SIZE, MAX_SEGMENT_SIZE, RetryPolicy,
    SWIFT_MIN_SEGMENT_SIZE, UploadConfig,
};
pub use error::{Result, StorageError, UploadError};
pub use hash::{ChecksumAccumulator, Md5Hasher};
pub use segment::{
    ContentHash, DEFAULT_OBJECT_NAME, SEGMENT_NUMBER_WIDTH, SEGMENTS_CONTAINER_SUFFIX, Segment,
    SegmentLayout, UploadTarget, segments_container,
};
pub use storage::{
    CONTENT_MD5_HEADER, DELETE_AFTER_HEADER, ETAG_HEADER, Headers, MANIFEST_HEADER, MemoryStore,
    ObjectStore, PutResponse, StoredObject,
};
pub use upload::{
    SegmentSizer, SegmentedUpload, UploadState, UploadSummary, delete_large_object,
    retry_with_backoff, upload, with_timeout,
};
