//! Configuration for segmented uploads.
//!
//! This module provides types to configure how an upload is segmented,
//! parallelised and retried:
//!
//! - [`UploadConfig`] - Segment sizing, concurrency, expiry and timeouts
//! - [`RetryPolicy`] - Attempt count and backoff schedule
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use segput::UploadConfig;
//!
//! let config = UploadConfig::default()
//!     .with_concurrency(4)
//!     .with_segment_size(8 * 1024 * 1024)
//!     .with_expire_after(Duration::from_secs(3600));
//!
//! config.validate()?;
//! # Ok::<(), segput::UploadError>(())
//! ```

use std::time::Duration;

use crate::error::UploadError;

/// Default number of concurrent segment uploads.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default initial segment size (20 MiB).
pub const DEFAULT_SEGMENT_SIZE: usize = 20 * 1024 * 1024;

/// Largest segment Swift accepts (5 GiB), or `usize::MAX` where that does not fit.
pub const MAX_SEGMENT_SIZE: usize = if usize::BITS >= 64 {
    (5u64 * 1024 * 1024 * 1024) as usize
} else {
    usize::MAX
};

/// Smallest segment Swift accepts for every segment but the last (5 MiB).
///
/// Not applied by default; see [`UploadConfig::with_min_segment_size`].
pub const SWIFT_MIN_SEGMENT_SIZE: usize = 5 * 1024 * 1024;

/// Number of segments after which the segment size doubles.
///
/// Keeps very large objects under the backend's segment-count ceiling while
/// small objects keep small, low-latency segments.
pub const DEFAULT_GROWTH_INTERVAL: u64 = 1000;

/// Default depth of the hand-off queue between the writer and the workers.
pub const DEFAULT_QUEUE_DEPTH: usize = 1;

/// Default number of attempts for one segment or manifest PUT.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Default delay before the first attempt of a segment.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Attempt count and backoff schedule for a request.
///
/// Attempt `n` (1-based) is preceded by a delay of
/// `initial_backoff * multiplier^(n-1)`, the first attempt included. With the
/// default policy the three attempts wait 100ms, 200ms and 400ms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first attempt.
    pub initial_backoff: Duration,
    /// Growth factor applied to the delay after each retry.
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Creates a policy.
    pub const fn new(max_attempts: u32, initial_backoff: Duration, multiplier: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            multiplier,
        }
    }

    /// A policy that makes `max_attempts` attempts without waiting.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, 1)
    }

    /// Delay before attempt `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt);
        self.initial_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    /// Three attempts, preceded by 100ms, 200ms and 400ms.
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_INITIAL_BACKOFF, 2)
    }
}

/// Configuration of one segmented upload.
///
/// # Segment sizing
///
/// Segments start at `segment_size` bytes. After every `growth_interval`
/// segments the size doubles, capped at `max_segment_size`.
///
/// # Memory
///
/// The upload holds at most `concurrency + queue_depth + 1` buffers: one per
/// worker, one per queued segment and the one being filled.
///
/// # Example
///
/// ```
/// use segput::UploadConfig;
///
/// let config = UploadConfig::default()
///     .with_concurrency(8)
///     .with_segment_size(5 * 1024 * 1024);
/// assert_eq!(config.concurrency(), 8);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct UploadConfig {
    concurrency: usize,
    segment_size: usize,
    max_segment_size: usize,
    min_segment_size: usize,
    growth_interval: u64,
    queue_depth: usize,
    expire_after: Option<Duration>,
    request_timeout: Option<Duration>,
    segment_retry: RetryPolicy,
    publish_retry: RetryPolicy,
    checksum_object: bool,
}

impl UploadConfig {
    /// Creates a configuration with the given initial and maximum segment sizes.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::InvalidConfig`] if a size is zero or
    /// `segment_size > max_segment_size`.
    pub fn new(segment_size: usize, max_segment_size: usize) -> Result<Self, UploadError> {
        let config = Self {
            segment_size,
            max_segment_size,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the number of upload workers (at least 1).
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    /// Sets the initial segment size.
    ///
    /// Note: This does not validate the configuration. Use [`UploadConfig::validate`].
    pub fn with_segment_size(mut self, size: usize) -> Self {
        self.segment_size = size;
        self
    }

    /// Sets the cap for segment growth.
    pub fn with_max_segment_size(mut self, size: usize) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Raises the initial segment size to at least `size`.
    ///
    /// Defaults to 1. Use [`SWIFT_MIN_SEGMENT_SIZE`] against a real Swift cluster.
    pub fn with_min_segment_size(mut self, size: usize) -> Self {
        self.min_segment_size = size.max(1);
        self
    }

    /// Sets how many segments are cut between two doublings of the segment size.
    pub fn with_growth_interval(mut self, segments: u64) -> Self {
        self.growth_interval = segments;
        self
    }

    /// Sets how many cut segments may wait for a free worker (at least 1).
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// Makes the published object expire after `after` (whole seconds).
    ///
    /// Only the manifest expires; segments are left to the backend.
    pub fn with_expire_after(mut self, after: Duration) -> Self {
        self.expire_after = (after.as_secs() > 0).then_some(after);
        self
    }

    /// Bounds every segment and manifest request by `timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the retry policy for segment uploads.
    pub fn with_segment_retry(mut self, policy: RetryPolicy) -> Self {
        self.segment_retry = policy;
        self
    }

    /// Sets the retry policy for the manifest publish.
    pub fn with_publish_retry(mut self, policy: RetryPolicy) -> Self {
        self.publish_retry = policy;
        self
    }

    /// Also store the hex MD5 of the whole content in `<object>.md5`.
    pub fn with_checksum_object(mut self, enabled: bool) -> Self {
        self.checksum_object = enabled;
        self
    }

    /// Returns the number of upload workers.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the initial segment size, raised to the minimum if needed.
    pub fn segment_size(&self) -> usize {
        self.segment_size.max(self.min_segment_size)
    }

    /// Returns the floor applied to the initial segment size.
    pub fn min_segment_size(&self) -> usize {
        self.min_segment_size
    }

    /// Returns the segment size cap.
    pub fn max_segment_size(&self) -> usize {
        self.max_segment_size
    }

    /// Returns the number of segments between doublings (0 disables growth).
    pub fn growth_interval(&self) -> u64 {
        self.growth_interval
    }

    /// Returns the hand-off queue depth.
    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// Returns the number of pooled buffers this configuration needs.
    pub fn pool_buffers(&self) -> usize {
        self.concurrency + self.queue_depth + 1
    }

    /// Returns the manifest expiry, if any.
    pub fn expire_after(&self) -> Option<Duration> {
        self.expire_after
    }

    /// Returns the per-request timeout, if any.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Returns the segment retry policy.
    pub fn segment_retry(&self) -> &RetryPolicy {
        &self.segment_retry
    }

    /// Returns the manifest retry policy.
    pub fn publish_retry(&self) -> &RetryPolicy {
        &self.publish_retry
    }

    /// Returns true if a `.md5` checksum object is written after publishing.
    pub fn checksum_object(&self) -> bool {
        self.checksum_object
    }

    /// Validates the current configuration.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.segment_size == 0 || self.max_segment_size == 0 {
            return Err(UploadError::InvalidConfig {
                message: "segment sizes must be non-zero",
            });
        }
        if self.segment_size() > self.max_segment_size {
            return Err(UploadError::InvalidConfig {
                message: "segment_size cannot be greater than max_segment_size",
            });
        }
        if self.segment_retry.max_attempts == 0 || self.publish_retry.max_attempts == 0 {
            return Err(UploadError::InvalidConfig {
                message: "retry policies need at least one attempt",
            });
        }
        Ok(())
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            segment_size: DEFAULT_SEGMENT_SIZE,
            max_segment_size: MAX_SEGMENT_SIZE,
            min_segment_size: 1,
            growth_interval: DEFAULT_GROWTH_INTERVAL,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            expire_after: None,
            request_timeout: None,
            segment_retry: RetryPolicy::default(),
            publish_retry: RetryPolicy::immediate(DEFAULT_ATTEMPTS),
            checksum_object: false,
        }
    }
}
