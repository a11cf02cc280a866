//! The segmented upload pipeline.
//!
//! - [`SegmentedUpload`] - the write/close surface owned by the writer
//! - `worker` - the pool of tasks that PUT segments with retry
//! - [`SegmentSizer`] - the growing segment size schedule
//! - [`retry_with_backoff`] - shared retry loop

mod delete;
mod manager;
mod retry;
mod sizer;
mod worker;

pub use delete::delete_large_object;
pub use manager::{SegmentedUpload, UploadState, UploadSummary, upload};
pub use retry::{retry_with_backoff, with_timeout};
pub use sizer::SegmentSizer;
