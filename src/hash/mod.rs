//! Content hashing for segments and whole uploads.
//!
//! - [`Md5Hasher`] - Incremental MD5, the digest Swift reports as the ETag
//! - [`ChecksumAccumulator`] - Per-segment, digest-of-digests and whole-content MD5

mod accumulator;
mod hasher;

pub use accumulator::ChecksumAccumulator;
pub use hasher::Md5Hasher;
