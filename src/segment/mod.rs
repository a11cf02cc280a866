//! Segment types.
//!
//! - [`Segment`] - One cut of the stream with its sequence number and MD5
//! - [`ContentHash`] - 16-byte MD5 digest with hex and base64 encodings
//! - [`SegmentLayout`] / [`UploadTarget`] - Object naming

mod data;
mod hash;
mod layout;

pub use data::Segment;
pub use hash::ContentHash;
pub use layout::{
    DEFAULT_OBJECT_NAME, SEGMENT_NUMBER_WIDTH, SEGMENTS_CONTAINER_SUFFIX, SegmentLayout,
    UploadTarget, segments_container,
};
