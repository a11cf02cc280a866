//! The Segment type - one cut of the upload stream.

use bytes::BytesMut;
use std::fmt;

use super::ContentHash;

/// One bounded chunk of the logical object, ready for upload.
///
/// A segment owns the pool buffer it was cut from. The buffer goes back to the
/// [`BufferPool`](crate::BufferPool) through [`Segment::into_buffer`] once the
/// upload reaches a terminal outcome.
#[derive(Debug)]
pub struct Segment {
    number: u64,
    data: BytesMut,
    hash: ContentHash,
}

impl Segment {
    /// Creates a segment from its sequence number, bytes and MD5.
    pub fn new(number: u64, data: BytesMut, hash: ContentHash) -> Self {
        Self { number, data, hash }
    }

    /// Returns the sequence number (1-based).
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Returns the segment bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the length of the segment.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the segment has no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the MD5 of the segment bytes.
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// Consumes the segment and returns the buffer that held it.
    pub fn into_buffer(self) -> BytesMut {
        self.data
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Segment(#{}, {} bytes, md5={})", self.number, self.len(), self.hash)
    }
}
