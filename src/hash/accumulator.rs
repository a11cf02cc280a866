//! Running checksums for one upload.

use super::Md5Hasher;
use crate::segment::ContentHash;

/// Integrity metadata accumulated over one upload.
///
/// Three digests are kept:
///
/// - the MD5 of each segment, returned by [`seal_segment`](Self::seal_segment)
/// - the MD5 over the concatenated raw segment digests, in sequence order
/// - the MD5 of the whole content, independent of segment boundaries
///
/// Only the producer touches the accumulator, always in stream order, so the
/// digests do not depend on the order in which segment uploads finish.
#[derive(Debug, Clone, Default)]
pub struct ChecksumAccumulator {
    content: Md5Hasher,
    segments: Md5Hasher,
    sealed: u64,
}

impl ChecksumAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds caller bytes into the whole-content digest.
    pub fn absorb(&mut self, data: &[u8]) {
        self.content.update(data);
    }

    /// Hashes one segment and folds its digest into the digest of digests.
    pub fn seal_segment(&mut self, data: &[u8]) -> ContentHash {
        let hash = Md5Hasher::hash(data);
        self.segments.update(hash.as_bytes());
        self.sealed += 1;
        hash
    }

    /// MD5 of every byte absorbed so far.
    pub fn content_hash(&self) -> ContentHash {
        self.content.finalize()
    }

    /// MD5 of the concatenated segment digests sealed so far.
    pub fn segments_hash(&self) -> ContentHash {
        self.segments.finalize()
    }

    /// Number of segments sealed.
    pub fn segment_count(&self) -> u64 {
        self.sealed
    }
}
