//! MD5-based content hashing.

use md5::{Digest, Md5};

use crate::segment::ContentHash;

/// A hasher that computes MD5 digests.
#[derive(Debug, Clone, Default)]
pub struct Md5Hasher {
    state: Md5,
}

impl Md5Hasher {
    /// Creates a new hasher.
    pub fn new() -> Self {
        Self { state: Md5::new() }
    }

    /// Updates the hasher with more data.
    pub fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    /// Returns the digest of everything absorbed so far.
    ///
    /// The hasher keeps its state, so more data may follow.
    pub fn finalize(&self) -> ContentHash {
        let digest = self.state.clone().finalize();
        let mut bytes = [0u8; ContentHash::SIZE];
        bytes.copy_from_slice(&digest);
        ContentHash::new(bytes)
    }

    /// Resets the hasher to its initial state.
    pub fn reset(&mut self) {
        self.state = Md5::new();
    }

    /// Convenience method to hash data in one shot.
    pub fn hash(data: &[u8]) -> ContentHash {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }
}
