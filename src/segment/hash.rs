//! Segment content hash.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

/// An MD5 digest of segment or object content.
///
/// Swift reports object ETags as the hex MD5 of the stored bytes, so this is
/// the value compared against the backend's answer after every PUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// The size of the digest in bytes.
    pub const SIZE: usize = 16;

    /// Creates a hash from a digest.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Creates a hash from a slice.
    ///
    /// Returns `None` if the slice is not exactly 16 bytes.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 16] = slice.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Returns the raw digest.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex, the form Swift uses for ETags.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a hex digest, tolerating the surrounding quotes some proxies add.
    pub fn from_hex(hex_str: &str) -> Option<Self> {
        let trimmed = hex_str.trim().trim_matches('"');
        let bytes = hex::decode(trimmed).ok()?;
        Self::from_slice(&bytes)
    }

    /// Standard base64, the form used by the `Content-MD5` header.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Returns true if `etag` names this digest.
    pub fn matches_etag(&self, etag: &str) -> bool {
        etag.trim().trim_matches('"').eq_ignore_ascii_case(&self.to_hex())
    }
}

impl AsRef<[u8]> for ContentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
