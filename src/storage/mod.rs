//! The object-storage boundary.
//!
//! The upload pipeline only needs a handful of Swift-style operations, captured
//! by [`ObjectStore`]. [`MemoryStore`] implements them in process.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::StorageError;

mod memory;

pub use memory::{MemoryStore, StoredObject};

/// Header naming the segment prefix of a dynamic large object.
pub const MANIFEST_HEADER: &str = "X-Object-Manifest";

/// Header carrying the number of seconds after which an object expires.
pub const DELETE_AFTER_HEADER: &str = "X-Delete-After";

/// Request header asking the backend to verify the body against a hex MD5.
pub const ETAG_HEADER: &str = "ETag";

/// Request header carrying the base64 MD5 of the body.
pub const CONTENT_MD5_HEADER: &str = "Content-MD5";

/// Request or response headers, ordered for stable output.
pub type Headers = BTreeMap<String, String>;

/// Response to a successful PUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResponse {
    /// ETag the backend computed for the stored body.
    pub etag: String,
}

/// Operations the upload pipeline performs against object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Creates `container` unless it already exists.
    async fn create_container(&self, container: &str) -> Result<(), StorageError>;

    /// Stores `body` as `container/object`.
    async fn put_object(
        &self,
        container: &str,
        object: &str,
        body: &[u8],
        headers: &Headers,
    ) -> Result<PutResponse, StorageError>;

    /// Returns the metadata headers of `container/object`.
    async fn object_headers(&self, container: &str, object: &str) -> Result<Headers, StorageError>;

    /// Lists every object name in `container`.
    async fn list_object_names(&self, container: &str) -> Result<Vec<String>, StorageError>;

    /// Deletes `container/object`.
    async fn delete_object(&self, container: &str, object: &str) -> Result<(), StorageError>;
}
