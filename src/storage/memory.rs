//! In-process object store.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ETAG_HEADER, Headers, MANIFEST_HEADER, ObjectStore, PutResponse};
use crate::error::StorageError;
use crate::hash::Md5Hasher;

/// An object as held by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Stored body.
    pub data: Vec<u8>,
    /// Headers sent with the PUT.
    pub headers: Headers,
    /// Hex MD5 of `data`.
    pub etag: String,
}

#[derive(Debug, Default)]
struct Faults {
    failing_puts: usize,
    failing_containers: HashSet<String>,
    corrupt_etags: bool,
    fail_deletes: bool,
    put_delay: Option<Duration>,
}

/// A Swift-like object store kept in memory.
///
/// Behaves like the real service where the upload pipeline can tell:
///
/// - PUT into a missing container fails with [`StorageError::NotFound`]
/// - a request `ETag` header that does not match the body is rejected with 422
/// - [`get_object`](Self::get_object) on a manifest object returns the
///   concatenation of every object under the manifest prefix, in
///   lexicographic name order
///
/// Faults can be injected to exercise retry and cleanup paths, and counters
/// record how the store was used.
#[derive(Debug, Default)]
pub struct MemoryStore {
    containers: Mutex<BTreeMap<String, BTreeMap<String, StoredObject>>>,
    put_attempts: Mutex<HashMap<(String, String), usize>>,
    faults: Mutex<Faults>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` PUTs fail with a transient error.
    pub fn fail_next_puts(&self, count: usize) {
        self.faults.lock().failing_puts = count;
    }

    /// Makes every PUT into `container` fail with a transient error.
    pub fn fail_puts_to(&self, container: &str) {
        self.faults.lock().failing_containers.insert(container.to_string());
    }

    /// Makes PUT responses carry an ETag that does not match the body.
    pub fn corrupt_etags(&self, enabled: bool) {
        self.faults.lock().corrupt_etags = enabled;
    }

    /// Makes every DELETE fail.
    pub fn fail_deletes(&self, enabled: bool) {
        self.faults.lock().fail_deletes = enabled;
    }

    /// Delays every PUT by `delay`.
    pub fn set_put_delay(&self, delay: Duration) {
        self.faults.lock().put_delay = Some(delay);
    }

    /// Number of PUT attempts made against `container/object`.
    pub fn put_attempts(&self, container: &str, object: &str) -> usize {
        self.put_attempts
            .lock()
            .get(&(container.to_string(), object.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of PUT attempts made against `container`.
    pub fn container_put_attempts(&self, container: &str) -> usize {
        self.put_attempts
            .lock()
            .iter()
            .filter(|((c, _), _)| c == container)
            .map(|(_, count)| count)
            .sum()
    }

    /// Highest number of PUTs that were in progress at the same time.
    pub fn peak_concurrent_puts(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Returns a stored object as written.
    pub fn object(&self, container: &str, object: &str) -> Option<StoredObject> {
        self.containers.lock().get(container)?.get(object).cloned()
    }

    /// Returns the names in `container`, sorted.
    pub fn object_names(&self, container: &str) -> Vec<String> {
        self.containers
            .lock()
            .get(container)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Reads an object, following a manifest header to its segments.
    pub fn get_object(&self, container: &str, object: &str) -> Result<Vec<u8>, StorageError> {
        let containers = self.containers.lock();
        let stored = containers
            .get(container)
            .and_then(|objects| objects.get(object))
            .ok_or_else(|| not_found(container, object))?;

        let Some(manifest) = stored.headers.get(MANIFEST_HEADER) else {
            return Ok(stored.data.clone());
        };

        let (segments_container, prefix) = manifest
            .split_once('/')
            .unwrap_or((manifest.as_str(), ""));
        let segments = containers
            .get(segments_container)
            .ok_or_else(|| not_found(segments_container, ""))?;

        let mut data = Vec::new();
        let matching = segments
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix));
        for (_, segment) in matching {
            data.extend_from_slice(&segment.data);
        }
        Ok(data)
    }
}

fn not_found(container: &str, object: &str) -> StorageError {
    StorageError::NotFound {
        container: container.to_string(),
        object: object.to_string(),
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn create_container(&self, container: &str) -> Result<(), StorageError> {
        self.containers.lock().entry(container.to_string()).or_default();
        Ok(())
    }

    async fn put_object(
        &self,
        container: &str,
        object: &str,
        body: &[u8],
        headers: &Headers,
    ) -> Result<PutResponse, StorageError> {
        *self
            .put_attempts
            .lock()
            .entry((container.to_string(), object.to_string()))
            .or_default() += 1;

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let (delay, corrupt) = {
            let mut faults = self.faults.lock();
            if faults.failing_puts > 0 {
                faults.failing_puts -= 1;
                return Err(StorageError::Request {
                    message: format!("injected failure for {}/{}", container, object),
                });
            }
            if faults.failing_containers.contains(container) {
                return Err(StorageError::Request {
                    message: format!("injected failure for container {}", container),
                });
            }
            (faults.put_delay, faults.corrupt_etags)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let hash = Md5Hasher::hash(body);
        if let Some(expected) = headers.get(ETAG_HEADER) {
            if !hash.matches_etag(expected) {
                return Err(StorageError::Rejected {
                    status: 422,
                    message: format!("etag {} does not match body", expected),
                });
            }
        }

        let etag = if corrupt {
            Md5Hasher::hash(object.as_bytes()).to_hex()
        } else {
            hash.to_hex()
        };

        let mut containers = self.containers.lock();
        let objects = containers
            .get_mut(container)
            .ok_or_else(|| not_found(container, object))?;
        objects.insert(
            object.to_string(),
            StoredObject {
                data: body.to_vec(),
                headers: headers.clone(),
                etag: hash.to_hex(),
            },
        );

        Ok(PutResponse { etag })
    }

    async fn object_headers(&self, container: &str, object: &str) -> Result<Headers, StorageError> {
        self.object(container, object)
            .map(|stored| stored.headers)
            .ok_or_else(|| not_found(container, object))
    }

    async fn list_object_names(&self, container: &str) -> Result<Vec<String>, StorageError> {
        let containers = self.containers.lock();
        let objects = containers.get(container).ok_or_else(|| not_found(container, ""))?;
        Ok(objects.keys().cloned().collect())
    }

    async fn delete_object(&self, container: &str, object: &str) -> Result<(), StorageError> {
        if self.faults.lock().fail_deletes {
            return Err(StorageError::Request {
                message: format!("injected delete failure for {}/{}", container, object),
            });
        }
        self.containers
            .lock()
            .get_mut(container)
            .and_then(|objects| objects.remove(object))
            .map(|_| ())
            .ok_or_else(|| not_found(container, object))
    }
}
