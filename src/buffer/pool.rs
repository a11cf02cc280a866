//! Fixed-size pool of reusable segment buffers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::error::UploadError;

/// A pool of `count` byte buffers handed out with explicit ownership.
///
/// [`acquire`](Self::acquire) suspends while every buffer is checked out, so
/// the pool bounds the memory held by one upload regardless of object size or
/// worker count. Buffers are returned with [`release`](Self::release).
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
    permits: Semaphore,
    buffer_capacity: usize,
    count: usize,
    shut_down: AtomicBool,
}

impl BufferPool {
    /// Creates a pool of `count` buffers of `buffer_capacity` bytes.
    ///
    /// Buffers are allocated on first use and reused after that.
    pub fn new(count: usize, buffer_capacity: usize) -> Arc<Self> {
        let count = count.max(1);
        let free = Vec::with_capacity(count);

        Arc::new(Self {
            free: Mutex::new(free),
            permits: Semaphore::new(count),
            buffer_capacity,
            count,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Takes an empty buffer, waiting until one is released if none is free.
    ///
    /// Fails with [`UploadError::PoolShutdown`] once the pool is shut down.
    pub async fn acquire(&self) -> Result<BytesMut, UploadError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| UploadError::PoolShutdown)?;
        permit.forget();
        Ok(self.take())
    }

    /// Takes a buffer without waiting.
    pub fn try_acquire(&self) -> Option<BytesMut> {
        let permit = self.permits.try_acquire().ok()?;
        permit.forget();
        Some(self.take())
    }

    fn take(&self) -> BytesMut {
        self.free
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.buffer_capacity))
    }

    /// Returns a buffer to the pool.
    ///
    /// The caller must hold no other reference to the buffer's contents. After
    /// shutdown the buffer is dropped instead.
    pub fn release(&self, mut buffer: BytesMut) {
        if self.shut_down.load(Ordering::Acquire) {
            return;
        }
        buffer.clear();
        self.free.lock().push(buffer);
        self.permits.add_permits(1);
    }

    /// Stops serving acquisitions and frees idle buffers.
    ///
    /// Waiters are woken with an error. Buffers already handed out stay valid.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        self.permits.close();
        self.free.lock().clear();
    }

    /// Returns true once [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Number of buffers that can be acquired without waiting.
    pub fn available(&self) -> usize {
        if self.is_shut_down() {
            return 0;
        }
        self.permits.available_permits()
    }

    /// Total number of buffers managed by the pool.
    pub fn capacity(&self) -> usize {
        self.count
    }

    /// Initial capacity of each buffer in bytes.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }
}
