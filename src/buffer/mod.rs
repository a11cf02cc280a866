//! Buffer management for segment data.
//!
//! The producer fills one pooled buffer at a time; each buffer travels with
//! its segment to an upload worker and comes back to the pool when the upload
//! finishes.

mod pool;

pub use pool::BufferPool;
