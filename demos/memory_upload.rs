//! Uploads a generated payload to the in-memory store and reads it back.
//!
//! Run with:
//!     RUST_LOG=segput=debug cargo run --example memory_upload

use std::sync::Arc;
use std::time::Duration;

use segput::{MemoryStore, ObjectStore, UploadConfig, UploadTarget, delete_large_object, upload};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = Arc::new(MemoryStore::new());
    store.create_container("demo").await?;
    store.set_put_delay(Duration::from_millis(2));
    store.fail_next_puts(2);

    let payload: Vec<u8> = (0..3 * 1024 * 1024).map(|i| (i % 253) as u8).collect();
    let config = UploadConfig::new(128 * 1024, 1024 * 1024)?
        .with_concurrency(4)
        .with_growth_interval(8)
        .with_checksum_object(true);

    let target = UploadTarget::parse("demo/generated.bin")?;
    let mut reader = payload.as_slice();
    let summary = upload(store.clone(), target, &mut reader, config).await?;
    println!("uploaded {}", summary);
    println!("segments md5: {}", summary.segments_md5);
    println!("peak concurrent PUTs: {}", store.peak_concurrent_puts());

    let stored = store.get_object("demo", "generated.bin")?;
    assert_eq!(stored, payload);
    println!("read back {} bytes", stored.len());

    let deleted = delete_large_object(store.as_ref(), "demo", "generated.bin").await?;
    println!("deleted manifest and {} segments", deleted);
    Ok(())
}
