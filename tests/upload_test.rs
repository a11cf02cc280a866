// Integration tests for SegmentedUpload against the in-memory store
// Tests cover: round trips, empty uploads, retries, abort cleanup, state machine

use std::sync::Arc;
use std::time::Duration;

use segput::{
    DELETE_AFTER_HEADER, MANIFEST_HEADER, MemoryStore, Md5Hasher, ObjectStore, RetryPolicy,
    SegmentedUpload, StorageError, UploadConfig, UploadError, UploadState, UploadTarget,
    delete_large_object, upload,
};
use tokio_test::{assert_err, assert_ok};

async fn store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.create_container("c").await.unwrap();
    store
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn config(segment_size: usize) -> UploadConfig {
    UploadConfig::new(segment_size, 1 << 20)
        .unwrap()
        .with_concurrency(4)
        .with_segment_retry(RetryPolicy::new(3, Duration::from_millis(1), 2))
}

fn target() -> UploadTarget {
    UploadTarget::new("c", "o").unwrap()
}

async fn start(store: &Arc<MemoryStore>, config: UploadConfig, key: &str) -> SegmentedUpload {
    SegmentedUpload::start_with_key(store.clone(), target(), config, key)
        .await
        .unwrap()
}

/// Waits until `count` segments named under `prefix` are stored.
async fn wait_for_segments(store: &MemoryStore, prefix: &str, count: usize) {
    for _ in 0..400 {
        let stored = store
            .object_names("c_segments")
            .iter()
            .filter(|name| name.starts_with(prefix))
            .count();
        if stored >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("segments under {} were not stored", prefix);
}

/// Keeps writing single bytes until a worker failure surfaces from `write`.
async fn write_until_error(upload: &mut SegmentedUpload) -> UploadError {
    for _ in 0..400 {
        match upload.write(b"x").await {
            Ok(_) => tokio::time::sleep(Duration::from_millis(5)).await,
            Err(e) => return e,
        }
    }
    panic!("segment failure should surface from write");
}

fn segment_sizes(store: &MemoryStore) -> Vec<usize> {
    store
        .object_names("c_segments")
        .iter()
        .map(|name| store.object("c_segments", name).unwrap().data.len())
        .collect()
}

// ============================================================================
// Round trip
// ============================================================================

#[tokio::test]
async fn test_round_trip_sizes_and_content() {
    const THRESHOLD: usize = 100;

    for size in [1, 99, 100, 101, 1000, 1234] {
        let store = store().await;
        let data = payload(size);

        let mut upload = start(&store, config(THRESHOLD), "k").await;
        for piece in data.chunks(37) {
            assert_eq!(upload.write(piece).await.unwrap(), piece.len());
        }
        let summary = upload.close().await.unwrap();

        let expected_segments = size.div_ceil(THRESHOLD);
        assert_eq!(summary.segments, expected_segments as u64, "size {}", size);
        assert_eq!(summary.bytes, size as u64);
        assert_eq!(summary.content_md5, Md5Hasher::hash(&data));
        assert_eq!(upload.state(), UploadState::Completed);

        let sizes = segment_sizes(&store);
        assert_eq!(sizes.len(), expected_segments);
        let (last, full) = sizes.split_last().unwrap();
        assert!(full.iter().all(|&s| s == THRESHOLD));
        let remainder = if size % THRESHOLD == 0 { THRESHOLD } else { size % THRESHOLD };
        assert_eq!(*last, remainder);

        assert_eq!(store.get_object("c", "o").unwrap(), data, "size {}", size);
    }
}

#[tokio::test]
async fn test_segment_names_are_contiguous() {
    let store = store().await;
    let mut upload = SegmentedUpload::start_with_key(store.clone(), target(), config(10), "k")
        .await
        .unwrap();
    upload.write(&payload(95)).await.unwrap();
    upload.close().await.unwrap();

    let expected: Vec<String> = (1..=10).map(|n| format!("o/k/{:08}", n)).collect();
    assert_eq!(store.object_names("c_segments"), expected);
}

#[tokio::test]
async fn test_manifest_headers() {
    let store = store().await;
    let config = config(8).with_expire_after(Duration::from_secs(3600));

    let mut upload = SegmentedUpload::start_with_key(store.clone(), target(), config, "k")
        .await
        .unwrap();
    upload.write(b"manifest test").await.unwrap();
    let summary = upload.close().await.unwrap();

    let manifest = store.object("c", "o").unwrap();
    assert!(manifest.data.is_empty());
    assert_eq!(manifest.headers[MANIFEST_HEADER], "c_segments/o/k");
    assert_eq!(manifest.headers[DELETE_AFTER_HEADER], "3600");
    assert_eq!(summary.manifest, "c_segments/o/k");
    assert_eq!(summary.namespace_key, "k");
}

#[tokio::test]
async fn test_default_key_is_unique_per_attempt() {
    let store = store().await;
    let first = SegmentedUpload::start(store.clone(), target(), config(8)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;
    let second = SegmentedUpload::start(store.clone(), target(), config(8)).await.unwrap();

    assert_ne!(first.namespace_key(), second.namespace_key());
    assert_eq!(first.namespace_key().len(), 20);
}

#[tokio::test]
async fn test_threshold_doubles_after_interval() {
    let store = store().await;
    let config = UploadConfig::new(4, 16).unwrap().with_growth_interval(2);

    let mut upload = SegmentedUpload::start_with_key(store.clone(), target(), config, "k")
        .await
        .unwrap();
    upload.write(&payload(60)).await.unwrap();
    assert_eq!(upload.threshold(), 16);
    upload.close().await.unwrap();

    assert_eq!(segment_sizes(&store), vec![4, 4, 8, 8, 16, 16, 4]);
    assert_eq!(store.get_object("c", "o").unwrap(), payload(60));
}

#[tokio::test]
async fn test_min_segment_size_raises_threshold() {
    let store = store().await;
    let config = UploadConfig::new(4, 64).unwrap().with_min_segment_size(10);

    let mut upload = start(&store, config, "k").await;
    assert_eq!(upload.threshold(), 10);
    upload.write(&payload(25)).await.unwrap();
    upload.close().await.unwrap();

    assert_eq!(segment_sizes(&store), vec![10, 10, 5]);
}

#[tokio::test]
async fn test_concurrency_does_not_change_result() {
    let data = payload(5000);
    let mut results = Vec::new();

    for workers in [1, 8] {
        let store = store().await;
        let config = config(64).with_concurrency(workers);
        let mut upload = SegmentedUpload::start_with_key(store.clone(), target(), config, "k")
            .await
            .unwrap();
        for piece in data.chunks(333) {
            upload.write(piece).await.unwrap();
        }
        let summary = upload.close().await.unwrap();
        results.push((
            summary.segments,
            summary.content_md5,
            summary.segments_md5,
            store.object_names("c_segments"),
            store.get_object("c", "o").unwrap(),
        ));
    }

    assert_eq!(results[0], results[1]);
    assert_eq!(results[0].4, data);
}

#[tokio::test]
async fn test_upload_helper_and_checksum_object() {
    let store = store().await;
    let data = payload(3000);
    let mut reader: &[u8] = &data;

    let summary = upload(
        store.clone(),
        target(),
        &mut reader,
        config(512).with_checksum_object(true),
    )
    .await
    .unwrap();

    assert_eq!(summary.segments, 6);
    assert_eq!(store.get_object("c", "o").unwrap(), data);
    let sidecar = store.object("c", "o.md5").unwrap();
    assert_eq!(sidecar.data, Md5Hasher::hash(&data).to_hex().into_bytes());
}

// ============================================================================
// Empty uploads and the state machine
// ============================================================================

#[tokio::test]
async fn test_empty_upload_is_rejected() {
    let store = store().await;
    let mut upload = SegmentedUpload::start(store.clone(), target(), config(16)).await.unwrap();
    upload.write(&[]).await.unwrap();

    let err = assert_err!(upload.close().await);
    assert!(matches!(err, UploadError::Empty));
    assert_eq!(err.to_string(), "0 bytes written");
    assert_eq!(upload.state(), UploadState::Failed);
    assert_eq!(store.container_put_attempts("c_segments"), 0);
    assert_eq!(store.container_put_attempts("c"), 0);
}

#[tokio::test]
async fn test_write_and_close_after_close() {
    let store = store().await;
    let mut upload = SegmentedUpload::start(store, target(), config(16)).await.unwrap();
    assert_ok!(upload.write(b"data").await);
    assert_ok!(upload.close().await);

    assert!(matches!(upload.write(b"more").await, Err(UploadError::Closed)));
    assert!(matches!(upload.close().await, Err(UploadError::Closed)));
    assert_eq!(upload.state(), UploadState::Completed);
}

// ============================================================================
// Failures, retry and abort
// ============================================================================

#[tokio::test]
async fn test_checksum_mismatch_makes_three_attempts() {
    let store = store().await;
    store.corrupt_etags(true);

    let mut upload = SegmentedUpload::start_with_key(store.clone(), target(), config(100), "k")
        .await
        .unwrap();
    upload.write(b"ten bytes!").await.unwrap();

    let err = assert_err!(upload.close().await);
    assert!(err.is_corruption());
    assert_eq!(store.put_attempts("c_segments", "o/k/00000001"), 3);
    assert!(store.object("c", "o").is_none());
    assert!(store.object_names("c_segments").is_empty());
    assert_eq!(upload.state(), UploadState::Failed);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let store = store().await;
    store.fail_next_puts(2);

    let config = config(100).with_concurrency(1);
    let mut upload = SegmentedUpload::start_with_key(store.clone(), target(), config, "k")
        .await
        .unwrap();
    upload.write(b"flaky").await.unwrap();
    upload.close().await.unwrap();

    assert_eq!(store.put_attempts("c_segments", "o/k/00000001"), 3);
    assert_eq!(store.get_object("c", "o").unwrap(), b"flaky");
}

#[tokio::test]
async fn test_segment_failure_is_sticky() {
    let store = store().await;
    store.fail_puts_to("c_segments");

    let mut upload = SegmentedUpload::start_with_key(store.clone(), target(), config(10), "k")
        .await
        .unwrap();
    upload.write(&payload(10)).await.unwrap();

    let first = write_until_error(&mut upload).await;
    assert!(matches!(first, UploadError::Storage(StorageError::Request { .. })));
    assert_eq!(upload.state(), UploadState::Failed);

    let again = assert_err!(upload.write(b"y").await);
    assert_eq!(again.to_string(), first.to_string());
    assert!(matches!(upload.close().await, Err(UploadError::Closed)));
    assert!(store.object("c", "o").is_none());
}

#[tokio::test]
async fn test_failure_seen_by_write_removes_uploaded_segments() {
    let store = store().await;
    let mut upload = start(&store, config(10), "k").await;

    upload.write(&payload(20)).await.unwrap();
    wait_for_segments(&store, "o/k/", 2).await;
    assert_eq!(
        store.object_names("c_segments"),
        vec!["o/k/00000001", "o/k/00000002"]
    );

    store.fail_puts_to("c_segments");
    upload.write(&payload(10)).await.unwrap();

    let err = write_until_error(&mut upload).await;
    assert!(matches!(err, UploadError::Storage(StorageError::Request { .. })));
    assert_eq!(upload.state(), UploadState::Failed);
    assert!(store.object_names("c_segments").is_empty());
    assert!(store.object("c", "o").is_none());
}

#[tokio::test]
async fn test_abort_removes_only_the_failed_attempt() {
    let store = store().await;

    let mut earlier = start(&store, config(4), "1000").await;
    earlier.write(&payload(8)).await.unwrap();
    wait_for_segments(&store, "o/1000/", 2).await;

    let mut later = start(&store, config(4), "100").await;
    later.write(&payload(8)).await.unwrap();
    wait_for_segments(&store, "o/100/", 2).await;
    assert_eq!(store.object_names("c_segments").len(), 4);

    store.fail_puts_to("c");
    let err = assert_err!(later.close().await);
    assert!(err.is_retryable());
    assert_eq!(store.put_attempts("c", "o"), 3);
    assert!(store.object("c", "o").is_none());
    assert_eq!(earlier.state(), UploadState::Open);
    assert_eq!(
        store.object_names("c_segments"),
        vec!["o/1000/00000001", "o/1000/00000002"]
    );

    // the earlier attempt fails the same way and removes its own segments
    assert_err!(earlier.close().await);
    assert!(store.object_names("c_segments").is_empty());
}

#[tokio::test]
async fn test_publish_failure_aborts_only_own_segments() {
    let store = store().await;
    store.create_container("c_segments").await.unwrap();

    // segments of other attempts at the same object
    let none = Default::default();
    for name in ["o/1000/00000001", "o/1000/00000002", "o/10000/00000001"] {
        store.put_object("c_segments", name, b"other", &none).await.unwrap();
    }

    store.fail_puts_to("c");
    let mut upload = SegmentedUpload::start_with_key(store.clone(), target(), config(4), "100")
        .await
        .unwrap();
    upload.write(&payload(10)).await.unwrap();

    let err = assert_err!(upload.close().await);
    assert!(err.is_retryable());
    assert_eq!(store.put_attempts("c", "o"), 3);
    assert!(store.object("c", "o").is_none());
    assert_eq!(
        store.object_names("c_segments"),
        vec!["o/1000/00000001", "o/1000/00000002", "o/10000/00000001"]
    );
}

#[tokio::test]
async fn test_abort_failures_are_not_reported() {
    let store = store().await;
    store.fail_puts_to("c");
    store.fail_deletes(true);

    let mut upload = SegmentedUpload::start_with_key(store.clone(), target(), config(4), "k")
        .await
        .unwrap();
    upload.write(b"abcdefgh").await.unwrap();

    let err = assert_err!(upload.close().await);
    assert!(matches!(err, UploadError::Storage(StorageError::Request { .. })));
    assert_eq!(store.object_names("c_segments").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_segment_retry_waits_before_every_attempt() {
    let store = store().await;
    store.corrupt_etags(true);

    let config = UploadConfig::new(100, 1 << 20).unwrap().with_concurrency(1);
    let mut upload = start(&store, config, "k").await;

    let started = tokio::time::Instant::now();
    upload.write(b"ten bytes!").await.unwrap();
    let err = assert_err!(upload.close().await);

    assert!(err.is_corruption());
    assert_eq!(store.put_attempts("c_segments", "o/k/00000001"), 3);
    // 100ms + 200ms + 400ms
    assert!(started.elapsed() >= Duration::from_millis(700));
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout() {
    let store = store().await;
    store.set_put_delay(Duration::from_millis(200));

    let config = config(100)
        .with_request_timeout(Duration::from_millis(20))
        .with_segment_retry(RetryPolicy::immediate(2));
    let mut upload = SegmentedUpload::start_with_key(store.clone(), target(), config, "k")
        .await
        .unwrap();
    upload.write(b"slow").await.unwrap();

    let err = assert_err!(upload.close().await);
    assert!(matches!(err, UploadError::Timeout { .. }));
    assert_eq!(store.put_attempts("c_segments", "o/k/00000001"), 2);
}

#[tokio::test]
async fn test_read_error_aborts_upload() {
    let store = store().await;
    let mut reader = tokio_test::io::Builder::new()
        .read(b"abcd")
        .read_error(std::io::Error::other("disk gone"))
        .build();

    let mut upload = SegmentedUpload::start_with_key(store.clone(), target(), config(2), "k")
        .await
        .unwrap();
    let err = assert_err!(upload.copy_from(&mut reader).await);

    assert!(matches!(err, UploadError::Io(_)));
    assert_eq!(upload.state(), UploadState::Failed);
    assert!(store.object_names("c_segments").is_empty());
}

// ============================================================================
// Concurrency bounds
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_puts_bounded_by_concurrency() {
    let store = store().await;
    store.set_put_delay(Duration::from_millis(5));

    let config = config(16).with_concurrency(3);
    let mut upload = SegmentedUpload::start(store.clone(), target(), config).await.unwrap();
    upload.write(&payload(16 * 20)).await.unwrap();
    upload.close().await.unwrap();

    let peak = store.peak_concurrent_puts();
    assert!((1..=3).contains(&peak), "peak {}", peak);
}

// ============================================================================
// Deleting large objects
// ============================================================================

#[tokio::test]
async fn test_delete_large_object() {
    let store = store().await;
    let mut upload = SegmentedUpload::start_with_key(store.clone(), target(), config(10), "k")
        .await
        .unwrap();
    upload.write(&payload(45)).await.unwrap();
    upload.close().await.unwrap();

    let deleted = delete_large_object(store.as_ref(), "c", "o").await.unwrap();
    assert_eq!(deleted, 5);
    assert!(store.object("c", "o").is_none());
    assert!(store.object_names("c_segments").is_empty());

    store.put_object("c", "plain", b"x", &Default::default()).await.unwrap();
    assert_eq!(delete_large_object(store.as_ref(), "c", "plain").await.unwrap(), 0);

    let missing = assert_err!(delete_large_object(store.as_ref(), "c", "plain").await);
    assert!(matches!(missing, UploadError::Storage(StorageError::NotFound { .. })));
}
