#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use segput::{
    MemoryStore, ObjectStore, RetryPolicy, SegmentedUpload, UploadConfig, UploadTarget,
};

fuzz_target!(|input: (u8, Vec<u8>, Vec<u8>)| {
    let (threshold, splits, data) = input;
    let threshold = usize::from(threshold.max(1));

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async {
        let store = Arc::new(MemoryStore::new());
        store.create_container("c").await.unwrap();
        let config = UploadConfig::new(threshold, threshold)
            .unwrap()
            .with_concurrency(2)
            .with_segment_retry(RetryPolicy::immediate(3));
        let target = UploadTarget::new("c", "o").unwrap();
        let mut upload = SegmentedUpload::start_with_key(store.clone(), target, config, "k")
            .await
            .unwrap();

        // Split the payload at fuzzer-chosen sizes
        let mut rest = data.as_slice();
        let mut sizes = splits.iter().map(|s| usize::from(*s) + 1).cycle();
        while !rest.is_empty() {
            let take = sizes.next().unwrap_or(rest.len()).min(rest.len());
            let (head, tail) = rest.split_at(take);
            upload.write(head).await.unwrap();
            rest = tail;
        }

        match upload.close().await {
            Ok(summary) => {
                assert_eq!(summary.segments as usize, data.len().div_ceil(threshold));
                assert_eq!(store.get_object("c", "o").unwrap(), data);
            }
            Err(e) => {
                assert!(data.is_empty(), "unexpected failure: {}", e);
                assert!(store.object_names("c_segments").is_empty());
            }
        }
    });
});
