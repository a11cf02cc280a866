#![no_main]

use libfuzzer_sys::fuzz_target;
use segput::{SegmentLayout, UploadTarget};

fuzz_target!(|path: &str| {
    let Ok(target) = UploadTarget::parse(path) else {
        return;
    };

    assert!(!target.container().is_empty());
    assert!(!target.container().contains('/'));
    assert!(!target.object().is_empty());

    let layout = SegmentLayout::new(&target, "00000000000000000001");
    let name = layout.segment_name(1);
    assert!(layout.owns(&name));
    assert!(layout.manifest_value().starts_with(layout.container()));
});
