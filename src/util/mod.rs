//! Internal helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Width of a generated namespace key; wide enough for any `u64` nanosecond count.
const NAMESPACE_KEY_WIDTH: usize = 20;

/// Current UNIX time in nanoseconds, zero-padded so keys sort chronologically.
pub(crate) fn namespace_key() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{:0width$}", nanos, width = NAMESPACE_KEY_WIDTH)
}

/// Returns true if `name` lies under the directory-like `prefix`.
///
/// `prefix` must match whole path components: `a/1` owns `a/1/x` but not `a/12/x`.
pub(crate) fn under_prefix(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}
