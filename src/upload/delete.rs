//! Removal of published large objects.

use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::{MANIFEST_HEADER, ObjectStore};
use crate::util::under_prefix;

/// Deletes `container/object` and, if it is a manifest, the segments it names.
///
/// The manifest object is deleted first; its segments are then removed on a
/// best-effort basis, logging any that could not be deleted. Returns the
/// number of segments deleted.
///
/// # Errors
///
/// Fails if the object's headers cannot be read or the object itself cannot
/// be deleted.
pub async fn delete_large_object(
    store: &dyn ObjectStore,
    container: &str,
    object: &str,
) -> Result<usize> {
    let headers = store.object_headers(container, object).await?;
    store.delete_object(container, object).await?;

    let Some((segments_container, prefix)) = headers
        .get(MANIFEST_HEADER)
        .and_then(|manifest| manifest.split_once('/'))
    else {
        debug!(container, object, "deleted plain object");
        return Ok(0);
    };

    let names = match store.list_object_names(segments_container).await {
        Ok(names) => names,
        Err(e) => {
            warn!(
                container = segments_container,
                error = %e,
                "cannot list segments of deleted manifest"
            );
            return Ok(0);
        }
    };

    let mut deleted = 0;
    for name in names.iter().filter(|name| under_prefix(name, prefix)) {
        match store.delete_object(segments_container, name).await {
            Ok(()) => deleted += 1,
            Err(e) => warn!(segment = %name, error = %e, "cannot delete segment"),
        }
    }
    debug!(container, object, segments = deleted, "deleted large object");
    Ok(deleted)
}
