//! Naming of segment objects and the manifest that ties them together.
//!
//! Segments live in a sibling container, `<container>_segments`, so listings of
//! the main container are not polluted. Each upload attempt writes under its
//! own namespace key: `<object>/<namespace_key>/<number>`. A new upload to the
//! same object name therefore never overwrites segments a published manifest
//! still points at.

use crate::error::UploadError;
use crate::util::under_prefix;

/// Suffix of the container holding segments.
pub const SEGMENTS_CONTAINER_SUFFIX: &str = "_segments";

/// Object name used when the destination path names only a container.
pub const DEFAULT_OBJECT_NAME: &str = "upload";

/// Width of the zero-padded sequence number in segment names.
///
/// The backend resolves a manifest by listing names lexicographically, so
/// padding keeps that order numeric.
pub const SEGMENT_NUMBER_WIDTH: usize = 8;

/// Destination of an upload: `container/object`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadTarget {
    container: String,
    object: String,
}

impl UploadTarget {
    /// Creates a target from its parts.
    pub fn new(
        container: impl Into<String>,
        object: impl Into<String>,
    ) -> Result<Self, UploadError> {
        let container = container.into();
        let object = object.into();
        if container.is_empty() || container.contains('/') {
            return Err(UploadError::InvalidTarget {
                message: "container name must be non-empty and contain no '/'",
            });
        }
        if object.is_empty() {
            return Err(UploadError::InvalidTarget {
                message: "object name must be non-empty",
            });
        }
        Ok(Self { container, object })
    }

    /// Parses `container[/object]`, defaulting the object name to `upload`.
    pub fn parse(path: &str) -> Result<Self, UploadError> {
        match path.split_once('/') {
            Some((container, object)) => Self::new(container, object),
            None => Self::new(path, DEFAULT_OBJECT_NAME),
        }
    }

    /// Returns the container name.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Returns the object name.
    pub fn object(&self) -> &str {
        &self.object
    }
}

/// Where the segments of one upload attempt are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentLayout {
    container: String,
    prefix: String,
}

impl SegmentLayout {
    /// Layout for `target` under `namespace_key`.
    pub fn new(target: &UploadTarget, namespace_key: &str) -> Self {
        Self {
            container: segments_container(target.container()),
            prefix: format!("{}/{}", target.object(), namespace_key),
        }
    }

    /// Container holding the segments.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// `<object>/<namespace_key>`, shared by every segment of the attempt.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Object name of segment `number`.
    pub fn segment_name(&self, number: u64) -> String {
        format!("{}/{:0width$}", self.prefix, number, width = SEGMENT_NUMBER_WIDTH)
    }

    /// Returns true if `name` is a segment of this attempt.
    ///
    /// The namespace key must match as a whole path component, so key `12`
    /// never claims the segments of key `123`.
    pub fn owns(&self, name: &str) -> bool {
        under_prefix(name, &self.prefix)
    }

    /// Value of the `X-Object-Manifest` header: `<segments container>/<prefix>`.
    pub fn manifest_value(&self) -> String {
        format!("{}/{}", self.container, self.prefix)
    }
}

/// `<container>_segments`.
pub fn segments_container(container: &str) -> String {
    format!("{}{}", container, SEGMENTS_CONTAINER_SUFFIX)
}
