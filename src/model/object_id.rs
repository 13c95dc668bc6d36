//! Object/version addressing

use std::fmt;

use super::VersionNum;

/// Identifies an object, optionally pinned to a specific version.
///
/// When no version is present the id refers to whatever the HEAD version is
/// at resolution time. For mutations, supplying an explicit version acts as
/// an optimistic concurrency check: the operation fails `ObjectOutOfSync`
/// unless that version is still the HEAD.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectVersionId {
    object_id: String,
    version_num: Option<VersionNum>,
}

impl ObjectVersionId {
    /// Refer to the HEAD version of an object
    pub fn head(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            version_num: None,
        }
    }

    /// Refer to a specific version of an object
    pub fn version(object_id: impl Into<String>, version_num: VersionNum) -> Self {
        Self {
            object_id: object_id.into(),
            version_num: Some(version_num),
        }
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    pub fn version_num(&self) -> Option<VersionNum> {
        self.version_num
    }

    pub fn is_head(&self) -> bool {
        self.version_num.is_none()
    }
}

impl fmt::Display for ObjectVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version_num {
            Some(num) => write!(f, "{} {}", self.object_id, num),
            None => write!(f, "{} HEAD", self.object_id),
        }
    }
}
