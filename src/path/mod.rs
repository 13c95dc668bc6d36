//! Logical and content path handling
//!
//! Logical paths are the user-visible namespace inside a version's state;
//! content paths are where bytes physically live under the object root. The
//! logical → content transform is pluggable: a [`LogicalPathMapper`] maps a
//! logical path to a path fragment, and a [`ContentPathConstraintProcessor`]
//! rejects fragments the backing store cannot represent. Both are bound at
//! repository construction and carried here by [`ContentPathMapper`].

use crate::errors::{OcflError, Result};
use crate::model::VersionNum;

/// Path to the mutable-head extension's version directory, relative to the
/// object root
pub const MUTABLE_HEAD_VERSION_PATH: &str = "extensions/0004-mutable-head/head";

/// Check logical path well-formedness: `/` separators, no leading or
/// trailing `/`, no empty, `.`, or `..` segments.
pub fn validate_logical_path(logical_path: &str) -> Result<()> {
    if logical_path.is_empty() {
        return Err(OcflError::InvalidInput(
            "Logical path cannot be empty".to_string(),
        ));
    }
    if logical_path.starts_with('/') || logical_path.ends_with('/') {
        return Err(OcflError::InvalidInput(format!(
            "Logical path cannot begin or end with '/': {:?}",
            logical_path
        )));
    }
    for segment in logical_path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(OcflError::InvalidInput(format!(
                "Logical path contains an illegal segment: {:?}",
                logical_path
            )));
        }
    }
    Ok(())
}

/// Maps a logical path to the path fragment used to store its content
pub trait LogicalPathMapper: Send + Sync {
    fn map(&self, logical_path: &str) -> String;
}

/// Uses logical paths as content paths unchanged.
///
/// Suitable for POSIX-style backends; stores with narrower character rules
/// should install a percent-encoding mapper instead.
#[derive(Debug, Default)]
pub struct DirectLogicalPathMapper;

impl LogicalPathMapper for DirectLogicalPathMapper {
    fn map(&self, logical_path: &str) -> String {
        logical_path.to_string()
    }
}

/// Rejects content paths the backing store cannot represent
pub trait ContentPathConstraintProcessor: Send + Sync {
    fn apply(&self, content_path: &str) -> Result<()>;
}

/// Baseline constraints every backend shares: non-empty segments, no `.` or
/// `..`, no backslashes, no ASCII control characters.
#[derive(Debug, Default)]
pub struct DefaultContentPathConstraints;

impl ContentPathConstraintProcessor for DefaultContentPathConstraints {
    fn apply(&self, content_path: &str) -> Result<()> {
        let reject = |reason: &str| {
            Err(OcflError::InvalidInput(format!(
                "Content path {:?} is invalid: {}",
                content_path, reason
            )))
        };

        if content_path.is_empty() {
            return reject("empty path");
        }
        if content_path.contains('\\') {
            return reject("contains a backslash");
        }
        if content_path.chars().any(|c| c.is_ascii_control()) {
            return reject("contains a control character");
        }
        for segment in content_path.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return reject("contains an illegal segment");
            }
        }
        Ok(())
    }
}

/// Binds the mapper and constraints to a version's content prefix and
/// produces content paths for newly added digests.
pub struct ContentPathMapper {
    logical_path_mapper: std::sync::Arc<dyn LogicalPathMapper>,
    constraints: std::sync::Arc<dyn ContentPathConstraintProcessor>,
    prefix: String,
}

/// A newly allocated content path, in both the forms callers need
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPathParts {
    /// Full manifest form, e.g. `v2/content/dir/file.txt`
    pub content_path: String,
    /// Relative to the content directory, e.g. `dir/file.txt`
    pub path_under_content_dir: String,
}

impl ContentPathMapper {
    /// Mapper for the version about to be created
    pub fn new(
        logical_path_mapper: std::sync::Arc<dyn LogicalPathMapper>,
        constraints: std::sync::Arc<dyn ContentPathConstraintProcessor>,
        version_num: VersionNum,
        content_directory: &str,
    ) -> Self {
        Self {
            logical_path_mapper,
            constraints,
            prefix: format!("{}/{}", version_num, content_directory),
        }
    }

    /// Allocate the content path for a logical path. Deterministic: the same
    /// logical path always maps to the same content path within a version.
    pub fn content_path(&self, logical_path: &str) -> Result<ContentPathParts> {
        validate_logical_path(logical_path)?;
        let mapped = self.logical_path_mapper.map(logical_path);
        let content_path = format!("{}/{}", self.prefix, mapped);
        self.constraints.apply(&content_path)?;
        Ok(ContentPathParts {
            content_path,
            path_under_content_dir: mapped,
        })
    }
}
