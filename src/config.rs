//! # Repository Configuration
//!
//! Defaults applied when creating new objects. Existing objects always keep
//! the algorithm and content directory recorded in their own inventories;
//! the configuration only influences objects created after it was set, plus
//! OCFL spec-version upgrades when `upgrade_objects_on_write` is enabled.

use serde::{Deserialize, Serialize};

use crate::digest::DigestAlgorithm;
use crate::errors::{OcflError, Result};
use crate::model::OcflVersion;

/// Name of the per-version content directory when none is configured
pub const DEFAULT_CONTENT_DIRECTORY: &str = "content";

/// Repository defaults for newly created objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcflConfig {
    /// Digest algorithm used for content addressing in new objects
    pub default_digest_algorithm: DigestAlgorithm,

    /// Name of the per-version content sub-directory in new objects
    pub default_content_directory: String,

    /// OCFL spec version new objects are created at
    pub default_ocfl_version: OcflVersion,

    /// When true, objects at an older OCFL spec version are upgraded to
    /// `default_ocfl_version` the next time they are written
    pub upgrade_objects_on_write: bool,
}

impl OcflConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects content directory names that cannot appear as a single path
    /// segment.
    pub fn validate(&self) -> Result<()> {
        let dir = &self.default_content_directory;
        if dir.is_empty() || dir.contains('/') || dir.contains('\\') || dir == "." || dir == ".." {
            return Err(OcflError::InvalidInput(format!(
                "Invalid content directory name: {:?}",
                dir
            )));
        }
        Ok(())
    }
}

impl Default for OcflConfig {
    fn default() -> Self {
        Self {
            default_digest_algorithm: DigestAlgorithm::Sha512,
            default_content_directory: DEFAULT_CONTENT_DIRECTORY.to_string(),
            default_ocfl_version: OcflVersion::V1_1,
            upgrade_objects_on_write: false,
        }
    }
}
