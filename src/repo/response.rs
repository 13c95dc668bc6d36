//! Read-side response types
//!
//! Plain values derived from an inventory for callers that describe
//! objects, versions, and file histories. Nothing here borrows the
//! inventory; responses stay valid after the repository moves on.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};

use crate::errors::{OcflError, Result};
use crate::model::{Inventory, ObjectVersionId, User, Version, VersionNum};
use crate::storage::StreamOpener;

/// One file visible in a version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDetails {
    /// Logical path within the version
    pub path: String,
    /// Path of the backing content file relative to the storage root
    pub storage_relative_path: String,
    /// algorithm name → digest, the content digest plus any fixity digests
    pub digests: BTreeMap<String, String>,
}

/// A version and the files visible in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDetails {
    pub object_id: String,
    pub version_num: VersionNum,
    pub created: DateTime<FixedOffset>,
    pub message: Option<String>,
    pub user: Option<User>,
    /// logical path → details
    pub files: BTreeMap<String, FileDetails>,
}

impl VersionDetails {
    pub fn object_version_id(&self) -> ObjectVersionId {
        ObjectVersionId::version(self.object_id.clone(), self.version_num)
    }
}

/// Summary of an object across all of its versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDetails {
    pub id: String,
    pub head: VersionNum,
    pub digest_algorithm: String,
    pub versions: BTreeMap<VersionNum, VersionDetails>,
}

impl ObjectDetails {
    pub fn head_version(&self) -> &VersionDetails {
        &self.versions[&self.head]
    }
}

/// A version's details plus lazy content streams
pub struct OcflObjectVersion {
    pub details: VersionDetails,
    /// logical path → stream opener, fixity-checked on read
    pub streams: BTreeMap<String, StreamOpener>,
}

/// What happened to a logical path in one version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeType {
    /// Content added or changed at the path
    Update,
    /// Path removed from the version's state
    Remove,
}

/// One entry in a file's change history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub change_type: FileChangeType,
    pub object_version_id: ObjectVersionId,
    pub path: String,
    /// Backing content path; `None` for removes
    pub storage_relative_path: Option<String>,
    pub digests: BTreeMap<String, String>,
    pub timestamp: DateTime<FixedOffset>,
    pub message: Option<String>,
    pub user: Option<User>,
}

/// The full change history of one logical path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeHistory {
    pub path: String,
    pub changes: Vec<FileChange>,
}

impl FileChangeHistory {
    /// The most recent change
    pub fn most_recent(&self) -> Option<&FileChange> {
        self.changes.last()
    }
}

/// Maps inventories into response values
pub(crate) struct ResponseMapper;

impl ResponseMapper {
    pub(crate) fn map_inventory(inventory: &Inventory) -> ObjectDetails {
        let versions = inventory
            .versions()
            .iter()
            .map(|(num, version)| (*num, Self::map_version(inventory, *num, version)))
            .collect();

        ObjectDetails {
            id: inventory.id().to_string(),
            head: inventory.head(),
            digest_algorithm: inventory.digest_algorithm().ocfl_name().to_string(),
            versions,
        }
    }

    pub(crate) fn map_version(
        inventory: &Inventory,
        version_num: VersionNum,
        version: &Version,
    ) -> VersionDetails {
        let mut files = BTreeMap::new();

        for (digest, logical_paths) in &version.state {
            let content_path = inventory
                .content_path_for_digest(digest)
                .cloned()
                .unwrap_or_default();

            for logical_path in logical_paths {
                files.insert(
                    logical_path.clone(),
                    FileDetails {
                        path: logical_path.clone(),
                        storage_relative_path: Self::storage_relative_path(
                            inventory,
                            &content_path,
                        ),
                        digests: Self::digests_for(inventory, digest, &content_path),
                    },
                );
            }
        }

        VersionDetails {
            object_id: inventory.id().to_string(),
            version_num,
            created: version.created,
            message: version.message.clone(),
            user: version.user.clone(),
            files,
        }
    }

    pub(crate) fn file_change_history(
        inventory: &Inventory,
        logical_path: &str,
    ) -> Result<FileChangeHistory> {
        let mut changes = Vec::new();
        let mut previous: Option<String> = None;

        for (num, version) in inventory.versions() {
            let current = version
                .digest_for_logical_path(logical_path)
                .map(str::to_string);

            match (&previous, &current) {
                (prev, Some(digest)) if prev.as_deref() != Some(digest.as_str()) => {
                    let content_path = inventory
                        .content_path_for_digest(digest)
                        .cloned()
                        .unwrap_or_default();
                    changes.push(FileChange {
                        change_type: FileChangeType::Update,
                        object_version_id: ObjectVersionId::version(inventory.id(), *num),
                        path: logical_path.to_string(),
                        storage_relative_path: Some(Self::storage_relative_path(
                            inventory,
                            &content_path,
                        )),
                        digests: Self::digests_for(inventory, digest, &content_path),
                        timestamp: version.created,
                        message: version.message.clone(),
                        user: version.user.clone(),
                    });
                }
                (Some(_), None) => {
                    changes.push(FileChange {
                        change_type: FileChangeType::Remove,
                        object_version_id: ObjectVersionId::version(inventory.id(), *num),
                        path: logical_path.to_string(),
                        storage_relative_path: None,
                        digests: BTreeMap::new(),
                        timestamp: version.created,
                        message: version.message.clone(),
                        user: version.user.clone(),
                    });
                }
                _ => {}
            }

            previous = current;
        }

        if changes.is_empty() {
            return Err(OcflError::NotFound(format!(
                "The logical path {} was not found in object {}",
                logical_path,
                inventory.id()
            )));
        }

        Ok(FileChangeHistory {
            path: logical_path.to_string(),
            changes,
        })
    }

    fn storage_relative_path(inventory: &Inventory, content_path: &str) -> String {
        if inventory.object_root_path().is_empty() {
            content_path.to_string()
        } else {
            format!("{}/{}", inventory.object_root_path(), content_path)
        }
    }

    fn digests_for(
        inventory: &Inventory,
        content_digest: &str,
        content_path: &str,
    ) -> BTreeMap<String, String> {
        let mut digests = BTreeMap::new();
        digests.insert(
            inventory.digest_algorithm().ocfl_name().to_string(),
            content_digest.to_string(),
        );

        if let Some(fixity) = inventory.fixity() {
            for (algorithm, block) in fixity {
                for (digest, paths) in block {
                    if paths.contains(content_path) {
                        digests.insert(algorithm.clone(), digest.clone());
                    }
                }
            }
        }
        digests
    }
}
