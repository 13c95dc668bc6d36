//! In-memory inventory mutation
//!
//! `InventoryUpdater` is a pure mutator over an [`Inventory`]: it records
//! additions, removals, renames, and reinstatements against a working state
//! and assembles the next inventory value when the version is built. It
//! never touches disk itself; when a mutation orphans content that was
//! staged for the in-progress version, it reports the staged path back to
//! the caller for deletion.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::config::OcflConfig;
use crate::digest::DigestAlgorithm;
use crate::errors::{OcflError, Result};
use crate::model::{FixityBlock, Inventory, OcflVersion, PathBiMap, Version, VersionInfo, VersionNum};
use crate::options::OcflOption;
use crate::path::{
    validate_logical_path, ContentPathConstraintProcessor, ContentPathMapper, ContentPathParts,
    LogicalPathMapper,
};

/// Outcome of an `add_file` call
#[derive(Debug)]
pub struct AddFileResult {
    /// False when the digest was already in the manifest and no new content
    /// path was allocated
    pub is_new: bool,
    /// Where the new content lives relative to the version's content
    /// directory; `None` when the add deduplicated
    pub path_under_content_dir: Option<String>,
    /// Staged files orphaned by an overwrite, to be deleted by the caller
    pub displaced: Vec<RemovedStagedFile>,
}

/// A file staged for the in-progress version that is no longer referenced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedStagedFile {
    pub path_under_content_dir: String,
}

/// Builds the next version of an inventory in memory.
///
/// Constructed in one of two modes: **blank state** (the next version
/// starts empty, for put-object replace-all semantics) or **copy state**
/// (the next version starts as a copy of an existing version's state, for
/// update and replicate flows).
pub struct InventoryUpdater {
    source: Inventory,
    next_version: VersionNum,
    spec_version: OcflVersion,
    manifest: PathBiMap,
    fixity: FixityBlock,
    state: PathBiMap,
    /// digest → allocated content path, for digests introduced by this
    /// in-progress version only
    added_this_version: HashMap<String, ContentPathParts>,
    mapper: ContentPathMapper,
}

impl InventoryUpdater {
    /// Next version starts from an empty state
    pub fn blank_state(
        inventory: &Inventory,
        logical_path_mapper: Arc<dyn LogicalPathMapper>,
        constraints: Arc<dyn ContentPathConstraintProcessor>,
    ) -> Self {
        Self::build(inventory, PathBiMap::new(), logical_path_mapper, constraints)
    }

    /// Next version starts as a copy of the HEAD version's state
    pub fn copy_state(
        inventory: &Inventory,
        logical_path_mapper: Arc<dyn LogicalPathMapper>,
        constraints: Arc<dyn ContentPathConstraintProcessor>,
    ) -> Self {
        let state = inventory
            .head_version()
            .map(|version| version.state.clone())
            .unwrap_or_default();
        Self::build(inventory, state, logical_path_mapper, constraints)
    }

    /// Next version starts as a copy of a specific version's state
    pub fn copy_state_of(
        inventory: &Inventory,
        version_num: VersionNum,
        logical_path_mapper: Arc<dyn LogicalPathMapper>,
        constraints: Arc<dyn ContentPathConstraintProcessor>,
    ) -> Result<Self> {
        let version = inventory.version(version_num).ok_or_else(|| {
            OcflError::NotFound(format!(
                "Object {} version {} was not found",
                inventory.id(),
                version_num
            ))
        })?;
        Ok(Self::build(
            inventory,
            version.state.clone(),
            logical_path_mapper,
            constraints,
        ))
    }

    fn build(
        inventory: &Inventory,
        state: PathBiMap,
        logical_path_mapper: Arc<dyn LogicalPathMapper>,
        constraints: Arc<dyn ContentPathConstraintProcessor>,
    ) -> Self {
        let next_version = inventory.next_version_num();
        let mapper = ContentPathMapper::new(
            logical_path_mapper,
            constraints,
            next_version,
            inventory.resolve_content_directory(),
        );
        Self {
            next_version,
            spec_version: inventory.spec_version(),
            manifest: inventory.manifest().clone(),
            fixity: inventory.fixity().cloned().unwrap_or_default(),
            state,
            added_this_version: HashMap::new(),
            mapper,
            source: inventory.clone(),
        }
    }

    /// The version this updater is building
    pub fn next_version_num(&self) -> VersionNum {
        self.next_version
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.source.digest_algorithm()
    }

    /// The content path a logical path would be staged at, relative to the
    /// content directory. Deterministic for a given logical path.
    pub fn inner_content_path(&self, logical_path: &str) -> Result<String> {
        Ok(self.mapper.content_path(logical_path)?.path_under_content_dir)
    }

    pub fn contains_logical_path(&self, logical_path: &str) -> bool {
        self.digest_for_logical_path(logical_path).is_some()
    }

    /// The digest the working state binds a logical path to
    pub fn digest_for_logical_path(&self, logical_path: &str) -> Option<&str> {
        self.state.iter().find_map(|(digest, paths)| {
            if paths.contains(logical_path) {
                Some(digest.as_str())
            } else {
                None
            }
        })
    }

    /// True when the digest was introduced by this in-progress version
    pub fn is_staged_digest(&self, digest: &str) -> bool {
        self.added_this_version.contains_key(&digest.to_lowercase())
    }

    /// The staged location of a digest introduced this version, relative to
    /// the content directory
    pub fn staged_content_path(&self, digest: &str) -> Option<&str> {
        self.added_this_version
            .get(&digest.to_lowercase())
            .map(|parts| parts.path_under_content_dir.as_str())
    }

    /// Record a file in the working state.
    ///
    /// If the digest already appears in the manifest no new content path is
    /// allocated and `is_new` is false. Otherwise a content path is
    /// allocated through the configured mapper and recorded in the
    /// manifest.
    pub fn add_file(
        &mut self,
        digest: &str,
        logical_path: &str,
        options: &[OcflOption],
    ) -> Result<AddFileResult> {
        validate_logical_path(logical_path)?;
        let digest = digest.to_lowercase();

        let mut displaced = Vec::new();
        if self.contains_logical_path(logical_path) {
            if !options.contains(&OcflOption::Overwrite) {
                return Err(OcflError::PathAlreadyExists(format!(
                    "Cannot add {} to object {} because the path already exists",
                    logical_path,
                    self.source.id()
                )));
            }
            displaced.extend(self.remove_binding(logical_path));
        }

        if self.manifest.contains_key(&digest) {
            self.state
                .entry(digest)
                .or_default()
                .insert(logical_path.to_string());
            return Ok(AddFileResult {
                is_new: false,
                path_under_content_dir: None,
                displaced,
            });
        }

        let parts = self.mapper.content_path(logical_path)?;
        self.manifest
            .entry(digest.clone())
            .or_default()
            .insert(parts.content_path.clone());
        self.state
            .entry(digest.clone())
            .or_default()
            .insert(logical_path.to_string());
        self.added_this_version.insert(digest, parts.clone());

        Ok(AddFileResult {
            is_new: true,
            path_under_content_dir: Some(parts.path_under_content_dir),
            displaced,
        })
    }

    /// Remove a logical path from the working state. Removing a path that
    /// does not exist is a no-op.
    ///
    /// Content committed by earlier versions always stays in the manifest.
    /// Content introduced by this in-progress version is dropped from the
    /// manifest once its last logical path is removed, and its staged file
    /// is reported for deletion.
    pub fn remove_file(&mut self, logical_path: &str) -> Vec<RemovedStagedFile> {
        self.remove_binding(logical_path).into_iter().collect()
    }

    /// Rebind a logical path, keeping its digest
    pub fn rename_file(
        &mut self,
        src_path: &str,
        dst_path: &str,
        options: &[OcflOption],
    ) -> Result<Vec<RemovedStagedFile>> {
        validate_logical_path(dst_path)?;

        let digest = self
            .digest_for_logical_path(src_path)
            .ok_or_else(|| {
                OcflError::NotFound(format!(
                    "Cannot rename {} in object {} because the path does not exist",
                    src_path,
                    self.source.id()
                ))
            })?
            .to_string();

        let mut displaced = Vec::new();
        if self.contains_logical_path(dst_path) {
            if !options.contains(&OcflOption::Overwrite) {
                return Err(OcflError::PathAlreadyExists(format!(
                    "Cannot rename {} to {} in object {} because the destination already exists",
                    src_path,
                    dst_path,
                    self.source.id()
                )));
            }
            displaced.extend(self.remove_binding(dst_path));
        }

        // Bind the destination before unbinding the source so the digest is
        // never transiently orphaned.
        self.state
            .entry(digest)
            .or_default()
            .insert(dst_path.to_string());
        displaced.extend(self.remove_binding(src_path));

        Ok(displaced)
    }

    /// Copy a digest binding from a historical version into the working
    /// state
    pub fn reinstate_file(
        &mut self,
        src_version: VersionNum,
        src_path: &str,
        dst_path: &str,
        options: &[OcflOption],
    ) -> Result<Vec<RemovedStagedFile>> {
        validate_logical_path(dst_path)?;

        let version = self.source.version(src_version).ok_or_else(|| {
            OcflError::NotFound(format!(
                "Object {} version {} was not found",
                self.source.id(),
                src_version
            ))
        })?;
        let digest = version
            .digest_for_logical_path(src_path)
            .ok_or_else(|| {
                OcflError::NotFound(format!(
                    "Object {} version {} does not contain path {}",
                    self.source.id(),
                    src_version,
                    src_path
                ))
            })?
            .to_string();

        let mut displaced = Vec::new();
        if self.contains_logical_path(dst_path) {
            if !options.contains(&OcflOption::Overwrite) {
                return Err(OcflError::PathAlreadyExists(format!(
                    "Cannot reinstate {} at {} in object {} because the destination already exists",
                    src_path,
                    dst_path,
                    self.source.id()
                )));
            }
            displaced.extend(self.remove_binding(dst_path));
        }

        self.state
            .entry(digest)
            .or_default()
            .insert(dst_path.to_string());

        Ok(displaced)
    }

    /// Empty the working state
    pub fn clear_state(&mut self) -> Vec<RemovedStagedFile> {
        let paths: Vec<String> = self.state.values().flatten().cloned().collect();
        let mut displaced = Vec::new();
        for path in paths {
            displaced.extend(self.remove_binding(&path));
        }
        displaced
    }

    /// Record an auxiliary fixity digest for a file staged this version.
    ///
    /// When the algorithm matches the object's content algorithm the digest
    /// is checked instead of recorded.
    pub fn add_fixity(
        &mut self,
        logical_path: &str,
        algorithm: &str,
        digest: &str,
    ) -> Result<()> {
        let content_digest = self
            .digest_for_logical_path(logical_path)
            .ok_or_else(|| {
                OcflError::NotFound(format!(
                    "Cannot add fixity for {} in object {} because the path does not exist",
                    logical_path,
                    self.source.id()
                ))
            })?
            .to_string();

        let digest = digest.to_lowercase();

        if algorithm == self.source.digest_algorithm().ocfl_name() {
            if digest != content_digest {
                return Err(OcflError::Fixity(format!(
                    "Expected {} digest of {} to be {} but was {}",
                    algorithm, logical_path, content_digest, digest
                )));
            }
            return Ok(());
        }

        let parts = self.added_this_version.get(&content_digest).ok_or_else(|| {
            OcflError::InvalidInput(format!(
                "Fixity can only be recorded for files added in the current version: {}",
                logical_path
            ))
        })?;

        self.fixity
            .entry(algorithm.to_string())
            .or_default()
            .entry(digest)
            .or_default()
            .insert(parts.content_path.clone());
        Ok(())
    }

    /// Upgrade the inventory's OCFL spec version when the configuration
    /// asks for a newer one. Returns true when an upgrade was applied.
    pub fn upgrade_inventory(&mut self, config: &OcflConfig) -> bool {
        if config.upgrade_objects_on_write && self.spec_version < config.default_ocfl_version {
            self.spec_version = config.default_ocfl_version;
            return true;
        }
        false
    }

    /// Finalize the working state into the next inventory value.
    ///
    /// The source inventory's digest becomes the new inventory's previous
    /// digest; the new inventory's own digest is unset until it is
    /// serialized.
    pub fn build_new_inventory(
        self,
        created: DateTime<FixedOffset>,
        version_info: &VersionInfo,
    ) -> Result<Inventory> {
        let version = Version::new(
            created,
            version_info.message.clone(),
            version_info.user.clone(),
            self.state,
        );

        let fixity = if self.fixity.is_empty() {
            None
        } else {
            Some(self.fixity)
        };

        self.source
            .to_builder()
            .spec_version(self.spec_version)
            .manifest(self.manifest)
            .fixity(fixity)
            .previous_digest(self.source.inventory_digest().map(str::to_string))
            .inventory_digest(None)
            .add_version(self.next_version, version)
            .build()
    }

    /// Unbind a logical path, dropping manifest entries and reporting
    /// staged files for digests that were introduced this version and are
    /// now orphaned.
    fn remove_binding(&mut self, logical_path: &str) -> Option<RemovedStagedFile> {
        let digest = self.digest_for_logical_path(logical_path)?.to_string();

        let orphaned = {
            let paths = self.state.get_mut(&digest).expect("digest is in state");
            paths.remove(logical_path);
            paths.is_empty()
        };
        if !orphaned {
            return None;
        }
        self.state.remove(&digest);

        let parts = self.added_this_version.remove(&digest)?;
        self.manifest.remove(&digest);
        for algorithm_block in self.fixity.values_mut() {
            for paths in algorithm_block.values_mut() {
                paths.remove(&parts.content_path);
            }
        }
        Some(RemovedStagedFile {
            path_under_content_dir: parts.path_under_content_dir,
        })
    }
}
