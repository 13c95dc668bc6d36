//! Local filesystem backend
//!
//! Repository layout: a namaste-marked root containing one directory per
//! object (percent-encoded id, flat). Version install moves the staged
//! version directory into place and then refreshes the root inventory
//! pair, rechecking the on-disk head while the caller holds the object's
//! write lock.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::layout::{
    decode_object_id, encode_object_id, object_namaste_file, REPOSITORY_NAMASTE_CONTENT,
    REPOSITORY_NAMASTE_FILE,
};
use super::{OcflStorage, StreamOpener};
use crate::digest::DigestWriter;
use crate::errors::{OcflError, Result};
use crate::inventory::{InventoryMapper, SidecarMapper, INVENTORY_FILE};
use crate::model::{Inventory, VersionNum};
use crate::path::MUTABLE_HEAD_VERSION_PATH;
use crate::util;
use crate::validate::{self, ValidationResults};

/// OCFL storage over a local filesystem root
pub struct FsStorage {
    repo_root: PathBuf,
}

impl FsStorage {
    /// Open a repository root, initializing it when the directory is empty
    /// or absent. An existing non-empty directory must carry the
    /// repository namaste declaration.
    pub fn new(repo_root: impl Into<PathBuf>) -> Result<Self> {
        let repo_root = repo_root.into();
        fs::create_dir_all(&repo_root).map_err(|e| OcflError::io_at(&repo_root, e))?;

        let namaste = repo_root.join(REPOSITORY_NAMASTE_FILE);
        if !namaste.exists() {
            if util::has_children(&repo_root) {
                return Err(OcflError::InvalidState(format!(
                    "{} is not an OCFL storage root",
                    repo_root.display()
                )));
            }
            info!(root = %repo_root.display(), "initializing OCFL storage root");
            util::write_file_sync(&namaste, REPOSITORY_NAMASTE_CONTENT.as_bytes())?;
        }

        Ok(Self { repo_root })
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    fn object_root(&self, object_id: &str) -> PathBuf {
        self.repo_root.join(encode_object_id(object_id))
    }

    fn require_object_root(&self, object_id: &str) -> Result<PathBuf> {
        let root = self.object_root(object_id);
        if !root.join(INVENTORY_FILE).exists() {
            return Err(OcflError::NotFound(format!(
                "Object {} was not found",
                object_id
            )));
        }
        Ok(root)
    }

    /// The head currently installed on disk, or `None` for a new object
    fn current_head(&self, object_id: &str) -> Result<Option<VersionNum>> {
        let root = self.object_root(object_id);
        if !root.join(INVENTORY_FILE).exists() {
            return Ok(None);
        }
        let inventory = InventoryMapper::read(&root, &self.object_root_path(object_id))?;
        Ok(Some(inventory.head()))
    }

    fn copy_inventory_pair(&self, version_dir: &Path, object_root: &Path) -> Result<()> {
        let sidecar = SidecarMapper::find(version_dir)?;
        let sidecar_name = sidecar.file_name().unwrap().to_os_string();
        util::copy_file_make_parents(
            &version_dir.join(INVENTORY_FILE),
            &object_root.join(INVENTORY_FILE),
        )?;
        util::copy_file_make_parents(&sidecar, &object_root.join(sidecar_name))
    }

    fn write_object_namaste(&self, object_root: &Path, inventory: &Inventory) -> Result<()> {
        // Drop declarations from older spec versions before writing the
        // current one.
        if let Ok(entries) = fs::read_dir(object_root) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with("0=ocfl_object_") {
                    let _ = fs::remove_file(entry.path());
                }
            }
        }
        let tag = inventory.spec_version().object_namaste();
        util::write_file_sync(
            &object_root.join(object_namaste_file(inventory.spec_version())),
            format!("{}\n", tag).as_bytes(),
        )
    }

    fn mutable_head_revision(&self, object_root: &Path, content_dir: &str) -> u32 {
        let revisions_root = object_root
            .join(MUTABLE_HEAD_VERSION_PATH)
            .join(content_dir);
        let mut max = 1;
        if let Ok(entries) = fs::read_dir(revisions_root) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if let Some(num) = name.strip_prefix('r').and_then(|n| n.parse::<u32>().ok()) {
                    max = max.max(num);
                }
            }
        }
        max
    }
}

impl OcflStorage for FsStorage {
    fn load_inventory(&self, object_id: &str) -> Result<Option<Inventory>> {
        let object_root = self.object_root(object_id);
        if !object_root.join(INVENTORY_FILE).exists() {
            return Ok(None);
        }

        let relative_root = self.object_root_path(object_id);
        let mutable_head_dir = object_root.join(MUTABLE_HEAD_VERSION_PATH);

        let mut inventory = if mutable_head_dir.join(INVENTORY_FILE).exists() {
            let mut inventory = InventoryMapper::read(&mutable_head_dir, &relative_root)?;
            let revision =
                self.mutable_head_revision(&object_root, inventory.resolve_content_directory());
            inventory.set_mutable_head(revision);
            inventory
        } else {
            InventoryMapper::read(&object_root, &relative_root)?
        };

        if inventory.id() != object_id {
            return Err(OcflError::InvalidState(format!(
                "Inventory at {} is for object {} but {} was requested",
                object_root.display(),
                inventory.id(),
                object_id
            )));
        }

        inventory.set_object_root_path(&relative_root);
        Ok(Some(inventory))
    }

    fn contains_object(&self, object_id: &str) -> Result<bool> {
        Ok(self.object_root(object_id).join(INVENTORY_FILE).exists())
    }

    fn object_root_path(&self, object_id: &str) -> String {
        encode_object_id(object_id)
    }

    fn store_new_version(
        &self,
        inventory: &Inventory,
        staging_dir: &Path,
        upgraded_ocfl_version: bool,
    ) -> Result<()> {
        let object_root = self.object_root(inventory.id());
        let version_num = inventory.head();

        // Head recheck under the caller's write lock: the staged version
        // must still be the next sequential one.
        match self.current_head(inventory.id())? {
            None => {
                if version_num != VersionNum::V1 {
                    return Err(OcflError::ObjectOutOfSync(format!(
                        "Cannot store version {} of object {} because the object does not exist",
                        version_num,
                        inventory.id()
                    )));
                }
            }
            Some(disk_head) => {
                if disk_head.next() != version_num {
                    return Err(OcflError::ObjectOutOfSync(format!(
                        "Cannot store version {} of object {} because the current version is {}",
                        version_num,
                        inventory.id(),
                        disk_head
                    )));
                }
            }
        }

        let version_dir = object_root.join(version_num.to_string());
        if version_dir.exists() {
            return Err(OcflError::ObjectOutOfSync(format!(
                "Version {} of object {} already exists",
                version_num,
                inventory.id()
            )));
        }

        debug!(object_id = inventory.id(), version = %version_num, "installing staged version");

        let new_object = version_num == VersionNum::V1;
        if new_object {
            fs::create_dir_all(&object_root).map_err(|e| OcflError::io_at(&object_root, e))?;
        }

        util::move_dir(staging_dir, &version_dir)?;

        if new_object || upgraded_ocfl_version {
            self.write_object_namaste(&object_root, inventory)?;
        }

        self.copy_inventory_pair(&version_dir, &object_root)
    }

    fn rollback_to_version(&self, inventory: &Inventory, version_num: VersionNum) -> Result<()> {
        let object_root = self.require_object_root(inventory.id())?;
        let version_dir = object_root.join(version_num.to_string());
        if !version_dir.is_dir() {
            return Err(OcflError::NotFound(format!(
                "Object {} version {} was not found",
                inventory.id(),
                version_num
            )));
        }

        info!(object_id = inventory.id(), version = %version_num, "rolling back object");

        // Restore the root inventory pair first so a crash mid-delete
        // leaves a consistent head with stray version directories rather
        // than a head that references deleted versions.
        self.copy_inventory_pair(&version_dir, &object_root)?;

        let mut version = version_num.next();
        while version <= inventory.head() {
            let dir = object_root.join(version.to_string());
            if dir.exists() {
                fs::remove_dir_all(&dir).map_err(|e| OcflError::io_at(&dir, e))?;
            }
            version = version.next();
        }
        Ok(())
    }

    fn purge_object(&self, object_id: &str) -> Result<()> {
        let object_root = self.object_root(object_id);
        if object_root.exists() {
            info!(object_id, "purging object");
            fs::remove_dir_all(&object_root).map_err(|e| OcflError::io_at(&object_root, e))?;
        }
        Ok(())
    }

    fn reconstruct_object_version(
        &self,
        inventory: &Inventory,
        version_num: VersionNum,
        output_dir: &Path,
    ) -> Result<()> {
        let object_root = self.require_object_root(inventory.id())?;
        let version = inventory.version(version_num).ok_or_else(|| {
            OcflError::NotFound(format!(
                "Object {} version {} was not found",
                inventory.id(),
                version_num
            ))
        })?;

        for (digest, logical_paths) in &version.state {
            let content_path = inventory.content_path_for_digest(digest).ok_or_else(|| {
                OcflError::InvalidState(format!(
                    "Object {} has no manifest entry for digest {}",
                    inventory.id(),
                    digest
                ))
            })?;
            let src = object_root.join(content_path);

            for logical_path in logical_paths {
                let dst = output_dir.join(logical_path);
                if let Some(parent) = dst.parent() {
                    fs::create_dir_all(parent).map_err(|e| OcflError::io_at(parent, e))?;
                }

                let mut reader = util::open_reader(&src)?;
                let out = File::create(&dst).map_err(|e| OcflError::io_at(&dst, e))?;
                let mut writer =
                    DigestWriter::new(BufWriter::new(out), inventory.digest_algorithm());
                io::copy(&mut reader, &mut writer).map_err(|e| {
                    OcflError::io(format!("Failed to copy {}", src.display()), e)
                })?;
                writer.flush().map_err(|e| OcflError::io_at(&dst, e))?;

                let (_, actual) = writer.finalize();
                if actual != *digest {
                    return Err(OcflError::Fixity(format!(
                        "Expected {} to have {} digest {} but was {}",
                        content_path,
                        inventory.digest_algorithm(),
                        digest,
                        actual
                    )));
                }
            }
        }
        Ok(())
    }

    fn get_object_streams(
        &self,
        inventory: &Inventory,
        version_num: VersionNum,
    ) -> Result<BTreeMap<String, StreamOpener>> {
        let object_root = self.require_object_root(inventory.id())?;
        let version = inventory.version(version_num).ok_or_else(|| {
            OcflError::NotFound(format!(
                "Object {} version {} was not found",
                inventory.id(),
                version_num
            ))
        })?;

        let mut streams = BTreeMap::new();
        for (digest, logical_paths) in &version.state {
            let content_path = inventory.content_path_for_digest(digest).ok_or_else(|| {
                OcflError::InvalidState(format!(
                    "Object {} has no manifest entry for digest {}",
                    inventory.id(),
                    digest
                ))
            })?;

            for logical_path in logical_paths {
                streams.insert(
                    logical_path.clone(),
                    StreamOpener::new(
                        object_root.join(content_path),
                        content_path.clone(),
                        inventory.digest_algorithm(),
                        digest.clone(),
                    ),
                );
            }
        }
        Ok(streams)
    }

    fn list_object_ids(&self) -> Result<Box<dyn Iterator<Item = String> + Send>> {
        let entries =
            fs::read_dir(&self.repo_root).map_err(|e| OcflError::io_at(&self.repo_root, e))?;

        Ok(Box::new(entries.filter_map(|entry| {
            let entry = entry.ok()?;
            let path = entry.path();
            if !path.is_dir() || !path.join(INVENTORY_FILE).exists() {
                return None;
            }
            let encoded = entry.file_name().to_string_lossy().into_owned();
            match decode_object_id(&encoded) {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(directory = %path.display(), "skipping undecodable object directory");
                    None
                }
            }
        })))
    }

    fn export_object(&self, object_id: &str, output_dir: &Path) -> Result<()> {
        let object_root = self.require_object_root(object_id)?;
        debug!(object_id, output = %output_dir.display(), "exporting object");
        util::copy_dir_recursive(&object_root, output_dir)
    }

    fn export_version(
        &self,
        object_id: &str,
        version_num: VersionNum,
        output_dir: &Path,
    ) -> Result<()> {
        let object_root = self.require_object_root(object_id)?;
        let version_dir = object_root.join(version_num.to_string());
        if !version_dir.is_dir() {
            return Err(OcflError::NotFound(format!(
                "Object {} version {} was not found",
                object_id, version_num
            )));
        }
        debug!(object_id, version = %version_num, output = %output_dir.display(), "exporting version");
        util::copy_dir_recursive(&version_dir, output_dir)
    }

    fn import_object(&self, object_id: &str, staging_dir: &Path) -> Result<()> {
        let object_root = self.object_root(object_id);
        if object_root.exists() {
            return Err(OcflError::AlreadyExists(format!(
                "Cannot import object {} because it already exists",
                object_id
            )));
        }
        info!(object_id, "importing object");
        util::move_dir(staging_dir, &object_root)
    }

    fn validate_object(
        &self,
        object_id: &str,
        content_fixity_check: bool,
    ) -> Result<ValidationResults> {
        let object_root = self.require_object_root(object_id)?;
        validate::validate_object_structure(&object_root, content_fixity_check)
    }

    fn invalidate_cache(&self, _object_id: Option<&str>) {
        // The filesystem backend reads inventories from disk on every call
        // and holds no cache.
    }

    fn close(&self) {}
}
