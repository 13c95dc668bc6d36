//! The mutation surface handed to update closures
//!
//! All methods take `&self` so a closure may fan work out across threads;
//! the shared [`InventoryUpdater`] is serialized behind a mutex and the
//! per-mutation [`FileLocker`] keeps concurrent operations on the same
//! logical path from interleaving.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use parking_lot::Mutex;
use tracing::debug;

use crate::digest::{DigestAlgorithm, DigestWriter};
use crate::errors::{OcflError, Result};
use crate::inventory::{AddFileProcessor, InventoryUpdater};
use crate::lock::FileLocker;
use crate::model::{Inventory, VersionNum};
use crate::options::OcflOption;
use crate::storage::OcflStorage;

/// Mutates the version being built inside an update closure.
///
/// Every mutation delegates to the shared [`InventoryUpdater`]; reads
/// resolve against staged content first and fall back to committed
/// content in the storage backend.
pub struct ObjectUpdater<'a> {
    inventory: &'a Inventory,
    updater: &'a Mutex<InventoryUpdater>,
    processor: &'a AddFileProcessor<'a>,
    file_locker: &'a FileLocker,
    storage: &'a dyn OcflStorage,
    content_dir: &'a Path,
}

impl<'a> ObjectUpdater<'a> {
    pub(crate) fn new(
        inventory: &'a Inventory,
        updater: &'a Mutex<InventoryUpdater>,
        processor: &'a AddFileProcessor<'a>,
        file_locker: &'a FileLocker,
        storage: &'a dyn OcflStorage,
        content_dir: &'a Path,
    ) -> Self {
        Self {
            inventory,
            updater,
            processor,
            file_locker,
            storage,
            content_dir,
        }
    }

    /// Add all regular files at or under `source_path`, rooted at
    /// `destination_path` within the object (`""` = object root)
    pub fn add_path(
        &self,
        source_path: &Path,
        destination_path: &str,
        options: &[OcflOption],
    ) -> Result<&Self> {
        self.processor
            .process_path(source_path, destination_path, options)?;
        Ok(self)
    }

    /// Add a single file whose digest the caller asserts, skipping hashing
    pub fn add_file_with_digest(
        &self,
        digest: &str,
        source_path: &Path,
        destination_path: &str,
        options: &[OcflOption],
    ) -> Result<&Self> {
        self.processor
            .process_file_with_digest(digest, source_path, destination_path, options)?;
        Ok(self)
    }

    /// Stream bytes into the version at `logical_path`
    pub fn write_file(
        &self,
        reader: &mut dyn Read,
        logical_path: &str,
        options: &[OcflOption],
    ) -> Result<&Self> {
        self.file_locker.with_lock(logical_path, || {
            let inner_path = self.updater.lock().inner_content_path(logical_path)?;
            let staged = self.content_dir.join(&inner_path);
            if let Some(parent) = staged.parent() {
                fs::create_dir_all(parent).map_err(|e| OcflError::io_at(parent, e))?;
            }

            let algorithm = self.updater.lock().digest_algorithm();
            let out = File::create(&staged).map_err(|e| OcflError::io_at(&staged, e))?;
            let mut writer = DigestWriter::new(BufWriter::new(out), algorithm);
            io::copy(reader, &mut writer).map_err(|e| {
                OcflError::io(format!("Failed to write {}", staged.display()), e)
            })?;
            writer.flush().map_err(|e| OcflError::io_at(&staged, e))?;
            let (_, digest) = writer.finalize();

            let result = self.updater.lock().add_file(&digest, logical_path, options)?;
            // An overwrite of a path staged earlier in this version
            // displaces the same staging location the new bytes now
            // occupy; that file must survive.
            let displaced: Vec<_> = result
                .displaced
                .iter()
                .filter(|removed| removed.path_under_content_dir != inner_path)
                .cloned()
                .collect();
            self.processor.delete_displaced(&displaced);

            if !result.is_new {
                debug!(staged = %staged.display(), %digest, "deleting staged duplicate");
                fs::remove_file(&staged).map_err(|e| OcflError::io_at(&staged, e))?;
                self.processor.flag_empty_dir_check();
            }
            Ok(())
        })?;
        Ok(self)
    }

    /// Remove a logical path from the version; removing a missing path is
    /// a no-op
    pub fn remove_file(&self, logical_path: &str) -> Result<&Self> {
        self.file_locker.with_lock(logical_path, || {
            let displaced = self.updater.lock().remove_file(logical_path);
            self.processor.delete_displaced(&displaced);
            Ok(())
        })?;
        Ok(self)
    }

    /// Rename a logical path within the version
    pub fn rename_file(
        &self,
        src_path: &str,
        dst_path: &str,
        options: &[OcflOption],
    ) -> Result<&Self> {
        // Lock in sorted order so two renames over the same pair cannot
        // deadlock.
        let (first, second) = if src_path <= dst_path {
            (src_path, dst_path)
        } else {
            (dst_path, src_path)
        };

        let _first_guard = self.file_locker.lock(first)?;
        let _second_guard = if first == second {
            None
        } else {
            Some(self.file_locker.lock(second)?)
        };

        let displaced = self.updater.lock().rename_file(src_path, dst_path, options)?;
        self.processor.delete_displaced(&displaced);
        Ok(self)
    }

    /// Bind `dst_path` to the content `src_path` had in `src_version`
    pub fn reinstate_file(
        &self,
        src_version: VersionNum,
        src_path: &str,
        dst_path: &str,
        options: &[OcflOption],
    ) -> Result<&Self> {
        self.file_locker.with_lock(dst_path, || {
            let displaced =
                self.updater
                    .lock()
                    .reinstate_file(src_version, src_path, dst_path, options)?;
            self.processor.delete_displaced(&displaced);
            Ok(())
        })?;
        Ok(self)
    }

    /// Empty the version's state, including content staged so far
    pub fn clear_version_state(&self) -> Result<&Self> {
        let displaced = self.updater.lock().clear_state();
        self.processor.delete_displaced(&displaced);
        Ok(self)
    }

    /// Record an auxiliary fixity digest for a file staged in this version.
    ///
    /// Digests in a supported algorithm are verified against the staged
    /// bytes before being recorded.
    pub fn add_file_fixity(
        &self,
        logical_path: &str,
        algorithm: &str,
        digest: &str,
    ) -> Result<&Self> {
        self.file_locker.with_lock(logical_path, || {
            let staged_path = {
                let updater = self.updater.lock();
                let content_digest = updater.digest_for_logical_path(logical_path).map(str::to_string);
                content_digest
                    .and_then(|d| updater.staged_content_path(&d).map(str::to_string))
            };

            if let (Some(staged), Some(alg)) =
                (&staged_path, DigestAlgorithm::from_ocfl_name(algorithm))
            {
                let actual = alg.hash_file(&self.content_dir.join(staged))?;
                if actual != digest.to_lowercase() {
                    return Err(OcflError::Fixity(format!(
                        "Expected {} digest of {} to be {} but was {}",
                        algorithm,
                        logical_path,
                        digest.to_lowercase(),
                        actual
                    )));
                }
            }

            self.updater.lock().add_fixity(logical_path, algorithm, digest)
        })?;
        Ok(self)
    }

    /// True when a logical path is bound in the version being built
    pub fn contains_file(&self, logical_path: &str) -> bool {
        self.updater.lock().contains_logical_path(logical_path)
    }

    /// Stream the current content of a logical path in the version being
    /// built: staged content when the file was added in this version,
    /// committed content otherwise.
    pub fn read_file(&self, logical_path: &str) -> Result<Box<dyn Read + Send>> {
        let (digest, staged_path) = {
            let updater = self.updater.lock();
            let digest = updater
                .digest_for_logical_path(logical_path)
                .ok_or_else(|| {
                    OcflError::NotFound(format!(
                        "Object {} does not contain path {}",
                        self.inventory.id(),
                        logical_path
                    ))
                })?
                .to_string();
            let staged = updater.staged_content_path(&digest).map(str::to_string);
            (digest, staged)
        };

        if let Some(staged) = staged_path {
            let file = crate::util::open_reader(&self.content_dir.join(staged))?;
            return Ok(Box::new(file));
        }

        // Committed content: resolve through whichever version binds the
        // digest and open its fixity-checked stream.
        for (num, version) in self.inventory.versions().iter().rev() {
            if let Some(paths) = version.paths_for_digest(&digest) {
                let path = paths.iter().next().expect("non-empty state entry");
                let streams = self.storage.get_object_streams(self.inventory, *num)?;
                let opener = streams.get(path).ok_or_else(|| {
                    OcflError::NotFound(format!(
                        "Object {} version {} does not contain path {}",
                        self.inventory.id(),
                        num,
                        path
                    ))
                })?;
                return Ok(Box::new(opener.open()?));
            }
        }

        Err(OcflError::NotFound(format!(
            "Object {} has no content for digest {}",
            self.inventory.id(),
            digest
        )))
    }
}
