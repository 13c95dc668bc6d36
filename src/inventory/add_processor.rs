//! Staging files into a version
//!
//! Walks a source tree and feeds each regular file into the
//! [`InventoryUpdater`], computing its digest while either moving or
//! stream-copying it into the staging content directory. Duplicate content
//! (a digest already present in the object) is never staged twice: in copy
//! mode the just-written file is deleted again, in move mode the source is
//! left untouched.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::updater::{InventoryUpdater, RemovedStagedFile};
use crate::digest::{DigestAlgorithm, DigestWriter};
use crate::errors::{OcflError, Result};
use crate::lock::FileLocker;
use crate::options::OcflOption;
use crate::util;

/// Stages source files into a version being built.
///
/// Shares the [`InventoryUpdater`] behind a mutex so the caller's update
/// closure may add files from multiple threads; the [`FileLocker`] keeps
/// concurrent adds of the same logical path serialized.
pub struct AddFileProcessor<'a> {
    updater: &'a Mutex<InventoryUpdater>,
    file_locker: &'a FileLocker,
    content_dir: PathBuf,
    algorithm: DigestAlgorithm,
    check_for_empty_dirs: AtomicBool,
}

impl<'a> AddFileProcessor<'a> {
    pub fn new(
        updater: &'a Mutex<InventoryUpdater>,
        file_locker: &'a FileLocker,
        content_dir: PathBuf,
        algorithm: DigestAlgorithm,
    ) -> Self {
        Self {
            updater,
            file_locker,
            content_dir,
            algorithm,
            check_for_empty_dirs: AtomicBool::new(false),
        }
    }

    /// Add every regular file at or under `source_path` to the object under
    /// `destination_path` (`""` = object root), returning the staged
    /// location of each newly added logical path.
    ///
    /// With `MoveSource`, sources are digested in place and moved into
    /// staging; the source tree is deleted afterwards. Otherwise sources
    /// are stream-copied through a digesting writer.
    pub fn process_path(
        &self,
        source_path: &Path,
        destination_path: &str,
        options: &[OcflOption],
    ) -> Result<BTreeMap<String, PathBuf>> {
        let mut results = BTreeMap::new();
        let is_move = options.contains(&OcflOption::MoveSource);
        let destination = self.destination(destination_path, source_path);

        let files = util::list_files_recursive(source_path)?;
        for file in files {
            let logical_path = self.logical_path(source_path, &file, &destination);
            let _guard = self.file_locker.lock(&logical_path)?;

            if is_move {
                self.move_file_into_staging(&file, &logical_path, options, &mut results)?;
            } else {
                self.copy_file_into_staging(&file, &logical_path, options, &mut results)?;
            }
        }

        if is_move {
            // Whatever remains of the source tree is dedup losers and
            // empty directories.
            util::safe_delete_dir(source_path);
        }

        Ok(results)
    }

    /// Add a single file whose digest the caller asserts. Skips hashing
    /// entirely; an inaccurate digest corrupts the object.
    pub fn process_file_with_digest(
        &self,
        digest: &str,
        source_path: &Path,
        destination_path: &str,
        options: &[OcflOption],
    ) -> Result<BTreeMap<String, PathBuf>> {
        if !source_path.is_file() {
            return Err(OcflError::InvalidInput(format!(
                "{} must be a regular file",
                source_path.display()
            )));
        }

        let destination = self.destination(destination_path, source_path);
        let logical_path = self.logical_path(source_path, source_path, &destination);

        let mut results = BTreeMap::new();
        self.file_locker.with_lock(&logical_path, || {
            let result = self
                .updater
                .lock()
                .add_file(digest, &logical_path, options)?;
            self.delete_displaced(&result.displaced);

            if result.is_new {
                let staged = self
                    .content_dir
                    .join(result.path_under_content_dir.as_deref().unwrap());
                if options.contains(&OcflOption::MoveSource) {
                    debug!(source = %source_path.display(), staged = %staged.display(), "moving file into staging");
                    util::move_file_make_parents(source_path, &staged)?;
                } else {
                    debug!(source = %source_path.display(), staged = %staged.display(), "copying file into staging");
                    util::copy_file_make_parents(source_path, &staged)?;
                }
                results.insert(logical_path.clone(), staged);
            }
            Ok(())
        })?;

        Ok(results)
    }

    /// True when a staged file was deleted and the staging content
    /// directory may contain empty directories
    pub fn check_for_empty_dirs(&self) -> bool {
        self.check_for_empty_dirs.load(Ordering::Acquire)
    }

    pub(crate) fn flag_empty_dir_check(&self) {
        self.check_for_empty_dirs.store(true, Ordering::Release);
    }

    pub(crate) fn delete_displaced(&self, displaced: &[RemovedStagedFile]) {
        for removed in displaced {
            let staged = self.content_dir.join(&removed.path_under_content_dir);
            if staged.exists() {
                let _ = fs::remove_file(&staged);
                self.flag_empty_dir_check();
            }
        }
    }

    fn move_file_into_staging(
        &self,
        file: &Path,
        logical_path: &str,
        options: &[OcflOption],
        results: &mut BTreeMap<String, PathBuf>,
    ) -> Result<()> {
        let digest = self.algorithm.hash_file(file)?;
        let result = self.updater.lock().add_file(&digest, logical_path, options)?;
        self.delete_displaced(&result.displaced);

        if result.is_new {
            let staged = self
                .content_dir
                .join(result.path_under_content_dir.as_deref().unwrap());
            debug!(source = %file.display(), staged = %staged.display(), "moving file into staging");
            util::move_file_make_parents(file, &staged)?;
            results.insert(logical_path.to_string(), staged);
        }
        Ok(())
    }

    fn copy_file_into_staging(
        &self,
        file: &Path,
        logical_path: &str,
        options: &[OcflOption],
        results: &mut BTreeMap<String, PathBuf>,
    ) -> Result<()> {
        // Stream into the deterministic staging location for this logical
        // path, hashing in the same pass.
        let inner_path = self.updater.lock().inner_content_path(logical_path)?;
        let staged = self.content_dir.join(&inner_path);
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent).map_err(|e| OcflError::io_at(parent, e))?;
        }

        debug!(source = %file.display(), staged = %staged.display(), "copying file into staging");
        let digest = self.stream_copy(file, &staged)?;

        let result = self.updater.lock().add_file(&digest, logical_path, options)?;
        // An overwrite of a path staged earlier in this version displaces
        // the same staging location the new bytes now occupy; that file
        // must survive.
        let displaced: Vec<_> = result
            .displaced
            .iter()
            .filter(|removed| removed.path_under_content_dir != inner_path)
            .cloned()
            .collect();
        self.delete_displaced(&displaced);

        if result.is_new {
            results.insert(logical_path.to_string(), staged);
        } else {
            debug!(staged = %staged.display(), %digest, "deleting staged duplicate");
            fs::remove_file(&staged).map_err(|e| OcflError::io_at(&staged, e))?;
            self.flag_empty_dir_check();
        }
        Ok(())
    }

    fn stream_copy(&self, src: &Path, dst: &Path) -> Result<String> {
        let mut reader = util::open_reader(src)?;
        let out = File::create(dst).map_err(|e| OcflError::io_at(dst, e))?;
        let mut writer = DigestWriter::new(BufWriter::new(out), self.algorithm);

        io::copy(&mut reader, &mut writer).map_err(|e| {
            OcflError::io(
                format!("Failed to copy {} to {}", src.display(), dst.display()),
                e,
            )
        })?;
        writer.flush().map_err(|e| OcflError::io_at(dst, e))?;

        let (_, digest) = writer.finalize();
        Ok(digest)
    }

    fn destination(&self, destination_path: &str, source_path: &Path) -> String {
        if destination_path.is_empty() && source_path.is_file() {
            return source_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        destination_path.to_string()
    }

    fn logical_path(&self, source_path: &Path, source_file: &Path, destination: &str) -> String {
        let relative = source_file
            .strip_prefix(source_path)
            .unwrap_or(Path::new(""));
        let relative = relative.to_string_lossy().replace('\\', "/");

        match (destination.is_empty(), relative.is_empty()) {
            (true, _) => relative,
            (_, true) => destination.to_string(),
            _ => format!("{}/{}", destination, relative),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Inventory;
    use crate::path::{DefaultContentPathConstraints, DirectLogicalPathMapper};
    use crate::config::OcflConfig;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn updater() -> Mutex<InventoryUpdater> {
        let stub = Inventory::stub("obj-1", &OcflConfig::default(), "obj-1").unwrap();
        Mutex::new(InventoryUpdater::blank_state(
            &stub,
            Arc::new(DirectLogicalPathMapper),
            Arc::new(DefaultContentPathConstraints),
        ))
    }

    fn source_tree(temp: &TempDir) -> PathBuf {
        let source = temp.path().join("source");
        fs::create_dir_all(source.join("b")).unwrap();
        fs::write(source.join("a.txt"), b"hello").unwrap();
        fs::write(source.join("b/c.txt"), b"world").unwrap();
        source
    }

    #[test]
    fn test_copy_mode_stages_all_files() {
        let temp = TempDir::new().unwrap();
        let source = source_tree(&temp);
        let content_dir = temp.path().join("staging/content");
        fs::create_dir_all(&content_dir).unwrap();

        let updater = updater();
        let locker = FileLocker::new(Duration::from_secs(1));
        let processor = AddFileProcessor::new(
            &updater,
            &locker,
            content_dir.clone(),
            DigestAlgorithm::Sha512,
        );

        let results = processor.process_path(&source, "", &[]).unwrap();

        assert_eq!(results.len(), 2);
        assert!(content_dir.join("a.txt").exists());
        assert!(content_dir.join("b/c.txt").exists());
        assert_eq!(fs::read(content_dir.join("a.txt")).unwrap(), b"hello");
        // Sources are untouched in copy mode
        assert!(source.join("a.txt").exists());
        assert!(!processor.check_for_empty_dirs());
    }

    #[test]
    fn test_move_mode_consumes_source() {
        let temp = TempDir::new().unwrap();
        let source = source_tree(&temp);
        let content_dir = temp.path().join("staging/content");
        fs::create_dir_all(&content_dir).unwrap();

        let updater = updater();
        let locker = FileLocker::new(Duration::from_secs(1));
        let processor = AddFileProcessor::new(
            &updater,
            &locker,
            content_dir.clone(),
            DigestAlgorithm::Sha512,
        );

        processor
            .process_path(&source, "", &[OcflOption::MoveSource])
            .unwrap();

        assert!(content_dir.join("a.txt").exists());
        assert!(!source.exists());
    }

    #[test]
    fn test_duplicate_content_is_staged_once() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("one.txt"), b"same").unwrap();
        fs::write(source.join("two.txt"), b"same").unwrap();

        let content_dir = temp.path().join("staging/content");
        fs::create_dir_all(&content_dir).unwrap();

        let updater = updater();
        let locker = FileLocker::new(Duration::from_secs(1));
        let processor = AddFileProcessor::new(
            &updater,
            &locker,
            content_dir.clone(),
            DigestAlgorithm::Sha512,
        );

        let results = processor.process_path(&source, "", &[]).unwrap();

        // Only one file was newly staged; the duplicate was deleted again
        assert_eq!(results.len(), 1);
        let staged: Vec<_> = util::list_files_recursive(&content_dir).unwrap();
        assert_eq!(staged.len(), 1);
        assert!(processor.check_for_empty_dirs());

        // Both logical paths are bound in the working state
        let updater = updater.lock();
        assert!(updater.contains_logical_path("one.txt"));
        assert!(updater.contains_logical_path("two.txt"));
    }

    #[test]
    fn test_single_file_source_uses_basename() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("single.txt");
        fs::write(&file, b"data").unwrap();

        let content_dir = temp.path().join("staging/content");
        fs::create_dir_all(&content_dir).unwrap();

        let updater = updater();
        let locker = FileLocker::new(Duration::from_secs(1));
        let processor =
            AddFileProcessor::new(&updater, &locker, content_dir, DigestAlgorithm::Sha512);

        let results = processor.process_path(&file, "", &[]).unwrap();
        assert!(results.contains_key("single.txt"));
    }

    #[test]
    fn test_destination_prefix_applies() {
        let temp = TempDir::new().unwrap();
        let source = source_tree(&temp);
        let content_dir = temp.path().join("staging/content");
        fs::create_dir_all(&content_dir).unwrap();

        let updater = updater();
        let locker = FileLocker::new(Duration::from_secs(1));
        let processor =
            AddFileProcessor::new(&updater, &locker, content_dir, DigestAlgorithm::Sha512);

        let results = processor.process_path(&source, "sub/dir", &[]).unwrap();
        assert!(results.contains_key("sub/dir/a.txt"));
        assert!(results.contains_key("sub/dir/b/c.txt"));
    }

    #[test]
    fn test_trusted_digest_skips_hashing() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("trusted.txt");
        fs::write(&file, b"bytes").unwrap();

        let content_dir = temp.path().join("staging/content");
        fs::create_dir_all(&content_dir).unwrap();

        let updater = updater();
        let locker = FileLocker::new(Duration::from_secs(1));
        let processor = AddFileProcessor::new(
            &updater,
            &locker,
            content_dir.clone(),
            DigestAlgorithm::Sha512,
        );

        let results = processor
            .process_file_with_digest("cafe01", &file, "trusted.txt", &[])
            .unwrap();
        assert!(results.contains_key("trusted.txt"));
        assert!(content_dir.join("trusted.txt").exists());
        assert_eq!(
            updater.lock().digest_for_logical_path("trusted.txt"),
            Some("cafe01")
        );
    }

    #[test]
    fn test_trusted_digest_rejects_directory() {
        let temp = TempDir::new().unwrap();
        let content_dir = temp.path().join("staging/content");
        fs::create_dir_all(&content_dir).unwrap();

        let updater = updater();
        let locker = FileLocker::new(Duration::from_secs(1));
        let processor =
            AddFileProcessor::new(&updater, &locker, content_dir, DigestAlgorithm::Sha512);

        let err = processor
            .process_file_with_digest("cafe01", temp.path(), "x", &[])
            .unwrap_err();
        assert!(matches!(err, OcflError::InvalidInput(_)));
    }
}
