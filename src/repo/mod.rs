//! Repository coordinator
//!
//! [`OcflRepository`] orchestrates every operation: it loads inventories,
//! owns workspace staging directories, runs the mutation pipeline, and
//! drives the storage backend. Mutations follow one sequence:
//!
//! 1. load the inventory (or synthesize a stub), check preconditions
//! 2. build an [`InventoryUpdater`] and stage content under a unique
//!    staging directory
//! 3. build and validate the next inventory
//! 4. write the inventory pair, optionally verify the staged tree
//! 5. install through the backend under the per-object write lock
//!
//! The staging directory is removed on every exit path. User callbacks run
//! outside the write lock; the backend's head recheck converts losing
//! races into `ObjectOutOfSync`.

mod response;
mod updater;
mod verifier;

pub use response::{
    FileChange, FileChangeHistory, FileChangeType, FileDetails, ObjectDetails, OcflObjectVersion,
    VersionDetails,
};
pub use updater::ObjectUpdater;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::OcflConfig;
use crate::errors::{not_blank, OcflError, Result};
use crate::inventory::{
    validate_compatible_inventories, validate_shallow, AddFileProcessor, InventoryMapper,
    InventoryUpdater, INVENTORY_FILE,
};
use crate::lock::{FileLocker, ObjectLock};
use crate::model::{Inventory, ObjectVersionId, VersionInfo, VersionNum};
use crate::options::OcflOption;
use crate::path::{
    ContentPathConstraintProcessor, DefaultContentPathConstraints, DirectLogicalPathMapper,
    LogicalPathMapper, MUTABLE_HEAD_VERSION_PATH,
};
use crate::storage::OcflStorage;
use crate::util::{self, StagingDir};
use crate::validate;

use response::ResponseMapper;

/// Injected time source, defaulting to the UTC wall clock
pub type Clock = Arc<dyn Fn() -> DateTime<FixedOffset> + Send + Sync>;

/// Assembles an [`OcflRepository`]
pub struct OcflRepositoryBuilder {
    config: OcflConfig,
    storage: Option<Arc<dyn OcflStorage>>,
    work_dir: Option<PathBuf>,
    verify_staging: bool,
    file_lock_timeout: Duration,
    logical_path_mapper: Arc<dyn LogicalPathMapper>,
    constraints: Arc<dyn ContentPathConstraintProcessor>,
}

impl Default for OcflRepositoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OcflRepositoryBuilder {
    pub fn new() -> Self {
        Self {
            config: OcflConfig::default(),
            storage: None,
            work_dir: None,
            verify_staging: true,
            file_lock_timeout: Duration::from_secs(60),
            logical_path_mapper: Arc::new(DirectLogicalPathMapper),
            constraints: Arc::new(DefaultContentPathConstraints),
        }
    }

    pub fn config(mut self, config: OcflConfig) -> Self {
        self.config = config;
        self
    }

    /// The storage backend the repository drives
    pub fn storage(mut self, storage: Arc<dyn OcflStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Directory used for assembling versions; each mutation allocates a
    /// unique staging directory under it
    pub fn work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(work_dir.into());
        self
    }

    /// Double-check staged versions against the inventory before install
    /// (on by default)
    pub fn verify_staging(mut self, verify_staging: bool) -> Self {
        self.verify_staging = verify_staging;
        self
    }

    /// How long to wait for a per-logical-path lock; zero means try once
    pub fn file_lock_timeout(mut self, timeout: Duration) -> Self {
        self.file_lock_timeout = timeout;
        self
    }

    pub fn logical_path_mapper(mut self, mapper: Arc<dyn LogicalPathMapper>) -> Self {
        self.logical_path_mapper = mapper;
        self
    }

    pub fn content_path_constraints(
        mut self,
        constraints: Arc<dyn ContentPathConstraintProcessor>,
    ) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn build(self) -> Result<OcflRepository> {
        let storage = self
            .storage
            .ok_or_else(|| OcflError::InvalidInput("storage must be set".to_string()))?;
        let work_dir = self
            .work_dir
            .ok_or_else(|| OcflError::InvalidInput("workDir must be set".to_string()))?;
        self.config.validate()?;

        fs::create_dir_all(&work_dir).map_err(|e| OcflError::io_at(&work_dir, e))?;

        Ok(OcflRepository {
            config: self.config,
            storage,
            work_dir,
            object_lock: ObjectLock::new(),
            verify_staging: self.verify_staging,
            file_lock_timeout: self.file_lock_timeout,
            logical_path_mapper: self.logical_path_mapper,
            constraints: self.constraints,
            clock: Arc::new(|| Utc::now().fixed_offset()),
            closed: AtomicBool::new(false),
        })
    }
}

/// The repository API: create, update, read, describe, validate, export,
/// import, roll back, and replicate OCFL objects over a pluggable backend.
pub struct OcflRepository {
    config: OcflConfig,
    storage: Arc<dyn OcflStorage>,
    work_dir: PathBuf,
    object_lock: ObjectLock,
    verify_staging: bool,
    file_lock_timeout: Duration,
    logical_path_mapper: Arc<dyn LogicalPathMapper>,
    constraints: Arc<dyn ContentPathConstraintProcessor>,
    clock: Clock,
    closed: AtomicBool,
}

impl OcflRepository {
    pub fn builder() -> OcflRepositoryBuilder {
        OcflRepositoryBuilder::new()
    }

    /// Create the next version of an object from the full contents of
    /// `source_path`, replacing any previous state.
    pub fn put_object(
        &self,
        object_version_id: &ObjectVersionId,
        source_path: &Path,
        version_info: &VersionInfo,
        options: &[OcflOption],
    ) -> Result<ObjectVersionId> {
        self.ensure_open()?;
        not_blank(object_version_id.object_id(), "objectId")?;
        if !source_path.exists() {
            return Err(OcflError::InvalidInput(format!(
                "Source path {} does not exist",
                source_path.display()
            )));
        }
        Self::validate_version_info(version_info)?;

        debug!(object_id = object_version_id.object_id(), source = %source_path.display(), "putting object");

        let inventory = self.load_inventory_or_stub(object_version_id.object_id())?;
        Self::ensure_no_mutable_head(&inventory)?;
        Self::enforce_object_version_for_update(object_version_id, &inventory)?;

        let staging = StagingDir::create(&self.work_dir, object_version_id.object_id())?;
        let content_dir = self.create_staging_content_dir(&inventory, &staging)?;

        let updater_mutex = Mutex::new(InventoryUpdater::blank_state(
            &inventory,
            self.logical_path_mapper.clone(),
            self.constraints.clone(),
        ));
        let file_locker = FileLocker::new(self.file_lock_timeout);
        let processor = AddFileProcessor::new(
            &updater_mutex,
            &file_locker,
            content_dir,
            inventory.digest_algorithm(),
        );

        processor.process_path(source_path, "", options)?;
        let check_for_empty_dirs = processor.check_for_empty_dirs();
        drop(processor);

        let mut updater = updater_mutex.into_inner();
        let upgraded = updater.upgrade_inventory(&self.config);
        let new_inventory =
            updater.build_new_inventory(self.now(version_info), version_info)?;
        validate_shallow(&new_inventory)?;

        self.write_new_version(&new_inventory, &staging, upgraded, check_for_empty_dirs)?;

        Ok(ObjectVersionId::version(
            object_version_id.object_id(),
            new_inventory.head(),
        ))
    }

    /// Create the next version of an object by applying the caller's
    /// closure to its current state.
    pub fn update_object<F>(
        &self,
        object_version_id: &ObjectVersionId,
        version_info: &VersionInfo,
        update: F,
    ) -> Result<ObjectVersionId>
    where
        F: FnOnce(&ObjectUpdater<'_>) -> Result<()>,
    {
        self.ensure_open()?;
        not_blank(object_version_id.object_id(), "objectId")?;
        Self::validate_version_info(version_info)?;

        debug!(object_id = object_version_id.object_id(), "updating object");

        let inventory = self.load_inventory_or_stub(object_version_id.object_id())?;
        Self::ensure_no_mutable_head(&inventory)?;
        Self::enforce_object_version_for_update(object_version_id, &inventory)?;

        let staging = StagingDir::create(&self.work_dir, object_version_id.object_id())?;
        let content_dir = self.create_staging_content_dir(&inventory, &staging)?;

        let updater_mutex = Mutex::new(InventoryUpdater::copy_state(
            &inventory,
            self.logical_path_mapper.clone(),
            self.constraints.clone(),
        ));
        let file_locker = FileLocker::new(self.file_lock_timeout);
        let processor = AddFileProcessor::new(
            &updater_mutex,
            &file_locker,
            content_dir.clone(),
            inventory.digest_algorithm(),
        );

        let object_updater = ObjectUpdater::new(
            &inventory,
            &updater_mutex,
            &processor,
            &file_locker,
            self.storage.as_ref(),
            &content_dir,
        );
        update(&object_updater)?;
        drop(object_updater);

        let check_for_empty_dirs = processor.check_for_empty_dirs();
        drop(processor);

        let mut updater = updater_mutex.into_inner();
        let upgraded = updater.upgrade_inventory(&self.config);
        let new_inventory =
            updater.build_new_inventory(self.now(version_info), version_info)?;
        validate_shallow(&new_inventory)?;

        self.write_new_version(&new_inventory, &staging, upgraded, check_for_empty_dirs)?;

        Ok(ObjectVersionId::version(
            object_version_id.object_id(),
            new_inventory.head(),
        ))
    }

    /// Republish a historical version's state as the new HEAD. No content
    /// is staged; every digest already exists in the manifest.
    pub fn replicate_version_as_head(
        &self,
        object_version_id: &ObjectVersionId,
        version_info: &VersionInfo,
    ) -> Result<ObjectVersionId> {
        self.ensure_open()?;
        not_blank(object_version_id.object_id(), "objectId")?;
        Self::validate_version_info(version_info)?;

        debug!(id = %object_version_id, "replicating version as head");

        let inventory = self.require_inventory(object_version_id.object_id())?;
        let version_num = Self::require_version(object_version_id, &inventory)?;
        Self::ensure_no_mutable_head(&inventory)?;

        let mut updater = InventoryUpdater::copy_state_of(
            &inventory,
            version_num,
            self.logical_path_mapper.clone(),
            self.constraints.clone(),
        )?;
        let upgraded = updater.upgrade_inventory(&self.config);
        let new_inventory =
            updater.build_new_inventory(self.now(version_info), version_info)?;
        validate_shallow(&new_inventory)?;

        let staging = StagingDir::create(&self.work_dir, object_version_id.object_id())?;
        // The content dir is unused but must exist; it is pruned before
        // install.
        self.create_staging_content_dir(&inventory, &staging)?;

        self.write_new_version(&new_inventory, &staging, upgraded, false)?;

        Ok(ObjectVersionId::version(
            object_version_id.object_id(),
            new_inventory.head(),
        ))
    }

    /// Reset an object to a historical version, discarding all later
    /// versions. Rolling back to the HEAD is a no-op.
    pub fn rollback_to_version(&self, object_version_id: &ObjectVersionId) -> Result<()> {
        self.ensure_open()?;
        not_blank(object_version_id.object_id(), "objectId")?;

        let inventory = self.require_inventory(object_version_id.object_id())?;
        let version_num = Self::require_version(object_version_id, &inventory)?;

        if version_num == inventory.head() {
            debug!(id = %object_version_id, "rollback target is already the head");
            return Ok(());
        }

        info!(object_id = inventory.id(), version = %version_num, "rolling back object");

        self.object_lock.in_write_lock(inventory.id(), || {
            self.storage.rollback_to_version(&inventory, version_num)
        })
    }

    /// Materialize a version into `output_path`, which must not exist
    pub fn get_object(
        &self,
        object_version_id: &ObjectVersionId,
        output_path: &Path,
    ) -> Result<()> {
        self.ensure_open()?;
        not_blank(object_version_id.object_id(), "objectId")?;
        Self::ensure_output_path(output_path)?;

        debug!(id = %object_version_id, output = %output_path.display(), "getting object");

        let inventory = self.require_inventory(object_version_id.object_id())?;
        let version_num = Self::require_version(object_version_id, &inventory)?;

        let staging = StagingDir::create(&self.work_dir, object_version_id.object_id())?;
        self.storage
            .reconstruct_object_version(&inventory, version_num, staging.path())?;
        util::move_dir(staging.path(), output_path)
    }

    /// A version's details plus lazy, fixity-checked content streams
    pub fn get_object_version(
        &self,
        object_version_id: &ObjectVersionId,
    ) -> Result<OcflObjectVersion> {
        self.ensure_open()?;
        not_blank(object_version_id.object_id(), "objectId")?;

        let inventory = self.require_inventory(object_version_id.object_id())?;
        let version_num = Self::require_version(object_version_id, &inventory)?;
        let version = inventory.version(version_num).expect("version exists");

        Ok(OcflObjectVersion {
            details: ResponseMapper::map_version(&inventory, version_num, version),
            streams: self.storage.get_object_streams(&inventory, version_num)?,
        })
    }

    pub fn describe_object(&self, object_id: &str) -> Result<ObjectDetails> {
        self.ensure_open()?;
        not_blank(object_id, "objectId")?;
        let inventory = self.require_inventory(object_id)?;
        Ok(ResponseMapper::map_inventory(&inventory))
    }

    pub fn describe_version(
        &self,
        object_version_id: &ObjectVersionId,
    ) -> Result<VersionDetails> {
        self.ensure_open()?;
        not_blank(object_version_id.object_id(), "objectId")?;
        let inventory = self.require_inventory(object_version_id.object_id())?;
        let version_num = Self::require_version(object_version_id, &inventory)?;
        let version = inventory.version(version_num).expect("version exists");
        Ok(ResponseMapper::map_version(&inventory, version_num, version))
    }

    /// Every change ever made to a logical path, oldest first
    pub fn file_change_history(
        &self,
        object_id: &str,
        logical_path: &str,
    ) -> Result<FileChangeHistory> {
        self.ensure_open()?;
        not_blank(object_id, "objectId")?;
        not_blank(logical_path, "logicalPath")?;
        let inventory = self.require_inventory(object_id)?;
        ResponseMapper::file_change_history(&inventory, logical_path)
    }

    pub fn contains_object(&self, object_id: &str) -> Result<bool> {
        self.ensure_open()?;
        not_blank(object_id, "objectId")?;
        self.storage.contains_object(object_id)
    }

    pub fn list_object_ids(&self) -> Result<Box<dyn Iterator<Item = String> + Send>> {
        self.ensure_open()?;
        self.storage.list_object_ids()
    }

    /// Remove an object entirely. Irreversible.
    pub fn purge_object(&self, object_id: &str) -> Result<()> {
        self.ensure_open()?;
        not_blank(object_id, "objectId")?;
        info!(object_id, "purging object");
        self.object_lock
            .in_write_lock(object_id, || self.storage.purge_object(object_id))
    }

    /// Validate an object in place, optionally re-digesting its content
    pub fn validate_object(
        &self,
        object_id: &str,
        content_fixity_check: bool,
    ) -> Result<validate::ValidationResults> {
        self.ensure_open()?;
        not_blank(object_id, "objectId")?;
        info!(object_id, "validating object");
        self.storage.validate_object(object_id, content_fixity_check)
    }

    /// Copy an object's full directory tree out of the repository,
    /// validating the export unless `NoValidation` is set.
    pub fn export_object(
        &self,
        object_id: &str,
        output_path: &Path,
        options: &[OcflOption],
    ) -> Result<()> {
        self.ensure_open()?;
        not_blank(object_id, "objectId")?;
        Self::ensure_export_path(output_path)?;
        self.require_inventory(object_id)?;

        debug!(object_id, output = %output_path.display(), "exporting object");

        self.object_lock.in_write_lock(object_id, || {
            self.storage.export_object(object_id, output_path)
        })?;

        if !options.contains(&OcflOption::NoValidation) {
            let results = validate::validate_object_structure(output_path, true)?;
            if results.has_errors() {
                return Err(OcflError::validation(
                    format!(
                        "Object {} failed validation after export to {}",
                        object_id,
                        output_path.display()
                    ),
                    results,
                ));
            }
        }
        Ok(())
    }

    /// Copy a single version directory out of the repository
    pub fn export_version(
        &self,
        object_version_id: &ObjectVersionId,
        output_path: &Path,
    ) -> Result<()> {
        self.ensure_open()?;
        not_blank(object_version_id.object_id(), "objectId")?;
        Self::ensure_export_path(output_path)?;

        // Always resolve through the inventory so HEAD exports carry the
        // numeric version and missing objects fail before any copying.
        let inventory = self.require_inventory(object_version_id.object_id())?;
        let version_num = Self::require_version(object_version_id, &inventory)?;

        debug!(id = %object_version_id, version = %version_num, output = %output_path.display(), "exporting version");

        self.storage
            .export_version(object_version_id.object_id(), version_num, output_path)
    }

    /// Import a complete OCFL object directory as a new object
    pub fn import_object(&self, object_path: &Path, options: &[OcflOption]) -> Result<()> {
        self.ensure_open()?;
        if !object_path.is_dir() {
            return Err(OcflError::InvalidInput(format!(
                "Object path {} must be a directory",
                object_path.display()
            )));
        }
        if object_path
            .join(MUTABLE_HEAD_VERSION_PATH)
            .join(INVENTORY_FILE)
            .exists()
        {
            return Err(OcflError::InvalidInput(format!(
                "The object at {} cannot be imported because it contains a mutable HEAD with uncommitted changes",
                object_path.display()
            )));
        }

        let inventory = InventoryMapper::read(object_path, "")?;
        let object_id = inventory.id().to_string();

        if self.storage.contains_object(&object_id)? {
            return Err(OcflError::AlreadyExists(format!(
                "Cannot import object at {} because an object already exists with ID {}",
                object_path.display(),
                object_id
            )));
        }

        let fixity_check = !options.contains(&OcflOption::NoValidation);
        let results = validate::validate_object_structure(object_path, fixity_check)?;
        if results.has_errors() {
            return Err(OcflError::validation(
                format!(
                    "Object {} at {} failed validation",
                    object_id,
                    object_path.display()
                ),
                results,
            ));
        }

        info!(object_id, "importing object");

        let staging = StagingDir::create(&self.work_dir, &object_id)?;
        self.import_to_staging(object_path, &staging, options)?;
        self.object_lock.in_write_lock(&object_id, || {
            self.storage.import_object(&object_id, staging.path())
        })
    }

    /// Import a single version directory as an object's next sequential
    /// version
    pub fn import_version(&self, version_path: &Path, options: &[OcflOption]) -> Result<()> {
        self.ensure_open()?;
        if !version_path.is_dir() {
            return Err(OcflError::InvalidInput(format!(
                "Version path {} must be a directory",
                version_path.display()
            )));
        }

        let imported = InventoryMapper::read(version_path, "")?;
        validate_shallow(&imported)?;

        let existing = self.storage.load_inventory(imported.id())?;
        if let Some(existing) = &existing {
            Self::ensure_no_mutable_head(existing)?;
            validate_compatible_inventories(&imported, existing)?;
        } else if imported.head() != VersionNum::V1 {
            return Err(OcflError::InvalidState(format!(
                "Cannot import version {} of object {} because the object does not exist; only v1 may be imported",
                imported.head(),
                imported.id()
            )));
        }

        let import_inventory = imported
            .to_builder()
            .object_root_path(self.storage.object_root_path(imported.id()))
            .previous_digest(
                existing
                    .as_ref()
                    .and_then(|inv| inv.inventory_digest().map(str::to_string)),
            )
            .build()?;

        Self::ensure_version_has_all_files(
            &import_inventory,
            version_path,
            !options.contains(&OcflOption::NoValidation),
        )?;

        info!(object_id = import_inventory.id(), version = %import_inventory.head(), "importing version");

        let staging = StagingDir::create(&self.work_dir, import_inventory.id())?;
        self.import_to_staging(version_path, &staging, options)?;
        self.object_lock.in_write_lock(import_inventory.id(), || {
            self.storage
                .store_new_version(&import_inventory, staging.path(), false)
        })
    }

    /// Drop backend caches for one object, or all objects when `None`
    pub fn invalidate_cache(&self, object_id: Option<&str>) {
        self.storage.invalidate_cache(object_id);
    }

    pub fn config(&self) -> &OcflConfig {
        &self.config
    }

    /// Close the repository. Idempotent; every subsequent operation fails
    /// with `InvalidState`.
    pub fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!("closing OCFL repository");
            self.storage.close();
        }
    }

    /// Replace the clock used to timestamp versions. Test hook.
    pub fn set_clock(&mut self, clock: Clock) {
        self.clock = clock;
    }

    // ---- shared internals ----

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OcflError::InvalidState(
                "The repository is closed".to_string(),
            ));
        }
        Ok(())
    }

    fn now(&self, version_info: &VersionInfo) -> DateTime<FixedOffset> {
        version_info.created.unwrap_or_else(|| (self.clock)())
    }

    fn load_inventory_or_stub(&self, object_id: &str) -> Result<Inventory> {
        match self.storage.load_inventory(object_id)? {
            Some(inventory) => Ok(inventory),
            None => Inventory::stub(
                object_id,
                &self.config,
                &self.storage.object_root_path(object_id),
            ),
        }
    }

    fn require_inventory(&self, object_id: &str) -> Result<Inventory> {
        self.storage.load_inventory(object_id)?.ok_or_else(|| {
            OcflError::NotFound(format!("Object {} was not found", object_id))
        })
    }

    fn require_version(
        object_version_id: &ObjectVersionId,
        inventory: &Inventory,
    ) -> Result<VersionNum> {
        match object_version_id.version_num() {
            None => Ok(inventory.head()),
            Some(num) => {
                if inventory.version(num).is_none() {
                    return Err(OcflError::NotFound(format!(
                        "Object {} version {} was not found",
                        object_version_id.object_id(),
                        num
                    )));
                }
                Ok(num)
            }
        }
    }

    fn ensure_no_mutable_head(inventory: &Inventory) -> Result<()> {
        if inventory.has_mutable_head() {
            return Err(OcflError::InvalidState(format!(
                "Cannot create a new version of object {} because it has an active mutable HEAD",
                inventory.id()
            )));
        }
        Ok(())
    }

    fn enforce_object_version_for_update(
        object_version_id: &ObjectVersionId,
        inventory: &Inventory,
    ) -> Result<()> {
        if let Some(num) = object_version_id.version_num() {
            if num != inventory.head() {
                return Err(OcflError::ObjectOutOfSync(format!(
                    "Cannot update object {} because the HEAD version is {}, but version {} was specified",
                    object_version_id.object_id(),
                    inventory.head(),
                    num
                )));
            }
        }
        Ok(())
    }

    fn validate_version_info(version_info: &VersionInfo) -> Result<()> {
        if let Some(user) = &version_info.user {
            if user.address.is_some() {
                not_blank(&user.name, "username")?;
            }
        }
        Ok(())
    }

    fn create_staging_content_dir(
        &self,
        inventory: &Inventory,
        staging: &StagingDir,
    ) -> Result<PathBuf> {
        let content_dir = staging.path().join(inventory.resolve_content_directory());
        fs::create_dir_all(&content_dir).map_err(|e| OcflError::io_at(&content_dir, e))?;
        Ok(content_dir)
    }

    /// The shared finisher: prune, verify, write the inventory pair, then
    /// install under the object's write lock.
    fn write_new_version(
        &self,
        inventory: &Inventory,
        staging: &StagingDir,
        upgraded_ocfl_version: bool,
        check_for_empty_dirs: bool,
    ) -> Result<()> {
        let final_inventory = InventoryMapper::write(inventory, staging.path())?;

        let content_dir = staging.path().join(inventory.resolve_content_directory());
        if check_for_empty_dirs {
            util::delete_empty_dirs(&content_dir)?;
        }
        if content_dir.is_dir() && !util::has_children(&content_dir) {
            fs::remove_dir(&content_dir).map_err(|e| OcflError::io_at(&content_dir, e))?;
        }

        if self.verify_staging {
            verifier::verify_staged_version(&final_inventory, staging.path(), &content_dir)?;
        }

        self.object_lock.in_write_lock(inventory.id(), || {
            self.storage
                .store_new_version(&final_inventory, staging.path(), upgraded_ocfl_version)
        })
    }

    fn import_to_staging(
        &self,
        source: &Path,
        staging: &StagingDir,
        options: &[OcflOption],
    ) -> Result<()> {
        if options.contains(&OcflOption::MoveSource) {
            // The freshly created staging dir must be out of the way for
            // the move to land at its path.
            fs::remove_dir(staging.path()).map_err(|e| OcflError::io_at(staging.path(), e))?;
            util::move_dir(source, staging.path())
        } else {
            util::copy_dir_recursive(source, staging.path())
        }
    }

    /// Every content file under an imported version must be declared by
    /// its manifest, and vice versa; optionally re-digest each file.
    fn ensure_version_has_all_files(
        inventory: &Inventory,
        version_path: &Path,
        fixity_check: bool,
    ) -> Result<()> {
        let content_dir = inventory.resolve_content_directory();
        let version_content = version_path.join(content_dir);
        let prefix = format!("{}/{}/", inventory.head(), content_dir);

        let mut expected: HashMap<String, String> = HashMap::new();
        for (digest, paths) in inventory.manifest() {
            for path in paths {
                if let Some(rest) = path.strip_prefix(&prefix) {
                    expected.insert(rest.to_string(), digest.clone());
                }
            }
        }

        let files = if version_content.is_dir() {
            util::list_files_recursive(&version_content)?
        } else {
            Vec::new()
        };

        for file in files {
            let relative = file
                .strip_prefix(&version_content)
                .unwrap_or(&file)
                .to_string_lossy()
                .replace('\\', "/");

            match expected.remove(&relative) {
                None => {
                    return Err(OcflError::InvalidState(format!(
                        "The version contains a content file that is not declared in its manifest: {}",
                        file.display()
                    )));
                }
                Some(digest) => {
                    if fixity_check {
                        let actual = inventory.digest_algorithm().hash_file(&file)?;
                        if actual != digest {
                            return Err(OcflError::Fixity(format!(
                                "Expected file {} to have {} digest {}, but it was {}",
                                file.display(),
                                inventory.digest_algorithm(),
                                digest,
                                actual
                            )));
                        }
                    }
                }
            }
        }

        if let Some(missing) = expected.keys().next() {
            return Err(OcflError::InvalidState(format!(
                "The version at {} was expected to contain {}/{}, but it did not",
                version_path.display(),
                content_dir,
                missing
            )));
        }

        Ok(())
    }

    fn ensure_output_path(output_path: &Path) -> Result<()> {
        if output_path.exists() {
            return Err(OcflError::InvalidInput(format!(
                "Output path {} must not exist",
                output_path.display()
            )));
        }
        match output_path.parent() {
            Some(parent) if parent.is_dir() => Ok(()),
            _ => Err(OcflError::InvalidInput(format!(
                "The parent of output path {} must be an existing directory",
                output_path.display()
            ))),
        }
    }

    fn ensure_export_path(output_path: &Path) -> Result<()> {
        if output_path.exists() && !output_path.is_dir() {
            return Err(OcflError::InvalidInput(format!(
                "Export path {} must be a directory",
                output_path.display()
            )));
        }
        fs::create_dir_all(output_path).map_err(|e| OcflError::io_at(output_path, e))
    }
}
