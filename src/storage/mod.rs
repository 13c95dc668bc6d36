//! Storage backends
//!
//! [`OcflStorage`] is the backend contract the repository coordinator
//! drives: bytes in and out, listing, and atomic version install. The
//! coordinator owns all sequencing and locking; backends only need to make
//! the install step all-or-nothing and recheck the head while the caller's
//! write lock is held.
//!
//! [`FsStorage`] implements the contract over a local filesystem root.

mod fs;
mod layout;

pub use fs::FsStorage;
pub use layout::{decode_object_id, encode_object_id, REPOSITORY_NAMASTE_FILE};

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::digest::{DigestAlgorithm, FixityReader};
use crate::errors::Result;
use crate::model::{Inventory, VersionNum};
use crate::util;
use crate::validate::ValidationResults;

/// Lazily opens one content file, verifying fixity as it is read
pub struct StreamOpener {
    path: PathBuf,
    content_path: String,
    algorithm: DigestAlgorithm,
    digest: String,
}

impl StreamOpener {
    pub(crate) fn new(
        path: PathBuf,
        content_path: String,
        algorithm: DigestAlgorithm,
        digest: String,
    ) -> Self {
        Self {
            path,
            content_path,
            algorithm,
            digest,
        }
    }

    /// The object-root-relative path the bytes live at
    pub fn content_path(&self) -> &str {
        &self.content_path
    }

    /// The content digest the stream will be verified against
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Open the stream. The reader fails with `InvalidData` at EOF if the
    /// bytes do not match the recorded digest.
    pub fn open(&self) -> Result<FixityReader<BufReader<File>>> {
        let reader = util::open_reader(&self.path)?;
        Ok(FixityReader::new(
            reader,
            self.algorithm,
            &self.digest,
            &self.content_path,
        ))
    }
}

/// Backend contract for OCFL storage.
///
/// Implementations must be thread-safe; the coordinator calls mutating
/// operations only while holding the per-object write lock, but reads may
/// run concurrently with anything.
pub trait OcflStorage: Send + Sync {
    /// Load an object's inventory, or `None` when the object does not
    /// exist. When the object has an uncommitted mutable HEAD, the mutable
    /// HEAD inventory is returned and flagged as such.
    fn load_inventory(&self, object_id: &str) -> Result<Option<Inventory>>;

    fn contains_object(&self, object_id: &str) -> Result<bool>;

    /// Storage-relative path of the object's root
    fn object_root_path(&self, object_id: &str) -> String;

    /// Install a fully staged version.
    ///
    /// `inventory` is the new inventory whose head is the version being
    /// installed; `staging_dir` holds the version contents (inventory pair
    /// plus content directory). Implementations must recheck that the
    /// version is the next sequential one and fail `ObjectOutOfSync`
    /// otherwise. When `upgraded_ocfl_version` is set the object's namaste
    /// declaration is rewritten.
    fn store_new_version(
        &self,
        inventory: &Inventory,
        staging_dir: &Path,
        upgraded_ocfl_version: bool,
    ) -> Result<()>;

    /// Remove all versions above `version_num` and restore the root
    /// inventory to that version's
    fn rollback_to_version(&self, inventory: &Inventory, version_num: VersionNum) -> Result<()>;

    /// Remove an object entirely; missing objects are a no-op
    fn purge_object(&self, object_id: &str) -> Result<()>;

    /// Materialize a version's logical state into `output_dir`, verifying
    /// content fixity on the way out
    fn reconstruct_object_version(
        &self,
        inventory: &Inventory,
        version_num: VersionNum,
        output_dir: &Path,
    ) -> Result<()>;

    /// Lazy stream openers for every logical path in a version
    fn get_object_streams(
        &self,
        inventory: &Inventory,
        version_num: VersionNum,
    ) -> Result<BTreeMap<String, StreamOpener>>;

    /// Ids of every object in the repository
    fn list_object_ids(&self) -> Result<Box<dyn Iterator<Item = String> + Send>>;

    /// Copy an object's entire directory tree into `output_dir`
    fn export_object(&self, object_id: &str, output_dir: &Path) -> Result<()>;

    /// Copy a single version directory into `output_dir`
    fn export_version(
        &self,
        object_id: &str,
        version_num: VersionNum,
        output_dir: &Path,
    ) -> Result<()>;

    /// Install a staged object directory as a new object
    fn import_object(&self, object_id: &str, staging_dir: &Path) -> Result<()>;

    /// Validate an object, optionally re-digesting its content
    fn validate_object(
        &self,
        object_id: &str,
        content_fixity_check: bool,
    ) -> Result<ValidationResults>;

    /// Drop any cached state for one object, or for all objects when
    /// `object_id` is `None`
    fn invalidate_cache(&self, object_id: Option<&str>);

    /// Release backend resources; further calls are undefined
    fn close(&self);
}
