//! Inventory data model
//!
//! Value types for the authoritative per-object document and its
//! sub-structures:
//!
//! - [`Inventory`] — manifest, fixity, and version history for one object
//! - [`Version`] — an immutable snapshot of logical state
//! - [`VersionNum`] — `v1`, `v2`, ... identifiers, strictly monotonic
//! - [`ObjectVersionId`] — object id plus optional version (HEAD when absent)
//! - [`OcflVersion`] — the OCFL spec version an object conforms to
//!
//! Inventories are plain values. Mutation happens by building a new
//! inventory through [`InventoryBuilder`], never in place.

mod inventory;
mod object_id;
mod ocfl_version;
mod version;
mod version_num;

pub use inventory::{Inventory, InventoryBuilder};
pub use object_id::ObjectVersionId;
pub use ocfl_version::OcflVersion;
pub use version::{User, Version, VersionInfo};
pub use version_num::VersionNum;

use std::collections::{BTreeMap, BTreeSet};

/// Digest → ordered set of paths, the shape of both manifests and states
pub type PathBiMap = BTreeMap<String, BTreeSet<String>>;

/// Alternate algorithm → digest → content paths
pub type FixityBlock = BTreeMap<String, PathBiMap>;
