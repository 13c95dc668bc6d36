//! Inventory consistency checks
//!
//! `validate_shallow` runs on every inventory the mutation pipeline builds,
//! before it is handed to storage. It enforces the structural invariants
//! that must hold for any persisted inventory without touching content
//! files. `validate_compatible_inventories` guards forward-sequential
//! version import against drift between inventories.

use std::collections::BTreeSet;

use crate::errors::{OcflError, Result};
use crate::model::{Inventory, VersionNum};
use crate::path::MUTABLE_HEAD_VERSION_PATH;

/// Validate the structural invariants of an inventory.
///
/// Checks, for every version: state digests resolve to non-empty manifest
/// entries, logical paths are unique within the version, and a user with an
/// address has a non-blank name. For the manifest: every content path is
/// rooted under a real version (or the mutable-head extension), and no
/// content path appears under two digests.
pub fn validate_shallow(inventory: &Inventory) -> Result<()> {
    if !inventory.has_versions() {
        return Err(OcflError::InvalidState(format!(
            "Inventory for object {} has no versions",
            inventory.id()
        )));
    }

    for (num, version) in inventory.versions() {
        let mut seen_paths: BTreeSet<&str> = BTreeSet::new();

        for (digest, logical_paths) in &version.state {
            match inventory.manifest().get(digest) {
                Some(content_paths) if !content_paths.is_empty() => {}
                _ => {
                    return Err(OcflError::InvalidState(format!(
                        "Object {} version {} references digest {} which has no manifest entry",
                        inventory.id(),
                        num,
                        digest
                    )));
                }
            }

            for path in logical_paths {
                if !seen_paths.insert(path) {
                    return Err(OcflError::InvalidState(format!(
                        "Object {} version {} binds logical path {} more than once",
                        inventory.id(),
                        num,
                        path
                    )));
                }
            }
        }

        if let Some(user) = &version.user {
            if user.address.is_some() && user.name.trim().is_empty() {
                return Err(OcflError::InvalidState(format!(
                    "Object {} version {} has a user address without a name",
                    inventory.id(),
                    num
                )));
            }
        }
    }

    let mut seen_content_paths: BTreeSet<&str> = BTreeSet::new();
    for (digest, content_paths) in inventory.manifest() {
        for path in content_paths {
            if !seen_content_paths.insert(path) {
                return Err(OcflError::InvalidState(format!(
                    "Object {} manifest records content path {} under more than one digest",
                    inventory.id(),
                    path
                )));
            }
            validate_content_path_root(inventory, digest, path)?;
        }
    }

    Ok(())
}

fn validate_content_path_root(inventory: &Inventory, digest: &str, path: &str) -> Result<()> {
    if path.starts_with(&format!("{}/", MUTABLE_HEAD_VERSION_PATH)) {
        return Ok(());
    }

    let version_part = path.split('/').next().unwrap_or("");
    let version: VersionNum = version_part.parse().map_err(|_| {
        OcflError::InvalidState(format!(
            "Object {} manifest entry {} for digest {} is not rooted under a version",
            inventory.id(),
            path,
            digest
        ))
    })?;

    if version > inventory.head() {
        return Err(OcflError::InvalidState(format!(
            "Object {} manifest entry {} is rooted under {} which is beyond head {}",
            inventory.id(),
            path,
            version,
            inventory.head()
        )));
    }
    Ok(())
}

/// Ensure an inventory being imported continues an existing object without
/// drift: same id, same digest algorithm, same content directory, and the
/// next sequential head, with all prior version states unchanged.
pub fn validate_compatible_inventories(import: &Inventory, existing: &Inventory) -> Result<()> {
    if import.id() != existing.id() {
        return Err(OcflError::InvalidState(format!(
            "Import inventory is for object {} but the existing object is {}",
            import.id(),
            existing.id()
        )));
    }
    if import.digest_algorithm() != existing.digest_algorithm() {
        return Err(OcflError::InvalidState(format!(
            "Object {} cannot change digest algorithm from {} to {}",
            import.id(),
            existing.digest_algorithm(),
            import.digest_algorithm()
        )));
    }
    if import.resolve_content_directory() != existing.resolve_content_directory() {
        return Err(OcflError::InvalidState(format!(
            "Object {} cannot change content directory from {} to {}",
            import.id(),
            existing.resolve_content_directory(),
            import.resolve_content_directory()
        )));
    }
    if import.head() != existing.head().next() {
        return Err(OcflError::InvalidState(format!(
            "Object {} import must be version {} but was {}",
            import.id(),
            existing.head().next(),
            import.head()
        )));
    }

    for (num, existing_version) in existing.versions() {
        match import.version(*num) {
            Some(import_version) if import_version.state == existing_version.state => {}
            Some(_) => {
                return Err(OcflError::InvalidState(format!(
                    "Object {} import changes the state of existing version {}",
                    import.id(),
                    num
                )));
            }
            None => {
                return Err(OcflError::InvalidState(format!(
                    "Object {} import is missing existing version {}",
                    import.id(),
                    num
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OcflConfig;
    use crate::inventory::updater::InventoryUpdater;
    use crate::model::{PathBiMap, User, Version, VersionInfo};
    use crate::path::{DefaultContentPathConstraints, DirectLogicalPathMapper};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn built_inventory() -> Inventory {
        let stub = Inventory::stub("obj-1", &OcflConfig::default(), "obj-1").unwrap();
        let mut updater = InventoryUpdater::blank_state(
            &stub,
            Arc::new(DirectLogicalPathMapper),
            Arc::new(DefaultContentPathConstraints),
        );
        updater.add_file("aaa", "a.txt", &[]).unwrap();
        updater.add_file("bbb", "b.txt", &[]).unwrap();
        updater
            .build_new_inventory(
                "2026-01-05T10:00:00Z".parse().unwrap(),
                &VersionInfo::new().user(User::new("alice")),
            )
            .unwrap()
    }

    #[test]
    fn test_pipeline_output_validates() {
        assert!(validate_shallow(&built_inventory()).is_ok());
    }

    #[test]
    fn test_state_digest_missing_from_manifest() {
        let mut state: PathBiMap = BTreeMap::new();
        state
            .entry("orphan".to_string())
            .or_default()
            .insert("a.txt".to_string());

        let inventory = Inventory::builder("obj-1")
            .add_version(
                VersionNum::V1,
                Version::new("2026-01-05T10:00:00Z".parse().unwrap(), None, None, state),
            )
            .build()
            .unwrap();

        let err = validate_shallow(&inventory).unwrap_err();
        assert!(err.to_string().contains("no manifest entry"));
    }

    #[test]
    fn test_manifest_path_beyond_head() {
        let mut manifest: PathBiMap = BTreeMap::new();
        manifest
            .entry("aaa".to_string())
            .or_default()
            .insert("v9/content/a.txt".to_string());

        let mut state: PathBiMap = BTreeMap::new();
        state.entry("aaa".to_string()).or_default().insert("a.txt".to_string());

        let inventory = Inventory::builder("obj-1")
            .manifest(manifest)
            .add_version(
                VersionNum::V1,
                Version::new("2026-01-05T10:00:00Z".parse().unwrap(), None, None, state),
            )
            .build()
            .unwrap();

        let err = validate_shallow(&inventory).unwrap_err();
        assert!(err.to_string().contains("beyond head"));
    }

    #[test]
    fn test_compatible_inventories_accept_next_version() {
        let existing = built_inventory();
        let mut updater = InventoryUpdater::copy_state(
            &existing,
            Arc::new(DirectLogicalPathMapper),
            Arc::new(DefaultContentPathConstraints),
        );
        updater.add_file("ccc", "c.txt", &[]).unwrap();
        let import = updater
            .build_new_inventory("2026-01-06T10:00:00Z".parse().unwrap(), &VersionInfo::new())
            .unwrap();

        assert!(validate_compatible_inventories(&import, &existing).is_ok());
    }

    #[test]
    fn test_compatible_inventories_reject_skipped_version() {
        let existing = built_inventory();
        let import = built_inventory();
        // Importing v1 over an object already at v1 is not sequential
        let err = validate_compatible_inventories(&import, &existing).unwrap_err();
        assert!(matches!(err, OcflError::InvalidState(_)));
    }
}
