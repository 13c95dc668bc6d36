//! Object validation
//!
//! The repository's collaborating validator: it checks that an object
//! directory on disk is a well-formed OCFL object, deeply enough for the
//! import/export flows to trust. It is not a complete conformance checker;
//! issue codes follow the OCFL validation codes so results line up with
//! external tooling.

mod results;

pub use results::{ValidationCode, ValidationIssue, ValidationResults};

use std::path::Path;

use crate::errors::Result;
use crate::inventory::{validate_shallow, InventoryMapper, INVENTORY_FILE};
use crate::model::{Inventory, VersionNum};
use crate::util;

/// Structurally validate the object rooted at `object_root`.
///
/// Always checked: the object namaste, the root inventory/sidecar pair and
/// their digest agreement, inventory structure, version directory
/// presence, and manifest/disk agreement in both directions. When
/// `content_fixity_check` is set, every content file is additionally
/// re-digested against its manifest entry.
///
/// I/O failures while reading the object surface as `Err`; conformance
/// problems are collected into the returned [`ValidationResults`].
pub fn validate_object_structure(
    object_root: &Path,
    content_fixity_check: bool,
) -> Result<ValidationResults> {
    let mut results = ValidationResults::new();

    if !has_object_namaste(object_root) {
        results.error(
            ValidationCode::E003,
            format!(
                "Object root {} is missing its namaste declaration",
                object_root.display()
            ),
        );
    }

    if !object_root.join(INVENTORY_FILE).exists() {
        results.error(
            ValidationCode::E034,
            format!("Object root {} is missing inventory.json", object_root.display()),
        );
        return Ok(results);
    }

    let inventory = match InventoryMapper::read(object_root, &object_root.to_string_lossy()) {
        Ok(inventory) => inventory,
        Err(e) => {
            results.error(
                ValidationCode::E058,
                format!("Root inventory could not be verified: {}", e),
            );
            return Ok(results);
        }
    };

    if let Err(e) = validate_shallow(&inventory) {
        results.error(ValidationCode::E000, e.to_string());
    }

    let mut version = VersionNum::V1;
    while version <= inventory.head() {
        if !object_root.join(version.to_string()).is_dir() {
            results.error(
                ValidationCode::E010,
                format!("Version directory {} is missing", version),
            );
        }
        version = version.next();
    }

    check_manifest_against_disk(object_root, &inventory, content_fixity_check, &mut results)?;
    check_disk_against_manifest(object_root, &inventory, &mut results)?;

    Ok(results)
}

fn has_object_namaste(object_root: &Path) -> bool {
    for tag in ["ocfl_object_1.1", "ocfl_object_1.0"] {
        let path = object_root.join(format!("0={}", tag));
        if let Ok(content) = std::fs::read_to_string(&path) {
            if content.trim_end() == tag {
                return true;
            }
        }
    }
    false
}

fn check_manifest_against_disk(
    object_root: &Path,
    inventory: &Inventory,
    content_fixity_check: bool,
    results: &mut ValidationResults,
) -> Result<()> {
    let algorithm = inventory.digest_algorithm();
    for (digest, content_paths) in inventory.manifest() {
        for content_path in content_paths {
            let on_disk = object_root.join(content_path);
            if !on_disk.is_file() {
                results.error(
                    ValidationCode::E092,
                    format!("Manifest entry {} does not exist on disk", content_path),
                );
                continue;
            }
            if content_fixity_check {
                let actual = algorithm.hash_file(&on_disk)?;
                if actual != *digest {
                    results.error(
                        ValidationCode::E092,
                        format!(
                            "Content file {} does not match its {} digest: expected {} but was {}",
                            content_path, algorithm, digest, actual
                        ),
                    );
                }
            }
        }
    }
    Ok(())
}

fn check_disk_against_manifest(
    object_root: &Path,
    inventory: &Inventory,
    results: &mut ValidationResults,
) -> Result<()> {
    let content_dir = inventory.resolve_content_directory();

    let mut version = VersionNum::V1;
    while version <= inventory.head() {
        let version_content = object_root.join(version.to_string()).join(content_dir);
        if version_content.is_dir() {
            for file in util::list_files_recursive(&version_content)? {
                let relative = file
                    .strip_prefix(object_root)
                    .unwrap_or(&file)
                    .to_string_lossy()
                    .replace('\\', "/");
                if inventory.digest_for_content_path(&relative).is_none() {
                    results.error(
                        ValidationCode::E023,
                        format!("Content file {} is not listed in the manifest", relative),
                    );
                }
            }
        }
        version = version.next();
    }
    Ok(())
}
