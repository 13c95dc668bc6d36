//! Staged version consistency check
//!
//! Runs after all content is staged and the inventory is written, before
//! the version is handed to storage: every staged file must be in the
//! manifest and referenced by the new HEAD state, and every manifest entry
//! belonging to the new version must have a staged file.

use std::collections::HashSet;
use std::path::Path;

use crate::errors::{OcflError, Result};
use crate::model::Inventory;
use crate::util;

pub(crate) fn verify_staged_version(
    inventory: &Inventory,
    staging_root: &Path,
    content_dir: &Path,
) -> Result<()> {
    let head_version = inventory.head_version().ok_or_else(|| {
        OcflError::InvalidState(format!(
            "Object {} has no versions to verify",
            inventory.id()
        ))
    })?;

    let content_rel = content_dir
        .strip_prefix(staging_root)
        .unwrap_or(content_dir)
        .to_string_lossy()
        .replace('\\', "/");

    // Mutations are refused while a mutable HEAD is active, so staged
    // versions always live under the new head's content prefix.
    let path_prefix = format!("{}/", inventory.head());
    let match_prefix = format!("{}{}", path_prefix, content_rel);

    // Digests whose content lives under this version's content prefix
    let mut expected: HashSet<&String> = inventory
        .manifest()
        .iter()
        .filter(|(_, paths)| paths.iter().any(|path| path.starts_with(&match_prefix)))
        .map(|(digest, _)| digest)
        .collect();

    let staged_files = if content_dir.is_dir() {
        util::list_files_recursive(content_dir)?
    } else {
        Vec::new()
    };

    for file in staged_files {
        let relative = file
            .strip_prefix(staging_root)
            .unwrap_or(&file)
            .to_string_lossy()
            .replace('\\', "/");
        let content_path = format!("{}{}", path_prefix, relative);

        match inventory.digest_for_content_path(&content_path) {
            None => {
                return Err(OcflError::InvalidState(format!(
                    "Staged version contains a file not in the manifest: {}",
                    content_path
                )));
            }
            Some(digest) => {
                if head_version.paths_for_digest(digest).is_none() {
                    return Err(OcflError::InvalidState(format!(
                        "Staged version contains a file not in its state: {}",
                        content_path
                    )));
                }
                expected.remove(&digest.to_string());
            }
        }
    }

    if !expected.is_empty() {
        let mut missing: Vec<String> = expected
            .iter()
            .filter_map(|digest| inventory.content_path_for_digest(digest).cloned())
            .collect();
        missing.sort();
        return Err(OcflError::InvalidState(format!(
            "Staged version is missing the following files: {}",
            missing.join(", ")
        )));
    }

    Ok(())
}
