//! Inventory serialization
//!
//! The inventory is written as pretty-printed JSON with stable key order,
//! piped through a digesting writer so its own digest is computed in the
//! same pass. The sidecar file `inventory.json.<algorithm>` records that
//! digest in checksum-tool format; readers verify it before parsing.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::digest::{DigestAlgorithm, DigestWriter};
use crate::errors::{OcflError, Result};
use crate::model::Inventory;
use crate::util;

/// File name of the inventory document
pub const INVENTORY_FILE: &str = "inventory.json";

/// Serializes inventories and computes their self-describing digests
pub struct InventoryMapper;

impl InventoryMapper {
    /// Write `inventory.json` and its sidecar into `dir`, returning the
    /// inventory with its digest populated.
    pub fn write(inventory: &Inventory, dir: &Path) -> Result<Inventory> {
        let path = dir.join(INVENTORY_FILE);
        let file = File::create(&path).map_err(|e| OcflError::io_at(&path, e))?;
        let mut writer = DigestWriter::new(BufWriter::new(file), inventory.digest_algorithm());

        serde_json::to_writer_pretty(&mut writer, inventory).map_err(|e| {
            OcflError::io(
                format!("Failed to serialize inventory to {}", path.display()),
                e.into(),
            )
        })?;
        writer.flush().map_err(|e| OcflError::io_at(&path, e))?;

        let (buffered, digest) = writer.finalize();
        buffered
            .into_inner()
            .map_err(|e| OcflError::io_at(&path, e.into_error()))?
            .sync_all()
            .map_err(|e| OcflError::io_at(&path, e))?;

        SidecarMapper::write(dir, inventory.digest_algorithm(), &digest)?;

        let mut written = inventory.clone();
        written.set_inventory_digest(digest);
        Ok(written)
    }

    /// Parse an inventory, verifying it against its sidecar first.
    ///
    /// The returned inventory carries the sidecar digest and the supplied
    /// object root path.
    pub fn read(dir: &Path, object_root_path: &str) -> Result<Inventory> {
        let path = dir.join(INVENTORY_FILE);
        let sidecar_path = SidecarMapper::find(dir)?;
        let algorithm = SidecarMapper::algorithm_from_path(&sidecar_path)?;
        let expected = SidecarMapper::read_digest(&sidecar_path)?;

        let mut bytes = Vec::new();
        util::open_reader(&path)?
            .read_to_end(&mut bytes)
            .map_err(|e| OcflError::io_at(&path, e))?;

        let actual = algorithm.hash_bytes(&bytes);
        if actual != expected {
            return Err(OcflError::Fixity(format!(
                "Inventory at {} does not match its sidecar: expected {} but was {}",
                path.display(),
                expected,
                actual
            )));
        }

        let mut inventory: Inventory = serde_json::from_slice(&bytes).map_err(|e| {
            OcflError::InvalidState(format!(
                "Failed to parse inventory at {}: {}",
                path.display(),
                e
            ))
        })?;

        if inventory.digest_algorithm() != algorithm {
            return Err(OcflError::InvalidState(format!(
                "Inventory at {} declares {} but its sidecar uses {}",
                path.display(),
                inventory.digest_algorithm(),
                algorithm
            )));
        }

        inventory.refresh_index();
        inventory.set_inventory_digest(actual);
        inventory.set_object_root_path(object_root_path);
        Ok(inventory)
    }
}

/// Reads and writes inventory sidecar files
pub struct SidecarMapper;

impl SidecarMapper {
    /// Sidecar file name for an algorithm, e.g. `inventory.json.sha512`
    pub fn sidecar_name(algorithm: DigestAlgorithm) -> String {
        format!("{}.{}", INVENTORY_FILE, algorithm.ocfl_name())
    }

    /// Write `<digest>  inventory.json\n` next to the inventory
    pub fn write(dir: &Path, algorithm: DigestAlgorithm, digest: &str) -> Result<()> {
        let path = dir.join(Self::sidecar_name(algorithm));
        util::write_file_sync(&path, format!("{}  {}\n", digest, INVENTORY_FILE).as_bytes())
    }

    /// Locate the sidecar next to an inventory, whatever its algorithm
    pub fn find(dir: &Path) -> Result<PathBuf> {
        let prefix = format!("{}.", INVENTORY_FILE);
        let entries = fs::read_dir(dir).map_err(|e| OcflError::io_at(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| OcflError::io_at(dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) {
                return Ok(entry.path());
            }
        }
        Err(OcflError::NotFound(format!(
            "No inventory sidecar found in {}",
            dir.display()
        )))
    }

    /// Recover the digest algorithm from a sidecar file name
    pub fn algorithm_from_path(sidecar_path: &Path) -> Result<DigestAlgorithm> {
        let name = sidecar_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let suffix = name
            .strip_prefix(&format!("{}.", INVENTORY_FILE))
            .unwrap_or("");
        DigestAlgorithm::from_ocfl_name(suffix).ok_or_else(|| {
            OcflError::InvalidState(format!(
                "Sidecar {} does not name a supported digest algorithm",
                sidecar_path.display()
            ))
        })
    }

    /// Parse the digest out of a sidecar file
    pub fn read_digest(sidecar_path: &Path) -> Result<String> {
        let content = fs::read_to_string(sidecar_path)
            .map_err(|e| OcflError::io_at(sidecar_path, e))?;
        let digest = content.split_whitespace().next().unwrap_or("");
        if digest.is_empty() {
            return Err(OcflError::InvalidState(format!(
                "Sidecar {} is malformed",
                sidecar_path.display()
            )));
        }
        Ok(digest.to_lowercase())
    }
}
