//! The authoritative per-object inventory document
//!
//! Serialization preserves the canonical key order `id, type,
//! digestAlgorithm, head, contentDirectory, fixity, manifest, versions`
//! (struct declaration order), and `BTreeMap`/`BTreeSet` keep map and set
//! contents stably ordered. Digests are lowercase hex.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{FixityBlock, OcflVersion, PathBiMap, Version, VersionNum};
use crate::config::{OcflConfig, DEFAULT_CONTENT_DIRECTORY};
use crate::digest::DigestAlgorithm;
use crate::errors::{not_blank, OcflError, Result};

/// The authoritative per-object document binding logical paths to content
/// digests across an append-only sequence of versions.
///
/// An inventory is an immutable value once built. Deriving the next version
/// goes through [`InventoryBuilder`] (see [`Inventory::to_builder`]), which
/// revalidates structural basics and rebuilds the content-path index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    id: String,
    #[serde(rename = "type")]
    spec_version: OcflVersion,
    #[serde(rename = "digestAlgorithm")]
    digest_algorithm: DigestAlgorithm,
    head: VersionNum,
    #[serde(rename = "contentDirectory", skip_serializing_if = "Option::is_none")]
    content_directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fixity: Option<FixityBlock>,
    manifest: PathBiMap,
    versions: BTreeMap<VersionNum, Version>,

    // Runtime-only fields, not part of the serialized document.
    #[serde(skip)]
    inventory_digest: Option<String>,
    #[serde(skip)]
    previous_digest: Option<String>,
    #[serde(skip)]
    object_root_path: String,
    #[serde(skip)]
    mutable_head: bool,
    #[serde(skip)]
    revision_num: Option<u32>,
    #[serde(skip)]
    content_path_index: HashMap<String, String>,
}

impl Inventory {
    /// A v0 stub for an object that does not exist yet. The first committed
    /// version turns it into a real v1 inventory.
    pub fn stub(object_id: &str, config: &OcflConfig, object_root_path: &str) -> Result<Inventory> {
        not_blank(object_id, "objectId")?;
        config.validate()?;
        Ok(Inventory {
            id: object_id.to_string(),
            spec_version: config.default_ocfl_version,
            digest_algorithm: config.default_digest_algorithm,
            head: VersionNum::ZERO,
            content_directory: Some(config.default_content_directory.clone()),
            fixity: None,
            manifest: BTreeMap::new(),
            versions: BTreeMap::new(),
            inventory_digest: None,
            previous_digest: None,
            object_root_path: object_root_path.to_string(),
            mutable_head: false,
            revision_num: None,
            content_path_index: HashMap::new(),
        })
    }

    pub fn builder(object_id: &str) -> InventoryBuilder {
        InventoryBuilder::new(object_id)
    }

    /// A builder pre-populated with this inventory's fields
    pub fn to_builder(&self) -> InventoryBuilder {
        InventoryBuilder::from(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn spec_version(&self) -> OcflVersion {
        self.spec_version
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    pub fn head(&self) -> VersionNum {
        self.head
    }

    /// True once at least one version has been committed
    pub fn has_versions(&self) -> bool {
        !self.head.is_zero()
    }

    pub fn next_version_num(&self) -> VersionNum {
        self.head.next()
    }

    /// The content directory name, falling back to `content` when the
    /// inventory does not record one.
    pub fn resolve_content_directory(&self) -> &str {
        self.content_directory
            .as_deref()
            .unwrap_or(DEFAULT_CONTENT_DIRECTORY)
    }

    pub fn manifest(&self) -> &PathBiMap {
        &self.manifest
    }

    pub fn fixity(&self) -> Option<&FixityBlock> {
        self.fixity.as_ref()
    }

    pub fn versions(&self) -> &BTreeMap<VersionNum, Version> {
        &self.versions
    }

    pub fn version(&self, num: VersionNum) -> Option<&Version> {
        self.versions.get(&num)
    }

    pub fn head_version(&self) -> Option<&Version> {
        self.versions.get(&self.head)
    }

    /// All content paths recorded for a digest, ordered
    pub fn content_paths(&self, digest: &str) -> Option<&BTreeSet<String>> {
        self.manifest.get(digest)
    }

    /// The first content path recorded for a digest
    pub fn content_path_for_digest(&self, digest: &str) -> Option<&String> {
        self.manifest.get(digest).and_then(|paths| paths.iter().next())
    }

    pub fn manifest_contains_digest(&self, digest: &str) -> bool {
        self.manifest.contains_key(digest)
    }

    /// Reverse manifest lookup: the digest a content path is stored under
    pub fn digest_for_content_path(&self, content_path: &str) -> Option<&str> {
        self.content_path_index
            .get(content_path)
            .map(String::as_str)
    }

    /// Digest of this inventory's serialized bytes, set after serialization
    pub fn inventory_digest(&self) -> Option<&str> {
        self.inventory_digest.as_deref()
    }

    /// The previous version's inventory digest
    pub fn previous_digest(&self) -> Option<&str> {
        self.previous_digest.as_deref()
    }

    /// Where the object lives in the storage backend
    pub fn object_root_path(&self) -> &str {
        &self.object_root_path
    }

    /// True when the object has an uncommitted mutable HEAD
    pub fn has_mutable_head(&self) -> bool {
        self.mutable_head
    }

    pub fn revision_num(&self) -> Option<u32> {
        self.revision_num
    }

    pub(crate) fn set_object_root_path(&mut self, path: &str) {
        self.object_root_path = path.to_string();
    }

    pub(crate) fn set_inventory_digest(&mut self, digest: String) {
        self.inventory_digest = Some(digest);
    }

    pub(crate) fn set_mutable_head(&mut self, revision_num: u32) {
        self.mutable_head = true;
        self.revision_num = Some(revision_num);
    }

    /// Rebuild the content-path → digest index. Must be called after
    /// deserialization; `InventoryBuilder::build` does it automatically.
    pub(crate) fn refresh_index(&mut self) {
        self.content_path_index.clear();
        for (digest, paths) in &self.manifest {
            for path in paths {
                self.content_path_index.insert(path.clone(), digest.clone());
            }
        }
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.head)
    }
}

/// Mutable draft for assembling the next inventory value
#[derive(Debug, Clone)]
pub struct InventoryBuilder {
    id: String,
    spec_version: OcflVersion,
    digest_algorithm: DigestAlgorithm,
    head: VersionNum,
    content_directory: Option<String>,
    fixity: Option<FixityBlock>,
    manifest: PathBiMap,
    versions: BTreeMap<VersionNum, Version>,
    inventory_digest: Option<String>,
    previous_digest: Option<String>,
    object_root_path: String,
    mutable_head: bool,
    revision_num: Option<u32>,
}

impl InventoryBuilder {
    pub fn new(object_id: &str) -> Self {
        Self {
            id: object_id.to_string(),
            spec_version: OcflVersion::V1_1,
            digest_algorithm: DigestAlgorithm::Sha512,
            head: VersionNum::ZERO,
            content_directory: Some(DEFAULT_CONTENT_DIRECTORY.to_string()),
            fixity: None,
            manifest: BTreeMap::new(),
            versions: BTreeMap::new(),
            inventory_digest: None,
            previous_digest: None,
            object_root_path: String::new(),
            mutable_head: false,
            revision_num: None,
        }
    }

    fn from(inventory: &Inventory) -> Self {
        Self {
            id: inventory.id.clone(),
            spec_version: inventory.spec_version,
            digest_algorithm: inventory.digest_algorithm,
            head: inventory.head,
            content_directory: inventory.content_directory.clone(),
            fixity: inventory.fixity.clone(),
            manifest: inventory.manifest.clone(),
            versions: inventory.versions.clone(),
            inventory_digest: inventory.inventory_digest.clone(),
            previous_digest: inventory.previous_digest.clone(),
            object_root_path: inventory.object_root_path.clone(),
            mutable_head: inventory.mutable_head,
            revision_num: inventory.revision_num,
        }
    }

    pub fn spec_version(mut self, spec_version: OcflVersion) -> Self {
        self.spec_version = spec_version;
        self
    }

    pub fn digest_algorithm(mut self, digest_algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = digest_algorithm;
        self
    }

    pub fn content_directory(mut self, content_directory: impl Into<String>) -> Self {
        self.content_directory = Some(content_directory.into());
        self
    }

    pub fn fixity(mut self, fixity: Option<FixityBlock>) -> Self {
        self.fixity = fixity;
        self
    }

    pub fn manifest(mut self, manifest: PathBiMap) -> Self {
        self.manifest = manifest;
        self
    }

    /// Append a version; `head` advances to it
    pub fn add_version(mut self, num: VersionNum, version: Version) -> Self {
        self.versions.insert(num, version);
        self.head = num;
        self
    }

    pub fn inventory_digest(mut self, digest: Option<String>) -> Self {
        self.inventory_digest = digest;
        self
    }

    pub fn previous_digest(mut self, digest: Option<String>) -> Self {
        self.previous_digest = digest;
        self
    }

    pub fn object_root_path(mut self, path: impl Into<String>) -> Self {
        self.object_root_path = path.into();
        self
    }

    /// Structural basics are enforced here; the deeper manifest/state
    /// consistency rules are the inventory validator's job.
    pub fn build(self) -> Result<Inventory> {
        not_blank(&self.id, "objectId")?;

        if self.versions.is_empty() {
            if !self.head.is_zero() {
                return Err(OcflError::InvalidState(format!(
                    "Inventory {} declares head {} but has no versions",
                    self.id, self.head
                )));
            }
        } else {
            let mut expected = VersionNum::V1;
            for num in self.versions.keys() {
                if *num != expected {
                    return Err(OcflError::InvalidState(format!(
                        "Inventory {} versions are not contiguous: expected {} but found {}",
                        self.id, expected, num
                    )));
                }
                expected = expected.next();
            }
            if self.head != *self.versions.keys().last().unwrap() {
                return Err(OcflError::InvalidState(format!(
                    "Inventory {} head {} does not match its highest version",
                    self.id, self.head
                )));
            }
        }

        let mut inventory = Inventory {
            id: self.id,
            spec_version: self.spec_version,
            digest_algorithm: self.digest_algorithm,
            head: self.head,
            content_directory: self.content_directory,
            fixity: self.fixity,
            manifest: self.manifest,
            versions: self.versions,
            inventory_digest: self.inventory_digest,
            previous_digest: self.previous_digest,
            object_root_path: self.object_root_path,
            mutable_head: self.mutable_head,
            revision_num: self.revision_num,
            content_path_index: HashMap::new(),
        };
        inventory.refresh_index();
        Ok(inventory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;

    fn version(state: &[(&str, &str)]) -> Version {
        let mut map: PathBiMap = BTreeMap::new();
        for (digest, path) in state {
            map.entry(digest.to_string())
                .or_default()
                .insert(path.to_string());
        }
        Version::new(
            "2026-01-05T10:00:00Z".parse().unwrap(),
            Some("msg".to_string()),
            Some(User::new("alice")),
            map,
        )
    }

    fn sample_inventory() -> Inventory {
        let mut manifest: PathBiMap = BTreeMap::new();
        manifest
            .entry("aaa".to_string())
            .or_default()
            .insert("v1/content/a.txt".to_string());
        manifest
            .entry("bbb".to_string())
            .or_default()
            .insert("v1/content/b.txt".to_string());

        Inventory::builder("obj-1")
            .manifest(manifest)
            .add_version(VersionNum::V1, version(&[("aaa", "a.txt"), ("bbb", "b.txt")]))
            .object_root_path("obj-1")
            .build()
            .unwrap()
    }

    #[test]
    fn test_stub_has_no_versions() {
        let stub = Inventory::stub("obj-1", &OcflConfig::default(), "root/obj-1").unwrap();
        assert!(!stub.has_versions());
        assert_eq!(stub.next_version_num(), VersionNum::V1);
        assert!(stub.head_version().is_none());
    }

    #[test]
    fn test_content_path_index() {
        let inventory = sample_inventory();
        assert_eq!(inventory.digest_for_content_path("v1/content/a.txt"), Some("aaa"));
        assert_eq!(inventory.digest_for_content_path("v1/content/missing"), None);
        assert_eq!(
            inventory.content_path_for_digest("bbb"),
            Some(&"v1/content/b.txt".to_string())
        );
    }

    #[test]
    fn test_builder_rejects_gapped_versions() {
        let result = Inventory::builder("obj-1")
            .add_version(VersionNum::new(2), version(&[]))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_serialized_key_order_is_canonical() {
        let inventory = sample_inventory();
        let json = serde_json::to_string(&inventory).unwrap();
        let id_pos = json.find("\"id\"").unwrap();
        let type_pos = json.find("\"type\"").unwrap();
        let alg_pos = json.find("\"digestAlgorithm\"").unwrap();
        let head_pos = json.find("\"head\"").unwrap();
        let manifest_pos = json.find("\"manifest\"").unwrap();
        let versions_pos = json.find("\"versions\"").unwrap();
        assert!(id_pos < type_pos);
        assert!(type_pos < alg_pos);
        assert!(alg_pos < head_pos);
        assert!(head_pos < manifest_pos);
        assert!(manifest_pos < versions_pos);
    }

    #[test]
    fn test_deserialized_inventory_needs_index_refresh() {
        let inventory = sample_inventory();
        let json = serde_json::to_string(&inventory).unwrap();
        let mut parsed: Inventory = serde_json::from_str(&json).unwrap();
        parsed.refresh_index();
        assert_eq!(parsed.digest_for_content_path("v1/content/a.txt"), Some("aaa"));
        assert_eq!(parsed.head(), VersionNum::V1);
    }
}
