//! Per-version records

use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::PathBiMap;

/// The user attributed to a version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
        }
    }

    pub fn with_address(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: Some(address.into()),
        }
    }
}

/// Caller-supplied metadata for a version about to be created.
///
/// `created` overrides the repository clock when set; this is primarily for
/// migrations that must preserve original timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub created: Option<DateTime<FixedOffset>>,
    pub message: Option<String>,
    pub user: Option<User>,
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    pub fn created(mut self, created: DateTime<FixedOffset>) -> Self {
        self.created = Some(created);
        self
    }
}

/// An immutable version record: who, when, why, and the logical state.
///
/// `state` maps content digests to the logical paths bound to them in this
/// version. Logical paths use `/` separators, no leading `/`, and no `.` or
/// `..` segments; each is unique within the version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub created: DateTime<FixedOffset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    pub state: PathBiMap,
}

impl Version {
    pub fn new(
        created: DateTime<FixedOffset>,
        message: Option<String>,
        user: Option<User>,
        state: PathBiMap,
    ) -> Self {
        Self {
            created,
            message,
            user,
            state,
        }
    }

    /// The digest a logical path is bound to, if any
    pub fn digest_for_logical_path(&self, logical_path: &str) -> Option<&str> {
        self.state.iter().find_map(|(digest, paths)| {
            if paths.contains(logical_path) {
                Some(digest.as_str())
            } else {
                None
            }
        })
    }

    /// The logical paths bound to a digest in this version
    pub fn paths_for_digest(&self, digest: &str) -> Option<&BTreeSet<String>> {
        self.state.get(digest)
    }

    pub fn contains_logical_path(&self, logical_path: &str) -> bool {
        self.digest_for_logical_path(logical_path).is_some()
    }

    /// All logical paths visible in this version
    pub fn logical_paths(&self) -> impl Iterator<Item = &String> {
        self.state.values().flatten()
    }
}
