//! OCFL spec version tags

use std::fmt;

use serde::{Deserialize, Serialize};

/// The OCFL spec version an object conforms to.
///
/// Serialized as the inventory `type` URI. The derived ordering follows
/// release order, which is what upgrade-on-write comparisons rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OcflVersion {
    #[serde(rename = "https://ocfl.io/1.0/spec/#inventory")]
    V1_0,
    #[serde(rename = "https://ocfl.io/1.1/spec/#inventory")]
    V1_1,
}

impl OcflVersion {
    /// The inventory `type` URI
    pub fn inventory_type(&self) -> &'static str {
        match self {
            OcflVersion::V1_0 => "https://ocfl.io/1.0/spec/#inventory",
            OcflVersion::V1_1 => "https://ocfl.io/1.1/spec/#inventory",
        }
    }

    /// The object namaste tag, e.g. `ocfl_object_1.1`
    pub fn object_namaste(&self) -> &'static str {
        match self {
            OcflVersion::V1_0 => "ocfl_object_1.0",
            OcflVersion::V1_1 => "ocfl_object_1.1",
        }
    }

    /// Resolve a version from an object namaste tag
    pub fn from_object_namaste(tag: &str) -> Option<Self> {
        match tag {
            "ocfl_object_1.0" => Some(OcflVersion::V1_0),
            "ocfl_object_1.1" => Some(OcflVersion::V1_1),
            _ => None,
        }
    }
}

impl fmt::Display for OcflVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcflVersion::V1_0 => write!(f, "1.0"),
            OcflVersion::V1_1 => write!(f, "1.1"),
        }
    }
}
