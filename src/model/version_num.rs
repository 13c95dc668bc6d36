//! Version number identifiers

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::OcflError;

/// A version number, rendered as `v1`, `v2`, ...
///
/// The value 0 is reserved for stub inventories of objects that do not have
/// any versions yet; it never appears on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionNum(u32);

impl VersionNum {
    pub const V1: VersionNum = VersionNum(1);

    /// The stub marker for objects with no committed versions
    pub(crate) const ZERO: VersionNum = VersionNum(0);

    pub fn new(number: u32) -> Self {
        VersionNum(number)
    }

    pub fn number(&self) -> u32 {
        self.0
    }

    pub fn next(&self) -> VersionNum {
        VersionNum(self.0 + 1)
    }

    pub fn previous(&self) -> Option<VersionNum> {
        if self.0 > 1 {
            Some(VersionNum(self.0 - 1))
        } else {
            None
        }
    }

    /// True for the stub marker of an object with no versions
    pub(crate) fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for VersionNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl FromStr for VersionNum {
    type Err = OcflError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || OcflError::InvalidInput(format!("Invalid version number: {:?}", s));

        let digits = s.strip_prefix('v').ok_or_else(invalid)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let number: u32 = digits.parse().map_err(|_| invalid())?;
        if number == 0 {
            return Err(invalid());
        }

        Ok(VersionNum(number))
    }
}

impl Serialize for VersionNum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionNum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            D::Error::custom(format!("invalid version number: {:?}", s))
        })
    }
}
