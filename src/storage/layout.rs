//! On-disk layout helpers
//!
//! Objects are addressed with a flat layout: each object occupies a
//! directory directly under the repository root, named by percent-encoding
//! its id. Object roots are marked with a namaste declaration file.

use crate::errors::{OcflError, Result};
use crate::model::OcflVersion;

/// Repository root namaste declaration file name
pub const REPOSITORY_NAMASTE_FILE: &str = "0=ocfl_1.1";

/// Repository root namaste declaration content
pub const REPOSITORY_NAMASTE_CONTENT: &str = "ocfl_1.1\n";

/// The namaste declaration file name for an object at a spec version
pub fn object_namaste_file(version: OcflVersion) -> String {
    format!("0={}", version.object_namaste())
}

fn is_plain(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' || byte == b'.'
}

/// Percent-encode an object id into a single path segment
pub fn encode_object_id(object_id: &str) -> String {
    let mut encoded = String::with_capacity(object_id.len());
    for byte in object_id.bytes() {
        if is_plain(byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02x}", byte));
        }
    }
    encoded
}

/// Invert [`encode_object_id`]
pub fn decode_object_id(encoded: &str) -> Result<String> {
    let invalid = || OcflError::InvalidInput(format!("Invalid encoded object id: {:?}", encoded));

    let mut bytes = Vec::with_capacity(encoded.len());
    let mut chars = encoded.bytes();
    while let Some(byte) = chars.next() {
        if byte == b'%' {
            let hi = chars.next().ok_or_else(invalid)?;
            let lo = chars.next().ok_or_else(invalid)?;
            let hex = [hi, lo];
            let hex = std::str::from_utf8(&hex).map_err(|_| invalid())?;
            bytes.push(u8::from_str_radix(hex, 16).map_err(|_| invalid())?);
        } else {
            bytes.push(byte);
        }
    }
    String::from_utf8(bytes).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ids_pass_through() {
        assert_eq!(encode_object_id("obj-1.v2_x"), "obj-1.v2_x");
    }

    #[test]
    fn test_special_characters_encoded() {
        assert_eq!(encode_object_id("urn:a/b"), "urn%3aa%2fb");
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        for id in ["obj-1", "urn:example:obj/1", "id with spaces", "ünïcode"] {
            assert_eq!(decode_object_id(&encode_object_id(id)).unwrap(), id);
        }
    }

    #[test]
    fn test_decode_rejects_truncated_escape() {
        assert!(decode_object_id("abc%2").is_err());
    }
}
