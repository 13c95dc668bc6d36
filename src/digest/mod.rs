//! Content digest support
//!
//! OCFL content addressing uses a single algorithm per object (sha512 or
//! sha256) with lowercase hex encoding. This module provides:
//!
//! - [`DigestAlgorithm`] — the algorithm tag plus one-shot hashing helpers
//! - [`DigestWriter`] — a `Write` adapter that hashes bytes as they stream
//!   through, used for staging copies and inventory serialization
//! - [`FixityReader`] — a `Read` adapter that verifies an expected digest
//!   once the underlying stream is fully consumed

mod algorithm;
mod writer;

pub use algorithm::DigestAlgorithm;
pub use writer::{DigestWriter, FixityReader};
