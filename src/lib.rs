//! ocfl - a storage engine for the Oxford Common File Layout
//!
//! OCFL objects are versioned, content-addressed directory trees described
//! by a self-describing inventory. This crate implements the repository
//! API over a pluggable storage backend: creating, updating, reading,
//! describing, validating, exporting, importing, rolling back, and
//! replicating objects.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ocfl::model::{ObjectVersionId, User, VersionInfo};
//! use ocfl::repo::OcflRepository;
//! use ocfl::storage::FsStorage;
//!
//! # fn main() -> ocfl::Result<()> {
//! let repo = OcflRepository::builder()
//!     .storage(Arc::new(FsStorage::new("/var/ocfl/root")?))
//!     .work_dir("/var/ocfl/work")
//!     .build()?;
//!
//! repo.put_object(
//!     &ObjectVersionId::head("obj-1"),
//!     "/tmp/source".as_ref(),
//!     &VersionInfo::new().message("initial import").user(User::new("alice")),
//!     &[],
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod digest;
pub mod errors;
pub mod inventory;
pub mod lock;
pub mod model;
pub mod options;
pub mod path;
pub mod repo;
pub mod storage;
pub mod util;
pub mod validate;

pub use config::OcflConfig;
pub use errors::{OcflError, Result};
pub use options::OcflOption;
pub use repo::{OcflRepository, OcflRepositoryBuilder};
