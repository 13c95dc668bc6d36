//! Version Pipeline Invariant Tests
//!
//! End-to-end coverage of the mutation pipeline:
//! - Fresh puts create v1 with manifest/state agreement
//! - Cross-version dedup never allocates a second content path
//! - Remove + reinstate round-trips without new manifest entries
//! - Idempotent puts advance the head without re-storing content
//! - Rollback discards later versions on disk
//! - Staging directories are cleaned on every exit path

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use ocfl::digest::DigestAlgorithm;
use ocfl::model::{ObjectVersionId, User, VersionInfo, VersionNum};
use ocfl::repo::{FileChangeType, OcflRepository};
use ocfl::storage::FsStorage;
use ocfl::{OcflError, OcflOption};

// =============================================================================
// Test Utilities
// =============================================================================

fn new_repo(temp: &TempDir) -> OcflRepository {
    OcflRepository::builder()
        .storage(Arc::new(
            FsStorage::new(temp.path().join("root")).unwrap(),
        ))
        .work_dir(temp.path().join("work"))
        .build()
        .unwrap()
}

fn write_source(temp: &TempDir, name: &str, files: &[(&str, &str)]) -> PathBuf {
    let source = temp.path().join(name);
    for (path, content) in files {
        let full = source.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }
    source
}

fn version_info(message: &str) -> VersionInfo {
    VersionInfo::new().message(message).user(User::new("alice"))
}

fn work_dir_is_empty(temp: &TempDir) -> bool {
    fs::read_dir(temp.path().join("work"))
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

fn object_root(temp: &TempDir, object_id: &str) -> PathBuf {
    temp.path().join("root").join(object_id)
}

// =============================================================================
// Fresh put
// =============================================================================

#[test]
fn test_fresh_put_creates_v1() {
    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);
    let source = write_source(&temp, "src", &[("a.txt", "hello"), ("b/c.txt", "world")]);

    let result = repo
        .put_object(
            &ObjectVersionId::head("obj-1"),
            &source,
            &version_info("init"),
            &[],
        )
        .unwrap();
    assert_eq!(result.version_num(), Some(VersionNum::V1));

    let details = repo.describe_object("obj-1").unwrap();
    assert_eq!(details.head, VersionNum::V1);
    assert_eq!(details.digest_algorithm, "sha512");

    let head = details.head_version();
    assert_eq!(head.files.len(), 2);
    assert_eq!(
        head.files["a.txt"].storage_relative_path,
        "obj-1/v1/content/a.txt"
    );
    assert_eq!(
        head.files["a.txt"].digests["sha512"],
        DigestAlgorithm::Sha512.hash_bytes(b"hello")
    );
    assert_eq!(
        head.files["b/c.txt"].digests["sha512"],
        DigestAlgorithm::Sha512.hash_bytes(b"world")
    );

    let root = object_root(&temp, "obj-1");
    assert_eq!(fs::read(root.join("v1/content/a.txt")).unwrap(), b"hello");
    assert_eq!(fs::read(root.join("v1/content/b/c.txt")).unwrap(), b"world");
    assert!(root.join("inventory.json").exists());
    assert!(root.join("inventory.json.sha512").exists());
    assert!(root.join("0=ocfl_object_1.1").exists());

    assert!(work_dir_is_empty(&temp), "staging must be cleaned up");
}

// =============================================================================
// Dedup
// =============================================================================

#[test]
fn test_update_with_dedup_allocates_no_new_content() {
    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);
    let source = write_source(&temp, "src", &[("a.txt", "hello"), ("b/c.txt", "world")]);

    repo.put_object(
        &ObjectVersionId::head("obj-1"),
        &source,
        &version_info("init"),
        &[],
    )
    .unwrap();

    let result = repo
        .update_object(
            &ObjectVersionId::head("obj-1"),
            &version_info("dedup add"),
            |updater| {
                let mut bytes = &b"hello"[..];
                updater.write_file(&mut bytes, "dup/a.txt", &[])?;
                Ok(())
            },
        )
        .unwrap();
    assert_eq!(result.version_num(), Some(VersionNum::new(2)));

    let details = repo.describe_object("obj-1").unwrap();
    let head = details.head_version();
    // The new logical path points at v1 content
    assert_eq!(
        head.files["dup/a.txt"].storage_relative_path,
        "obj-1/v1/content/a.txt"
    );

    // No content was stored for v2
    let v2 = object_root(&temp, "obj-1").join("v2");
    assert!(v2.join("inventory.json").exists());
    assert!(!v2.join("content").exists());
}

// =============================================================================
// Remove + reinstate
// =============================================================================

#[test]
fn test_remove_then_reinstate() {
    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);
    let source = write_source(&temp, "src", &[("a.txt", "hello")]);
    let id = ObjectVersionId::head("obj-1");

    repo.put_object(&id, &source, &version_info("init"), &[])
        .unwrap();

    repo.update_object(&id, &version_info("remove"), |updater| {
        updater.remove_file("a.txt")?;
        Ok(())
    })
    .unwrap();

    let v2 = repo
        .describe_version(&ObjectVersionId::version("obj-1", VersionNum::new(2)))
        .unwrap();
    assert!(v2.files.is_empty());

    repo.update_object(&id, &version_info("reinstate"), |updater| {
        updater.reinstate_file(VersionNum::V1, "a.txt", "a.txt", &[])?;
        Ok(())
    })
    .unwrap();

    let details = repo.describe_object("obj-1").unwrap();
    assert_eq!(details.head, VersionNum::new(3));
    assert_eq!(
        details.head_version().files["a.txt"].storage_relative_path,
        "obj-1/v1/content/a.txt"
    );
}

// =============================================================================
// Idempotent put
// =============================================================================

#[test]
fn test_idempotent_put_advances_head_without_new_content() {
    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);
    let source = write_source(&temp, "src", &[("a.txt", "hello"), ("b/c.txt", "world")]);
    let id = ObjectVersionId::head("obj-1");

    repo.put_object(&id, &source, &version_info("first"), &[])
        .unwrap();
    let result = repo
        .put_object(&id, &source, &version_info("second"), &[])
        .unwrap();
    assert_eq!(result.version_num(), Some(VersionNum::new(2)));

    let details = repo.describe_object("obj-1").unwrap();
    let v1 = &details.versions[&VersionNum::V1];
    let v2 = &details.versions[&VersionNum::new(2)];

    // Identical state, and every v2 file still points at v1 content
    assert_eq!(
        v1.files.keys().collect::<Vec<_>>(),
        v2.files.keys().collect::<Vec<_>>()
    );
    for file in v2.files.values() {
        assert!(
            file.storage_relative_path.starts_with("obj-1/v1/"),
            "{} should reuse v1 content",
            file.path
        );
    }
    assert!(!object_root(&temp, "obj-1").join("v2/content").exists());
}

// =============================================================================
// Replace semantics of put
// =============================================================================

#[test]
fn test_put_replaces_previous_state() {
    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);
    let id = ObjectVersionId::head("obj-1");

    let first = write_source(&temp, "src1", &[("a.txt", "one"), ("b.txt", "two")]);
    repo.put_object(&id, &first, &version_info("first"), &[])
        .unwrap();

    let second = write_source(&temp, "src2", &[("c.txt", "three")]);
    repo.put_object(&id, &second, &version_info("second"), &[])
        .unwrap();

    let head = repo.describe_object("obj-1").unwrap();
    let files: Vec<_> = head.head_version().files.keys().cloned().collect();
    assert_eq!(files, vec!["c.txt".to_string()]);
}

// =============================================================================
// Rollback
// =============================================================================

#[test]
fn test_rollback_discards_later_versions() {
    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);
    let id = ObjectVersionId::head("obj-1");

    repo.put_object(
        &id,
        &write_source(&temp, "s1", &[("a.txt", "one")]),
        &version_info("v1"),
        &[],
    )
    .unwrap();
    repo.put_object(
        &id,
        &write_source(&temp, "s2", &[("a.txt", "two")]),
        &version_info("v2"),
        &[],
    )
    .unwrap();
    repo.put_object(
        &id,
        &write_source(&temp, "s3", &[("a.txt", "three")]),
        &version_info("v3"),
        &[],
    )
    .unwrap();

    repo.rollback_to_version(&ObjectVersionId::version("obj-1", VersionNum::V1))
        .unwrap();

    let details = repo.describe_object("obj-1").unwrap();
    assert_eq!(details.head, VersionNum::V1);

    let root = object_root(&temp, "obj-1");
    assert!(root.join("v1").exists());
    assert!(!root.join("v2").exists());
    assert!(!root.join("v3").exists());

    // Rolling back to the head is a no-op
    repo.rollback_to_version(&ObjectVersionId::version("obj-1", VersionNum::V1))
        .unwrap();
    assert_eq!(repo.describe_object("obj-1").unwrap().head, VersionNum::V1);
}

// =============================================================================
// Staging cleanup
// =============================================================================

#[test]
fn test_staging_cleaned_after_failed_update() {
    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);
    let id = ObjectVersionId::head("obj-1");

    repo.put_object(
        &id,
        &write_source(&temp, "src", &[("a.txt", "hello")]),
        &version_info("init"),
        &[],
    )
    .unwrap();

    let result = repo.update_object(&id, &version_info("fails"), |updater| {
        let mut bytes = &b"partial"[..];
        updater.write_file(&mut bytes, "staged.txt", &[])?;
        Err(OcflError::InvalidInput("caller aborted".to_string()))
    });
    assert!(result.is_err());

    assert!(work_dir_is_empty(&temp), "staging must be cleaned on failure");
    assert_eq!(repo.describe_object("obj-1").unwrap().head, VersionNum::V1);
}

// =============================================================================
// Reads
// =============================================================================

#[test]
fn test_get_object_reconstructs_version() {
    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);
    let id = ObjectVersionId::head("obj-1");

    repo.put_object(
        &id,
        &write_source(&temp, "src", &[("a.txt", "one"), ("d/e.txt", "deep")]),
        &version_info("init"),
        &[],
    )
    .unwrap();

    let out = temp.path().join("out");
    repo.get_object(&id, &out).unwrap();

    assert_eq!(fs::read(out.join("a.txt")).unwrap(), b"one");
    assert_eq!(fs::read(out.join("d/e.txt")).unwrap(), b"deep");
    assert!(work_dir_is_empty(&temp));
}

#[test]
fn test_get_object_version_streams_content() {
    use std::io::Read;

    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);
    let id = ObjectVersionId::head("obj-1");

    repo.put_object(
        &id,
        &write_source(&temp, "src", &[("a.txt", "stream me")]),
        &version_info("init"),
        &[],
    )
    .unwrap();

    let version = repo.get_object_version(&id).unwrap();
    let mut content = String::new();
    version.streams["a.txt"]
        .open()
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    assert_eq!(content, "stream me");
    assert_eq!(version.details.version_num, VersionNum::V1);
}

#[test]
fn test_file_change_history() {
    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);
    let id = ObjectVersionId::head("obj-1");

    repo.put_object(
        &id,
        &write_source(&temp, "s1", &[("a.txt", "one")]),
        &version_info("create"),
        &[],
    )
    .unwrap();
    repo.update_object(&id, &version_info("change"), |updater| {
        let mut bytes = &b"changed"[..];
        updater.write_file(&mut bytes, "a.txt", &[OcflOption::Overwrite])?;
        Ok(())
    })
    .unwrap();
    repo.update_object(&id, &version_info("remove"), |updater| {
        updater.remove_file("a.txt")?;
        Ok(())
    })
    .unwrap();

    let history = repo.file_change_history("obj-1", "a.txt").unwrap();
    let kinds: Vec<_> = history.changes.iter().map(|c| c.change_type).collect();
    assert_eq!(
        kinds,
        vec![
            FileChangeType::Update,
            FileChangeType::Update,
            FileChangeType::Remove
        ]
    );

    let missing = repo.file_change_history("obj-1", "never.txt");
    assert!(matches!(missing, Err(OcflError::NotFound(_))));
}

// =============================================================================
// Replicate
// =============================================================================

#[test]
fn test_replicate_version_as_head() {
    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);
    let id = ObjectVersionId::head("obj-1");

    repo.put_object(
        &id,
        &write_source(&temp, "s1", &[("a.txt", "one")]),
        &version_info("v1"),
        &[],
    )
    .unwrap();
    repo.put_object(
        &id,
        &write_source(&temp, "s2", &[("b.txt", "two")]),
        &version_info("v2"),
        &[],
    )
    .unwrap();

    let result = repo
        .replicate_version_as_head(
            &ObjectVersionId::version("obj-1", VersionNum::V1),
            &version_info("restore v1"),
        )
        .unwrap();
    assert_eq!(result.version_num(), Some(VersionNum::new(3)));

    let details = repo.describe_object("obj-1").unwrap();
    let files: Vec<_> = details.head_version().files.keys().cloned().collect();
    assert_eq!(files, vec!["a.txt".to_string()]);
    // Replicating the head itself is also allowed
    repo.replicate_version_as_head(&id, &version_info("again"))
        .unwrap();
    assert_eq!(repo.describe_object("obj-1").unwrap().head, VersionNum::new(4));
}

// =============================================================================
// Preconditions
// =============================================================================

#[test]
fn test_put_with_stale_version_fails_out_of_sync() {
    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);

    repo.put_object(
        &ObjectVersionId::head("obj-1"),
        &write_source(&temp, "s1", &[("a.txt", "one")]),
        &version_info("v1"),
        &[],
    )
    .unwrap();
    repo.put_object(
        &ObjectVersionId::head("obj-1"),
        &write_source(&temp, "s2", &[("a.txt", "two")]),
        &version_info("v2"),
        &[],
    )
    .unwrap();

    // Pinning v1 when the head is v2 must fail
    let result = repo.put_object(
        &ObjectVersionId::version("obj-1", VersionNum::V1),
        &write_source(&temp, "s3", &[("a.txt", "three")]),
        &version_info("stale"),
        &[],
    );
    assert!(matches!(result, Err(OcflError::ObjectOutOfSync(_))));
    assert!(work_dir_is_empty(&temp));
}

#[test]
fn test_closed_repository_rejects_operations() {
    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);

    repo.close();
    repo.close(); // idempotent

    let result = repo.put_object(
        &ObjectVersionId::head("obj-1"),
        Path::new("/nonexistent"),
        &version_info("nope"),
        &[],
    );
    assert!(matches!(result, Err(OcflError::InvalidState(_))));
    assert!(matches!(
        repo.describe_object("obj-1"),
        Err(OcflError::InvalidState(_))
    ));
}

#[test]
fn test_injected_clock_stamps_versions() {
    let temp = TempDir::new().unwrap();
    let mut repo = new_repo(&temp);
    let fixed = "2026-03-01T12:00:00+02:00"
        .parse::<chrono::DateTime<chrono::FixedOffset>>()
        .unwrap();
    repo.set_clock(Arc::new(move || fixed));

    repo.put_object(
        &ObjectVersionId::head("obj-1"),
        &write_source(&temp, "src", &[("a.txt", "x")]),
        &version_info("init"),
        &[],
    )
    .unwrap();

    let details = repo.describe_object("obj-1").unwrap();
    assert_eq!(details.head_version().created, fixed);
}

#[test]
fn test_overwriting_file_staged_in_same_version() {
    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);
    let id = ObjectVersionId::head("obj-1");

    repo.update_object(&id, &version_info("write twice"), |updater| {
        let mut first = &b"first draft"[..];
        updater.write_file(&mut first, "x.txt", &[])?;
        let mut second = &b"second draft"[..];
        updater.write_file(&mut second, "x.txt", &[OcflOption::Overwrite])?;
        Ok(())
    })
    .unwrap();

    let details = repo.describe_object("obj-1").unwrap();
    assert_eq!(
        details.head_version().files["x.txt"].digests["sha512"],
        DigestAlgorithm::Sha512.hash_bytes(b"second draft")
    );
    assert_eq!(
        fs::read(object_root(&temp, "obj-1").join("v1/content/x.txt")).unwrap(),
        b"second draft"
    );
}

#[test]
fn test_move_source_consumes_input() {
    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);
    let source = write_source(&temp, "src", &[("a.txt", "move me")]);

    repo.put_object(
        &ObjectVersionId::head("obj-1"),
        &source,
        &version_info("init"),
        &[OcflOption::MoveSource],
    )
    .unwrap();

    assert!(!source.exists(), "source must be consumed");
    assert_eq!(
        fs::read(object_root(&temp, "obj-1").join("v1/content/a.txt")).unwrap(),
        b"move me"
    );
}
