//! Concurrency Invariant Tests
//!
//! - Two concurrent updates of one object: exactly one wins, the loser
//!   fails ObjectOutOfSync, and no partial version remains
//! - Parallel adds within a single update closure are safe
//! - Mutations of different objects do not contend

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

use ocfl::model::{ObjectVersionId, User, VersionInfo, VersionNum};
use ocfl::repo::OcflRepository;
use ocfl::storage::FsStorage;
use ocfl::OcflError;

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

#[test]
fn test_concurrent_updates_exactly_one_wins() {
    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);
    let id = ObjectVersionId::head("obj-2");

    repo.put_object(
        &id,
        &write_source(&temp, "seed", &[("seed.txt", "seed")]),
        &version_info("seed"),
        &[],
    )
    .unwrap();

    // Both updates must observe head=v1 before either installs. The
    // closures rendezvous on a barrier: closures run after the inventory
    // is loaded and before the version is installed.
    let barrier = std::sync::Barrier::new(2);

    let results: Vec<ocfl::Result<ObjectVersionId>> = thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|i| {
                let repo = &repo;
                let id = &id;
                let barrier = &barrier;
                s.spawn(move || {
                    repo.update_object(id, &version_info("racer"), |updater| {
                        barrier.wait();
                        let bytes = format!("racer {}", i);
                        let mut reader = bytes.as_bytes();
                        updater.write_file(&mut reader, &format!("racer-{}.txt", i), &[])?;
                        Ok(())
                    })
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let losers = results
        .iter()
        .filter(|r| matches!(r, Err(OcflError::ObjectOutOfSync(_))))
        .count();
    assert_eq!(winners + losers, 2);
    assert_eq!(winners, 1, "exactly one update must win: {:?}", results);
    assert_eq!(losers, 1, "the other update must fail out-of-sync");

    let details = repo.describe_object("obj-2").unwrap();
    assert_eq!(details.head, VersionNum::new(2));

    // Exactly one racer file exists in the head, and no v3 was created
    let racers: Vec<_> = details
        .head_version()
        .files
        .keys()
        .filter(|path| path.starts_with("racer-"))
        .collect();
    assert_eq!(racers.len(), 1);
    assert!(!temp.path().join("root/obj-2/v3").exists());

    // No partial staging remains
    let leftover: Vec<_> = fs::read_dir(temp.path().join("work"))
        .unwrap()
        .collect();
    assert!(leftover.is_empty(), "work dir must be empty: {:?}", leftover);
}

#[test]
fn test_parallel_adds_within_one_update() {
    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);
    let id = ObjectVersionId::head("obj-1");

    repo.update_object(&id, &version_info("parallel"), |updater| {
        thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    s.spawn(move || {
                        let bytes = format!("content {}", i);
                        let mut reader = bytes.as_bytes();
                        updater.write_file(&mut reader, &format!("file-{}.txt", i), &[])?;
                        Ok::<(), OcflError>(())
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap()?;
            }
            Ok(())
        })
    })
    .unwrap();

    let details = repo.describe_object("obj-1").unwrap();
    assert_eq!(details.head_version().files.len(), 8);
}

#[test]
fn test_different_objects_do_not_contend() {
    let temp = TempDir::new().unwrap();
    let repo = new_repo(&temp);

    let results: Vec<ocfl::Result<ObjectVersionId>> = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let repo = &repo;
                let temp = &temp;
                s.spawn(move || {
                    let source =
                        write_source(temp, &format!("src-{}", i), &[("a.txt", "content")]);
                    repo.put_object(
                        &ObjectVersionId::head(format!("obj-{}", i)),
                        &source,
                        &version_info("parallel put"),
                        &[],
                    )
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for result in &results {
        assert!(result.is_ok(), "{:?}", result);
    }

    let mut ids: Vec<_> = repo.list_object_ids().unwrap().collect();
    ids.sort();
    assert_eq!(ids.len(), 4);
}
