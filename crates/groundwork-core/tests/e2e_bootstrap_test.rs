//! E2E Test: Bootstrap of storage root, log root and store
//!
//! Drives the public API against real temporary directories and checks the
//! on-disk state the supervisor would see after each start.

use std::fs;
use std::path::{Path, PathBuf};

use groundwork_core::{
    initialize, Bootstrap, FailureKind, GroundworkConfig, Migration, ReadinessSignal,
};
use proptest::prelude::*;

/// Sorted (relative path, is_dir, size) listing of everything under `root`
fn snapshot(root: &Path) -> Vec<(PathBuf, bool, u64)> {
    fn walk(base: &Path, dir: &Path, out: &mut Vec<(PathBuf, bool, u64)>) {
        for entry in fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            let meta = entry.metadata().unwrap();
            let rel = path.strip_prefix(base).unwrap().to_path_buf();
            out.push((rel, meta.is_dir(), if meta.is_dir() { 0 } else { meta.len() }));
            if meta.is_dir() {
                walk(base, &path, out);
            }
        }
    }

    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}

fn names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn schema() -> Vec<Migration> {
    vec![Migration::new(
        1,
        "init",
        "CREATE TABLE entries (id INTEGER PRIMARY KEY, body TEXT NOT NULL);",
    )]
}

/// E2E test: fresh volume
///
/// `data/` and `logs/` absent → both exist, only the store file under `data/`.
#[test]
fn e2e_fresh_volume_scenario() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    let logs = tmp.path().join("logs");

    let signal = initialize(&data, &logs);

    let runtime = match signal {
        ReadinessSignal::Ready(runtime) => runtime,
        ReadinessSignal::Failed(e) => panic!("expected Ready, got {e}"),
    };

    // State as seen at Ready time, with the store still open
    assert!(data.is_dir());
    assert!(logs.is_dir());
    assert_eq!(names(&data), vec!["store".to_string()]);
    assert!(names(&logs).is_empty());

    runtime.shutdown().unwrap();
    assert_eq!(names(&data), vec!["store".to_string()]);
}

/// E2E test: idempotence
///
/// A second start against the same roots leaves the on-disk state unchanged.
#[test]
fn e2e_second_start_is_noop() {
    let tmp = tempfile::tempdir().unwrap();
    let config = GroundworkConfig::default()
        .with_storage_root(tmp.path().join("data"))
        .with_log_root(tmp.path().join("logs"));

    let first = Bootstrap::new(config.clone())
        .with_migrations(schema())
        .initialize()
        .into_result()
        .unwrap();
    let applied_first = first.store().applied_migrations().unwrap();
    first.shutdown().unwrap();
    let after_first = snapshot(tmp.path());

    let second = Bootstrap::new(config)
        .with_migrations(schema())
        .initialize()
        .into_result()
        .unwrap();
    let applied_second = second.store().applied_migrations().unwrap();
    second.shutdown().unwrap();
    let after_second = snapshot(tmp.path());

    assert_eq!(after_first, after_second);
    assert_eq!(applied_first, applied_second);
}

/// E2E test: storage root is a regular file
#[test]
fn e2e_storage_root_file_is_path_conflict() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    fs::write(&data, b"occupied").unwrap();
    let before = snapshot(tmp.path());

    let signal = initialize(&data, tmp.path().join("logs"));

    assert_eq!(signal.failure_kind(), Some(FailureKind::PathConflict));
    assert_eq!(snapshot(tmp.path()), before, "no filesystem mutation after a conflict");
}

/// E2E test: pre-existing valid store keeps its contents
#[test]
fn e2e_existing_store_is_preserved() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir(&data).unwrap();
    {
        let conn = rusqlite::Connection::open(data.join("store")).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO users (name) VALUES ('ada'), ('grace');",
        )
        .unwrap();
    }

    let runtime = initialize(&data, tmp.path().join("logs"))
        .into_result()
        .unwrap();

    let names: Vec<String> = {
        let conn = runtime.store().connection();
        let mut stmt = conn.prepare("SELECT name FROM users ORDER BY id").unwrap();
        let rows = stmt.query_map([], |row| row.get(0)).unwrap();
        rows.collect::<Result<_, _>>().unwrap()
    };
    assert_eq!(names, vec!["ada".to_string(), "grace".to_string()]);
    runtime.shutdown().unwrap();
}

/// E2E test: pre-existing empty store file
#[test]
fn e2e_empty_store_file_opens() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("store"), b"").unwrap();

    let signal = initialize(&data, tmp.path().join("logs"));

    assert!(signal.is_ready());
}

/// E2E test: garbage where the store should be
#[test]
fn e2e_foreign_store_file_is_corrupt() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir(&data).unwrap();
    let garbage = b"{\"this\": \"is a json document, not a database\"}\n".repeat(20);
    fs::write(data.join("store"), &garbage).unwrap();

    let signal = initialize(&data, tmp.path().join("logs"));

    assert_eq!(signal.failure_kind(), Some(FailureKind::StoreCorrupt));
    let message = signal.into_result().unwrap_err().to_string();
    assert!(message.contains("store"), "message should name the store: {message}");
    assert_eq!(fs::read(data.join("store")).unwrap(), garbage);
}

/// E2E test: a directory where the store file should be
#[test]
fn e2e_store_directory_is_path_conflict() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir_all(data.join("store")).unwrap();

    let signal = initialize(&data, tmp.path().join("logs"));

    assert_eq!(signal.failure_kind(), Some(FailureKind::PathConflict));
    let message = signal.into_result().unwrap_err().to_string();
    assert!(message.contains("store"), "message should name the store: {message}");
    assert!(data.join("store").is_dir());
}

/// E2E test: an applied migration edited afterwards
#[test]
fn e2e_edited_migration_is_detected() {
    let tmp = tempfile::tempdir().unwrap();
    let config = GroundworkConfig::default()
        .with_storage_root(tmp.path().join("data"))
        .with_log_root(tmp.path().join("logs"));

    Bootstrap::new(config.clone())
        .with_migrations(schema())
        .initialize()
        .into_result()
        .unwrap()
        .shutdown()
        .unwrap();

    let edited = Migration::new(1, "init", "CREATE TABLE entries (id INTEGER PRIMARY KEY);");
    let signal = Bootstrap::new(config).with_migrations([edited]).initialize();

    assert_eq!(signal.failure_kind(), Some(FailureKind::StoreCorrupt));
}

/// E2E test: replicas sharing one volume start at the same time
#[test]
fn e2e_concurrent_starts_share_volume() {
    let tmp = tempfile::tempdir().unwrap();
    let config = GroundworkConfig::default()
        .with_storage_root(tmp.path().join("shared").join("data"))
        .with_log_root(tmp.path().join("shared").join("logs"));

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let config = config.clone();
            std::thread::spawn(move || {
                Bootstrap::new(config)
                    .with_migrations(schema())
                    .initialize()
                    .into_result()
                    .map(|runtime| runtime.shutdown())
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap().unwrap();
    }

    let runtime = Bootstrap::new(config)
        .with_migrations(schema())
        .initialize()
        .into_result()
        .unwrap();
    assert_eq!(runtime.store().applied_migrations().unwrap().len(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// For any fresh relative paths, both roots get created and the bootstrap is ready.
    #[test]
    fn prop_fresh_paths_become_ready(
        storage in prop::collection::vec("[a-z0-9_]{1,8}", 1..4),
        logs in prop::collection::vec("[a-z0-9_]{1,8}", 1..4),
    ) {
        let tmp = tempfile::tempdir().unwrap();
        let storage_root = storage.iter().fold(tmp.path().join("s"), |p, seg| p.join(seg));
        let log_root = logs.iter().fold(tmp.path().join("l"), |p, seg| p.join(seg));

        let signal = initialize(&storage_root, &log_root);

        prop_assert!(signal.is_ready());
        prop_assert!(storage_root.is_dir());
        prop_assert!(log_root.is_dir());
        prop_assert!(storage_root.join("store").is_file());
    }
}
