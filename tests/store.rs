//! Host store tests: transactions, conflicts, history, persistence.

mod common;

use common::fast_store_config;
use granary::error::{ErrorKind, GranaryError};
use granary::store::{Database, Version, SNAPSHOT_FILE_NAME};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn db() -> Database {
    Database::new(fast_store_config())
}

#[tokio::test]
async fn transaction_reads_its_own_writes() {
    let db = db();
    let mut tr = db.create_transaction();
    tr.set(b"a".to_vec(), b"1".to_vec());
    tr.set(b"b".to_vec(), b"2".to_vec());
    tr.clear(b"b".to_vec());

    assert_eq!(tr.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(tr.get(b"b").unwrap(), None);
    assert_eq!(tr.get_range(b"", b"z", 0, false).unwrap().len(), 1);

    let version = tr.commit().unwrap();
    assert_eq!(version, Version::new(1));
    assert_eq!(db.committed_version(), version);
}

#[tokio::test]
async fn read_only_commit_keeps_version() {
    let db = db();
    let mut tr = db.create_transaction();
    assert_eq!(tr.get(b"missing").unwrap(), None);
    assert_eq!(tr.commit().unwrap(), Version::ZERO);
    assert_eq!(db.committed_version(), Version::ZERO);
}

#[tokio::test]
async fn range_reads_honor_limit_and_direction() {
    let db = db();
    db.run(|tr| {
        for key in ["a", "b", "c", "d"] {
            tr.set(key.as_bytes().to_vec(), key.as_bytes().to_vec());
        }
        Ok(())
    })
    .await
    .unwrap();

    let mut tr = db.create_transaction();
    let forward = tr.get_range(b"a", b"z", 2, false).unwrap();
    assert_eq!(forward[0].0, b"a".to_vec());
    assert_eq!(forward[1].0, b"b".to_vec());

    let reverse = tr.get_range(b"a", b"z", 1, true).unwrap();
    assert_eq!(reverse[0].0, b"d".to_vec());

    assert!(tr.get_range(b"z", b"a", 0, false).unwrap().is_empty());
}

#[tokio::test]
async fn stale_read_conflicts_at_commit() {
    let db = db();
    let mut first = db.create_transaction();
    assert_eq!(first.get(b"k").unwrap(), None);

    let mut second = db.create_transaction();
    second.set(b"k".to_vec(), b"2".to_vec());
    second.commit().unwrap();

    first.set(b"k".to_vec(), b"1".to_vec());
    let err = first.commit().unwrap_err();
    assert!(err.is_retriable());
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn disjoint_writes_do_not_conflict() {
    let db = db();
    let mut first = db.create_transaction();
    first.get(b"a").unwrap();

    let mut second = db.create_transaction();
    second.set(b"b".to_vec(), b"2".to_vec());
    second.commit().unwrap();

    first.set(b"a".to_vec(), b"1".to_vec());
    first.commit().unwrap();
}

#[tokio::test]
async fn declared_write_range_conflicts_with_readers() {
    let db = db();
    let mut reader = db.create_transaction();
    assert!(reader.get_range(b"f", b"g", 0, false).unwrap().is_empty());

    let mut writer = db.create_transaction();
    writer.add_write_conflict_range(b"a", b"m");
    writer.set(b"a".to_vec(), b"span".to_vec());
    writer.commit().unwrap();

    reader.set(b"f".to_vec(), b"1".to_vec());
    assert_eq!(reader.commit().unwrap_err().kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn snapshot_scan_records_no_conflict() {
    let db = db();
    let mut reader = db.create_transaction();
    assert!(reader.get_range_snapshot(b"a", b"z", 1, true).unwrap().is_empty());

    let mut writer = db.create_transaction();
    writer.set(b"c".to_vec(), b"2".to_vec());
    writer.commit().unwrap();

    reader.set(b"x".to_vec(), b"1".to_vec());
    reader.commit().unwrap();
}

#[tokio::test]
async fn run_retries_conflicts() {
    let db = db();
    let attempts = Arc::new(AtomicU32::new(0));

    let value = {
        let attempts = attempts.clone();
        let interloper = db.clone();
        db.run(move |tr| {
            let current = tr.get(b"counter")?;
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                // Commit behind this transaction's back once.
                let mut other = interloper.create_transaction();
                other.set(b"counter".to_vec(), b"x".to_vec());
                other.commit()?;
            }
            tr.set(b"counter".to_vec(), b"y".to_vec());
            Ok(current)
        })
        .await
        .unwrap()
    };

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(value, Some(b"x".to_vec()));
}

#[tokio::test]
async fn run_gives_up_after_retry_limit() {
    let mut config = fast_store_config();
    config.max_retries = Some(2);
    let db = Database::new(config);
    let interloper = db.clone();

    let err = db
        .run(move |tr| {
            tr.get(b"k")?;
            let mut other = interloper.create_transaction();
            other.set(b"k".to_vec(), b"x".to_vec());
            other.commit()?;
            tr.set(b"k".to_vec(), b"y".to_vec());
            Ok(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GranaryError::Conflict { .. }));
}

#[tokio::test]
async fn non_retriable_errors_surface_immediately() {
    let db = db();
    let attempts = AtomicU32::new(0);
    let err = db
        .run(|_tr| -> Result<(), GranaryError> {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(GranaryError::invalid_request("nope"))
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pinned_read_version_sees_history() {
    let db = db();
    db.run(|tr| {
        tr.set(b"k".to_vec(), b"old".to_vec());
        Ok(())
    })
    .await
    .unwrap();
    let old = db.committed_version();
    db.run(|tr| {
        tr.set(b"k".to_vec(), b"new".to_vec());
        Ok(())
    })
    .await
    .unwrap();

    let mut tr = db.create_transaction();
    tr.set_read_version(old);
    assert_eq!(tr.get(b"k").unwrap(), Some(b"old".to_vec()));

    let mut tr = db.create_transaction();
    tr.set_read_version(db.committed_version().next());
    assert!(matches!(tr.get(b"k"), Err(GranaryError::FutureVersion { .. })));
}

#[tokio::test]
async fn compaction_drops_old_versions() {
    let db = db();
    for value in ["1", "2", "3"] {
        db.run(|tr| {
            tr.set(b"k".to_vec(), value.as_bytes().to_vec());
            Ok(())
        })
        .await
        .unwrap();
    }
    let mut stale = db.create_transaction();
    stale.set_read_version(Version::new(1));
    assert_eq!(stale.get(b"k").unwrap(), Some(b"1".to_vec()));

    assert!(db.compact(Version::new(2)) > 0);

    let mut tr = db.create_transaction();
    tr.set_read_version(Version::new(1));
    assert!(matches!(tr.get(b"k"), Err(GranaryError::VersionTooOld { .. })));

    let mut tr = db.create_transaction();
    tr.set_read_version(Version::new(2));
    assert_eq!(tr.get(b"k").unwrap(), Some(b"2".to_vec()));

    // A transaction pinned below the floor can no longer commit.
    stale.set(b"other".to_vec(), b"v".to_vec());
    assert!(matches!(stale.commit(), Err(GranaryError::Conflict { .. })));
}

#[tokio::test]
async fn shutdown_cancels_transactions() {
    let db = db();
    db.shutdown();
    assert!(db.is_cancelled());

    let err = db
        .run(|tr| {
            tr.get(b"k")?;
            Ok(())
        })
        .await
        .unwrap_err();
    assert_eq!(err, GranaryError::Cancelled);
    assert!(*db.subscribe_shutdown().borrow());
}

#[tokio::test]
async fn snapshot_round_trips_through_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(SNAPSHOT_FILE_NAME);

    let db = db();
    db.run(|tr| {
        tr.set(b"a".to_vec(), b"1".to_vec());
        Ok(())
    })
    .await
    .unwrap();
    db.run(|tr| {
        tr.clear(b"a".to_vec());
        tr.set(b"b".to_vec(), b"2".to_vec());
        Ok(())
    })
    .await
    .unwrap();
    let id = db.next_id();
    db.save(&path).unwrap();

    let restored = Database::open(&path, fast_store_config()).unwrap();
    assert_eq!(restored.committed_version(), db.committed_version());
    assert!(restored.next_id() > id);

    let mut tr = restored.create_transaction();
    assert_eq!(tr.get(b"a").unwrap(), None);
    assert_eq!(tr.get(b"b").unwrap(), Some(b"2".to_vec()));
    tr.set_read_version(Version::new(1));
    assert_eq!(tr.get(b"a").unwrap(), Some(b"1".to_vec()));
}

#[tokio::test]
async fn open_missing_snapshot_starts_empty() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(&dir.path().join("absent.snap"), fast_store_config()).unwrap();
    assert_eq!(db.committed_version(), Version::ZERO);
}
