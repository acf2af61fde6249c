//! Bulk dump job tests.

mod common;

use common::{client, range};
use granary::bulkdump::{BulkDump, BulkDumpScheduler, JobId, StepOutcome, TaskState, Transport};
use granary::error::ErrorKind;

#[tokio::test]
async fn mode_toggles_and_reports_previous() {
    let client = client();
    let dump = BulkDump::new(client.database().clone());

    assert!(!dump.mode().await.unwrap());
    assert!(!dump.set_mode(true).await.unwrap());
    assert!(dump.mode().await.unwrap());
    assert!(dump.set_mode(false).await.unwrap());
    assert!(!dump.mode().await.unwrap());
}

#[tokio::test]
async fn job_is_split_at_granule_boundaries() {
    let client = client();
    let r = range("a", "m");
    client.activate(&r, None).await.unwrap();
    client.split_granule(&r, &[b"f".to_vec()], None).await.unwrap();

    let dump = BulkDump::new(client.database().clone());
    let id = dump.submit_job(&range("c", "z"), "/dump", Transport::Local).await.unwrap();

    let job = dump.job_status().await.unwrap().unwrap();
    assert_eq!(job.id, id);
    assert_eq!(job.transport, Transport::Local);

    let slices: Vec<_> = dump
        .tasks(&range("c", "z"))
        .await
        .unwrap()
        .into_iter()
        .map(|(r, _)| r)
        .collect();
    assert_eq!(slices, vec![range("c", "f"), range("f", "m"), range("m", "z")]);
}

#[tokio::test]
async fn only_one_job_at_a_time() {
    let client = client();
    let dump = BulkDump::new(client.database().clone());
    dump.submit_job(&range("a", "b"), "/dump", Transport::Local).await.unwrap();

    let err = dump
        .submit_job(&range("c", "d"), "s3://bucket", Transport::BlobStore)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn scheduler_waits_for_mode() {
    let client = client();
    let db = client.database().clone();
    let dump = BulkDump::new(db.clone());
    let scheduler = BulkDumpScheduler::new(db);

    assert_eq!(scheduler.step().await.unwrap(), StepOutcome::Disabled);
    dump.set_mode(true).await.unwrap();
    assert_eq!(scheduler.step().await.unwrap(), StepOutcome::Idle);
}

#[tokio::test]
async fn scheduler_completes_every_task() {
    let client = client();
    client.activate(&range("a", "m"), None).await.unwrap();
    client
        .split_granule(&range("a", "m"), &[b"g".to_vec()], None)
        .await
        .unwrap();

    let db = client.database().clone();
    let dump = BulkDump::new(db.clone());
    let scheduler = BulkDumpScheduler::new(db);
    dump.set_mode(true).await.unwrap();
    let id = dump.submit_job(&range("a", "m"), "/dump/", Transport::Local).await.unwrap();

    assert_eq!(scheduler.run_to_completion().await.unwrap(), 2);
    assert!(dump.job_status().await.unwrap().is_none());
    assert_eq!(dump.completed_task_count(&range("a", "m")).await.unwrap(), 2);

    let tasks = dump.tasks(&range("a", "m")).await.unwrap();
    match &tasks[0].1.state {
        TaskState::Complete { manifest } => {
            assert_eq!(manifest, &format!("/dump/{}/a/manifest", id));
        }
        TaskState::Pending => panic!("task left pending"),
    }

    // The finished job no longer blocks a new submission.
    dump.submit_job(&range("x", "y"), "/dump", Transport::Local).await.unwrap();
}

#[tokio::test]
async fn cancel_keeps_completed_tasks() {
    let client = client();
    client.activate(&range("a", "m"), None).await.unwrap();
    client
        .split_granule(&range("a", "m"), &[b"g".to_vec()], None)
        .await
        .unwrap();

    let db = client.database().clone();
    let dump = BulkDump::new(db.clone());
    let scheduler = BulkDumpScheduler::new(db);
    dump.set_mode(true).await.unwrap();
    let id = dump.submit_job(&range("a", "m"), "/dump", Transport::Local).await.unwrap();

    assert!(matches!(
        scheduler.step().await.unwrap(),
        StepOutcome::Progressed { .. }
    ));
    dump.cancel_job(id).await.unwrap();

    assert!(dump.job_status().await.unwrap().is_none());
    assert_eq!(dump.tasks(&range("a", "m")).await.unwrap().len(), 1);
    assert_eq!(dump.completed_task_count(&range("a", "m")).await.unwrap(), 1);

    let err = dump.cancel_job(id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = dump.cancel_job(JobId(12345)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn submission_rejects_system_range_and_empty_root() {
    let client = client();
    let dump = BulkDump::new(client.database().clone());

    let system = granary::KeyRange::new(b"a".to_vec(), b"\xff\x05".to_vec()).unwrap();
    assert!(dump.submit_job(&system, "/dump", Transport::Local).await.is_err());
    assert!(dump.submit_job(&range("a", "b"), "", Transport::Local).await.is_err());
}
