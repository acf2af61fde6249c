//! Tenant directory and scoping tests.

mod common;

use common::{client, create_tenant, range};
use granary::blob::PurgeVersion;
use granary::error::{ErrorKind, GranaryError};
use granary::tenant::StoreTenantDirectory;

#[tokio::test]
async fn unknown_tenant_fails_every_operation() {
    let client = client();
    let r = range("a", "b");
    let bogus = Some("BogusTenant");

    let err = client.activate(&r, bogus).await.unwrap_err();
    assert_eq!(err, GranaryError::tenant_not_found("BogusTenant"));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert!(client.deactivate(&r, bogus).await.is_err());
    assert!(client.is_active(&r, bogus, None).await.is_err());
    assert!(client.list_active(&r, 0, bogus).await.is_err());
    assert!(client.granule_ranges(&r, 0, bogus).await.is_err());
    assert!(client
        .request_purge(&r, PurgeVersion::All, true, bogus)
        .await
        .is_err());
}

#[tokio::test]
async fn tenant_ranges_are_relative() {
    let client = client();
    create_tenant(&client, "acme").await;
    let r = range("a", "m");

    assert!(client.activate(&r, Some("acme")).await.unwrap());
    assert!(client.is_active(&r, Some("acme"), None).await.unwrap().is_some());
    assert_eq!(
        client.list_active(&range("", "z"), 0, Some("acme")).await.unwrap(),
        vec![r.clone()]
    );
    assert_eq!(
        client.granule_ranges(&r, 0, Some("acme")).await.unwrap(),
        vec![r.clone()]
    );

    // Globally the same keys are unregistered.
    assert_eq!(client.is_active(&r, None, None).await.unwrap(), None);
    assert!(client.list_active(&range("a", "z"), 0, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn tenants_are_isolated() {
    let client = client();
    create_tenant(&client, "one").await;
    create_tenant(&client, "two").await;
    let r = range("a", "m");

    assert!(client.activate(&r, Some("one")).await.unwrap());
    assert!(client.activate(&r, Some("two")).await.unwrap());
    assert!(client.deactivate(&r, Some("one")).await.unwrap());

    assert_eq!(client.is_active(&r, Some("one"), None).await.unwrap(), None);
    assert!(client.is_active(&r, Some("two"), None).await.unwrap().is_some());
}

#[tokio::test]
async fn tenant_purge_stays_inside_prefix() {
    let client = client();
    create_tenant(&client, "acme").await;
    let r = range("a", "m");
    client.activate(&r, Some("acme")).await.unwrap();
    client.activate(&r, None).await.unwrap();

    let id = client
        .request_purge(&r, PurgeVersion::All, true, Some("acme"))
        .await
        .unwrap();
    granary::PurgeWorker::new(client.database().clone(), common::fast_purge_config())
        .drain()
        .await
        .unwrap();
    client.await_completion(id).await.unwrap();

    assert_eq!(client.is_active(&r, Some("acme"), None).await.unwrap(), None);
    assert!(client.is_active(&r, None, None).await.unwrap().is_some());

    let task = client
        .purge_tasks()
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.id == id)
        .unwrap();
    assert_eq!(task.tenant.as_deref(), Some("acme"));
}

#[tokio::test]
async fn directory_lifecycle() {
    let client = client();
    let directory = StoreTenantDirectory::new();
    let db = client.database();

    let first = db.run(|tr| directory.create_tenant(tr, "alpha")).await.unwrap();
    let again = db.run(|tr| directory.create_tenant(tr, "alpha")).await.unwrap();
    assert_eq!(first, again);
    assert_eq!(first.prefix, first.id.to_be_bytes().to_vec());

    let second = db.run(|tr| directory.create_tenant(tr, "beta")).await.unwrap();
    assert!(second.id > first.id);

    let names: Vec<String> = db
        .run(|tr| directory.list_tenants(tr))
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);

    assert!(db.run(|tr| directory.create_tenant(tr, "")).await.is_err());

    db.run(|tr| directory.delete_tenant(tr, "beta")).await.unwrap();
    assert!(db.run(|tr| directory.get_tenant(tr, "beta")).await.unwrap().is_none());
    let err = db.run(|tr| directory.delete_tenant(tr, "beta")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn tenant_with_ranges_cannot_be_deleted() {
    let client = client();
    create_tenant(&client, "busy").await;
    client.activate(&range("a", "b"), Some("busy")).await.unwrap();

    let directory = StoreTenantDirectory::new();
    let err = client
        .database()
        .run(|tr| directory.delete_tenant(tr, "busy"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}
