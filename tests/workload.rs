//! Workload driver tests.

mod common;

use common::client_with_worker;
use granary::config::WorkloadConfig;
use granary::workload::{Scenario, Workload, WORKLOAD_TENANT};
use std::time::Duration;

fn short_config(use_tenant: bool) -> WorkloadConfig {
    WorkloadConfig {
        test_duration_secs: 1,
        ops_per_second: 50,
        target_ranges: 8,
        sequential: true,
        sequential_gap: 2,
        seed: Some(0x5eed),
        use_tenant,
    }
}

#[tokio::test]
async fn every_scenario_passes() {
    let (client, worker) = client_with_worker();
    let workload = Workload::new(client.clone(), short_config(false));

    for scenario in Scenario::ALL {
        tokio::time::timeout(Duration::from_secs(10), workload.run_scenario(scenario))
            .await
            .unwrap_or_else(|_| panic!("{} timed out", scenario))
            .unwrap_or_else(|e| panic!("{} failed: {:#}", scenario, e));
    }

    client.database().shutdown();
    worker.await.unwrap();
}

#[tokio::test]
async fn seed_is_reported() {
    let (client, _worker) = client_with_worker();
    let workload = Workload::new(client, short_config(false));
    assert_eq!(workload.seed(), 0x5eed);
}

#[tokio::test]
async fn short_run_checks_out() {
    let (client, worker) = client_with_worker();
    let workload = Workload::new(client.clone(), short_config(false));

    let report = tokio::time::timeout(Duration::from_secs(30), workload.run())
        .await
        .expect("workload timed out")
        .unwrap();

    assert_eq!(report.seed, 0x5eed);
    assert!(report.tenant.is_none());
    assert_eq!(report.scenarios.len(), Scenario::ALL.len());
    assert_eq!(
        report.active_ranges,
        8 + report.registered - report.unregistered
    );
    assert_eq!(report.inactive_ranges, report.unregistered);

    client.database().shutdown();
    worker.await.unwrap();
}

#[tokio::test]
async fn tenant_run_checks_out() {
    let (client, worker) = client_with_worker();
    let workload = Workload::new(client.clone(), short_config(true));

    let report = tokio::time::timeout(Duration::from_secs(30), workload.run())
        .await
        .expect("workload timed out")
        .unwrap();
    assert_eq!(report.tenant.as_deref(), Some(WORKLOAD_TENANT));

    // Nothing leaked into the global keyspace.
    let everything = granary::KeyRange::normal_keys();
    let global = client.entries(&everything, None).await.unwrap();
    assert!(global.iter().all(|e| e.tenant.as_deref() == Some(WORKLOAD_TENANT)));

    client.database().shutdown();
    worker.await.unwrap();
}
