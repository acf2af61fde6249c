//! Randomized registry workload.
//!
//! The driver sets up a batch of ranges, then runs two loops until the
//! configured duration elapses:
//! - a client loop registering and unregistering ranges at a fixed rate,
//!   sometimes force purging before unregistering
//! - a scenario loop cycling through [`Scenario`]s on fresh ranges
//!
//! A final pass checks every range the client loop left behind. All
//! randomness comes from one seed, so a failing run can be replayed.
//!
//! The purge worker must be running for force purges to complete.

pub mod scenarios;

pub use scenarios::Scenario;

use crate::blob::BlobClient;
use crate::core::config::WorkloadConfig;
use crate::core::error::GranaryError;
use crate::keys::{strinc, KeyRange};
use crate::tenant::StoreTenantDirectory;
use anyhow::{ensure, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scenarios::Checker;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Tenant the workload runs in when `use_tenant` is set.
pub const WORKLOAD_TENANT: &str = "granary-workload";

/// Summary of a workload run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkloadReport {
    pub seed: u64,
    pub tenant: Option<String>,
    pub registered: usize,
    pub unregistered: usize,
    pub force_purges: usize,
    pub scenarios: Vec<(Scenario, usize)>,
    pub active_ranges: usize,
    pub inactive_ranges: usize,
}

/// Generates range begin keys.
struct KeyGen {
    prefix: &'static str,
    next: u64,
    sequential: bool,
    gap: u64,
}

impl KeyGen {
    fn new(prefix: &'static str, config: &WorkloadConfig) -> Self {
        Self {
            prefix,
            next: 0,
            sequential: config.sequential,
            gap: u64::from(config.sequential_gap.max(1)),
        }
    }

    fn next_range(&mut self, rng: &mut StdRng) -> Result<KeyRange> {
        let key = if self.sequential {
            self.next += self.gap;
            format!("{}{:08x}", self.prefix, self.next)
        } else {
            format!("{}{:016x}", self.prefix, rng.random::<u64>())
        };
        let end = strinc(key.as_bytes()).context("range key has no successor")?;
        Ok(KeyRange::new(key.into_bytes(), end)?)
    }
}

/// Ranges the client loop has touched.
#[derive(Debug, Default)]
struct Tracked {
    active: Vec<KeyRange>,
    inactive: Vec<KeyRange>,
}

/// The workload driver.
pub struct Workload {
    client: BlobClient,
    config: WorkloadConfig,
    seed: u64,
}

impl Workload {
    pub fn new(client: BlobClient, config: WorkloadConfig) -> Self {
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        Self { client, config, seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn tenant(&self) -> Option<&str> {
        self.config.use_tenant.then_some(WORKLOAD_TENANT)
    }

    fn checker(&self) -> Checker<'_> {
        Checker {
            client: &self.client,
            tenant: self.tenant(),
        }
    }

    /// Create the tenant, verify unknown tenants are rejected, and register
    /// the initial ranges.
    async fn setup(&self, rng: &mut StdRng, keys: &mut KeyGen, tracked: &mut Tracked) -> Result<()> {
        tracing::info!(
            seed = self.seed,
            target_ranges = self.config.target_ranges,
            tenant = ?self.tenant(),
            "workload setup"
        );

        if let Some(tenant) = self.tenant() {
            let directory = StoreTenantDirectory::new();
            self.client
                .database()
                .run(|tr| directory.create_tenant(tr, tenant))
                .await
                .context("failed to create workload tenant")?;

            let unknown = keys.next_range(rng)?;
            match self.client.activate(&unknown, Some("BogusTenant")).await {
                Err(GranaryError::TenantNotFound { .. }) => {}
                Ok(_) => anyhow::bail!("activation under an unknown tenant succeeded"),
                Err(e) => return Err(e).context("unknown tenant failed with the wrong error"),
            }
        }

        let checker = self.checker();
        for _ in 0..self.config.target_ranges {
            let range = keys.next_range(rng)?;
            ensure!(checker.activate(&range).await?, "initial activate {} rejected", range);
            tracked.active.push(range);
        }
        Ok(())
    }

    async fn client_loop(
        &self,
        rng: &mut StdRng,
        keys: &mut KeyGen,
        tracked: &mut Tracked,
        report: &mut WorkloadReport,
        deadline: Instant,
    ) -> Result<()> {
        let checker = self.checker();
        let mut tick = tokio::time::interval(self.op_interval());
        while Instant::now() < deadline {
            tick.tick().await;

            if tracked.active.is_empty() || rng.random_bool(0.5) {
                let range = keys.next_range(rng)?;
                ensure!(checker.activate(&range).await?, "activate {} rejected", range);
                tracked.active.push(range);
                report.registered += 1;
                continue;
            }

            // Drop from the active set first so it is never checked mid-flight.
            let index = rng.random_range(0..tracked.active.len());
            let range = tracked.active.swap_remove(index);
            if rng.random_bool(0.5) {
                checker.force_purge(rng, &range).await?;
                report.force_purges += 1;
            }
            ensure!(checker.deactivate(&range).await?, "deactivate {} rejected", range);
            tracked.inactive.push(range);
            report.unregistered += 1;
        }
        Ok(())
    }

    async fn scenario_loop(
        &self,
        rng: &mut StdRng,
        keys: &mut KeyGen,
        counts: &mut [usize; 5],
        deadline: Instant,
    ) -> Result<()> {
        let checker = self.checker();
        while Instant::now() < deadline {
            let index = rng.random_range(0..Scenario::ALL.len());
            let range = keys.next_range(rng)?;
            checker.run(Scenario::ALL[index], rng, &range).await?;
            counts[index] += 1;
            tokio::time::sleep(self.op_interval()).await;
        }
        Ok(())
    }

    async fn check(&self, tracked: &Tracked) -> Result<()> {
        tracing::info!(
            active = tracked.active.len(),
            inactive = tracked.inactive.len(),
            "workload check"
        );
        let checker = self.checker();
        for range in &tracked.active {
            checker.check_range(range, true).await?;
        }
        for range in &tracked.inactive {
            checker.check_range(range, false).await?;
        }
        Ok(())
    }

    fn op_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.config.ops_per_second.max(1)))
    }

    /// Run a single scenario on a fresh range.
    pub async fn run_scenario(&self, scenario: Scenario) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut keys = KeyGen::new("S_", &self.config);
        let range = keys.next_range(&mut rng)?;
        self.checker().run(scenario, &mut rng, &range).await
    }

    /// Run setup, both loops, and the final check.
    pub async fn run(&self) -> Result<WorkloadReport> {
        let mut client_rng = StdRng::seed_from_u64(self.seed);
        let mut scenario_rng = StdRng::seed_from_u64(self.seed.wrapping_add(1));
        let mut client_keys = KeyGen::new("R_", &self.config);
        let mut scenario_keys = KeyGen::new("U_", &self.config);
        let mut tracked = Tracked::default();
        let mut report = WorkloadReport {
            seed: self.seed,
            tenant: self.tenant().map(str::to_string),
            ..WorkloadReport::default()
        };
        let mut counts = [0usize; 5];

        self.setup(&mut client_rng, &mut client_keys, &mut tracked).await?;

        let deadline = Instant::now() + Duration::from_secs(self.config.test_duration_secs);
        let (client, scenarios) = tokio::join!(
            self.client_loop(&mut client_rng, &mut client_keys, &mut tracked, &mut report, deadline),
            self.scenario_loop(&mut scenario_rng, &mut scenario_keys, &mut counts, deadline),
        );
        client?;
        scenarios?;

        self.check(&tracked).await?;

        report.scenarios = Scenario::ALL.iter().copied().zip(counts).collect();
        report.active_ranges = tracked.active.len();
        report.inactive_ranges = tracked.inactive.len();
        tracing::info!(
            seed = report.seed,
            registered = report.registered,
            unregistered = report.unregistered,
            force_purges = report.force_purges,
            "workload complete"
        );
        Ok(report)
    }
}
