//! Self-checking registry scenarios.
//!
//! Each scenario owns a fresh range, drives the client through a fixed
//! sequence of operations, asserts the observable outcome after each step,
//! and tears its ranges down again.

use crate::blob::{BlobClient, PurgeTaskId, PurgeVersion};
use crate::core::error::ErrorKind;
use crate::keys::{printable, KeyRange};
use crate::store::Version;
use anyhow::{ensure, Context, Result};
use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;

/// The scenario catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Scenario {
    /// Coverage checks on sub-ranges and supersets of one Active range.
    VerifyRange,
    /// Adjacent Active ranges around one unregistered gap.
    VerifyGap,
    /// Unclipped listing and rejected misaligned purges.
    Misaligned,
    /// Repeated and overlapping activation, force purge, deactivation.
    Idempotent,
    /// Activate again after a force purge and deactivation.
    Reactivate,
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [
        Scenario::VerifyRange,
        Scenario::VerifyGap,
        Scenario::Misaligned,
        Scenario::Idempotent,
        Scenario::Reactivate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::VerifyRange => "verify-range",
            Self::VerifyGap => "verify-gap",
            Self::Misaligned => "misaligned",
            Self::Idempotent => "idempotent",
            Self::Reactivate => "reactivate",
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn with_suffix(key: &[u8], suffix: &str) -> Vec<u8> {
    let mut out = key.to_vec();
    out.extend_from_slice(suffix.as_bytes());
    out
}

fn span(begin: &[u8], end: &[u8]) -> Result<KeyRange> {
    KeyRange::new(begin.to_vec(), end.to_vec())
        .with_context(|| format!("bad range [{} - {})", printable(begin), printable(end)))
}

/// Assertions and helpers shared by the client loop and the scenarios.
pub(crate) struct Checker<'a> {
    pub client: &'a BlobClient,
    pub tenant: Option<&'a str>,
}

impl Checker<'_> {
    pub async fn is_active(&self, range: &KeyRange) -> Result<bool> {
        Ok(self.client.is_active(range, self.tenant, None).await?.is_some())
    }

    /// Assert that `range` is entirely inside one Active range with a
    /// contiguous tiling, or entirely unregistered.
    pub async fn check_range(&self, range: &KeyRange, active: bool) -> Result<()> {
        ensure!(
            self.is_active(range).await? == active,
            "{} expected {}",
            range,
            if active { "active" } else { "inactive" }
        );

        let listed = self.client.list_active(range, 0, self.tenant).await?;
        if active {
            ensure!(listed.len() == 1, "{} listed {} ranges", range, listed.len());
            ensure!(listed[0].contains_range(range), "{} not inside {}", range, listed[0]);
        } else {
            ensure!(listed.is_empty(), "{} still listed as {:?}", range, listed);
        }

        let granules = self.client.granule_ranges(range, 0, self.tenant).await?;
        self.check_granules(range, &granules, active)
    }

    fn check_granules(&self, range: &KeyRange, granules: &[KeyRange], active: bool) -> Result<()> {
        if !active {
            ensure!(granules.is_empty(), "{} still has {} granules", range, granules.len());
            return Ok(());
        }
        let (Some(first), Some(last)) = (granules.first(), granules.last()) else {
            anyhow::bail!("{} has no granules", range);
        };
        ensure!(first.begin() <= range.begin(), "granules of {} start late", range);
        ensure!(last.end() >= range.end(), "granules of {} end early", range);
        for pair in granules.windows(2) {
            ensure!(
                pair[0].end() == pair[1].begin(),
                "granules {} and {} are not contiguous",
                pair[0],
                pair[1]
            );
        }
        Ok(())
    }

    /// Assert that querying `query` reports exactly `expected`, unclipped,
    /// from both the registry and the granule view.
    pub async fn check_unclipped(&self, expected: &KeyRange, query: &KeyRange) -> Result<()> {
        let listed = self.client.list_active(query, 0, self.tenant).await?;
        ensure!(listed == [expected.clone()], "query {} listed {:?}", query, listed);
        let granules = self.client.granule_ranges(query, 0, self.tenant).await?;
        ensure!(granules == [expected.clone()], "query {} returned granules {:?}", query, granules);
        Ok(())
    }

    pub async fn activate(&self, range: &KeyRange) -> Result<bool> {
        Ok(self.client.activate(range, self.tenant).await?)
    }

    pub async fn deactivate(&self, range: &KeyRange) -> Result<bool> {
        Ok(self.client.deactivate(range, self.tenant).await?)
    }

    /// Force purge `range` at a random version and wait for it.
    pub async fn force_purge(&self, rng: &mut StdRng, range: &KeyRange) -> Result<PurgeTaskId> {
        let version = if rng.random_bool(0.5) {
            PurgeVersion::All
        } else {
            PurgeVersion::Before(Version::new(1))
        };
        let id = self.client.request_purge(range, version, true, self.tenant).await?;
        self.client.await_completion(id).await?;
        Ok(id)
    }

    /// Force purge and deactivate.
    pub async fn tear_down(&self, rng: &mut StdRng, range: &KeyRange) -> Result<()> {
        self.force_purge(rng, range).await?;
        ensure!(self.deactivate(range).await?, "tear down of {} rejected", range);
        tracing::debug!(range = %range, "scenario range torn down");
        Ok(())
    }

    async fn expect_unsupported_purge(&self, range: &KeyRange, force: bool) -> Result<()> {
        let result = self
            .client
            .request_purge(range, PurgeVersion::Before(Version::new(1)), force, self.tenant)
            .await;
        match result {
            Err(e) => {
                ensure!(
                    e.kind() == ErrorKind::UnsupportedOperation,
                    "misaligned purge of {} failed with {}",
                    range,
                    e
                );
                Ok(())
            }
            Ok(id) => anyhow::bail!("misaligned purge of {} accepted as {}", range, id),
        }
    }

    /// Run `scenario` on the fresh range `range`.
    pub async fn run(&self, scenario: Scenario, rng: &mut StdRng, range: &KeyRange) -> Result<()> {
        tracing::debug!(scenario = %scenario, range = %range, "running scenario");
        match scenario {
            Scenario::VerifyRange => self.verify_range(rng, range).await,
            Scenario::VerifyGap => self.verify_gap(rng, range).await,
            Scenario::Misaligned => self.misaligned(rng, range).await,
            Scenario::Idempotent => self.idempotent(rng, range).await,
            Scenario::Reactivate => self.reactivate(rng, range).await,
        }
        .with_context(|| format!("scenario {} on {}", scenario, range))
    }

    async fn verify_range(&self, rng: &mut StdRng, range: &KeyRange) -> Result<()> {
        let (b, e) = (range.begin(), range.end());
        let active = span(&with_suffix(b, "A"), &with_suffix(b, "B"))?;
        let middle = with_suffix(b, "AF");

        ensure!(self.activate(&active).await?, "activate {} rejected", active);
        self.check_range(&active, true).await?;

        ensure!(self.is_active(&span(active.begin(), &middle)?).await?);
        ensure!(self.is_active(&span(&middle, active.end())?).await?);

        let uncovered = [
            range.clone(),
            span(b, active.begin())?,
            span(active.end(), e)?,
            span(b, &middle)?,
            span(&middle, e)?,
            span(b, active.end())?,
            span(active.begin(), e)?,
        ];
        for query in &uncovered {
            ensure!(!self.is_active(query).await?, "{} reported active", query);
        }

        self.tear_down(rng, &active).await
    }

    async fn verify_gap(&self, rng: &mut StdRng, range: &KeyRange) -> Result<()> {
        let count: usize = rng.random_range(3..=16);
        let mut bounds = vec![range.begin().to_vec()];
        for i in 0..count - 1 {
            bounds.push(with_suffix(range.begin(), &format!("{:04x}", i)));
        }
        bounds.push(range.end().to_vec());

        let gap = rng.random_range(0..count);
        let mut registered = Vec::with_capacity(count - 1);
        for i in 0..count {
            let sub = span(&bounds[i], &bounds[i + 1])?;
            if i == gap {
                self.check_range(&sub, false).await?;
            } else {
                ensure!(self.activate(&sub).await?, "activate {} rejected", sub);
                self.check_range(&sub, true).await?;
                registered.push(sub);
            }
        }

        ensure!(!self.is_active(range).await?, "{} active across a gap", range);

        for sub in &registered {
            self.tear_down(rng, sub).await?;
        }
        Ok(())
    }

    async fn misaligned(&self, rng: &mut StdRng, range: &KeyRange) -> Result<()> {
        let b = range.begin();
        ensure!(self.activate(range).await?, "activate {} rejected", range);
        let sub = span(&with_suffix(b, "A"), &with_suffix(b, "B"))?;

        self.check_range(range, true).await?;
        self.check_unclipped(range, range).await?;

        self.check_range(&sub, true).await?;
        self.check_unclipped(range, &sub).await?;
        self.check_unclipped(range, &span(b, sub.end())?).await?;
        self.check_unclipped(range, &span(sub.begin(), range.end())?).await?;

        self.expect_unsupported_purge(&sub, false).await?;
        self.expect_unsupported_purge(&sub, true).await?;

        self.check_range(range, true).await?;
        self.check_unclipped(range, range).await?;

        self.tear_down(rng, range).await
    }

    async fn idempotent(&self, rng: &mut StdRng, range: &KeyRange) -> Result<()> {
        let (b, e) = (range.begin(), range.end());
        let active = span(&with_suffix(b, "A"), &with_suffix(b, "B"))?;
        let middle = with_suffix(b, "AF");
        let middle2 = with_suffix(b, "AG");

        if rng.random_bool(0.5) {
            ensure!(self.activate(&active).await?);
        }
        ensure!(self.activate(&active).await?, "activate {} rejected", active);
        self.check_range(&active, true).await?;
        ensure!(self.activate(&active).await?, "re-activate {} rejected", active);
        self.check_range(&active, true).await?;

        let overlapping = [
            range.clone(),
            span(b, active.end())?,
            span(active.begin(), e)?,
            span(b, &middle)?,
            span(&middle, e)?,
            span(active.begin(), &middle)?,
            span(&middle, active.end())?,
            span(&middle, &middle2)?,
        ];
        for query in &overlapping {
            ensure!(!self.activate(query).await?, "overlapping activate {} accepted", query);
        }

        self.check_unclipped(&active, range).await?;

        let version = if rng.random_bool(0.5) {
            PurgeVersion::All
        } else {
            PurgeVersion::Before(Version::new(1))
        };
        let target = if rng.random_bool(0.5) { &active } else { range };
        let id = self.client.request_purge(target, version, true, self.tenant).await?;
        self.client.await_completion(id).await?;
        if rng.random_bool(0.5) {
            let again = self.client.request_purge(target, version, true, self.tenant).await?;
            self.client.await_completion(again).await?;
        }

        // Force-purged ranges stay listed until deactivated.
        let listed = self.client.list_active(range, 0, self.tenant).await?;
        ensure!(listed == [active.clone()], "after purge {} listed {:?}", range, listed);

        for query in &overlapping {
            ensure!(!self.deactivate(query).await?, "overlapping deactivate {} accepted", query);
        }
        ensure!(self.deactivate(&active).await?, "deactivate {} rejected", active);
        ensure!(self.deactivate(&active).await?, "repeat deactivate {} rejected", active);
        Ok(())
    }

    async fn reactivate(&self, rng: &mut StdRng, range: &KeyRange) -> Result<()> {
        ensure!(self.activate(range).await?, "activate {} rejected", range);
        self.check_range(range, true).await?;

        self.force_purge(rng, range).await?;
        ensure!(!self.is_active(range).await?, "{} active after force purge", range);
        let granules = self.client.granule_ranges(range, 0, self.tenant).await?;
        ensure!(granules.is_empty(), "{} kept granules after force purge", range);

        ensure!(self.deactivate(range).await?, "deactivate {} rejected", range);
        self.check_range(range, false).await?;

        ensure!(self.activate(range).await?, "re-activate {} rejected", range);
        self.check_range(range, true).await?;

        self.tear_down(rng, range).await
    }
}
