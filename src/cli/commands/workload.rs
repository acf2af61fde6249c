//! Workload command implementation.

use super::{print_json, CliContext};
use crate::workload::{Scenario, Workload};
use anyhow::Result;
use clap::{Args, ValueEnum};

/// Run the randomized registry workload.
#[derive(Args, Debug)]
pub struct WorkloadArgs {
    /// Override the run duration in seconds.
    #[arg(long)]
    pub duration: Option<u64>,

    /// Run inside the workload tenant.
    #[arg(long)]
    pub tenant: bool,

    /// Run a single scenario instead of the full workload.
    #[arg(long, value_enum)]
    pub scenario: Option<ScenarioArg>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ScenarioArg {
    VerifyRange,
    VerifyGap,
    Misaligned,
    Idempotent,
    Reactivate,
}

impl From<ScenarioArg> for Scenario {
    fn from(arg: ScenarioArg) -> Self {
        match arg {
            ScenarioArg::VerifyRange => Scenario::VerifyRange,
            ScenarioArg::VerifyGap => Scenario::VerifyGap,
            ScenarioArg::Misaligned => Scenario::Misaligned,
            ScenarioArg::Idempotent => Scenario::Idempotent,
            ScenarioArg::Reactivate => Scenario::Reactivate,
        }
    }
}

/// Run the workload command.
pub async fn run_workload(ctx: &CliContext, args: WorkloadArgs) -> Result<()> {
    let mut runtime = ctx.open_runtime().await?;

    let mut config = runtime.config().workload.clone();
    if let Some(duration) = args.duration {
        config.test_duration_secs = duration;
    }
    config.use_tenant |= args.tenant;
    let workload = Workload::new(runtime.blob_client(), config);

    let result = match args.scenario {
        Some(scenario) => {
            let scenario = Scenario::from(scenario);
            workload.run_scenario(scenario).await.map(|()| {
                println!("Scenario {} passed (seed {})", scenario, workload.seed());
            })
        }
        None => match workload.run().await {
            Ok(report) if args.json => print_json(&report),
            Ok(report) => {
                println!("Workload passed (seed {})", report.seed);
                println!(
                    "  registered {}, unregistered {}, force purges {}",
                    report.registered, report.unregistered, report.force_purges
                );
                for (scenario, count) in &report.scenarios {
                    println!("  {:<14} {}", scenario, count);
                }
                Ok(())
            }
            Err(e) => Err(e),
        },
    };

    if let Err(e) = &result {
        tracing::error!(seed = workload.seed(), error = %e, "workload failed");
    }
    runtime.stop().await?;
    result
}
