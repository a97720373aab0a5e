use clap::Args;
use serde::Serialize;
use std::time::Duration;

use dockhand::context::resolve_target_session;
use dockhand::health::ReqwestProbe;
use dockhand::workflow::{self, RunReport, WorkflowOptions};

use super::CmdResult;

#[derive(Args)]
pub struct DeployArgs {
    /// Target ID
    pub target_id: String,

    /// Upload the target's artifact manifest before deploying
    #[arg(long)]
    pub sync: bool,

    /// Rebuild without the engine's layer cache
    #[arg(long)]
    pub no_cache: bool,

    /// Skip the readiness verification phase
    #[arg(long)]
    pub skip_verify: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutput {
    pub command: String,
    pub target_id: String,
    pub report: RunReport,
}

pub fn run(args: DeployArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<DeployOutput> {
    let ctx = resolve_target_session(&args.target_id)?;
    let http = ReqwestProbe::new(Duration::from_secs(10))?;

    let options = WorkflowOptions {
        sync_artifacts: args.sync,
        no_cache: args.no_cache,
        skip_verify: args.skip_verify,
    };

    let result = workflow::run(&ctx.client, &ctx.target, &http, &options);
    ctx.client.close();

    let report = result?;
    let exit_code = if report.succeeded() { 0 } else { 1 };

    Ok((
        DeployOutput {
            command: "deploy.run".to_string(),
            target_id: args.target_id,
            report,
        },
        exit_code,
    ))
}
