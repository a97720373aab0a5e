use clap::Args;
use serde::Serialize;
use std::time::Duration;

use dockhand::context::resolve_target_session;
use dockhand::health::{self, HealthStatus, ReqwestProbe};
use dockhand::{privilege, tools};

use super::CmdResult;

#[derive(Args)]
pub struct StatusArgs {
    /// Target ID
    pub target_id: String,

    /// Poll until ready or the configured health timeout elapses
    #[arg(long)]
    pub wait: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutput {
    pub command: String,
    pub target_id: String,
    pub ready: bool,
    pub status: HealthStatus,
}

pub fn run(args: StatusArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<StatusOutput> {
    let ctx = resolve_target_session(&args.target_id)?;
    let http = ReqwestProbe::new(Duration::from_secs(10))?;

    let result = check(&ctx, &http, args.wait);
    ctx.client.close();

    let status = result?;
    let ready = health::is_ready(&ctx.target.health, &status);
    let exit_code = if ready { 0 } else { 1 };

    Ok((
        StatusOutput {
            command: "status.check".to_string(),
            target_id: args.target_id,
            ready,
            status,
        },
        exit_code,
    ))
}

fn check(
    ctx: &dockhand::context::TargetContext,
    http: &ReqwestProbe,
    wait: bool,
) -> dockhand::Result<HealthStatus> {
    let mut engine = tools::resolve(
        &ctx.client,
        "container engine",
        &ctx.target.engine_candidates,
        "--version",
    )?;
    engine.requires_elevation = privilege::requires_elevation(&ctx.client, &engine)?;
    engine.elevation_command = ctx.target.elevation_command.clone();

    if wait {
        health::verify(
            &ctx.client,
            &engine,
            http,
            &ctx.target.health,
            &ctx.target.container,
        )
    } else {
        health::check_once(
            &ctx.client,
            &engine,
            http,
            &ctx.target.health,
            &ctx.target.container,
        )
    }
}
