use clap::Args;
use serde::Serialize;

use dockhand::context::resolve_target_session;
use dockhand::tools::{self, ResolvedTool};
use dockhand::privilege;

use super::CmdResult;

#[derive(Args)]
pub struct DoctorArgs {
    /// Target ID
    pub target_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorOutput {
    pub command: String,
    pub target_id: String,
    pub host: String,
    pub engine: ResolvedTool,
    pub compose: ResolvedTool,
    pub requires_elevation: bool,
}

pub fn run(args: DoctorArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<DoctorOutput> {
    let ctx = resolve_target_session(&args.target_id)?;

    let result = diagnose(&ctx);
    ctx.client.close();
    let (engine, compose, requires_elevation) = result?;

    Ok((
        DoctorOutput {
            command: "doctor.check".to_string(),
            target_id: args.target_id,
            host: ctx.server.host.clone(),
            engine,
            compose,
            requires_elevation,
        },
        0,
    ))
}

fn diagnose(
    ctx: &dockhand::context::TargetContext,
) -> dockhand::Result<(ResolvedTool, ResolvedTool, bool)> {
    let mut engine = tools::resolve(
        &ctx.client,
        "container engine",
        &ctx.target.engine_candidates,
        "--version",
    )?;
    let mut compose = tools::resolve(
        &ctx.client,
        "compose orchestrator",
        &ctx.target.compose_candidates,
        "--version",
    )?;

    let requires_elevation = privilege::requires_elevation(&ctx.client, &engine)?;
    engine.requires_elevation = requires_elevation;
    engine.elevation_command = ctx.target.elevation_command.clone();
    compose.requires_elevation = requires_elevation;
    compose.elevation_command = ctx.target.elevation_command.clone();

    Ok((engine, compose, requires_elevation))
}
