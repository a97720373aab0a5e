use clap::Args;
use serde::Serialize;

use dockhand::context::resolve_target_session;
use dockhand::logs::{self, LogContent};
use dockhand::{privilege, tools};

use super::CmdResult;

#[derive(Args)]
pub struct LogsArgs {
    /// Target ID
    pub target_id: String,

    /// Number of lines to tail
    #[arg(long, default_value_t = 50)]
    pub lines: u32,

    /// Tail a log file under the deploy root instead of the container logs
    #[arg(long)]
    pub file: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsOutput {
    pub command: String,
    pub target_id: String,
    pub log: LogContent,
}

pub fn run(args: LogsArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<LogsOutput> {
    let ctx = resolve_target_session(&args.target_id)?;

    let result = tail(&ctx, args.file.as_deref(), args.lines);
    ctx.client.close();
    let log = result?;

    Ok((
        LogsOutput {
            command: "logs.tail".to_string(),
            target_id: args.target_id,
            log,
        },
        0,
    ))
}

fn tail(
    ctx: &dockhand::context::TargetContext,
    file: Option<&str>,
    lines: u32,
) -> dockhand::Result<LogContent> {
    if let Some(path) = file {
        let full_path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                ctx.target.deploy_root.trim_end_matches('/'),
                path
            )
        };
        return logs::file_tail(&ctx.client, &full_path, lines);
    }

    let mut engine = tools::resolve(
        &ctx.client,
        "container engine",
        &ctx.target.engine_candidates,
        "--version",
    )?;
    engine.requires_elevation = privilege::requires_elevation(&ctx.client, &engine)?;
    engine.elevation_command = ctx.target.elevation_command.clone();

    logs::container_tail(&ctx.client, &engine, &ctx.target.container, lines)
}
