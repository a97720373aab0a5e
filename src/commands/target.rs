use clap::{Args, Subcommand};
use serde::Serialize;

use dockhand::target::{self, Target};
use dockhand::Error;

use super::{read_json_spec, to_value, CmdResult};

#[derive(Args)]
pub struct TargetArgs {
    #[command(subcommand)]
    pub command: TargetCommand,
}

#[derive(Subcommand)]
pub enum TargetCommand {
    /// Add or update a target from a JSON spec (inline or @file)
    Add {
        /// Target ID
        id: String,
        /// JSON spec, e.g. '{"serverId":"prod","deployRoot":"/srv/app","container":"app"}'
        spec: String,
    },
    /// List configured targets
    List,
    /// Show one target configuration
    Show {
        /// Target ID
        id: String,
    },
    /// Remove a target configuration
    Remove {
        /// Target ID
        id: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TargetItemOutput {
    command: String,
    target: Target,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TargetListOutput {
    command: String,
    targets: Vec<Target>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TargetRemoveOutput {
    command: String,
    id: String,
}

pub fn run(args: TargetArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<serde_json::Value> {
    match args.command {
        TargetCommand::Add { id, spec } => {
            let content = read_json_spec(&spec)?;
            let mut entry: Target = serde_json::from_str(&content)
                .map_err(|e| Error::validation_invalid_json(e, Some("parse target spec".to_string())))?;
            entry.id = id;
            target::save(&entry)?;
            Ok((
                to_value(TargetItemOutput {
                    command: "target.add".to_string(),
                    target: entry,
                })?,
                0,
            ))
        }
        TargetCommand::List => {
            let targets = target::list()?;
            Ok((
                to_value(TargetListOutput {
                    command: "target.list".to_string(),
                    targets,
                })?,
                0,
            ))
        }
        TargetCommand::Show { id } => {
            let entry = target::load(&id)?;
            Ok((
                to_value(TargetItemOutput {
                    command: "target.show".to_string(),
                    target: entry,
                })?,
                0,
            ))
        }
        TargetCommand::Remove { id } => {
            target::delete(&id)?;
            Ok((
                to_value(TargetRemoveOutput {
                    command: "target.remove".to_string(),
                    id,
                })?,
                0,
            ))
        }
    }
}
