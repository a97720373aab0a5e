use clap::{Args, Subcommand};
use serde::Serialize;

use dockhand::server::{self, Server};

use super::{to_value, CmdResult};

#[derive(Args)]
pub struct ServerArgs {
    #[command(subcommand)]
    pub command: ServerCommand,
}

#[derive(Subcommand)]
pub enum ServerCommand {
    /// Add or update a server configuration
    Add {
        /// Server ID
        id: String,
        /// Host name or address
        #[arg(long)]
        host: String,
        /// SSH user
        #[arg(long)]
        user: String,
        /// SSH port
        #[arg(long, default_value_t = 22)]
        port: u16,
        /// Path to an SSH identity file
        #[arg(long)]
        identity_file: Option<String>,
        /// Connection handshake timeout in seconds
        #[arg(long, default_value_t = 10)]
        connect_timeout_secs: u64,
        /// Per-command timeout in seconds (0 disables)
        #[arg(long, default_value_t = 300)]
        command_timeout_secs: u64,
    },
    /// List configured servers
    List,
    /// Show one server configuration
    Show {
        /// Server ID
        id: String,
    },
    /// Remove a server configuration
    Remove {
        /// Server ID
        id: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerItemOutput {
    command: String,
    server: Server,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerListOutput {
    command: String,
    servers: Vec<Server>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerRemoveOutput {
    command: String,
    id: String,
}

pub fn run(args: ServerArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<serde_json::Value> {
    match args.command {
        ServerCommand::Add {
            id,
            host,
            user,
            port,
            identity_file,
            connect_timeout_secs,
            command_timeout_secs,
        } => {
            let entry = Server {
                id,
                host,
                user,
                port,
                identity_file,
                connect_timeout_secs,
                command_timeout_secs,
            };
            server::save(&entry)?;
            Ok((
                to_value(ServerItemOutput {
                    command: "server.add".to_string(),
                    server: entry,
                })?,
                0,
            ))
        }
        ServerCommand::List => {
            let servers = server::list()?;
            Ok((
                to_value(ServerListOutput {
                    command: "server.list".to_string(),
                    servers,
                })?,
                0,
            ))
        }
        ServerCommand::Show { id } => {
            let entry = server::load(&id)?;
            Ok((
                to_value(ServerItemOutput {
                    command: "server.show".to_string(),
                    server: entry,
                })?,
                0,
            ))
        }
        ServerCommand::Remove { id } => {
            server::delete(&id)?;
            Ok((
                to_value(ServerRemoveOutput {
                    command: "server.remove".to_string(),
                    id,
                })?,
                0,
            ))
        }
    }
}
