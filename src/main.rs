use clap::Parser;

mod commands;
mod output;

use commands::GlobalArgs;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "dockhand")]
#[command(version = VERSION)]
#[command(about = "CLI for orchestrating container deployments on remote servers over SSH")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Manage SSH server configurations
    Server(commands::server::ServerArgs),
    /// Manage deployment target configurations
    Target(commands::target::TargetArgs),
    /// Run the stop/rebuild/start/verify workflow against a target
    Deploy(commands::deploy::DeployArgs),
    /// Upload a target's artifact manifest
    Sync(commands::sync::SyncArgs),
    /// Check whether a target is running and ready
    Status(commands::status::StatusArgs),
    /// Tail container or file logs on a target
    Logs(commands::logs::LogsArgs),
    /// Diagnose tool discovery and privilege requirements on a target
    Doctor(commands::doctor::DoctorArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs {};

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    output::print_json_result(json_result);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
