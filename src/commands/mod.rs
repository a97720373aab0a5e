pub type CmdResult<T> = dockhand::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

pub mod deploy;
pub mod doctor;
pub mod logs;
pub mod server;
pub mod status;
pub mod sync;
pub mod target;

use crate::output::map_cmd_result_to_json;

pub fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (dockhand::Result<serde_json::Value>, i32) {
    match command {
        crate::Commands::Server(args) => map_cmd_result_to_json(server::run(args, global)),
        crate::Commands::Target(args) => map_cmd_result_to_json(target::run(args, global)),
        crate::Commands::Deploy(args) => map_cmd_result_to_json(deploy::run(args, global)),
        crate::Commands::Sync(args) => map_cmd_result_to_json(sync::run(args, global)),
        crate::Commands::Status(args) => map_cmd_result_to_json(status::run(args, global)),
        crate::Commands::Logs(args) => map_cmd_result_to_json(logs::run(args, global)),
        crate::Commands::Doctor(args) => map_cmd_result_to_json(doctor::run(args, global)),
    }
}

/// Read a JSON spec from a string or a file (`@path`).
pub(crate) fn read_json_spec(spec: &str) -> dockhand::Result<String> {
    if let Some(path) = spec.strip_prefix('@') {
        if path.trim().is_empty() {
            return Err(dockhand::Error::validation_invalid_argument(
                "json",
                "Invalid JSON spec '@' (missing file path)",
                None,
                None,
            ));
        }
        return std::fs::read_to_string(path).map_err(|e| {
            dockhand::Error::internal_io(e.to_string(), Some(format!("read {}", path)))
        });
    }

    Ok(spec.to_string())
}

pub(crate) fn to_value<T: serde::Serialize>(data: T) -> dockhand::Result<serde_json::Value> {
    serde_json::to_value(data).map_err(|e| {
        dockhand::Error::internal_json(e.to_string(), Some("serialize response".to_string()))
    })
}
