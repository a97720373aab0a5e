//! Remote log viewing.
//!
//! Tails either the managed container's own logs (through the resolved
//! engine) or an arbitrary file under the deploy root.

use crate::error::{Error, Result};
use crate::session::Session;
use crate::tools::ResolvedTool;
use crate::utils::shell;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogContent {
    pub source: String,
    pub lines: u32,
    pub content: String,
}

/// Last N lines of the container's logs. Engines split service output
/// across stdout and stderr, so both streams are folded into the result.
pub fn container_tail(
    session: &dyn Session,
    tool: &ResolvedTool,
    container: &str,
    lines: u32,
) -> Result<LogContent> {
    let command = tool.invocation(&format!(
        "logs --tail {} {}",
        lines,
        shell::quote_arg(container)
    ));
    let output = session.execute(&command)?;

    if !output.success {
        return Err(Error::remote_command_failed(
            command,
            output.exit_code,
            output.stdout,
            output.stderr,
        ));
    }

    let mut content = output.stdout;
    if !output.stderr.is_empty() {
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&output.stderr);
    }

    Ok(LogContent {
        source: container.to_string(),
        lines,
        content,
    })
}

/// Last N lines of a log file on the remote host.
pub fn file_tail(session: &dyn Session, path: &str, lines: u32) -> Result<LogContent> {
    let command = format!("tail -n {} {}", lines, shell::quote_path(path));
    let output = session.execute(&command)?;

    if !output.success {
        return Err(Error::remote_command_failed(
            command,
            output.exit_code,
            output.stdout,
            output.stderr,
        ));
    }

    Ok(LogContent {
        source: path.to_string(),
        lines,
        content: output.stdout,
    })
}
