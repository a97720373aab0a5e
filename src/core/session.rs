//! Remote command channel abstraction.
//!
//! A `Session` owns one logical connection to a single host. An `Err` from a
//! session method always means "could not determine whether the command ran"
//! (connection loss, timeout, closed session); a command that ran and exited
//! non-zero comes back as `Ok` with `success: false`. Callers rely on that
//! distinction to tell expected failures from transport failures.

use crate::error::Result;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

pub trait Session {
    /// Buffered execution: wait for completion, then return the full output.
    fn execute(&self, command: &str) -> Result<CommandOutput>;

    /// Streamed execution: `on_line` receives each stdout line as it is
    /// produced, while the remote process is still running. The returned
    /// output's stdout is empty; stderr is captured in full.
    fn execute_streamed(
        &self,
        command: &str,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput>;

    /// Copy a local file to a path on the remote host.
    fn send_file(&self, local: &Path, remote: &str) -> Result<()>;

    /// Host label for logs and error reports.
    fn host(&self) -> &str;
}
