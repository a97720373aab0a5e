use crate::error::{Error, Result};
use crate::server::Server;
use crate::session::{CommandOutput, Session};
use crate::utils::shell;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// SSH exit code 255 is reserved for ssh's own errors (not the remote
/// command), so it marks the boundary between "ran and failed" and
/// "could not run".
const SSH_CONNECTION_EXIT: i32 = 255;

const TRANSIENT_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "no route to host",
    "network is unreachable",
    "temporary failure in name resolution",
    "could not resolve hostname",
    "broken pipe",
    "ssh_exchange_identification",
    "connection closed by remote host",
];

pub struct SshClient {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the server host is localhost/127.0.0.1/::1.
    pub is_local: bool,
    closed: AtomicBool,
}

impl SshClient {
    /// Open a session to the configured server. Performs a no-op handshake
    /// command so a dead host or bad credentials fail here, not mid-workflow.
    pub fn connect(server: &Server, server_id: &str) -> Result<Self> {
        if !server.is_valid() {
            return Err(Error::ssh_server_invalid(
                server_id.to_string(),
                server.missing_fields(),
            ));
        }

        let identity_file = match &server.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(
                        server_id.to_string(),
                        expanded,
                    ));
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(&server.host);
        if is_local {
            log_status!("ssh", "Server '{}' is localhost, using local execution", server_id);
        }

        let client = Self {
            host: server.host.clone(),
            user: server.user.clone(),
            port: server.port,
            identity_file,
            connect_timeout_secs: server.connect_timeout_secs,
            command_timeout_secs: server.command_timeout_secs,
            is_local,
            closed: AtomicBool::new(false),
        };

        client.execute("true")?;
        Ok(client)
    }

    /// Close the session. Idempotent; commands issued afterwards fail with
    /// a session.closed error.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::session_closed(self.host.clone()));
        }
        Ok(())
    }

    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        // Timeout and keepalive options prevent hangs on stalled
        // connections or unexpected prompts.
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        args.push(format!("{}@{}", self.user, self.host));
        args.push(command.to_string());

        args
    }

    fn execute_with_retry(&self, command: &str, max_attempts: u32) -> Result<CommandOutput> {
        let backoff_secs = [0u64, 2, 5]; // delays before retry 1, 2, 3
        let mut attempt = 0;

        loop {
            match self.run_command(command, None) {
                Ok(output) => return Ok(output),
                Err(err) => {
                    attempt += 1;
                    // Only retry transient connection errors, never command failures
                    if attempt >= max_attempts || !err.retryable.unwrap_or(false) {
                        return Err(err);
                    }
                    let delay = backoff_secs.get(attempt as usize).copied().unwrap_or(5);
                    log_status!(
                        "ssh",
                        "Connection failed (attempt {}/{}), retrying in {}s...",
                        attempt,
                        max_attempts,
                        delay
                    );
                    std::thread::sleep(Duration::from_secs(delay));
                }
            }
        }
    }

    /// Shared execution engine for both output modes. With `on_line` set,
    /// stdout is handed to the callback line by line while the process runs;
    /// end-of-stream is the signal to then collect the exit status. Without
    /// it, stdout is accumulated and returned whole.
    fn run_command(
        &self,
        command: &str,
        mut on_line: Option<&mut dyn FnMut(&str)>,
    ) -> Result<CommandOutput> {
        let mut cmd = if self.is_local {
            local_shell_command(command)
        } else {
            let mut cmd = Command::new("ssh");
            cmd.args(self.build_ssh_args(command));
            cmd
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::internal_io(e.to_string(), Some("spawn command".to_string())))?;

        let deadline = (self.command_timeout_secs > 0)
            .then(|| Instant::now() + Duration::from_secs(self.command_timeout_secs));

        // Drain stderr on its own thread so neither pipe can fill up and
        // block the remote process from exiting.
        let stderr_handle = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        let mut stdout = String::new();
        let mut timed_out = false;

        if let Some(pipe) = child.stdout.take() {
            let mut reader = BufReader::new(pipe);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line) {
                    Ok(0) => break, // end of stream; exit status comes next
                    Ok(_) => {
                        match on_line.as_mut() {
                            Some(cb) => cb(line.trim_end_matches(['\n', '\r'])),
                            None => stdout.push_str(&line),
                        }
                        if deadline.is_some_and(|d| Instant::now() > d) {
                            timed_out = true;
                            break;
                        }
                    }
                    Err(_) => break, // pipe error; fall through to exit status
                }
            }
        }

        if !timed_out {
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        let stderr = stderr_handle
                            .and_then(|h| h.join().ok())
                            .unwrap_or_default();
                        let exit_code = status.code().unwrap_or(-1);

                        if !self.is_local {
                            if let Some(err) =
                                classify_connection_failure(&self.host, exit_code, &stderr)
                            {
                                return Err(err);
                            }
                        }

                        return Ok(CommandOutput {
                            stdout,
                            stderr,
                            success: status.success(),
                            exit_code,
                        });
                    }
                    Ok(None) => {
                        if deadline.is_some_and(|d| Instant::now() > d) {
                            timed_out = true;
                            break;
                        }
                        std::thread::sleep(Duration::from_millis(50));
                    }
                    Err(e) => {
                        return Err(Error::internal_io(
                            e.to_string(),
                            Some("wait for command".to_string()),
                        ))
                    }
                }
            }
        }

        let _ = child.kill();
        let _ = child.wait();
        if let Some(handle) = stderr_handle {
            let _ = handle.join();
        }
        Err(Error::remote_command_timeout(
            command,
            self.command_timeout_secs,
        ))
    }
}

impl Session for SshClient {
    fn execute(&self, command: &str) -> Result<CommandOutput> {
        self.ensure_open()?;
        self.execute_with_retry(command, 3)
    }

    fn execute_streamed(
        &self,
        command: &str,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput> {
        self.ensure_open()?;
        // A partially consumed stream is not replayable, so streamed
        // commands never retry.
        self.run_command(command, Some(on_line))
    }

    fn send_file(&self, local: &Path, remote: &str) -> Result<()> {
        self.ensure_open()?;

        if self.is_local {
            if let Some(parent) = Path::new(remote).parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::transfer_failed(local.display().to_string(), remote, e.to_string())
                })?;
            }
            std::fs::copy(local, remote).map_err(|e| {
                Error::transfer_failed(local.display().to_string(), remote, e.to_string())
            })?;
            return Ok(());
        }

        let mut scp_args: Vec<String> = vec![
            "-q".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
        ];

        if let Some(identity_file) = &self.identity_file {
            scp_args.extend(["-i".to_string(), identity_file.clone()]);
        }

        if self.port != 22 {
            scp_args.extend(["-P".to_string(), self.port.to_string()]);
        }

        scp_args.push(local.to_string_lossy().to_string());
        scp_args.push(format!(
            "{}@{}:{}",
            self.user,
            self.host,
            shell::quote_path(remote)
        ));

        let output = Command::new("scp")
            .args(&scp_args)
            .output()
            .map_err(|e| Error::internal_io(e.to_string(), Some("spawn scp".to_string())))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::transfer_failed(
                local.display().to_string(),
                remote,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    fn host(&self) -> &str {
        &self.host
    }
}

fn local_shell_command(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    }

    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Map an ssh-level failure to a typed error, or None when the exit code
/// belongs to the remote command itself.
fn classify_connection_failure(host: &str, exit_code: i32, stderr: &str) -> Option<Error> {
    if exit_code != SSH_CONNECTION_EXIT {
        return None;
    }

    let lower = stderr.to_lowercase();
    if lower.contains("permission denied") || lower.contains("authentication failed") {
        return Some(Error::ssh_auth_failed(host, stderr.trim()));
    }

    let transient = TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p));
    Some(Error::ssh_connect_failed(host, stderr.trim()).with_retryable(transient))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn test_client(host: &str) -> SshClient {
        SshClient {
            host: host.to_string(),
            user: "deploy".to_string(),
            port: 22,
            identity_file: None,
            connect_timeout_secs: 10,
            command_timeout_secs: 300,
            is_local: is_local_host(host),
            closed: AtomicBool::new(false),
        }
    }

    #[test]
    fn local_host_detection() {
        assert!(is_local_host("localhost"));
        assert!(is_local_host("127.0.0.1"));
        assert!(is_local_host("::1"));
        assert!(!is_local_host("example.com"));
    }

    #[test]
    fn ssh_args_include_batch_mode_and_target() {
        let client = test_client("example.com");
        let args = client.build_ssh_args("true");
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"deploy@example.com".to_string()));
        assert!(!args.contains(&"-p".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("true"));
    }

    #[test]
    fn ssh_args_include_nonstandard_port() {
        let mut client = test_client("example.com");
        client.port = 2222;
        let args = client.build_ssh_args("true");
        assert!(args.contains(&"-p".to_string()));
        assert!(args.contains(&"2222".to_string()));
    }

    #[test]
    fn closed_session_rejects_commands() {
        let client = test_client("localhost");
        client.close();
        client.close(); // idempotent
        let err = client.execute("true").unwrap_err();
        assert_eq!(err.code, ErrorCode::SessionClosed);
    }

    #[test]
    fn exit_255_classifies_as_connection_failure() {
        let err = classify_connection_failure("example.com", 255, "ssh: connect to host example.com port 22: Connection refused");
        let err = err.expect("255 should classify");
        assert_eq!(err.code, ErrorCode::SshConnectFailed);
        assert_eq!(err.retryable, Some(true));
    }

    #[test]
    fn exit_255_with_auth_error_is_not_retried() {
        let err = classify_connection_failure("example.com", 255, "deploy@example.com: Permission denied (publickey).");
        assert_eq!(err.expect("255 should classify").code, ErrorCode::SshAuthFailed);
    }

    #[test]
    fn nonzero_remote_exit_is_not_a_connection_failure() {
        assert!(classify_connection_failure("example.com", 1, "No such container").is_none());
    }

    #[test]
    fn local_execution_captures_output() {
        let client = test_client("localhost");
        let output = client.execute("echo hello && echo oops >&2").unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[test]
    fn local_streamed_execution_delivers_lines_then_status() {
        let client = test_client("localhost");
        let mut lines = Vec::new();
        let output = client
            .execute_streamed("printf 'one\\ntwo\\n'", &mut |line| {
                lines.push(line.to_string())
            })
            .unwrap();
        assert!(output.success);
        assert_eq!(lines, vec!["one", "two"]);
        assert!(output.stdout.is_empty());
    }

    #[test]
    fn local_command_failure_is_ok_with_failure_flag() {
        let client = test_client("localhost");
        let output = client.execute("exit 3").unwrap();
        assert!(!output.success);
        assert_eq!(output.exit_code, 3);
    }
}
