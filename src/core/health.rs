//! Post-deploy readiness verification.
//!
//! Polls the engine's container listing and an optional HTTP endpoint on a
//! bounded interval until both report ready or the phase times out. The last
//! observed status is returned on both paths so partial progress is always
//! reportable.

use crate::error::{Error, Result};
use crate::session::Session;
use crate::target::{HealthSettings, RunningMatch};
use crate::tools::ResolvedTool;
use crate::utils::shell;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub container_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub checked_at: DateTime<Utc>,
}

pub trait HttpProbe {
    /// GET the URL and return the status code. Redirects must not be
    /// followed; 301/302 are ready signals in their own right.
    fn status(&self, url: &str) -> Result<u16>;
}

pub struct ReqwestProbe {
    client: reqwest::blocking::Client,
}

impl ReqwestProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                Error::internal_unexpected(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self { client })
    }
}

impl HttpProbe for ReqwestProbe {
    fn status(&self, url: &str) -> Result<u16> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::internal_unexpected(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// One combined probe: container listing plus HTTP endpoint.
pub fn check_once(
    session: &dyn Session,
    tool: &ResolvedTool,
    http: &dyn HttpProbe,
    settings: &HealthSettings,
    container: &str,
) -> Result<HealthStatus> {
    let container_running = container_is_running(session, tool, settings, container)?;

    // A refused connection while the service boots is expected, so HTTP
    // probe errors read as "not ready yet", never as failures.
    let http_status = settings
        .url
        .as_deref()
        .and_then(|url| http.status(url).ok());

    Ok(HealthStatus {
        container_running,
        http_status,
        checked_at: Utc::now(),
    })
}

pub fn is_ready(settings: &HealthSettings, status: &HealthStatus) -> bool {
    if !status.container_running {
        return false;
    }
    match &settings.url {
        None => true,
        Some(_) => status
            .http_status
            .map(|code| settings.ready_statuses.contains(&code))
            .unwrap_or(false),
    }
}

/// Poll until ready or the timeout elapses. Returns the readiness flag and
/// the last observed status in both cases.
pub fn wait_ready(
    session: &dyn Session,
    tool: &ResolvedTool,
    http: &dyn HttpProbe,
    settings: &HealthSettings,
    container: &str,
) -> Result<(bool, HealthStatus)> {
    let deadline = Instant::now() + Duration::from_secs(settings.timeout_secs);

    loop {
        let status = check_once(session, tool, http, settings, container)?;
        if is_ready(settings, &status) {
            return Ok((true, status));
        }
        if Instant::now() >= deadline {
            return Ok((false, status));
        }
        log_status!(
            "health",
            "Not ready yet (running: {}, http: {})",
            status.container_running,
            status
                .http_status
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
        std::thread::sleep(Duration::from_secs(settings.interval_secs));
    }
}

/// Like `wait_ready`, but a timeout becomes a typed error carrying the last
/// observed status.
pub fn verify(
    session: &dyn Session,
    tool: &ResolvedTool,
    http: &dyn HttpProbe,
    settings: &HealthSettings,
    container: &str,
) -> Result<HealthStatus> {
    let (ready, status) = wait_ready(session, tool, http, settings, container)?;
    if ready {
        return Ok(status);
    }
    let last = serde_json::to_value(&status)
        .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));
    Err(Error::health_check_timeout(
        container,
        settings.timeout_secs,
        last,
    ))
}

fn container_is_running(
    session: &dyn Session,
    tool: &ResolvedTool,
    settings: &HealthSettings,
    container: &str,
) -> Result<bool> {
    match &settings.running_match {
        RunningMatch::StatusSubstring { pattern } => {
            let args = format!(
                "ps --filter name=^{}$ --format '{{{{.Status}}}}'",
                shell::quote_arg(container)
            );
            let output = session.execute(&tool.invocation(&args))?;
            Ok(output.success && output.stdout.contains(pattern.as_str()))
        }
        RunningMatch::PsQuiet => {
            let args = format!(
                "ps -q --filter name=^{}$ --filter status=running",
                shell::quote_arg(container)
            );
            let output = session.execute(&tool.invocation(&args))?;
            Ok(output.success && !output.stdout.trim().is_empty())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CommandOutput;
    use crate::tools::ResolvedTool;
    use std::cell::RefCell;
    use std::path::Path;

    struct PsSession {
        /// Successive replies to the container-status probe.
        replies: RefCell<Vec<&'static str>>,
    }

    impl PsSession {
        fn new(mut replies: Vec<&'static str>) -> Self {
            replies.reverse();
            Self {
                replies: RefCell::new(replies),
            }
        }
    }

    impl Session for PsSession {
        fn execute(&self, _command: &str) -> crate::error::Result<CommandOutput> {
            let stdout = self.replies.borrow_mut().pop().unwrap_or("");
            Ok(CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                success: true,
                exit_code: 0,
            })
        }

        fn execute_streamed(
            &self,
            command: &str,
            _on_line: &mut dyn FnMut(&str),
        ) -> crate::error::Result<CommandOutput> {
            self.execute(command)
        }

        fn send_file(&self, _local: &Path, _remote: &str) -> crate::error::Result<()> {
            Ok(())
        }

        fn host(&self) -> &str {
            "health"
        }
    }

    struct FixedProbe(Option<u16>);

    impl HttpProbe for FixedProbe {
        fn status(&self, _url: &str) -> crate::error::Result<u16> {
            self.0
                .ok_or_else(|| Error::internal_unexpected("connection refused"))
        }
    }

    fn docker() -> ResolvedTool {
        ResolvedTool {
            name: "docker".to_string(),
            command: "docker".to_string(),
            version: None,
            requires_elevation: false,
            elevation_command: String::new(),
        }
    }

    fn settings(url: Option<&str>, timeout_secs: u64) -> HealthSettings {
        HealthSettings {
            url: url.map(String::from),
            timeout_secs,
            interval_secs: 0,
            ..HealthSettings::default()
        }
    }

    #[test]
    fn ready_when_running_and_http_ok() {
        let session = PsSession::new(vec!["Up 3 seconds\n"]);
        let probe = FixedProbe(Some(200));
        let cfg = settings(Some("http://localhost:8080/"), 60);

        let (ready, status) = wait_ready(&session, &docker(), &probe, &cfg, "app").unwrap();
        assert!(ready);
        assert!(status.container_running);
        assert_eq!(status.http_status, Some(200));
    }

    #[test]
    fn redirect_statuses_count_as_ready() {
        let session = PsSession::new(vec!["Up 2 minutes\n"]);
        let probe = FixedProbe(Some(301));
        let cfg = settings(Some("http://localhost:8080/"), 60);

        let (ready, _) = wait_ready(&session, &docker(), &probe, &cfg, "app").unwrap();
        assert!(ready);
    }

    #[test]
    fn timeout_returns_last_observed_status() {
        let session = PsSession::new(vec!["Exited (1) 5 seconds ago\n"]);
        let probe = FixedProbe(None);
        let cfg = settings(Some("http://localhost:8080/"), 0);

        let (ready, status) = wait_ready(&session, &docker(), &probe, &cfg, "app").unwrap();
        assert!(!ready);
        assert!(!status.container_running);
        assert_eq!(status.http_status, None);
    }

    #[test]
    fn becomes_ready_after_restart_settles() {
        let session = PsSession::new(vec!["", "Up 1 second\n"]);
        let probe = FixedProbe(Some(200));
        let cfg = settings(Some("http://localhost:8080/"), 60);

        let (ready, status) = wait_ready(&session, &docker(), &probe, &cfg, "app").unwrap();
        assert!(ready);
        assert!(status.container_running);
    }

    #[test]
    fn verify_timeout_is_typed_and_carries_last_status() {
        let session = PsSession::new(vec![""]);
        let probe = FixedProbe(None);
        let cfg = settings(Some("http://localhost:8080/"), 0);

        let err = verify(&session, &docker(), &probe, &cfg, "app").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::HealthCheckTimeout);
        assert_eq!(err.details["lastObserved"]["containerRunning"], false);
    }

    #[test]
    fn no_url_means_container_check_alone() {
        let session = PsSession::new(vec!["Up 10 minutes\n"]);
        let probe = FixedProbe(None);
        let cfg = settings(None, 60);

        let (ready, status) = wait_ready(&session, &docker(), &probe, &cfg, "app").unwrap();
        assert!(ready);
        assert_eq!(status.http_status, None);
    }

    #[test]
    fn ps_quiet_policy_uses_id_listing() {
        let session = PsSession::new(vec!["abc123\n"]);
        let probe = FixedProbe(None);
        let mut cfg = settings(None, 60);
        cfg.running_match = RunningMatch::PsQuiet;

        let (ready, _) = wait_ready(&session, &docker(), &probe, &cfg, "app").unwrap();
        assert!(ready);
    }
}
