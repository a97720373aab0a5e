//! The deployment state machine.
//!
//! One run walks Idle -> Stopping -> Rebuilding -> Starting -> Verifying and
//! ends in Succeeded or Failed. Steps execute strictly sequentially; each
//! produces exactly one StepResult, and the final report lists every step
//! that was attempted even when the run fails partway. Build output is
//! streamed but never parsed; only exit codes drive transitions.

use crate::error::{Error, Result};
use crate::health::{self, HealthStatus, HttpProbe};
use crate::logs;
use crate::privilege;
use crate::session::Session;
use crate::target::Target;
use crate::tools::{self, ResolvedTool};
use crate::transfer::{self, TransferManifest};
use crate::utils::shell;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Instant;
use uuid::Uuid;

/// Streamed steps keep only the most recent lines in the report; the full
/// stream already went to the status log as it was produced.
const STREAM_CAPTURE_LINES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    Stopping,
    Rebuilding,
    Starting,
    Verifying,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct DeploymentStep {
    pub name: &'static str,
    pub state: WorkflowState,
    pub command: String,
    pub abort_on_failure: bool,
    pub streamed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Tolerated,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub name: String,
    pub command: String,
    /// None when the command's fate is unknown (connection lost mid-step).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub target_id: String,
    pub host: String,
    pub state: WorkflowState,
    pub engine: ResolvedTool,
    pub compose: ResolvedTool,
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_tail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.state == WorkflowState::Succeeded
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowOptions {
    /// Upload the target's manifest before touching the deployment.
    pub sync_artifacts: bool,
    /// Rebuild without the engine's layer cache.
    pub no_cache: bool,
    /// Stop after the start step without waiting for readiness.
    pub skip_verify: bool,
}

/// Run the full deployment workflow against one target.
///
/// Errors are returned only for pre-step failures (tool discovery, privilege
/// probe, artifact sync); once steps begin, failures land in the report so
/// partial progress is never discarded.
pub fn run(
    session: &dyn Session,
    target: &Target,
    http: &dyn HttpProbe,
    options: &WorkflowOptions,
) -> Result<RunReport> {
    let started = Instant::now();
    let started_at = Utc::now();
    log_status!("deploy", "Deploying '{}' to {}", target.id, session.host());

    // Tool discovery and the privilege probe happen once per run; every
    // later command reuses the answers.
    let mut engine = tools::resolve(
        session,
        "container engine",
        &target.engine_candidates,
        "--version",
    )?;
    let mut compose = tools::resolve(
        session,
        "compose orchestrator",
        &target.compose_candidates,
        "--version",
    )?;

    let elevate = privilege::requires_elevation(session, &engine)?;
    if elevate {
        log_status!(
            "deploy",
            "Privilege escalation required; prefixing commands with '{}'",
            target.elevation_command
        );
    }
    engine.requires_elevation = elevate;
    engine.elevation_command = target.elevation_command.clone();
    compose.requires_elevation = elevate;
    compose.elevation_command = target.elevation_command.clone();

    transfer::ensure_remote_dirs(session, &target.deploy_root, &target.state_dirs)?;

    if options.sync_artifacts && !target.manifest.is_empty() {
        let manifest = TransferManifest::from_entries(&target.manifest);
        let upload = transfer::upload(session, &manifest, true)?;
        if !upload.ok() {
            let files = serde_json::to_value(&upload.files).unwrap_or_default();
            return Err(Error::transfer_incomplete(
                upload.failed,
                upload.failed + upload.transferred,
                files,
            ));
        }
    }

    let steps = build_steps(target, &compose, options);
    let mut report = RunReport {
        run_id: Uuid::new_v4().to_string(),
        target_id: target.id.clone(),
        host: session.host().to_string(),
        state: WorkflowState::Idle,
        engine,
        compose,
        steps: Vec::new(),
        health: None,
        error: None,
        log_tail: None,
        started_at,
        duration_ms: 0,
    };

    for step in &steps {
        report.state = step.state;
        let result = execute_step(session, step);

        if result.outcome == StepOutcome::Tolerated {
            log_status!(
                "deploy",
                "[{}] exited {} (tolerated)",
                step.name,
                result.exit_code.unwrap_or(-1)
            );
        }

        let failed = result.outcome == StepOutcome::Failed;
        if failed {
            report.error = Some(step_failure_message(&result));
        }
        report.steps.push(result);

        if failed {
            report.state = WorkflowState::Failed;
            report.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(report);
        }
    }

    if options.skip_verify {
        report.state = WorkflowState::Succeeded;
        report.duration_ms = started.elapsed().as_millis() as u64;
        log_status!("deploy", "Deployment finished (verification skipped)");
        return Ok(report);
    }

    report.state = WorkflowState::Verifying;
    log_status!(
        "deploy",
        "Verifying '{}' is ready (timeout {}s)",
        target.container,
        target.health.timeout_secs
    );

    match health::wait_ready(
        session,
        &report.engine,
        http,
        &target.health,
        &target.container,
    ) {
        Ok((true, status)) => {
            report.health = Some(status);
            report.state = WorkflowState::Succeeded;
            log_status!("deploy", "Deployment of '{}' succeeded", target.id);
        }
        Ok((false, status)) => {
            report.health = Some(status);
            report.state = WorkflowState::Failed;
            report.error = Some(format!(
                "Service did not become ready within {}s",
                target.health.timeout_secs
            ));
            // Pull the service's own logs so the failure is diagnosable
            // from the report alone.
            match logs::container_tail(
                session,
                &report.engine,
                &target.container,
                target.log_tail_lines,
            ) {
                Ok(tail) => report.log_tail = Some(tail.content),
                Err(err) => log_status!("deploy", "Could not fetch container logs: {}", err),
            }
        }
        Err(err) => {
            report.state = WorkflowState::Failed;
            report.error = Some(err.to_string());
        }
    }

    report.duration_ms = started.elapsed().as_millis() as u64;
    Ok(report)
}

fn build_steps(
    target: &Target,
    compose: &ResolvedTool,
    options: &WorkflowOptions,
) -> Vec<DeploymentStep> {
    let cd = format!("cd {} && ", shell::quote_path(&target.deploy_root));
    let file = shell::quote_path(&target.compose_file);
    let service = target
        .service
        .as_deref()
        .map(|s| format!(" {}", shell::quote_arg(s)))
        .unwrap_or_default();
    let no_cache = if options.no_cache { " --no-cache" } else { "" };

    vec![
        DeploymentStep {
            name: "stop",
            state: WorkflowState::Stopping,
            // Stopping a container that isn't running is a success condition
            command: format!(
                "{}{}",
                cd,
                compose.invocation(&format!("-f {} stop{}", file, service))
            ),
            abort_on_failure: false,
            streamed: false,
        },
        DeploymentStep {
            name: "rebuild",
            state: WorkflowState::Rebuilding,
            command: format!(
                "{}{}",
                cd,
                compose.invocation(&format!("-f {} build{}{}", file, no_cache, service))
            ),
            abort_on_failure: true,
            streamed: true,
        },
        DeploymentStep {
            name: "start",
            state: WorkflowState::Starting,
            command: format!(
                "{}{}",
                cd,
                compose.invocation(&format!("-f {} up -d{}", file, service))
            ),
            abort_on_failure: true,
            streamed: false,
        },
    ]
}

fn execute_step(session: &dyn Session, step: &DeploymentStep) -> StepResult {
    log_status!("deploy", "[{}] {}", step.name, step.command);
    let started = Instant::now();

    let outcome_of = |success: bool| {
        if success {
            StepOutcome::Succeeded
        } else if step.abort_on_failure {
            StepOutcome::Failed
        } else {
            StepOutcome::Tolerated
        }
    };

    if step.streamed {
        let mut tail: VecDeque<String> = VecDeque::new();
        let result = session.execute_streamed(&step.command, &mut |line| {
            log_status!("deploy", "[{}] {}", step.name, line);
            if tail.len() == STREAM_CAPTURE_LINES {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
        });
        let captured = tail.into_iter().collect::<Vec<_>>().join("\n");

        match result {
            Ok(output) => StepResult {
                name: step.name.to_string(),
                command: step.command.clone(),
                exit_code: Some(output.exit_code),
                stdout: captured,
                stderr: output.stderr,
                duration_ms: started.elapsed().as_millis() as u64,
                outcome: outcome_of(output.success),
                error: None,
            },
            Err(err) => StepResult {
                name: step.name.to_string(),
                command: step.command.clone(),
                exit_code: None,
                stdout: captured,
                stderr: String::new(),
                duration_ms: started.elapsed().as_millis() as u64,
                outcome: StepOutcome::Failed,
                error: Some(err.to_string()),
            },
        }
    } else {
        match session.execute(&step.command) {
            Ok(output) => StepResult {
                name: step.name.to_string(),
                command: step.command.clone(),
                exit_code: Some(output.exit_code),
                stdout: output.stdout,
                stderr: output.stderr,
                duration_ms: started.elapsed().as_millis() as u64,
                outcome: outcome_of(output.success),
                error: None,
            },
            Err(err) => StepResult {
                name: step.name.to_string(),
                command: step.command.clone(),
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: started.elapsed().as_millis() as u64,
                outcome: StepOutcome::Failed,
                error: Some(err.to_string()),
            },
        }
    }
}

fn step_failure_message(result: &StepResult) -> String {
    if let Some(err) = &result.error {
        return format!("Step '{}' could not run: {}", result.name, err);
    }

    let detail = if result.stderr.trim().is_empty() {
        result.stdout.trim()
    } else {
        result.stderr.trim()
    };

    if detail.is_empty() {
        format!(
            "Step '{}' failed (exit {})",
            result.name,
            result.exit_code.unwrap_or(-1)
        )
    } else {
        format!(
            "Step '{}' failed (exit {}): {}",
            result.name,
            result.exit_code.unwrap_or(-1),
            detail
        )
    }
}
