//! Tool discovery with ordered fallback.
//!
//! Each tool family (container engine, compose orchestrator) is described by
//! an ordered candidate list from target configuration. Resolution probes
//! candidates in order and stops at the first one that answers; the result
//! is held for the rest of the run and never re-probed.

use crate::error::{Error, Result, ToolProbeAttempt};
use crate::session::Session;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCandidate {
    pub name: String,
    pub command: String,
}

impl ToolCandidate {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTool {
    pub name: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub requires_elevation: bool,
    #[serde(skip)]
    pub elevation_command: String,
}

impl ResolvedTool {
    /// Full invocation for a subcommand against this tool, with the
    /// elevation prefix applied when required.
    pub fn invocation(&self, args: &str) -> String {
        if self.requires_elevation {
            format!("{} {} {}", self.elevation_command, self.command, args)
        } else {
            format!("{} {}", self.command, args)
        }
    }
}

/// Resolve the first working candidate, in caller order. A candidate whose
/// probe exits zero wins and later candidates are never probed. Connection
/// failures abort resolution; they say nothing about tool availability.
pub fn resolve(
    session: &dyn Session,
    family: &str,
    candidates: &[ToolCandidate],
    probe_args: &str,
) -> Result<ResolvedTool> {
    if candidates.is_empty() {
        return Err(Error::tool_not_found(family, Vec::new()));
    }

    let mut attempted = Vec::new();

    for candidate in candidates {
        let probe = format!("{} {}", candidate.command, probe_args);
        match session.execute(&probe)? {
            output if output.success => {
                let version = extract_version(&output.stdout);
                log_status!(
                    "tools",
                    "Resolved {} to '{}'{}",
                    family,
                    candidate.command,
                    version
                        .as_deref()
                        .map(|v| format!(" ({})", v))
                        .unwrap_or_default()
                );
                return Ok(ResolvedTool {
                    name: candidate.name.clone(),
                    command: candidate.command.clone(),
                    version,
                    requires_elevation: false,
                    elevation_command: String::new(),
                });
            }
            output => {
                let error = if output.stderr.trim().is_empty() {
                    output.stdout.trim().to_string()
                } else {
                    output.stderr.trim().to_string()
                };
                attempted.push(ToolProbeAttempt {
                    name: candidate.name.clone(),
                    command: probe,
                    error,
                });
            }
        }
    }

    Err(Error::tool_not_found(family, attempted))
}

/// Pull a version token out of probe output, e.g.
/// "Docker version 27.3.1, build ce12230" -> "27.3.1".
fn extract_version(stdout: &str) -> Option<String> {
    let first_line = stdout.lines().next()?.trim();
    if first_line.is_empty() {
        return None;
    }

    Regex::new(r"v?(\d+\.\d+(?:\.\d+)?)")
        .ok()?
        .captures(first_line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| Some(first_line.to_string()))
}
