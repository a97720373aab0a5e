//! Privilege-escalation detection.
//!
//! Decided once per session by probing the engine with a harmless listing
//! command; every later command against that engine reuses the answer
//! instead of re-testing per step.

use crate::error::Result;
use crate::session::Session;
use crate::tools::ResolvedTool;

const PERMISSION_DENIED_PATTERNS: &[&str] = &[
    "permission denied",
    "access denied",
    "operation not permitted",
    "must be run as root",
];

/// Probe whether invocations of this tool need the elevation prefix.
/// The probe runs unescalated; a permission-denied signature in its output
/// means yes. Any other failure (daemon down, unknown subcommand) is not an
/// elevation problem and the workflow surfaces it on the first real step.
pub fn requires_elevation(session: &dyn Session, tool: &ResolvedTool) -> Result<bool> {
    let probe = format!("{} ps -q", tool.command);
    let output = session.execute(&probe)?;

    if output.success {
        return Ok(false);
    }

    let haystack = format!("{}\n{}", output.stderr, output.stdout).to_lowercase();
    Ok(PERMISSION_DENIED_PATTERNS
        .iter()
        .any(|p| haystack.contains(p)))
}
