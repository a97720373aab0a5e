use crate::config::{self, ConfigEntity};
use crate::error::{Error, Result};
use crate::paths;
use crate::tools::ToolCandidate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One artifact to synchronize; whether it expands as a directory is decided
/// at transfer time from the local filesystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub local: String,
    pub remote: String,
}

/// Which container-list output counts as "running". The exact status text
/// varies between engines and versions, so the policy is configurable
/// rather than a hardcoded string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "camelCase")]
pub enum RunningMatch {
    /// Match a substring of the container's status column (e.g. "Up").
    StatusSubstring {
        #[serde(default = "default_running_pattern")]
        pattern: String,
    },
    /// Rely on `ps -q --filter status=running` returning a non-empty id list.
    PsQuiet,
}

fn default_running_pattern() -> String {
    "Up".to_string()
}

impl Default for RunningMatch {
    fn default() -> Self {
        RunningMatch::StatusSubstring {
            pattern: default_running_pattern(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSettings {
    /// HTTP endpoint probed for readiness. Without it, readiness is the
    /// container-running check alone.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_ready_statuses")]
    pub ready_statuses: Vec<u16>,
    #[serde(default)]
    pub running_match: RunningMatch,
}

fn default_health_timeout() -> u64 {
    60
}

fn default_health_interval() -> u64 {
    3
}

fn default_ready_statuses() -> Vec<u16> {
    vec![200, 301, 302]
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_health_timeout(),
            interval_secs: default_health_interval(),
            ready_statuses: default_ready_statuses(),
            running_match: RunningMatch::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[serde(skip_deserializing, default)]
    pub id: String,
    pub server_id: String,
    /// Directory on the remote host that holds the workload's files.
    pub deploy_root: String,
    /// Container name used for status listing and log tailing.
    pub container: String,
    #[serde(default = "default_compose_file")]
    pub compose_file: String,
    /// Optional compose service to scope stop/build/up to.
    #[serde(default)]
    pub service: Option<String>,
    /// State subdirectories ensured under the deploy root before each run.
    #[serde(default)]
    pub state_dirs: Vec<String>,
    #[serde(default)]
    pub manifest: Vec<ManifestEntry>,
    #[serde(default = "default_engine_candidates")]
    pub engine_candidates: Vec<ToolCandidate>,
    #[serde(default = "default_compose_candidates")]
    pub compose_candidates: Vec<ToolCandidate>,
    #[serde(default = "default_elevation_command")]
    pub elevation_command: String,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: u32,
}

fn default_compose_file() -> String {
    "docker-compose.yml".to_string()
}

fn default_elevation_command() -> String {
    "sudo -n".to_string()
}

fn default_log_tail_lines() -> u32 {
    50
}

pub fn default_engine_candidates() -> Vec<ToolCandidate> {
    vec![
        ToolCandidate::new("docker", "docker"),
        ToolCandidate::new("podman", "podman"),
        ToolCandidate::new("docker (system path)", "/usr/local/bin/docker"),
    ]
}

pub fn default_compose_candidates() -> Vec<ToolCandidate> {
    vec![
        ToolCandidate::new("docker-compose", "docker-compose"),
        ToolCandidate::new("docker compose plugin", "docker compose"),
    ]
}

impl Target {
    pub fn validate(&self) -> Result<()> {
        if self.deploy_root.trim().is_empty() {
            return Err(Error::config_invalid_value(
                "deployRoot",
                None,
                "Deploy root must not be empty",
            ));
        }
        if self.container.trim().is_empty() {
            return Err(Error::config_invalid_value(
                "container",
                None,
                "Container name must not be empty",
            ));
        }
        Ok(())
    }
}

impl ConfigEntity for Target {
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn config_path(id: &str) -> Result<PathBuf> {
        paths::target(id)
    }
    fn config_dir() -> Result<PathBuf> {
        paths::targets()
    }
    fn not_found_error(id: String) -> Error {
        Error::target_not_found(id)
    }
    fn entity_type() -> &'static str {
        "target"
    }
}

// ============================================================================
// Core CRUD - Thin wrappers around config module
// ============================================================================

pub fn load(id: &str) -> Result<Target> {
    config::load::<Target>(id)
}

pub fn list() -> Result<Vec<Target>> {
    config::list::<Target>()
}

pub fn save(target: &Target) -> Result<()> {
    target.validate()?;
    config::save(target)
}

pub fn delete(id: &str) -> Result<()> {
    config::delete::<Target>(id)
}

pub fn exists(id: &str) -> bool {
    config::exists::<Target>(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_target_gets_defaults() {
        let target: Target = serde_json::from_str(
            r#"{"serverId": "prod", "deployRoot": "/srv/app", "container": "app"}"#,
        )
        .unwrap();

        assert_eq!(target.compose_file, "docker-compose.yml");
        assert_eq!(target.elevation_command, "sudo -n");
        assert_eq!(target.engine_candidates.len(), 3);
        assert_eq!(target.compose_candidates.len(), 2);
        assert_eq!(target.health.timeout_secs, 60);
        assert_eq!(target.health.ready_statuses, vec![200, 301, 302]);
        assert!(matches!(
            target.health.running_match,
            RunningMatch::StatusSubstring { ref pattern } if pattern == "Up"
        ));
        assert_eq!(target.log_tail_lines, 50);
        assert!(target.state_dirs.is_empty());
        assert!(target.manifest.is_empty());
    }

    #[test]
    fn running_match_policy_is_configurable() {
        let target: Target = serde_json::from_str(
            r#"{
                "serverId": "prod",
                "deployRoot": "/srv/app",
                "container": "app",
                "health": {"runningMatch": {"policy": "psQuiet"}}
            }"#,
        )
        .unwrap();
        assert!(matches!(target.health.running_match, RunningMatch::PsQuiet));
    }

    #[test]
    fn validation_rejects_empty_deploy_root() {
        let target: Target = serde_json::from_str(
            r#"{"serverId": "prod", "deployRoot": " ", "container": "app"}"#,
        )
        .unwrap();
        assert!(target.validate().is_err());
    }
}
