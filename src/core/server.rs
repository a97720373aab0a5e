use crate::config::{self, ConfigEntity};
use crate::error::{Error, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    #[serde(skip_deserializing, default)]
    pub id: String,
    pub host: String,
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub identity_file: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    300
}

impl Server {
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty() && !self.user.is_empty()
    }

    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.host.is_empty() {
            missing.push("host".to_string());
        }
        if self.user.is_empty() {
            missing.push("user".to_string());
        }
        missing
    }
}

impl ConfigEntity for Server {
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn config_path(id: &str) -> Result<PathBuf> {
        paths::server(id)
    }
    fn config_dir() -> Result<PathBuf> {
        paths::servers()
    }
    fn not_found_error(id: String) -> Error {
        Error::server_not_found(id)
    }
    fn entity_type() -> &'static str {
        "server"
    }
}

// ============================================================================
// Core CRUD - Thin wrappers around config module
// ============================================================================

pub fn load(id: &str) -> Result<Server> {
    config::load::<Server>(id)
}

pub fn list() -> Result<Vec<Server>> {
    config::list::<Server>()
}

pub fn save(server: &Server) -> Result<()> {
    if !server.is_valid() {
        return Err(Error::ssh_server_invalid(
            server.id.clone(),
            server.missing_fields(),
        ));
    }
    config::save(server)
}

pub fn delete(id: &str) -> Result<()> {
    config::delete::<Server>(id)
}

pub fn exists(id: &str) -> bool {
    config::exists::<Server>(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied_on_deserialize() {
        let server: Server =
            serde_json::from_str(r#"{"host": "example.com", "user": "deploy"}"#).unwrap();
        assert_eq!(server.port, 22);
        assert_eq!(server.connect_timeout_secs, 10);
        assert_eq!(server.command_timeout_secs, 300);
        assert!(server.identity_file.is_none());
    }

    #[test]
    fn missing_fields_reported() {
        let server: Server = serde_json::from_str(r#"{"host": "", "user": ""}"#).unwrap();
        assert!(!server.is_valid());
        assert_eq!(server.missing_fields(), vec!["host", "user"]);
    }
}
