use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Base dockhand config directory (universal ~/.config/dockhand/ on all platforms)
pub fn dockhand() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("dockhand"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("dockhand"))
    }
}

/// Servers directory
pub fn servers() -> Result<PathBuf> {
    Ok(dockhand()?.join("servers"))
}

/// Targets directory
pub fn targets() -> Result<PathBuf> {
    Ok(dockhand()?.join("targets"))
}

/// Server config file path
pub fn server(id: &str) -> Result<PathBuf> {
    Ok(servers()?.join(format!("{}.json", id)))
}

/// Target config file path
pub fn target(id: &str) -> Result<PathBuf> {
    Ok(targets()?.join(format!("{}.json", id)))
}
