//! Generic JSON-backed config entity storage.
//!
//! Entities live as one pretty-printed JSON file per id under their
//! entity-type directory; the id comes from the filename, never the file body.

use crate::error::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;

pub trait ConfigEntity: Serialize + DeserializeOwned {
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn config_path(id: &str) -> Result<PathBuf>;
    fn config_dir() -> Result<PathBuf>;
    fn not_found_error(id: String) -> Error;
    fn entity_type() -> &'static str;
}

pub fn load<T: ConfigEntity>(id: &str) -> Result<T> {
    let path = T::config_path(id)?;
    if !path.exists() {
        return Err(T::not_found_error(id.to_string()));
    }

    let content = std::fs::read_to_string(&path).map_err(|e| {
        Error::internal_io(
            e.to_string(),
            Some(format!("read {} config", T::entity_type())),
        )
    })?;

    let mut entity: T = serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))?;
    entity.set_id(id.to_string());
    Ok(entity)
}

pub fn save<T: ConfigEntity>(entity: &T) -> Result<()> {
    let dir = T::config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| {
        Error::internal_io(
            e.to_string(),
            Some(format!("create {} config dir", T::entity_type())),
        )
    })?;

    let path = T::config_path(entity.id())?;
    let content = serde_json::to_string_pretty(entity)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize config".to_string())))?;

    std::fs::write(&path, content).map_err(|e| {
        Error::internal_io(
            e.to_string(),
            Some(format!("write {} config", T::entity_type())),
        )
    })
}

pub fn list<T: ConfigEntity>() -> Result<Vec<T>> {
    let dir = T::config_dir()?;
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(&dir).map_err(|e| {
        Error::internal_io(
            e.to_string(),
            Some(format!("list {} configs", T::entity_type())),
        )
    })?;

    let mut items = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        items.push(load::<T>(id)?);
    }

    items.sort_by(|a, b| a.id().cmp(b.id()));
    Ok(items)
}

pub fn delete<T: ConfigEntity>(id: &str) -> Result<()> {
    let path = T::config_path(id)?;
    if !path.exists() {
        return Err(T::not_found_error(id.to_string()));
    }

    std::fs::remove_file(&path).map_err(|e| {
        Error::internal_io(
            e.to_string(),
            Some(format!("delete {} config", T::entity_type())),
        )
    })
}

pub fn exists<T: ConfigEntity>(id: &str) -> bool {
    T::config_path(id).map(|p| p.exists()).unwrap_or(false)
}
