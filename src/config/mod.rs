//! Configuration Management
//!
//! This module loads and saves named connection strings.
//!
//! # Configuration Locations
//! - Local: `.sqlcommand/config.json` (team-shareable, per-project)
//! - Global: `~/.config/sqlcommand/connections.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Local config file (`.sqlcommand/config.json`)
//! 2. Global config file (`~/.config/sqlcommand/connections.json`)
//!
//! # Named Connection Strings
//! Entries are keyed by name. When no name is given the settings' `default`
//! is used, and failing that the entry called `ConnectionString`.
//!
//! ```json
//! {
//!   "connection_strings": {
//!     "ConnectionString": { "value": "Data Source=app.db" },
//!     "reporting": { "env": "REPORTING_DB" }
//!   },
//!   "default": "ConnectionString",
//!   "command_timeout": 60
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DataError, Result};

/// Name looked up when neither the caller nor the settings pick one
pub const DEFAULT_CONNECTION_NAME: &str = "ConnectionString";

/// Settings file contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSettings {
    /// Named connection strings
    #[serde(default)]
    pub connection_strings: HashMap<String, StoredConnectionString>,

    /// Name of the default connection string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Timeout in seconds for commands built from these settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout: Option<u32>,
}

/// Stored connection string
///
/// Either the literal value or the name of an environment variable holding
/// it, so credentials can stay out of the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConnectionString {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Environment variable read instead of `value`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

impl StoredConnectionString {
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self { value: Some(value.into()), env: None }
    }

    #[must_use]
    pub fn from_env(variable: impl Into<String>) -> Self {
        Self { value: None, env: Some(variable.into()) }
    }

    /// Resolve the environment variable (if any) and return the connection string
    pub fn resolve(&self) -> Result<String> {
        if let Some(variable) = &self.env {
            return std::env::var(variable).map_err(|_| {
                DataError::config(format!(
                    "Environment variable {variable} not found for connection string"
                ))
            });
        }
        self.value.clone().ok_or_else(|| {
            DataError::config("Connection string entry has neither 'value' nor 'env'")
        })
    }
}

impl DataSettings {
    /// Resolve a connection string by name
    ///
    /// `None` falls back to `default`, then to [`DEFAULT_CONNECTION_NAME`].
    pub fn connection_string(&self, name: Option<&str>) -> Result<String> {
        let name = name
            .or(self.default.as_deref())
            .unwrap_or(DEFAULT_CONNECTION_NAME);

        let stored = self.connection_strings.get(name).ok_or_else(|| {
            let mut available: Vec<_> = self.connection_strings.keys().collect();
            available.sort();
            DataError::config(format!(
                "Connection string '{name}' not found. Available connection strings: {available:?}"
            ))
        })?;

        stored.resolve()
    }

    /// Overlay `local` onto `self`: local entries replace global ones with the
    /// same name, and local `default`/`command_timeout` win when set
    #[must_use]
    pub fn merged_with(mut self, local: Self) -> Self {
        self.connection_strings.extend(local.connection_strings);
        if local.default.is_some() {
            self.default = local.default;
        }
        if local.command_timeout.is_some() {
            self.command_timeout = local.command_timeout;
        }
        self
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Local config: `.sqlcommand/config.json` (team-shareable)
    Local,
    /// Global config: `~/.config/sqlcommand/connections.json` (per-user)
    Global,
}

impl ConfigLocation {
    pub fn path(self) -> Result<PathBuf> {
        match self {
            Self::Local => local_config_path(),
            Self::Global => global_config_path(),
        }
    }
}

/// Get path to local config file (`.sqlcommand/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        DataError::config(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".sqlcommand").join("config.json"))
}

/// Get path to global config file (`~/.config/sqlcommand/connections.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| DataError::config("Could not determine user config directory"))?;

    Ok(config_dir.join("sqlcommand").join("connections.json"))
}

/// Load settings from a config file; a missing file yields empty settings
pub fn load_settings(path: &Path) -> Result<DataSettings> {
    if !path.exists() {
        return Ok(DataSettings::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| DataError::config(format!("Could not read config file: {e}")))?;

    serde_json::from_str(&contents)
        .map_err(|e| DataError::config(format!("Invalid config file format: {e}")))
}

/// Save settings to a config file, creating its directory if needed
pub fn save_settings(path: &Path, settings: &DataSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            DataError::config(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(settings)
        .map_err(|e| DataError::config(format!("Could not serialize config: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| DataError::config(format!("Could not write config file: {e}")))
}

/// Load settings with precedence (local over global)
pub fn load_with_precedence() -> Result<DataSettings> {
    load_with_precedence_from(&global_config_path()?, &local_config_path()?)
}

/// Load the files at `global` and `local`, entries in `local` winning
pub fn load_with_precedence_from(global: &Path, local: &Path) -> Result<DataSettings> {
    Ok(load_settings(global)?.merged_with(load_settings(local)?))
}

/// Resolve a named connection string from the merged local and global settings
pub fn resolve_connection_string(name: Option<&str>) -> Result<String> {
    load_with_precedence()?.connection_string(name)
}

/// Add or replace a named connection string in the file at `location`
///
/// The first entry saved to a file becomes its default.
pub fn save_connection_string(
    name: &str,
    stored: StoredConnectionString,
    location: ConfigLocation,
) -> Result<()> {
    save_connection_string_to(&location.path()?, name, stored)
}

/// [`save_connection_string`] against an explicit config file
pub fn save_connection_string_to(
    path: &Path,
    name: &str,
    stored: StoredConnectionString,
) -> Result<()> {
    let mut settings = load_settings(path)?;

    if settings.default.is_none() && settings.connection_strings.is_empty() {
        settings.default = Some(name.to_string());
    }
    settings.connection_strings.insert(name.to_string(), stored);

    save_settings(path, &settings)
}
