//! Configuration Management
//!
//! This module handles loading and saving named database roles.
//!
//! # Configuration Locations
//! - Local: `.dbconnect/config.json` (team-shareable, per-project)
//! - Global: `~/.config/dbconnect/connections.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Local config file (`.dbconnect/config.json`)
//! 2. Global config file (`~/.config/dbconnect/connections.json`)
//!
//! Local roles replace global roles of the same name; a local `default`
//! or `settings` block replaces the global one.
//!
//! # File Format
//! ```json
//! {
//!   "roles": {
//!     "caldav": {
//!       "backend": "postgres",
//!       "endpoint": "unix:/var/run/postgresql",
//!       "user": "caldav",
//!       "password_env": "CALDAV_DB_PASSWORD",
//!       "database": "caldav"
//!     }
//!   },
//!   "default": "caldav",
//!   "settings": { "statement_timeout_ms": 30000 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::connector::{ConnectorFactory, ConnectorSettings};
use crate::driver::DriverKind;
use crate::endpoint::{ConnectOptions, REDACTED};
use crate::error::{DbConnectError, Result};

/// One config file's contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Named roles
    #[serde(default)]
    pub roles: BTreeMap<String, StoredRole>,

    /// Name of the default role (must exist in `roles`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<ConnectorSettings>,
}

/// Stored role
///
/// The password is either stored directly or read from `password_env` when
/// the role is resolved.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRole {
    /// `postgres` or `oracle`
    pub backend: String,

    /// `unix:<path>` or `tcp:<host>[:<port>]`
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable name for password (if not storing password directly)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Postgres driver family override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverKind>,
}

impl fmt::Debug for StoredRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredRole")
            .field("backend", &self.backend)
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("password_env", &self.password_env)
            .field("database", &self.database)
            .field("driver", &self.driver)
            .finish()
    }
}

impl StoredRole {
    pub fn new(backend: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            endpoint: endpoint.into(),
            user: None,
            password: None,
            password_env: None,
            database: None,
            driver: None,
        }
    }

    /// Resolve environment variables into connect options
    pub fn resolve(&self, name: &str) -> Result<ResolvedRole> {
        let mut options = ConnectOptions::new(self.endpoint.clone());
        options.user = self.user.clone();
        options.database = self.database.clone();
        options.password = self.password.clone();

        if let Some(env_var) = &self.password_env {
            let password = std::env::var(env_var).map_err(|_| {
                DbConnectError::config_error(format!(
                    "Environment variable {env_var} not found for password of role '{name}'"
                ))
            })?;
            options.password = Some(password);
        }

        Ok(ResolvedRole {
            name: name.to_string(),
            backend: self.backend.clone(),
            driver: self.driver,
            options,
        })
    }
}

/// Role with its password resolved, ready to build a connector from
///
/// `Debug` goes through `ConnectOptions`, which hides the password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRole {
    pub name: String,
    pub backend: String,
    pub driver: Option<DriverKind>,
    pub options: ConnectOptions,
}

impl ResolvedRole {
    /// Apply this role's driver override to `factory`
    #[must_use]
    pub fn configure(&self, factory: ConnectorFactory) -> ConnectorFactory {
        match self.driver {
            Some(kind) => factory.postgres_driver(kind),
            None => factory,
        }
    }
}

/// Role listing entry (no secrets)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSummary {
    pub name: String,
    pub backend: String,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub is_default: bool,
}

impl RoleConfig {
    /// Connector settings, falling back to defaults
    pub fn effective_settings(&self) -> ConnectorSettings {
        self.settings.clone().unwrap_or_default()
    }

    /// Overlay `local` on top of `self`
    #[must_use]
    pub fn merged_with(mut self, local: Self) -> Self {
        self.roles.extend(local.roles);
        if local.default.is_some() {
            self.default = local.default;
        }
        if local.settings.is_some() {
            self.settings = local.settings;
        }
        self
    }

    /// Resolve a role by name, or the default role when `name` is `None`
    pub fn resolve(&self, name: Option<&str>) -> Result<ResolvedRole> {
        let role_name = match name {
            Some(n) => n,
            None => self.default.as_deref().ok_or_else(|| {
                let available: Vec<_> = self.roles.keys().collect();
                DbConnectError::config_error(format!(
                    "No default role set. Available roles: {available:?}. \
                     Specify one with --role or set a default in the config."
                ))
            })?,
        };

        let stored = self.roles.get(role_name).ok_or_else(|| {
            let available: Vec<_> = self.roles.keys().collect();
            DbConnectError::config_error(format!(
                "Role '{role_name}' not found. Available roles: {available:?}"
            ))
        })?;

        stored.resolve(role_name)
    }

    /// Insert or replace a role; the first role saved becomes the default
    pub fn insert(&mut self, name: impl Into<String>, role: StoredRole) {
        let name = name.into();
        if self.roles.is_empty() && self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.roles.insert(name, role);
    }

    pub fn summaries(&self) -> Vec<RoleSummary> {
        self.roles
            .iter()
            .map(|(name, role)| RoleSummary {
                name: name.clone(),
                backend: role.backend.clone(),
                endpoint: role.endpoint.clone(),
                user: role.user.clone(),
                database: role.database.clone(),
                is_default: self.default.as_deref() == Some(name.as_str()),
            })
            .collect()
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Local config: `.dbconnect/config.json` (team-shareable)
    Local,
    /// Global config: `~/.config/dbconnect/connections.json` (per-user)
    Global,
}

/// Get path to local config file (`.dbconnect/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        DbConnectError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".dbconnect").join("config.json"))
}

/// Get path to global config file (`~/.config/dbconnect/connections.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| DbConnectError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("dbconnect").join("connections.json"))
}

pub fn config_path(location: ConfigLocation) -> Result<PathBuf> {
    match location {
        ConfigLocation::Local => local_config_path(),
        ConfigLocation::Global => global_config_path(),
    }
}

/// Load one config file; a missing file is an empty config
pub fn load_config(path: &Path) -> Result<RoleConfig> {
    if !path.exists() {
        return Ok(RoleConfig::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| DbConnectError::config_error(format!("Could not read config file: {e}")))?;

    serde_json::from_str(&contents).map_err(|e| {
        DbConnectError::config_error(format!(
            "Invalid config file format in {}: {e}",
            path.display()
        ))
    })
}

/// Save one config file, creating its directory
pub fn save_config(path: &Path, config: &RoleConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            DbConnectError::config_error(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(config)
        .map_err(|e| DbConnectError::config_error(format!("Could not serialize config: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| DbConnectError::config_error(format!("Could not write config file: {e}")))?;

    tracing::debug!(path = %path.display(), "config saved");
    Ok(())
}

/// Merged view of `global` overlaid with `local`
pub fn load_from_paths(local: &Path, global: &Path) -> Result<RoleConfig> {
    let global_config = load_config(global)?;
    let local_config = load_config(local)?;
    Ok(global_config.merged_with(local_config))
}

/// Load roles with precedence (local first, then global)
pub fn load_with_precedence() -> Result<RoleConfig> {
    load_from_paths(&local_config_path()?, &global_config_path()?)
}

/// Save a role to the local or global config file
pub fn save_role(name: &str, role: StoredRole, location: ConfigLocation) -> Result<PathBuf> {
    let path = config_path(location)?;
    save_role_at(&path, name, role)?;
    Ok(path)
}

pub fn save_role_at(path: &Path, name: &str, role: StoredRole) -> Result<()> {
    let mut config = load_config(path)?;
    config.insert(name, role);
    save_config(path, &config)
}

/// List all roles from the merged view
pub fn list_roles() -> Result<Vec<RoleSummary>> {
    Ok(load_with_precedence()?.summaries())
}
