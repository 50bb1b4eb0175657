//! Configuration management for sqlgate.
//!
//! Handles loading configuration from TOML files, with named database
//! connections, the danger keyword policy, and audit log settings.

use crate::db::DatabaseBackend;
use crate::error::{Result, SqlGateError};
use crate::safety::{DangerKeywordConfig, MatchMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "SQLGATE_CONFIG";

/// File name searched for beside the executable and in the working directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Default audit file size cap (10 MiB).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Named database connections: name -> connection URL.
    #[serde(default)]
    pub connections: BTreeMap<String, String>,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Directory of the loaded file; relative paths resolve against it.
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

/// Danger keyword and confirmation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_danger_keywords")]
    pub danger_keywords: Vec<String>,

    /// "whole_text" or "tokens"; anything else falls back to whole_text.
    #[serde(default)]
    pub danger_keyword_match: Option<String>,

    #[serde(default = "default_true")]
    pub require_confirm_for_ddl: bool,

    #[serde(default)]
    pub confirm_method: ConfirmMethod,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            danger_keywords: default_danger_keywords(),
            danger_keyword_match: None,
            require_confirm_for_ddl: true,
            confirm_method: ConfirmMethod::default(),
        }
    }
}

/// How a human is asked to confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmMethod {
    /// Native desktop dialog.
    #[default]
    Dialog,
    /// Prompt on the controlling terminal.
    Terminal,
    /// Reject everything that needs confirmation.
    Reject,
}

/// Audit and diagnostic logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_true")]
    pub audit_log: bool,

    #[serde(default = "default_true")]
    pub verbose_logging: bool,

    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            audit_log: true,
            verbose_logging: true,
            log_file: default_log_file(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

fn default_danger_keywords() -> Vec<String> {
    ["truncate", "drop", "alter system", "shutdown", "grant dba", "delete"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_log_file() -> PathBuf {
    PathBuf::from("audit.log")
}

fn default_max_file_bytes() -> u64 {
    DEFAULT_MAX_FILE_BYTES
}

/// A configured database target.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub name: String,
    pub url: String,
    pub backend: DatabaseBackend,
}

impl ConnectionTarget {
    /// Parses and validates a named connection URL.
    pub fn parse(name: &str, url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| {
            SqlGateError::config(format!("Invalid connection URL for '{name}': {e}"))
        })?;

        let backend = DatabaseBackend::from_scheme(parsed.scheme()).ok_or_else(|| {
            SqlGateError::config(format!(
                "Unsupported scheme '{}' for connection '{name}'. Expected postgres, mysql, mariadb or sqlite",
                parsed.scheme()
            ))
        })?;

        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            backend,
        })
    }

    /// Returns the URL with any password masked, for logs and messages.
    pub fn display_string(&self) -> String {
        match Url::parse(&self.url) {
            Ok(mut url) if url.password().is_some() => {
                // set_password only fails for cannot-be-a-base URLs, which have no password.
                let _ = url.set_password(Some("****"));
                url.to_string()
            }
            Ok(url) => url.to_string(),
            Err(_) => "<invalid url>".to_string(),
        }
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("name", &self.name)
            .field("url", &self.display_string())
            .field("backend", &self.backend)
            .finish()
    }
}

impl Config {
    /// Returns the per-user config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sqlgate")
            .join(CONFIG_FILE_NAME)
    }

    /// Candidate config files in lookup order (explicit path first).
    pub fn candidate_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(path) = explicit {
            candidates.push(path.to_path_buf());
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                candidates.push(PathBuf::from(path));
            }
        }
        if let Some(dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            candidates.push(dir.join(CONFIG_FILE_NAME));
        }
        candidates.push(PathBuf::from(CONFIG_FILE_NAME));
        candidates.push(Self::default_path());
        candidates
    }

    /// Loads the first configuration file found.
    ///
    /// An explicit path must exist; otherwise the built-in defaults are used
    /// when no candidate exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(SqlGateError::config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
        }

        match Self::candidate_paths(explicit)
            .into_iter()
            .find(|path| path.is_file())
        {
            Some(path) => Self::load_from_file(&path),
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SqlGateError::config(format!("Failed to read config file: {e}")))?;

        let mut config = Self::parse_toml(&content, path)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            SqlGateError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Checks the settings needed to serve requests.
    pub fn validate(&self) -> Result<()> {
        if self.connections.is_empty() {
            return Err(SqlGateError::config(
                "At least one connection must be configured under [connections]",
            ));
        }
        if self.logging.max_file_bytes == 0 {
            return Err(SqlGateError::config("logging.max_file_bytes must be greater than 0"));
        }
        self.targets().map(|_| ())
    }

    /// Parsed connection targets, ordered by name.
    pub fn targets(&self) -> Result<Vec<ConnectionTarget>> {
        self.connections
            .iter()
            .map(|(name, url)| ConnectionTarget::parse(name, url))
            .collect()
    }

    /// The normalized danger keyword policy.
    pub fn danger_keywords(&self) -> DangerKeywordConfig {
        DangerKeywordConfig::new(
            &self.security.danger_keywords,
            MatchMode::from_config(self.security.danger_keyword_match.as_deref()),
        )
    }

    /// Audit file base path; relative paths resolve against the config file's directory.
    pub fn audit_log_path(&self) -> PathBuf {
        let path = &self.logging.log_file;
        match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.clone(),
        }
    }
}
