//! Startup configuration loading.
//!
//! # Responsibility
//! - Parse the TOML configuration file into an `AppConfig` value.
//! - Apply `TODO_*` environment overrides on top of the file layer.
//!
//! # Invariants
//! - Configuration is loaded once at startup and read-only afterwards; it is
//!   passed explicitly to whoever needs it.
//! - Role credentials never appear in `Debug` output.

use crate::logging::default_log_level;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};

/// Name of the role whose entry carries the bootstrap admin credentials.
pub const ADMIN_ROLE: &str = "Admin";

const DEFAULT_DATABASE_FILE: &str = "todo.sqlite3";

pub const ENV_DATABASE_PATH: &str = "TODO_DATABASE_PATH";
pub const ENV_LOG_LEVEL: &str = "TODO_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "TODO_LOG_DIR";
pub const ENV_ADMIN_EMAIL: &str = "TODO_ADMIN_EMAIL";
pub const ENV_ADMIN_PASSWORD: &str = "TODO_ADMIN_PASSWORD";

/// Bootstrap record for one configured role.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl RoleConfig {
    /// Whether both bootstrap credentials are present.
    pub fn has_credentials(&self) -> bool {
        !self.email.trim().is_empty() && !self.password.trim().is_empty()
    }
}

impl Debug for RoleConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let password = if self.password.is_empty() {
            "<empty>"
        } else {
            "<redacted>"
        };
        f.debug_struct("RoleConfig")
            .field("role", &self.role)
            .field("email", &self.email)
            .field("password", &password)
            .finish()
    }
}

/// Role name to bootstrap record, in deterministic order.
pub type RoleConfigMap = BTreeMap<String, RoleConfig>;

/// Whole-process configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_level")]
    pub log_level: String,
    /// Rolling log file directory; logs go to stderr when absent.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// `None` when the file has no `[roles]` section at all.
    #[serde(default)]
    pub roles: Option<RoleConfigMap>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            log_level: default_level(),
            log_dir: None,
            roles: None,
        }
    }
}

impl AppConfig {
    /// Returns the role section, failing when it is absent or empty.
    pub fn require_roles(&self) -> Result<&RoleConfigMap, ConfigError> {
        match self.roles.as_ref() {
            Some(roles) if !roles.is_empty() => Ok(roles),
            _ => Err(ConfigError::MissingRoles),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_FILE)
}

fn default_level() -> String {
    default_log_level().to_string()
}

/// Configuration loading errors.
#[derive(Debug)]
pub enum ConfigError {
    /// File could not be read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// File is not valid TOML for `AppConfig`.
    Parse { path: PathBuf, message: String },
    /// No role section is configured.
    MissingRoles,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            Self::Parse { path, message } => {
                write!(f, "failed to parse {}: {message}", path.display())
            }
            Self::MissingRoles => write!(f, "configuration has no `roles` section"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { .. } | Self::MissingRoles => None,
        }
    }
}

/// Reads `path`, parses it and applies process environment overrides.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = parse_config(&contents).map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parses configuration text without touching the environment.
pub fn parse_config(contents: &str) -> Result<AppConfig, String> {
    toml::from_str(contents).map_err(|err| err.to_string())
}

/// Applies `TODO_*` overrides from the process environment.
pub fn apply_env_overrides(config: &mut AppConfig) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Applies overrides from an arbitrary key lookup.
///
/// Blank values are ignored. Admin credential overrides only apply when an
/// `Admin` role entry exists, so they can never stand in for a missing
/// role section.
pub fn apply_overrides_from(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let value = |key: &str| {
        lookup(key)
            .map(|raw| raw.trim().to_string())
            .filter(|trimmed| !trimmed.is_empty())
    };

    if let Some(path) = value(ENV_DATABASE_PATH) {
        config.database_path = PathBuf::from(path);
    }
    if let Some(level) = value(ENV_LOG_LEVEL) {
        config.log_level = level;
    }
    if let Some(dir) = value(ENV_LOG_DIR) {
        config.log_dir = Some(PathBuf::from(dir));
    }

    let email = value(ENV_ADMIN_EMAIL);
    let password = value(ENV_ADMIN_PASSWORD);
    if email.is_none() && password.is_none() {
        return;
    }
    let admin = config.roles.as_mut().and_then(|roles| {
        let key = roles
            .keys()
            .find(|name| name.as_str() == ADMIN_ROLE)
            .or_else(|| {
                roles
                    .keys()
                    .find(|name| name.trim().eq_ignore_ascii_case(ADMIN_ROLE))
            })?
            .clone();
        roles.get_mut(&key)
    });
    match admin {
        Some(admin) => {
            if let Some(email) = email {
                admin.email = email;
            }
            if let Some(password) = password {
                admin.password = password;
            }
        }
        None => warn!(
            "event=config_override module=config status=skip reason=no_admin_role keys={ENV_ADMIN_EMAIL},{ENV_ADMIN_PASSWORD}"
        ),
    }
}
