//! Configuration types and parsing for tidemark.yml

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "tidemark.yml";

/// Environment variable overriding `database.path`
pub const ENV_DATABASE: &str = "TIDEMARK_DATABASE";

/// Environment variable overriding `actor`
pub const ENV_ACTOR: &str = "TIDEMARK_ACTOR";

/// Main project configuration from tidemark.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name
    pub name: String,

    /// Directory holding migration SQL files, relative to the project root
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: String,

    /// Directory of the filesystem artifact store, relative to the project root
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,

    /// Identity recorded in the ledger (falls back to $USER)
    #[serde(default)]
    pub actor: Option<String>,

    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Migration lock settings
    #[serde(default)]
    pub lock: LockConfig,

    /// Execution settings
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Artifact signing settings
    #[serde(default)]
    pub signing: SigningConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database file path, or `:memory:`
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Migration lock settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// Lock key shared by every process migrating this database
    #[serde(default = "default_lock_key")]
    pub key: String,

    /// Upper bound on a single non-blocking acquisition attempt
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Lease after which a lock left behind by a dead process may be taken over
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            key: default_lock_key(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            lease_secs: default_lease_secs(),
        }
    }
}

/// Execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Bound on the executing phase of one apply or rollback
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Dispatch same-category units concurrently
    #[serde(default)]
    pub parallel: bool,

    /// Maximum concurrently dispatched units when `parallel` is set
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            parallel: false,
            max_parallel: default_max_parallel(),
        }
    }
}

/// Artifact signing settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningConfig {
    /// File holding the base58 Ed25519 signing seed
    #[serde(default)]
    pub key_path: Option<String>,

    /// Base58 Ed25519 public key used to verify artifacts
    #[serde(default)]
    pub public_key: Option<String>,
}

impl SigningConfig {
    /// Whether a security provider should be configured
    pub fn is_enabled(&self) -> bool {
        self.key_path.is_some() || self.public_key.is_some()
    }
}

fn default_migrations_dir() -> String {
    "migrations".to_string()
}

fn default_artifact_dir() -> String {
    ".tidemark/artifacts".to_string()
}

fn default_db_path() -> String {
    "tidemark.duckdb".to_string()
}

fn default_lock_key() -> String {
    "tidemark_migration_lock".to_string()
}

fn default_acquire_timeout_ms() -> u64 {
    5_000
}

fn default_lease_secs() -> u64 {
    3_600
}

fn default_max_parallel() -> usize {
    4
}

impl Config {
    /// Load configuration from a file path, applying environment overrides
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        log::debug!("Loading configuration from {}", path.display());
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load `tidemark.yml` from a project directory
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        Self::load(&dir.join(CONFIG_FILE_NAME))
    }

    /// Parse YAML content without environment overrides or validation
    pub fn parse(content: &str) -> CoreResult<Self> {
        serde_yaml::from_str(content).map_err(|e| CoreError::ConfigParseError {
            message: e.to_string(),
        })
    }

    /// Apply `TIDEMARK_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(ENV_DATABASE) {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(actor) = std::env::var(ENV_ACTOR) {
            if !actor.is_empty() {
                self.actor = Some(actor);
            }
        }
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "name must not be empty".to_string(),
            });
        }
        if self.lock.key.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "lock.key must not be empty".to_string(),
            });
        }
        if self.lock.acquire_timeout_ms == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "lock.acquire_timeout_ms must be greater than 0".to_string(),
            });
        }
        if self.lock.lease_secs == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "lock.lease_secs must be greater than 0".to_string(),
            });
        }
        if self.execution.max_parallel == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "execution.max_parallel must be at least 1".to_string(),
            });
        }
        if self.execution.timeout_secs == Some(0) {
            return Err(CoreError::ConfigInvalid {
                message: "execution.timeout_secs must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Identity recorded in the ledger
    pub fn actor(&self) -> String {
        self.actor
            .clone()
            .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Absolute migrations directory
    pub fn migrations_path(&self, root: &Path) -> PathBuf {
        root.join(&self.migrations_dir)
    }

    /// Absolute artifact store directory
    pub fn artifact_path(&self, root: &Path) -> PathBuf {
        root.join(&self.artifact_dir)
    }

    /// Database path; relative file paths resolve against the project root
    pub fn database_path(&self, root: &Path) -> String {
        if self.database.path == ":memory:" || Path::new(&self.database.path).is_absolute() {
            self.database.path.clone()
        } else {
            root.join(&self.database.path).display().to_string()
        }
    }

    /// Lock acquisition bound
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock.acquire_timeout_ms)
    }

    /// Lock lease
    pub fn lock_lease(&self) -> Duration {
        Duration::from_secs(self.lock.lease_secs)
    }

    /// Execution timeout, if configured
    pub fn execution_timeout(&self) -> Option<Duration> {
        self.execution.timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
