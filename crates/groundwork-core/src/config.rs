//! Bootstrap configuration
//!
//! Values are layered: built-in defaults, then an optional TOML file, then the
//! process environment (including a `.env` file), then whatever the caller sets
//! through the `with_*` builders.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BootstrapError, Result};

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "groundwork.toml";

/// Default durable-storage directory
pub const DEFAULT_STORAGE_ROOT: &str = "data";

/// Default log directory
pub const DEFAULT_LOG_ROOT: &str = "logs";

/// Default store file name inside the storage root
pub const DEFAULT_STORE_FILE: &str = "store";

/// Default startup window in milliseconds
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 30_000;

/// Main bootstrap configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundworkConfig {
    /// Durable-storage directory
    pub storage_root: PathBuf,

    /// Log directory
    pub log_root: PathBuf,

    /// Upper bound on the whole bootstrap, in milliseconds
    pub startup_timeout_ms: u64,

    /// Store configuration
    pub store: StoreSettings,

    /// Logging configuration
    pub logging: LogSettings,
}

impl Default for GroundworkConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            log_root: PathBuf::from(DEFAULT_LOG_ROOT),
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
            store: StoreSettings::default(),
            logging: LogSettings::default(),
        }
    }
}

impl GroundworkConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the storage root
    pub fn with_storage_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_root = path.into();
        self
    }

    /// Set the log root
    pub fn with_log_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_root = path.into();
        self
    }

    /// Set the startup timeout
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the migrations directory
    pub fn with_migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store.migrations_dir = Some(dir.into());
        self
    }

    /// Startup window as a `Duration`
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BootstrapError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve the full configuration: defaults, file, `.env` and environment.
    ///
    /// With `path = None`, `groundwork.toml` in the working directory is used if
    /// it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };

        dotenvy::dotenv().ok();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GROUNDWORK_DATA_DIR") {
            self.storage_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("GROUNDWORK_LOG_DIR") {
            self.log_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("GROUNDWORK_STORE_FILE") {
            self.store.file_name = v;
        }
        if let Some(v) = lookup("GROUNDWORK_MIGRATIONS_DIR") {
            self.store.migrations_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("GROUNDWORK_STARTUP_TIMEOUT_SECS") {
            let secs: u64 = v.trim().parse().map_err(|_| {
                BootstrapError::Config(format!(
                    "GROUNDWORK_STARTUP_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                    v
                ))
            })?;
            self.startup_timeout_ms = secs.saturating_mul(1000);
        }
        Ok(())
    }

    /// Reject values the bootstrap cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.startup_timeout_ms == 0 {
            return Err(BootstrapError::Config(
                "startup_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.storage_root.as_os_str().is_empty() || self.log_root.as_os_str().is_empty() {
            return Err(BootstrapError::Config(
                "storage_root and log_root must not be empty".to_string(),
            ));
        }
        if self.logging.max_files == 0 {
            return Err(BootstrapError::Config(
                "logging.max_files must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Embedded store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// File name of the store inside the storage root
    pub file_name: String,

    /// How long a connection waits on a locked database, in milliseconds
    pub busy_timeout_ms: u64,

    /// Directory of `<version>_<name>.sql` migrations
    pub migrations_dir: Option<PathBuf>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_STORE_FILE.to_string(),
            busy_timeout_ms: 5000,
            migrations_dir: None,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,

    /// Log file name prefix inside the log root
    pub file_prefix: String,

    /// How often the log file rolls over
    pub rotation: LogRotation,

    /// Rolled files kept on disk
    pub max_files: usize,

    /// Colored console output
    pub ansi: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_prefix: "groundwork.log".to_string(),
            rotation: LogRotation::Daily,
            max_files: 5,
            ansi: true,
        }
    }
}

/// Log file rotation period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Minutely,
    Hourly,
    Daily,
    Never,
}
