//! Configuration for TideKV
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. built-in defaults
//! 2. a TOML file (`--config path`)
//! 3. `TIDEKV_*` environment variables, then `--host` / `--port`
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1"
//! port = 6379
//! databases = 16
//! hz = 10
//! active_expire = true
//!
//! [persistence]
//! appendonly = true
//! appendfilename = "appendonly.aof"
//! appendfsync = "every-second"
//! dbfilename = "dump.json"
//! dir = "./data"
//!
//! [expire]
//! keys_per_loop = 20
//! repeat_threshold = 0.25
//! time_limit_percent = 25
//! ```

use crate::persistence::FsyncPolicy;
use crate::storage::ExpiryConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Highest accepted cron frequency.
pub const MAX_HZ: u32 = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub persistence: PersistenceConfig,
    pub expire: ExpiryConfig,
}

/// Listener and cron settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind: String,

    /// Port to listen on (0 picks a free port)
    pub port: u16,

    /// Number of numbered databases
    pub databases: usize,

    /// Cron ticks per second
    pub hz: u32,

    /// Run the active expire cycle on every cron tick
    pub active_expire: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            databases: 16,
            hz: 10,
            active_expire: true,
        }
    }
}

/// Append-only log and snapshot settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Log every mutating command
    pub appendonly: bool,

    /// Log file name inside `dir`
    pub appendfilename: String,

    pub appendfsync: FsyncPolicy,

    /// Snapshot file name inside `dir`
    pub dbfilename: String,

    /// Directory holding both files
    pub dir: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            appendonly: false,
            appendfilename: "appendonly.aof".to_string(),
            appendfsync: FsyncPolicy::default(),
            dbfilename: "dump.json".to_string(),
            dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Applies `TIDEKV_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides using `lookup` to read variables.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("TIDEKV_BIND") {
            self.server.bind = bind;
        }
        if let Some(port) = lookup("TIDEKV_PORT") {
            self.server.port = parse_env("TIDEKV_PORT", port)?;
        }
        if let Some(databases) = lookup("TIDEKV_DATABASES") {
            self.server.databases = parse_env("TIDEKV_DATABASES", databases)?;
        }
        if let Some(hz) = lookup("TIDEKV_HZ") {
            self.server.hz = parse_env("TIDEKV_HZ", hz)?;
        }
        if let Some(enabled) = lookup("TIDEKV_ACTIVE_EXPIRE") {
            self.server.active_expire = parse_bool("TIDEKV_ACTIVE_EXPIRE", enabled)?;
        }
        if let Some(enabled) = lookup("TIDEKV_APPENDONLY") {
            self.persistence.appendonly = parse_bool("TIDEKV_APPENDONLY", enabled)?;
        }
        if let Some(policy) = lookup("TIDEKV_APPENDFSYNC") {
            self.persistence.appendfsync = parse_env("TIDEKV_APPENDFSYNC", policy)?;
        }
        if let Some(dir) = lookup("TIDEKV_DIR") {
            self.persistence.dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_HZ).contains(&self.server.hz) {
            return Err(ConfigError::Invalid(format!(
                "hz must be between 1 and {MAX_HZ}, got {}",
                self.server.hz
            )));
        }
        if self.server.databases == 0 {
            return Err(ConfigError::Invalid("databases must be at least 1".to_string()));
        }
        if self.persistence.appendfilename.is_empty() || self.persistence.dbfilename.is_empty() {
            return Err(ConfigError::Invalid("file names must not be empty".to_string()));
        }
        if self.expire.keys_per_loop == 0 {
            return Err(ConfigError::Invalid("keys_per_loop must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.expire.repeat_threshold) {
            return Err(ConfigError::Invalid(format!(
                "repeat_threshold must be between 0 and 1, got {}",
                self.expire.repeat_threshold
            )));
        }
        if !(1..=100).contains(&self.expire.time_limit_percent) {
            return Err(ConfigError::Invalid(format!(
                "time_limit_percent must be between 1 and 100, got {}",
                self.expire.time_limit_percent
            )));
        }
        Ok(())
    }

    /// `host:port` for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }

    pub fn aof_path(&self) -> PathBuf {
        self.persistence.dir.join(&self.persistence.appendfilename)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.persistence.dir.join(&self.persistence.dbfilename)
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { name, value })
}

fn parse_bool(name: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnv { name, value }),
    }
}
