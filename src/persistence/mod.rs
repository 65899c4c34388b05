//! Persistence
//!
//! Durability comes from the append-only log: every command that changed
//! the keyspace is appended as a RESP array before its reply is sent, and at
//! startup the log is replayed through the normal dispatch path. A JSON
//! snapshot can seed the keyspace when no log is available.
//!
//! - `aof`: log writer and replay
//! - `snapshot`: snapshot file format and loader

pub mod aof;
pub mod snapshot;

pub use aof::{replay, AppendOnlyLog, ReplayStats};
pub use snapshot::{load_snapshot, Snapshot, SnapshotStats};

use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// When the log file is flushed to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FsyncPolicy {
    /// Leave flushing to the operating system
    #[serde(alias = "no")]
    Never,
    /// A background timer syncs once per second
    #[default]
    #[serde(alias = "everysec")]
    EverySecond,
    /// Sync after every record
    Always,
}

impl FromStr for FsyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "never" | "no" => Ok(FsyncPolicy::Never),
            "every-second" | "everysec" => Ok(FsyncPolicy::EverySecond),
            "always" => Ok(FsyncPolicy::Always),
            other => Err(format!("unknown fsync policy '{other}'")),
        }
    }
}

impl std::fmt::Display for FsyncPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FsyncPolicy::Never => "never",
            FsyncPolicy::EverySecond => "every-second",
            FsyncPolicy::Always => "always",
        })
    }
}

/// Errors from the log and snapshot files.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt append-only log at byte {offset}: {reason}")]
    CorruptLog { offset: usize, reason: String },

    #[error("unknown command '{name}' in append-only log at byte {offset}")]
    UnknownCommand { name: String, offset: usize },

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsync_policy_names() {
        assert_eq!("always".parse(), Ok(FsyncPolicy::Always));
        assert_eq!("everysec".parse(), Ok(FsyncPolicy::EverySecond));
        assert_eq!("Every-Second".parse(), Ok(FsyncPolicy::EverySecond));
        assert_eq!("no".parse(), Ok(FsyncPolicy::Never));
        assert!("sometimes".parse::<FsyncPolicy>().is_err());
        assert_eq!(FsyncPolicy::EverySecond.to_string(), "every-second");
    }
}
