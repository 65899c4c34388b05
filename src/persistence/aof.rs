//! Append-only log
//!
//! ## Record format
//!
//! Each record is one command encoded as a RESP array of bulk strings:
//!
//! ```text
//! *2\r\n$6\r\nselect\r\n$1\r\n0\r\n
//! *3\r\n$3\r\nset\r\n$1\r\na\r\n$1\r\n1\r\n
//! ```
//!
//! A `select` record is written whenever the database of the next record
//! differs from the previous one. There are no checksums: a crash can only
//! leave a partial record at the very end, which replay discards.

use crate::persistence::{FsyncPolicy, PersistenceError};
use crate::protocol::{encode_command, RespParser};
use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

struct LogFile {
    file: File,
    /// Bytes known to be well-framed
    len: u64,
    /// Database of the last record written
    selected_db: Option<usize>,
    /// Written but not yet synced
    pending_sync: bool,
}

/// The log writer. Appends are serialized by an internal mutex.
pub struct AppendOnlyLog {
    path: PathBuf,
    policy: FsyncPolicy,
    inner: Mutex<LogFile>,
}

impl std::fmt::Debug for AppendOnlyLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendOnlyLog")
            .field("path", &self.path)
            .field("policy", &self.policy)
            .finish()
    }
}

impl AppendOnlyLog {
    /// Opens (or creates) the log for appending.
    pub fn open(path: impl AsRef<Path>, policy: FsyncPolicy) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PersistenceError::io(&path, e))?;
        let len = file
            .metadata()
            .map_err(|e| PersistenceError::io(&path, e))?
            .len();

        info!(path = %path.display(), policy = %policy, bytes = len, "Append-only log opened");

        Ok(Self {
            path,
            policy,
            inner: Mutex::new(LogFile {
                file,
                len,
                selected_db: None,
                pending_sync: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> FsyncPolicy {
        self.policy
    }

    /// Appends one command executed against database `db`.
    ///
    /// Under [`FsyncPolicy::Always`] the record is on stable storage when
    /// this returns `Ok`.
    pub fn append(&self, db: usize, argv: &[Bytes]) -> Result<(), PersistenceError> {
        let mut buf = Vec::with_capacity(64);
        let mut log = self.inner.lock();

        if log.selected_db != Some(db) {
            let select = [Bytes::from_static(b"select"), Bytes::from(db.to_string())];
            encode_command(&mut buf, &select);
        }
        encode_command(&mut buf, argv);

        if let Err(e) = log.file.write_all(&buf) {
            // Cut off whatever part of the record made it to the file.
            let len = log.len;
            if let Err(trunc) = log.file.set_len(len) {
                warn!(error = %trunc, "Could not roll back partial log write");
            }
            log.selected_db = None;
            return Err(PersistenceError::io(&self.path, e));
        }
        log.len += buf.len() as u64;
        log.selected_db = Some(db);

        match self.policy {
            FsyncPolicy::Always => log
                .file
                .sync_data()
                .map_err(|e| PersistenceError::io(&self.path, e))?,
            FsyncPolicy::EverySecond => log.pending_sync = true,
            FsyncPolicy::Never => {}
        }
        Ok(())
    }

    /// Syncs the file if anything was written since the last sync.
    ///
    /// Returns whether a sync happened.
    pub fn sync_pending(&self) -> Result<bool, PersistenceError> {
        let mut log = self.inner.lock();
        if !log.pending_sync {
            return Ok(false);
        }
        log.file
            .sync_data()
            .map_err(|e| PersistenceError::io(&self.path, e))?;
        log.pending_sync = false;
        Ok(true)
    }

    /// Flushes and syncs unconditionally, used at shutdown.
    pub fn sync(&self) -> Result<(), PersistenceError> {
        let mut log = self.inner.lock();
        log.file
            .flush()
            .and_then(|_| log.file.sync_all())
            .map_err(|e| PersistenceError::io(&self.path, e))?;
        log.pending_sync = false;
        debug!(path = %self.path.display(), "Append-only log synced");
        Ok(())
    }
}

/// Outcome of replaying a log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records applied
    pub records: usize,
    /// Bytes of a partial trailing record that were cut off
    pub truncated_bytes: usize,
}

/// Replays the log at `path`, handing each record to `apply`.
///
/// `apply` receives the argument vector and the record's byte offset. A
/// partial record at the end of the file is treated as end of file, and the
/// file is truncated back to the last complete record.
pub fn replay<F>(path: &Path, mut apply: F) -> Result<ReplayStats, PersistenceError>
where
    F: FnMut(Vec<Bytes>, usize) -> Result<(), PersistenceError>,
{
    let data = std::fs::read(path).map_err(|e| PersistenceError::io(path, e))?;
    let mut parser = RespParser::new();
    let mut stats = ReplayStats::default();
    let mut offset = 0;

    while offset < data.len() {
        match parser.parse(&data[offset..]) {
            Ok(Some((value, used))) => {
                let argv = value.into_argv().ok_or_else(|| PersistenceError::CorruptLog {
                    offset,
                    reason: "record is not an array of strings".to_string(),
                })?;
                apply(argv, offset)?;
                stats.records += 1;
                offset += used;
            }
            Ok(None) => {
                stats.truncated_bytes = data.len() - offset;
                warn!(
                    path = %path.display(),
                    offset,
                    bytes = stats.truncated_bytes,
                    "Append-only log ends with a partial record, truncating"
                );
                let file = OpenOptions::new()
                    .write(true)
                    .open(path)
                    .map_err(|e| PersistenceError::io(path, e))?;
                file.set_len(offset as u64)
                    .map_err(|e| PersistenceError::io(path, e))?;
                break;
            }
            Err(e) => {
                return Err(PersistenceError::CorruptLog {
                    offset,
                    reason: e.to_string(),
                })
            }
        }
    }

    info!(path = %path.display(), records = stats.records, "Append-only log replayed");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn argv(args: &[&str]) -> Vec<Bytes> {
        args.iter().map(|s| Bytes::from(s.to_string())).collect()
    }

    fn collect(path: &Path) -> (Vec<Vec<Bytes>>, ReplayStats) {
        let mut records = Vec::new();
        let stats = replay(path, |argv, _| {
            records.push(argv);
            Ok(())
        })
        .unwrap();
        (records, stats)
    }

    #[test]
    fn test_append_emits_select_on_db_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("appendonly.aof");
        let log = AppendOnlyLog::open(&path, FsyncPolicy::Always).unwrap();

        log.append(0, &argv(&["set", "a", "1"])).unwrap();
        log.append(0, &argv(&["incr", "a"])).unwrap();
        log.append(3, &argv(&["set", "b", "2"])).unwrap();

        let (records, stats) = collect(&path);
        assert_eq!(stats.truncated_bytes, 0);
        assert_eq!(
            records,
            vec![
                argv(&["select", "0"]),
                argv(&["set", "a", "1"]),
                argv(&["incr", "a"]),
                argv(&["select", "3"]),
                argv(&["set", "b", "2"]),
            ]
        );
    }

    #[test]
    fn test_reopened_log_selects_again() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("appendonly.aof");

        AppendOnlyLog::open(&path, FsyncPolicy::Never)
            .unwrap()
            .append(2, &argv(&["set", "a", "1"]))
            .unwrap();
        let log = AppendOnlyLog::open(&path, FsyncPolicy::Never).unwrap();
        log.append(2, &argv(&["set", "b", "1"])).unwrap();
        log.sync().unwrap();

        let (records, _) = collect(&path);
        assert_eq!(records.len(), 4);
        assert_eq!(records[2], argv(&["select", "2"]));
    }

    #[test]
    fn test_replay_truncates_partial_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("appendonly.aof");
        let complete = b"*3\r\n$3\r\nset\r\n$1\r\na\r\n$1\r\n1\r\n";
        let mut data = complete.to_vec();
        data.extend_from_slice(b"*3\r\n$3\r\nset\r\n$1\r\nb");
        std::fs::write(&path, &data).unwrap();

        let (records, stats) = collect(&path);
        assert_eq!(records, vec![argv(&["set", "a", "1"])]);
        assert_eq!(stats.truncated_bytes, data.len() - complete.len());
        assert_eq!(std::fs::read(&path).unwrap(), complete);

        // New appends land on a clean record boundary.
        let log = AppendOnlyLog::open(&path, FsyncPolicy::Always).unwrap();
        log.append(0, &argv(&["set", "c", "3"])).unwrap();
        let (records, stats) = collect(&path);
        assert_eq!(stats.truncated_bytes, 0);
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_replay_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("appendonly.aof");
        std::fs::write(&path, b"*1\r\n$4\r\nping\r\n*x\r\n").unwrap();

        let err = replay(&path, |_, _| Ok(())).unwrap_err();
        assert!(matches!(err, PersistenceError::CorruptLog { offset: 14, .. }));
    }

    #[test]
    fn test_replay_rejects_non_command_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("appendonly.aof");
        std::fs::write(&path, b":5\r\n").unwrap();

        let err = replay(&path, |_, _| Ok(())).unwrap_err();
        assert!(matches!(err, PersistenceError::CorruptLog { offset: 0, .. }));
    }

    #[test]
    fn test_every_second_sync_is_deferred() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("appendonly.aof");
        let log = AppendOnlyLog::open(&path, FsyncPolicy::EverySecond).unwrap();

        assert!(!log.sync_pending().unwrap());
        log.append(0, &argv(&["set", "a", "1"])).unwrap();
        assert!(log.sync_pending().unwrap());
        assert!(!log.sync_pending().unwrap());
    }
}
