//! Server Context
//!
//! [`Server`] owns everything the running process shares: configuration,
//! the keyspace, the command table, statistics and the append-only log.
//! Connection tasks and the cron timer hold it (or parts of it) through
//! `Arc`s; nothing lives in globals.
//!
//! ## Lifecycle
//!
//! ```text
//! Server::new        build + self-check the command table
//!      │
//!      ▼
//! load_data_from_disk   log replay ──fail──► snapshot ──fail──► empty
//!      │
//!      ▼
//! open_log           open the log writer (after loading)
//!      │
//!      ▼
//! run                reactor task (cron, fsync) + accept loop
//!                    until shutdown, then a final log sync
//! ```

pub mod cron;
pub mod stats;

pub use stats::ServerStats;

use crate::commands::{CommandError, CommandTable, Invocation};
use crate::config::Config;
use crate::connection::{handle_connection, Client};
use crate::persistence::{
    load_snapshot, replay, AppendOnlyLog, FsyncPolicy, PersistenceError, ReplayStats,
    SnapshotStats,
};
use crate::protocol::RespValue;
use crate::reactor::Reactor;
use crate::storage::{now_ms, Keyspace};
use crate::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Where the startup state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    AppendOnlyLog(ReplayStats),
    Snapshot(SnapshotStats),
    Empty,
}

pub struct Server {
    config: Config,
    keyspace: Arc<Keyspace>,
    commands: CommandTable,
    stats: Arc<ServerStats>,
    aof: Option<Arc<AppendOnlyLog>>,
    /// Held from a write command's handler through its log append
    write_order: Mutex<()>,
    next_client_id: AtomicU64,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("databases", &self.keyspace.len())
            .field("commands", &self.commands.len())
            .field("aof", &self.aof)
            .finish()
    }
}

impl Server {
    /// Builds the server context. Fails if the command table is inconsistent.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let commands = CommandTable::builtin()?;
        commands.verify()?;

        let stats = ServerStats::new(config.server.hz, config.persistence.appendonly);
        stats.set_registered_commands(commands.len());
        info!(commands = commands.len(), "Command table verified");

        Ok(Self {
            keyspace: Arc::new(Keyspace::new(config.server.databases)),
            commands,
            stats: Arc::new(stats),
            aof: None,
            write_order: Mutex::new(()),
            next_client_id: AtomicU64::new(0),
            config,
        })
    }

    /// Creates a server, loads its data and opens the log writer.
    pub fn start(config: Config) -> Result<Arc<Self>> {
        let mut server = Self::new(config)?;
        server.load_data_from_disk();
        server.open_log()?;
        Ok(Arc::new(server))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn keyspace(&self) -> &Arc<Keyspace> {
        &self.keyspace
    }

    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub(crate) fn next_client_id(&self) -> u64 {
        self.next_client_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Rebuilds the keyspace from disk.
    ///
    /// The log is preferred when enabled and present. The snapshot is only
    /// used when there is no usable log, and a failed load never leaves
    /// half-restored state behind.
    pub fn load_data_from_disk(&self) -> LoadOutcome {
        if self.config.persistence.appendonly {
            let path = self.config.aof_path();
            if path.exists() {
                match self.replay_log(&path) {
                    Ok(stats) => return LoadOutcome::AppendOnlyLog(stats),
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "Append-only log load failed");
                        self.keyspace.flush_all();
                    }
                }
            }
        }

        let path = self.config.snapshot_path();
        if path.exists() {
            match load_snapshot(&path, &self.keyspace, now_ms()) {
                Ok(stats) => return LoadOutcome::Snapshot(stats),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Snapshot load failed");
                    self.keyspace.flush_all();
                }
            }
        }

        warn!("No data loaded from disk, starting with an empty keyspace");
        LoadOutcome::Empty
    }

    /// Replays the log through the normal dispatch path without re-logging.
    fn replay_log(&self, path: &Path) -> std::result::Result<ReplayStats, PersistenceError> {
        let mut client = Client::new(0, None);

        replay(path, |argv, offset| {
            let Some(name) = argv.first() else {
                return Err(PersistenceError::CorruptLog {
                    offset,
                    reason: "empty record".to_string(),
                });
            };
            if self.commands.get(name).is_none() {
                return Err(PersistenceError::UnknownCommand {
                    name: String::from_utf8_lossy(name).into_owned(),
                    offset,
                });
            }

            let reply = self.execute(&mut client, &argv, false);
            if let RespValue::Error(message) = reply {
                warn!(offset, error = %message, "Log record replied with an error");
            }
            Ok(())
        })
    }

    /// Opens the log writer when logging is enabled.
    pub fn open_log(&mut self) -> Result<()> {
        if !self.config.persistence.appendonly {
            return Ok(());
        }
        let dir = &self.config.persistence.dir;
        std::fs::create_dir_all(dir).map_err(|e| PersistenceError::io(dir, e))?;
        let log = AppendOnlyLog::open(self.config.aof_path(), self.config.persistence.appendfsync)?;
        self.aof = Some(Arc::new(log));
        Ok(())
    }

    /// Runs one command for `client` and returns its reply.
    ///
    /// A command that changed the keyspace is appended to the log before
    /// this returns, unless `propagate` is false (log replay).
    pub fn execute(&self, client: &mut Client, argv: &[Bytes], propagate: bool) -> RespValue {
        let Some(name) = argv.first() else {
            return RespValue::error("ERR empty command");
        };
        let Some(spec) = self.commands.get(name) else {
            return RespValue::error(format!(
                "ERR unknown command '{}'",
                String::from_utf8_lossy(name)
            ));
        };
        if !spec.accepts(argv.len()) {
            return RespValue::error(CommandError::WrongArgCount(spec.name.to_string()).to_string());
        }
        let Some(db) = self.keyspace.db(client.db_index) else {
            return RespValue::error(CommandError::InvalidDbIndex.to_string());
        };

        // Writes hold the order lock until their record is appended, so the
        // log lists them in the order they changed the keyspace.
        let _ordered = (propagate && spec.write && self.aof.is_some())
            .then(|| self.write_order.lock());

        let mut inv = Invocation::new(argv, db, &self.keyspace, &self.stats, client, now_ms());
        let result = (spec.handler)(&mut inv);
        debug_assert!(
            spec.write || inv.dirty == 0,
            "read-only command '{}' changed the keyspace",
            spec.name
        );
        self.stats.command_processed();

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => return RespValue::error(e.to_string()),
        };

        if inv.dirty > 0 && propagate {
            if let Some(aof) = &self.aof {
                if let Err(e) = aof.append(db.index(), &inv.propagated()) {
                    self.stats.aof_write_failed();
                    error!(command = spec.name, error = %e, "Append-only log write failed");
                    if aof.policy() == FsyncPolicy::Always {
                        return RespValue::error(format!("ERR failed to persist write: {e}"));
                    }
                }
            }
        }

        reply
    }

    /// Serves clients on `listener` until `shutdown` completes.
    pub async fn run<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let reactor = Arc::new(Reactor::new());
        cron::Cron::new(&self).register(&reactor);
        if let Some(aof) = &self.aof {
            if aof.policy() == FsyncPolicy::EverySecond {
                cron::register_fsync(&reactor, Arc::clone(aof));
            }
        }

        let reactor_task = {
            let reactor = Arc::clone(&reactor);
            tokio::spawn(async move { reactor.run().await })
        };

        info!(addr = %listener.local_addr()?, "Ready to accept connections");

        tokio::select! {
            _ = self.accept_loop(&listener) => {}
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }

        reactor.stop();
        if let Err(e) = reactor_task.await {
            warn!(error = %e, "Reactor task ended abnormally");
        }

        if let Some(aof) = &self.aof {
            aof.sync()?;
        }
        info!("Server shutdown complete");
        Ok(())
    }

    /// Main loop that accepts incoming connections
    async fn accept_loop(self: &Arc<Self>, listener: &TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    tokio::spawn(handle_connection(stream, addr, Arc::clone(self)));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::argv;
    use crate::persistence::snapshot::test_support::snapshot_of;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir, policy: FsyncPolicy) -> Config {
        let mut config = Config::default();
        config.persistence.appendonly = true;
        config.persistence.appendfsync = policy;
        config.persistence.dir = dir.path().to_path_buf();
        config
    }

    fn run(server: &Server, client: &mut Client, args: &[&str]) -> RespValue {
        server.execute(client, &argv(args), true)
    }

    #[test]
    fn test_dispatch_errors() {
        let server = Server::new(Config::default()).unwrap();
        let mut client = Client::new(1, None);

        assert_eq!(
            run(&server, &mut client, &["foo"]),
            RespValue::error("ERR unknown command 'foo'")
        );
        assert_eq!(
            run(&server, &mut client, &["GET"]),
            RespValue::error("ERR wrong number of arguments for 'get' command")
        );
        assert_eq!(run(&server, &mut client, &["Set", "a", "1"]), RespValue::ok());
        assert_eq!(server.stats.commands_processed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.server.hz = 0;
        assert!(Server::new(config).is_err());
    }

    #[test]
    fn test_log_replay_rebuilds_state() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, FsyncPolicy::Always);

        let expected = {
            let server = Server::start(config.clone()).unwrap();
            let mut client = Client::new(1, None);
            run(&server, &mut client, &["SET", "a", "1"]);
            run(&server, &mut client, &["INCRBY", "a", "5"]);
            run(&server, &mut client, &["EXPIRE", "a", "1000"]);
            run(&server, &mut client, &["SELECT", "2"]);
            run(&server, &mut client, &["RPUSH", "l", "x", "y", "z"]);
            run(&server, &mut client, &["SADD", "s", "m1", "m2"]);
            run(&server, &mut client, &["SPOP", "s"]);
            run(&server, &mut client, &["GET", "missing"]);
            server.keyspace.export()
        };

        let restarted = Server::new(config.clone()).unwrap();
        let outcome = restarted.load_data_from_disk();
        assert!(matches!(outcome, LoadOutcome::AppendOnlyLog(_)));
        assert_eq!(restarted.keyspace.export(), expected);

        // Replaying again from the same file gives the same state.
        let again = Server::new(config).unwrap();
        again.load_data_from_disk();
        assert_eq!(again.keyspace.export(), expected);
    }

    #[test]
    fn test_failed_replay_falls_back_to_snapshot() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, FsyncPolicy::Always);

        let seed = Keyspace::new(16);
        seed.db(0)
            .unwrap()
            .set(Bytes::from("from"), crate::storage::Value::from("snapshot"), 0);
        std::fs::write(
            config.snapshot_path(),
            serde_json::to_vec(&snapshot_of(&seed)).unwrap(),
        )
        .unwrap();

        let mut log = Vec::new();
        crate::protocol::encode_command(&mut log, &argv(&["set", "partial", "1"]));
        crate::protocol::encode_command(&mut log, &argv(&["bogus", "x"]));
        std::fs::write(config.aof_path(), log).unwrap();

        let server = Server::new(config).unwrap();
        let outcome = server.load_data_from_disk();
        assert!(matches!(outcome, LoadOutcome::Snapshot(SnapshotStats { keys: 1, .. })));
        assert_eq!(server.keyspace.export(), seed.export());
    }

    #[test]
    fn test_missing_files_start_empty() {
        let dir = TempDir::new().unwrap();
        let server = Server::new(config_in(&dir, FsyncPolicy::Never)).unwrap();
        assert_eq!(server.load_data_from_disk(), LoadOutcome::Empty);
        assert_eq!(server.keyspace.total_keys(), 0);
    }

    #[test]
    fn test_snapshot_ignored_when_log_loads() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, FsyncPolicy::Always);

        let seed = Keyspace::new(16);
        seed.db(0)
            .unwrap()
            .set(Bytes::from("stale"), crate::storage::Value::from("x"), 0);
        std::fs::write(
            config.snapshot_path(),
            serde_json::to_vec(&snapshot_of(&seed)).unwrap(),
        )
        .unwrap();

        let mut log = Vec::new();
        crate::protocol::encode_command(&mut log, &argv(&["set", "fresh", "1"]));
        std::fs::write(config.aof_path(), log).unwrap();

        let server = Server::new(config).unwrap();
        server.load_data_from_disk();
        let db = server.keyspace.db(0).unwrap();
        assert!(db.contains(&Bytes::from("fresh"), now_ms()));
        assert!(!db.contains(&Bytes::from("stale"), now_ms()));
    }

    #[test]
    fn test_concurrent_writes_replay_to_live_state() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, FsyncPolicy::Never);
        let server = Server::start(config.clone()).unwrap();

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let server = Arc::clone(&server);
                std::thread::spawn(move || {
                    let mut client = Client::new(t + 1, None);
                    for i in 0..500 {
                        let value = format!("{t}-{i}");
                        run(&server, &mut client, &["SET", "k", value.as_str()]);
                        run(&server, &mut client, &["RPUSH", "l", value.as_str()]);
                        run(&server, &mut client, &["INCR", "n"]);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let live = server.keyspace.export();
        drop(server);

        let replayed = Server::new(config).unwrap();
        assert!(matches!(
            replayed.load_data_from_disk(),
            LoadOutcome::AppendOnlyLog(_)
        ));
        assert_eq!(replayed.keyspace.export(), live);
    }

    #[test]
    fn test_read_only_commands_are_not_logged() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, FsyncPolicy::Always);
        let server = Server::start(config.clone()).unwrap();
        let mut client = Client::new(1, None);

        run(&server, &mut client, &["GET", "a"]);
        run(&server, &mut client, &["PING"]);
        run(&server, &mut client, &["DEL", "nothing"]);
        assert_eq!(std::fs::read(config.aof_path()).unwrap(), b"");

        // Replay does not append to the log it reads.
        run(&server, &mut client, &["SET", "a", "1"]);
        let before = std::fs::read(config.aof_path()).unwrap();
        let restarted = Server::start(config.clone()).unwrap();
        drop(restarted);
        assert_eq!(std::fs::read(config.aof_path()).unwrap(), before);
    }
}
