//! Runtime statistics
//!
//! Counters are plain atomics shared by the connection tasks, the reactor
//! and the `INFO` command. Connection and command counters move on every
//! event; the expiry and uptime figures are refreshed by the cron tick.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct ServerStats {
    started: Instant,
    hz: u32,
    appendonly: bool,

    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Size of the dispatch table
    pub registered_commands: AtomicUsize,
    /// Keys deleted by expiry, as of the last cron tick
    pub expired_keys: AtomicU64,
    /// Completed cron ticks
    pub cron_runs: AtomicU64,
    /// Seconds since startup, as of the last cron tick
    pub uptime_secs: AtomicU64,
    /// Failed appends to the log
    pub aof_write_errors: AtomicU64,
}

impl ServerStats {
    pub fn new(hz: u32, appendonly: bool) -> Self {
        Self {
            started: Instant::now(),
            hz,
            appendonly,
            connections_accepted: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            commands_processed: AtomicU64::new(0),
            registered_commands: AtomicUsize::new(0),
            expired_keys: AtomicU64::new(0),
            cron_runs: AtomicU64::new(0),
            uptime_secs: AtomicU64::new(0),
            aof_write_errors: AtomicU64::new(0),
        }
    }

    pub fn hz(&self) -> u32 {
        self.hz
    }

    pub fn appendonly(&self) -> bool {
        self.appendonly
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_registered_commands(&self, count: usize) {
        self.registered_commands.store(count, Ordering::Relaxed);
    }

    pub fn aof_write_failed(&self) {
        self.aof_write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Called by the cron tick.
    pub fn refresh(&self, expired_keys: u64) {
        self.expired_keys.store(expired_keys, Ordering::Relaxed);
        self.uptime_secs
            .store(self.started.elapsed().as_secs(), Ordering::Relaxed);
        self.cron_runs.fetch_add(1, Ordering::Relaxed);
    }

    /// Exact uptime, independent of the cron tick.
    pub fn uptime(&self) -> std::time::Duration {
        self.started.elapsed()
    }
}
