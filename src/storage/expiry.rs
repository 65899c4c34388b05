//! Active Expiry
//!
//! Lazy expiry (checking on access) never reclaims a key that is not read
//! again. The active expire cycle covers that case: the cron timer calls
//! [`active_expire_cycle`] on every tick, and it samples the oldest
//! deadlines of each database and deletes the ones that have passed.
//!
//! ## Adaptive Effort
//!
//! One sweep looks at `keys_per_loop` deadlines. If more than
//! `repeat_threshold` of them had expired, the database probably holds more
//! expired keys, so the cycle sweeps it again. The whole cycle stops when
//! its time budget (a share of the cron period) is spent, so a flood of
//! expiring keys cannot stall the reactor.

use crate::storage::db::Keyspace;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Tuning for the active expire cycle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    /// Deadlines examined per sweep (default: 20)
    pub keys_per_loop: usize,

    /// Sweep the same database again while this fraction of examined keys
    /// had expired (default: 0.25)
    pub repeat_threshold: f64,

    /// Share of the cron period the cycle may use, in percent (default: 25)
    pub time_limit_percent: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            keys_per_loop: 20,
            repeat_threshold: 0.25,
            time_limit_percent: 25,
        }
    }
}

impl ExpiryConfig {
    /// Time budget of one cycle for a cron running at `hz` ticks per second.
    pub fn time_limit(&self, hz: u32) -> Duration {
        let period_us = 1_000_000 / u64::from(hz.max(1));
        Duration::from_micros(period_us * self.time_limit_percent / 100)
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub examined: usize,
    pub expired: usize,
    pub sweeps: usize,
    /// The time budget ran out before every database settled
    pub timed_out: bool,
}

/// Runs one active expire cycle over every database.
pub fn active_expire_cycle(
    keyspace: &Keyspace,
    now: u64,
    config: &ExpiryConfig,
    time_limit: Duration,
) -> CycleStats {
    let started = Instant::now();
    let budget = config.keys_per_loop.max(1);
    let mut stats = CycleStats::default();

    'databases: for db in keyspace.iter() {
        if db.volatile_len() == 0 {
            continue;
        }

        loop {
            let result = db.sweep(now, budget);
            stats.sweeps += 1;
            stats.examined += result.examined;
            stats.expired += result.expired;

            if result.examined == 0 {
                break;
            }
            let ratio = result.expired as f64 / result.examined as f64;
            trace!(
                db = db.index(),
                examined = result.examined,
                expired = result.expired,
                "Expiry sweep"
            );

            if started.elapsed() >= time_limit {
                stats.timed_out = true;
                break 'databases;
            }
            if ratio <= config.repeat_threshold {
                break;
            }
        }
    }

    if stats.expired > 0 {
        debug!(
            expired = stats.expired,
            examined = stats.examined,
            sweeps = stats.sweeps,
            timed_out = stats.timed_out,
            "Active expire cycle"
        );
    }

    stats
}
