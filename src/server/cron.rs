//! Periodic server work
//!
//! The cron tick runs `hz` times per second on the reactor: it drives the
//! active expire cycle and refreshes the statistics `INFO` reports. When the
//! log syncs every second, a second timer does that.

use crate::persistence::AppendOnlyLog;
use crate::reactor::{EventId, Reactor, TimerAction};
use crate::server::{Server, ServerStats};
use crate::storage::{active_expire_cycle, now_ms, CycleStats, ExpiryConfig, Keyspace};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// State of the cron time event.
pub struct Cron {
    keyspace: Arc<Keyspace>,
    stats: Arc<ServerStats>,
    expire: ExpiryConfig,
    active_expire: bool,
    period: Duration,
    time_limit: Duration,
}

impl Cron {
    pub fn new(server: &Server) -> Self {
        let hz = server.config().server.hz;
        let expire = server.config().expire.clone();
        Self {
            keyspace: Arc::clone(server.keyspace()),
            stats: Arc::clone(server.stats()),
            time_limit: expire.time_limit(hz),
            expire,
            active_expire: server.config().server.active_expire,
            period: period(hz),
        }
    }

    /// One tick. Returns what the expire cycle did, if it ran.
    pub fn tick(&mut self, now: u64) -> Option<CycleStats> {
        let cycle = self
            .active_expire
            .then(|| active_expire_cycle(&self.keyspace, now, &self.expire, self.time_limit));

        self.stats.refresh(self.keyspace.expired_keys());
        trace!(expired_total = self.keyspace.expired_keys(), "Cron tick");
        cycle
    }

    /// Registers the repeating tick on `reactor`.
    pub fn register(mut self, reactor: &Reactor) -> EventId {
        let period = self.period;
        debug!(period_ms = period.as_millis() as u64, "Cron timer registered");
        reactor.register_timer(period, true, move |_| {
            self.tick(now_ms());
            Ok(TimerAction::Reschedule(period))
        })
    }
}

/// The cron period for `hz` ticks per second.
pub fn period(hz: u32) -> Duration {
    Duration::from_millis(1000 / u64::from(hz.max(1)))
}

/// Registers the once-per-second log sync.
pub fn register_fsync(reactor: &Reactor, aof: Arc<AppendOnlyLog>) -> EventId {
    let interval = Duration::from_secs(1);
    reactor.register_timer(interval, true, move |_| {
        if aof.sync_pending()? {
            trace!("Append-only log synced");
        }
        Ok(TimerAction::Reschedule(interval))
    })
}
