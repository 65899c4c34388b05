//! Storage Module
//!
//! The numbered databases of the server, the typed values they hold and the
//! expiry machinery that reclaims keys past their deadline.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────── Keyspace ───────────────────────────┐
//! │  ┌───────────┐ ┌───────────┐             ┌───────────┐      │
//! │  │   db 0    │ │   db 1    │     ...     │   db 15   │      │
//! │  │ 16 shards │ │ 16 shards │             │ 16 shards │      │
//! │  └───────────┘ └───────────┘             └───────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//!          ▲ lazy check on every access        ▲
//!          │                                   │
//!   command handlers               active_expire_cycle (cron tick)
//! ```
//!
//! ## Example
//!
//! ```
//! use tidekv::storage::{now_ms, Keyspace, Value};
//! use bytes::Bytes;
//!
//! let keyspace = Keyspace::new(16);
//! let db = keyspace.db(0).unwrap();
//! let now = now_ms();
//!
//! db.set(Bytes::from("name"), Value::from("tide"), now);
//! assert!(db.set_expiry(&Bytes::from("name"), now + 60_000, now));
//! assert_eq!(db.get(&Bytes::from("name"), now), Some(Value::from("tide")));
//! ```

pub mod db;
pub mod expiry;
pub mod value;

pub use db::{Database, Entry, Keyspace, SweepResult};
pub use expiry::{active_expire_cycle, CycleStats, ExpiryConfig};
pub use value::Value;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
