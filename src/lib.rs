//! # TideKV - An In-Memory Key-Value Server
//!
//! TideKV speaks the Redis protocol and keeps strings, lists, hashes and
//! sets in numbered in-memory databases. Keys can carry a deadline; expired
//! keys are reclaimed lazily on access and actively by a cron timer. Every
//! command that changes data can be appended to a log that rebuilds the
//! keyspace on restart.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               Server                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────┐                 │
//! │  │ Accept loop │───>│ Connection  │───>│ CommandTable │──┐              │
//! │  │             │    │  task (N)   │    │   dispatch   │  │              │
//! │  └─────────────┘    └─────────────┘    └──────┬───────┘  │ dirty        │
//! │                                               │          ▼              │
//! │                                               │   ┌──────────────┐      │
//! │                                               │   │ Append-only  │      │
//! │                                               │   │     log      │      │
//! │                                               ▼   └──────────────┘      │
//! │                     ┌──────────────────────────────────────────────┐    │
//! │                     │       Keyspace (db 0..N, sharded)            │    │
//! │                     └──────────────────────────────────────────────┘    │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │  Reactor: cron tick (active expiry, stats),     │ │
//! │                     │           log fsync every second                │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use tidekv::{Config, Server};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let listener = TcpListener::bind(config.bind_address()).await?;
//!     let server = Server::start(config)?;
//!     server.run(listener, async { let _ = tokio::signal::ctrl_c().await; }).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP parser and reply types
//! - [`storage`]: databases, values and expiry
//! - [`commands`]: the dispatch table and command handlers
//! - [`connection`]: per-client tasks
//! - [`reactor`]: the time-event loop
//! - [`persistence`]: append-only log and snapshot loading
//! - [`server`]: the shared server context and its lifecycle
//! - [`config`]: file, environment and CLI settings

pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod persistence;
pub mod protocol;
pub mod reactor;
pub mod server;
pub mod storage;

pub use commands::{CommandTable, CommandError};
pub use config::Config;
pub use error::{Error, Result};
pub use protocol::{ParseError, RespParser, RespValue};
pub use server::Server;
pub use storage::{Keyspace, Value};

/// The default port TideKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host TideKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of TideKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
