//! Connection Management
//!
//! Every accepted socket is served by its own tokio task. The task owns a
//! [`Client`] (selected database, queued replies) and talks to the shared
//! [`Server`](crate::server::Server) for everything else.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Accept loop (Server::run)                   │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ spawn task per client
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────────┐  │
//! │  │ Read bytes  │───>│ Parse RESP  │───>│ Server::execute │  │
//! │  └─────────────┘    └─────────────┘    └────────┬────────┘  │
//! │                                                 ▼           │
//! │                                        ┌─────────────────┐  │
//! │                                        │ Flush replies   │  │
//! │                                        └─────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod handler;

pub use client::Client;
pub use handler::{handle_connection, ConnectionError, ConnectionHandler};
