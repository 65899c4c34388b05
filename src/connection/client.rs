//! Per-connection client state

use crate::protocol::RespValue;
use std::net::SocketAddr;

/// State the server keeps for one connected client.
///
/// The append-only log loader replays records through a `Client` with no
/// address, so `SELECT` records switch databases exactly as they did live.
#[derive(Debug)]
pub struct Client {
    pub id: u64,
    /// `None` for the internal replay client
    pub addr: Option<SocketAddr>,
    /// Selected database
    pub db_index: usize,
    /// Serialized replies not yet written to the socket
    reply: Vec<u8>,
    /// Set by `QUIT`
    pub close_after_reply: bool,
}

impl Client {
    pub fn new(id: u64, addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            addr,
            db_index: 0,
            reply: Vec::new(),
            close_after_reply: false,
        }
    }

    /// Appends a reply to the output buffer.
    pub fn add_reply(&mut self, reply: &RespValue) {
        reply.serialize_into(&mut self.reply);
    }

    pub fn has_pending_reply(&self) -> bool {
        !self.reply.is_empty()
    }

    /// Takes the buffered replies, leaving the buffer empty.
    pub fn take_reply(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.reply)
    }
}
