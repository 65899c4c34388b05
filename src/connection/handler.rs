//! Connection Handler
//!
//! Each client gets its own task running [`ConnectionHandler::run`]: read
//! bytes, parse every complete command in the buffer, execute them in
//! arrival order, then write all their replies in one go.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! accept ──► ┌──────────────────────────────────────┐
//!            │ parse commands already buffered      │◄─┐
//!            │ execute each, queue its reply        │  │
//!            │ flush queued replies                 │  │
//!            │ read more bytes from the socket      │──┘
//!            └──────────────────────────────────────┘
//!                 │ EOF, I/O error, parse error,
//!                 │ buffer overflow or QUIT
//!                 ▼
//!            task ends
//! ```
//!
//! ## Buffer Management
//!
//! A `BytesMut` accumulates incoming data, since TCP may deliver half a
//! command or several commands in one read. Unparsed data is capped at
//! 64 KiB per connection.

use crate::connection::Client;
use crate::protocol::{ParseError, RespParser, RespValue};
use crate::server::Server;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace, warn};

/// Maximum size of unparsed input (64 KB)
pub const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Reply for a frame that is not an array of strings.
const MALFORMED_COMMAND: &str = "ERR Protocol error: expected an array of bulk strings";

/// Handles a single client connection.
pub struct ConnectionHandler {
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    parser: RespParser,

    /// Selected database and queued replies
    client: Client,

    server: Arc<Server>,
}

impl ConnectionHandler {
    pub fn new(stream: TcpStream, addr: SocketAddr, server: Arc<Server>) -> Self {
        server.stats().connection_opened();
        let client = Client::new(server.next_client_id(), Some(addr));

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            client,
            server,
        }
    }

    /// Runs the connection until the client leaves or a fatal error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, id = self.client.id, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.server.stats().connection_closed();
        result
    }

    /// The read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(frame) = self.try_parse_command()? {
                self.process(frame);
                if self.client.close_after_reply {
                    self.flush_replies().await?;
                    return Ok(());
                }
            }

            self.flush_replies().await?;
            self.read_more_data().await?;
        }
    }

    /// Executes one parsed frame and queues its reply.
    fn process(&mut self, frame: RespValue) {
        // Blank inline lines and `*0` carry no command and get no reply.
        if matches!(&frame, RespValue::Array(items) if items.is_empty()) {
            return;
        }
        match frame.into_argv() {
            Some(argv) => {
                let reply = self.server.execute(&mut self.client, &argv, true);
                self.client.add_reply(&reply);
            }
            None => {
                debug!(client = %self.addr, "Malformed command frame");
                self.client.add_reply(&RespValue::error(MALFORMED_COMMAND));
            }
        }
    }

    /// Attempts to parse a command from the buffer.
    fn try_parse_command(&mut self) -> Result<Option<RespValue>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((value, consumed))) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed command"
                );
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Parse error");
                Err(ConnectionError::ParseError(e))
            }
        }
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        trace!(client = %self.addr, bytes = n, "Read data");
        Ok(())
    }

    /// Writes every queued reply to the socket.
    async fn flush_replies(&mut self) -> Result<(), ConnectionError> {
        if !self.client.has_pending_reply() {
            return Ok(());
        }
        let bytes = self.client.take_reply();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        trace!(client = %self.addr, bytes = bytes.len(), "Sent replies");
        Ok(())
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// RESP parse error
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial command)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Runs a [`ConnectionHandler`] to completion.
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, server: Arc<Server>) {
    let handler = ConnectionHandler::new(stream, addr, server);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}
