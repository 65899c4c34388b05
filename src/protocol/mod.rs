//! RESP Protocol Implementation
//!
//! The protocol boundary of the server: raw bytes in, one argument vector
//! per command out, and `RespValue` replies back. The append-only log uses
//! the same framing for its records (see [`encode_command`]).
//!
//! - `types`: the `RespValue` enum and serialization
//! - `parser`: incremental parser for incoming RESP data

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::{encode_command, RespValue};
