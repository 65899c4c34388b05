//! Command Dispatch
//!
//! Every command the server understands is a [`CommandSpec`]: a lowercase
//! name, an arity and a plain handler function. The [`CommandTable`] maps
//! names to specs and refuses ambiguous registrations, and the server checks
//! the whole table again at startup with [`CommandTable::verify`].
//!
//! ## Architecture
//!
//! ```text
//! Client argv ["INCRBY", "a", "5"]
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  CommandTable   │  lowercase lookup + arity check (server module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    handler      │  fn(&mut Invocation) -> CommandResult
//! └────────┬────────┘
//!          │ dirty > 0 ?
//!          ▼
//! ┌─────────────────┐
//! │ append-only log │  (persistence module)
//! └─────────────────┘
//! ```
//!
//! ## Command Groups
//!
//! - `string`: `GET SET STRLEN APPEND GETRANGE MGET INCR INCRBY DECR DECRBY`
//! - `keys`: `DEL EXISTS EXPIRE PEXPIRE EXPIREAT PEXPIREAT TTL PTTL PERSIST TYPE`
//! - `list`: `LPUSH RPUSH LLEN LINDEX LSET LINSERT LRANGE LPOP RPOP LREM`
//! - `hash`: `HSET HGET HLEN HGETALL HEXISTS HDEL`
//! - `set`: `SADD SCARD SISMEMBER SMEMBERS SPOP SRANDMEMBER SREM`
//! - `server`: `PING ECHO SELECT KEYS DBSIZE FLUSHDB FLUSHALL INFO QUIT`

/// Builds a [`CommandSpec`], recording the handler's name as its identity.
///
/// `write` marks commands that may change the keyspace.
macro_rules! command {
    ($name:literal, $arity:expr, $handler:ident) => {
        $crate::commands::CommandSpec::new($name, $arity, $handler, stringify!($handler))
    };
    ($name:literal, $arity:expr, $handler:ident, write) => {
        $crate::commands::CommandSpec::new($name, $arity, $handler, stringify!($handler))
            .mutating()
    };
}

pub mod hash;
pub mod keys;
pub mod list;
pub mod server;
pub mod set;
pub mod string;

use crate::connection::Client;
use crate::protocol::RespValue;
use crate::server::ServerStats;
use crate::storage::{Database, Keyspace};
use bytes::Bytes;
use std::collections::HashMap;
use thiserror::Error;

/// Errors a handler reports back to the client as an error reply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArgCount(String),

    #[error("ERR index out of range")]
    IndexOutOfRange,

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("ERR DB index is out of range")]
    InvalidDbIndex,

    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpireTime(&'static str),

    #[error("ERR {0}")]
    Other(String),
}

pub type CommandResult = Result<RespValue, CommandError>;

/// A command implementation.
pub type CommandHandler = fn(&mut Invocation<'_>) -> CommandResult;

/// One entry of the dispatch table.
#[derive(Clone, Copy)]
pub struct CommandSpec {
    /// Lowercase command name
    pub name: &'static str,
    /// Expected argument count including the name; 0 = not checked
    pub arity: usize,
    pub handler: CommandHandler,
    /// Name of the handler function, unique across the table
    pub handler_name: &'static str,
    /// May change the keyspace; runs in log order when logging is on
    pub write: bool,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("handler", &self.handler_name)
            .field("write", &self.write)
            .finish()
    }
}

impl CommandSpec {
    pub const fn new(
        name: &'static str,
        arity: usize,
        handler: CommandHandler,
        handler_name: &'static str,
    ) -> Self {
        Self {
            name,
            arity,
            handler,
            handler_name,
            write: false,
        }
    }

    /// Marks the command as one that may change the keyspace.
    pub const fn mutating(self) -> Self {
        Self { write: true, ..self }
    }

    /// Whether `argc` arguments (name included) satisfy the arity.
    pub fn accepts(&self, argc: usize) -> bool {
        self.arity == 0 || self.arity == argc
    }
}

/// Reasons the dispatch table can be rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("command '{0}' is registered twice")]
    Duplicate(String),

    #[error("command registered as '{key}' describes itself as '{name}'")]
    NameMismatch { key: String, name: String },

    #[error("command name '{0}' must be non-empty lowercase ASCII")]
    InvalidName(String),

    #[error("commands '{first}' and '{second}' share one handler")]
    SharedHandler { first: String, second: String },
}

/// Lowercase command name to spec.
#[derive(Debug, Default)]
pub struct CommandTable {
    commands: HashMap<&'static str, CommandSpec>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table with every built-in command.
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut table = Self::new();
        for group in [
            string::COMMANDS,
            keys::COMMANDS,
            list::COMMANDS,
            hash::COMMANDS,
            set::COMMANDS,
            server::COMMANDS,
        ] {
            for spec in group {
                table.register(*spec)?;
            }
        }
        Ok(table)
    }

    /// Registers `spec` under its own name.
    pub fn register(&mut self, spec: CommandSpec) -> Result<(), RegistryError> {
        self.insert(spec.name, spec)
    }

    /// Registers `spec` under `key`, which must equal `spec.name`.
    pub fn insert(&mut self, key: &'static str, spec: CommandSpec) -> Result<(), RegistryError> {
        check_name(key)?;
        if key != spec.name {
            return Err(RegistryError::NameMismatch {
                key: key.to_string(),
                name: spec.name.to_string(),
            });
        }
        if self.commands.contains_key(key) {
            return Err(RegistryError::Duplicate(key.to_string()));
        }
        if let Some(other) = self
            .commands
            .values()
            .find(|other| other.handler_name == spec.handler_name)
        {
            return Err(RegistryError::SharedHandler {
                first: other.name.to_string(),
                second: key.to_string(),
            });
        }

        self.commands.insert(key, spec);
        Ok(())
    }

    /// Re-checks the whole table: names, keys and handler uniqueness.
    pub fn verify(&self) -> Result<(), RegistryError> {
        let mut handlers: HashMap<&'static str, &'static str> = HashMap::new();
        let mut names: Vec<_> = self.commands.keys().copied().collect();
        names.sort_unstable();

        for key in names {
            let spec = &self.commands[key];
            check_name(key)?;
            if spec.name != key {
                return Err(RegistryError::NameMismatch {
                    key: key.to_string(),
                    name: spec.name.to_string(),
                });
            }
            if spec.handler_name.is_empty() {
                return Err(RegistryError::InvalidName(key.to_string()));
            }
            if let Some(first) = handlers.insert(spec.handler_name, key) {
                return Err(RegistryError::SharedHandler {
                    first: first.to_string(),
                    second: key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &[u8]) -> Option<&CommandSpec> {
        let name = std::str::from_utf8(name).ok()?;
        if name.bytes().any(|b| b.is_ascii_uppercase()) {
            self.commands.get(name.to_ascii_lowercase().as_str())
        } else {
            self.commands.get(name)
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

fn check_name(name: &str) -> Result<(), RegistryError> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidName(name.to_string()))
    }
}

/// Everything a handler may touch while it runs.
pub struct Invocation<'a> {
    /// Full argument vector, `args[0]` is the command name
    pub args: &'a [Bytes],
    /// The client's selected database
    pub db: &'a Database,
    pub keyspace: &'a Keyspace,
    pub stats: &'a ServerStats,
    pub client: &'a mut Client,
    /// Wall clock in Unix milliseconds, fixed for the whole command
    pub now: u64,
    /// Number of changes made; non-zero means the command is logged
    pub dirty: u64,
    /// Deterministic form to log instead of `args`
    pub propagate_as: Option<Vec<Bytes>>,
}

impl<'a> Invocation<'a> {
    pub fn new(
        args: &'a [Bytes],
        db: &'a Database,
        keyspace: &'a Keyspace,
        stats: &'a ServerStats,
        client: &'a mut Client,
        now: u64,
    ) -> Self {
        Self {
            args,
            db,
            keyspace,
            stats,
            client,
            now,
            dirty: 0,
            propagate_as: None,
        }
    }

    /// Checks the argument count of a variadic command.
    pub fn require_args(&self, min: usize) -> Result<(), CommandError> {
        if self.args.len() < min {
            let name = String::from_utf8_lossy(&self.args[0]).to_ascii_lowercase();
            return Err(CommandError::WrongArgCount(name));
        }
        Ok(())
    }

    #[inline]
    pub fn arg(&self, index: usize) -> &'a Bytes {
        &self.args[index]
    }

    pub fn int_arg(&self, index: usize) -> Result<i64, CommandError> {
        parse_int(&self.args[index])
    }

    /// The record to append to the log for this command.
    pub fn propagated(&self) -> Vec<Bytes> {
        match &self.propagate_as {
            Some(argv) => argv.clone(),
            None => self.args.to_vec(),
        }
    }
}

/// Parses a decimal integer argument.
pub fn parse_int(arg: &[u8]) -> Result<i64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(CommandError::NotInteger)
}

/// Resolves a possibly negative index against a sequence of `len` items.
pub(crate) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let actual = if index < 0 { len + index } else { index };
    (0..len).contains(&actual).then_some(actual as usize)
}

/// Clamps an inclusive `start..=stop` range with negative offsets.
pub(crate) fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::storage::Keyspace;

    /// A keyspace, stats and client to run handlers against.
    pub struct Harness {
        pub keyspace: Keyspace,
        pub stats: ServerStats,
        pub client: Client,
        pub table: CommandTable,
        pub now: u64,
    }

    impl Harness {
        pub fn new() -> Self {
            let table = CommandTable::builtin().unwrap();
            let stats = ServerStats::new(10, false);
            stats.set_registered_commands(table.len());
            Self {
                keyspace: Keyspace::new(16),
                stats,
                client: Client::new(1, None),
                table,
                now: 1_000_000,
            }
        }

        /// Runs a command; returns the reply and the logged form if dirty.
        pub fn run(&mut self, args: &[&str]) -> (RespValue, Option<Vec<Bytes>>) {
            let argv: Vec<Bytes> = args.iter().map(|s| Bytes::from(s.to_string())).collect();
            let spec = *self.table.get(&argv[0]).unwrap();
            assert!(spec.accepts(argv.len()), "bad arity for {args:?}");

            let db = self.keyspace.db(self.client.db_index).unwrap();
            let mut inv = Invocation::new(
                &argv,
                db,
                &self.keyspace,
                &self.stats,
                &mut self.client,
                self.now,
            );
            let reply = match (spec.handler)(&mut inv) {
                Ok(reply) => reply,
                Err(e) => RespValue::error(e.to_string()),
            };
            let logged = (inv.dirty > 0).then(|| inv.propagated());
            (reply, logged)
        }

        pub fn exec(&mut self, args: &[&str]) -> RespValue {
            self.run(args).0
        }
    }

    pub fn bulk(s: &str) -> RespValue {
        RespValue::bulk_string(Bytes::from(s.to_string()))
    }

    pub fn argv(args: &[&str]) -> Vec<Bytes> {
        args.iter().map(|s| Bytes::from(s.to_string())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd_a(_: &mut Invocation<'_>) -> CommandResult {
        Ok(RespValue::ok())
    }

    fn cmd_b(_: &mut Invocation<'_>) -> CommandResult {
        Ok(RespValue::pong())
    }

    // Same body as cmd_a; the optimizer may fold the two together.
    fn cmd_c(_: &mut Invocation<'_>) -> CommandResult {
        Ok(RespValue::ok())
    }

    #[test]
    fn test_builtin_table_verifies() {
        let table = CommandTable::builtin().unwrap();
        table.verify().unwrap();
        assert_eq!(table.len(), 52);
        assert!(table.get(b"GET").is_some());
        assert!(table.get(b"IncrBy").is_some());
        assert!(table.get(b"foo").is_none());
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut table = CommandTable::new();
        table.register(CommandSpec::new("a", 1, cmd_a, "cmd_a")).unwrap();
        assert_eq!(
            table.register(CommandSpec::new("a", 1, cmd_b, "cmd_b")),
            Err(RegistryError::Duplicate("a".to_string()))
        );
    }

    #[test]
    fn test_register_rejects_shared_handler() {
        let mut table = CommandTable::new();
        table.register(CommandSpec::new("a", 1, cmd_a, "cmd_a")).unwrap();
        assert!(matches!(
            table.register(CommandSpec::new("b", 1, cmd_a, "cmd_a")),
            Err(RegistryError::SharedHandler { .. })
        ));
    }

    #[test]
    fn test_identical_bodies_are_distinct_handlers() {
        let mut table = CommandTable::new();
        table.register(command!("a", 1, cmd_a)).unwrap();
        table.register(command!("c", 1, cmd_c)).unwrap();
        table.verify().unwrap();
    }

    #[test]
    fn test_write_flag() {
        let table = CommandTable::builtin().unwrap();
        for name in ["set", "incrby", "del", "pexpire", "rpush", "hset", "spop", "flushall"] {
            assert!(table.get(name.as_bytes()).unwrap().write, "{name}");
        }
        for name in ["get", "ttl", "lrange", "hgetall", "smembers", "select", "info"] {
            assert!(!table.get(name.as_bytes()).unwrap().write, "{name}");
        }
    }

    #[test]
    fn test_insert_rejects_name_mismatch() {
        let mut table = CommandTable::new();
        assert!(matches!(
            table.insert("a", CommandSpec::new("b", 1, cmd_a, "cmd_a")),
            Err(RegistryError::NameMismatch { .. })
        ));
        assert_eq!(
            table.register(CommandSpec::new("Get", 2, cmd_a, "cmd_a")),
            Err(RegistryError::InvalidName("Get".to_string()))
        );
    }

    #[test]
    fn test_arity() {
        let fixed = CommandSpec::new("a", 2, cmd_a, "cmd_a");
        assert!(fixed.accepts(2));
        assert!(!fixed.accepts(3));
        let variadic = CommandSpec::new("b", 0, cmd_b, "cmd_b");
        assert!(variadic.accepts(1));
        assert!(variadic.accepts(10));
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int(b"42"), Ok(42));
        assert_eq!(parse_int(b"-7"), Ok(-7));
        assert_eq!(parse_int(b"4x"), Err(CommandError::NotInteger));
        assert_eq!(parse_int(b""), Err(CommandError::NotInteger));
    }

    #[test]
    fn test_normalize_range() {
        assert_eq!(normalize_range(0, -1, 5), Some((0, 4)));
        assert_eq!(normalize_range(-2, -1, 5), Some((3, 4)));
        assert_eq!(normalize_range(-100, 100, 3), Some((0, 2)));
        assert_eq!(normalize_range(3, 1, 5), None);
        assert_eq!(normalize_range(5, 10, 5), None);
        assert_eq!(normalize_range(0, -1, 0), None);
    }

    #[test]
    fn test_normalize_index() {
        assert_eq!(normalize_index(0, 3), Some(0));
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(3, 3), None);
        assert_eq!(normalize_index(-4, 3), None);
    }
}
