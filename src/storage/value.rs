//! Typed values held by a key.

use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};

/// The payload stored under a key.
///
/// Command handlers match on the variant they expect and answer
/// `WRONGTYPE` for any other one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(Bytes),
    List(VecDeque<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
    Set(HashSet<Bytes>),
}

impl Value {
    /// Name reported by the `TYPE` command.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
        }
    }

    /// An aggregate with no elements left is deleted by the database.
    pub fn is_empty_aggregate(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(items) => items.is_empty(),
            Value::Hash(fields) => fields.is_empty(),
            Value::Set(members) => members.is_empty(),
        }
    }

    /// Rough payload size, used by `INFO`.
    pub fn approximate_size(&self) -> usize {
        match self {
            Value::String(s) => s.len(),
            Value::List(items) => items.iter().map(Bytes::len).sum(),
            Value::Hash(fields) => fields.iter().map(|(k, v)| k.len() + v.len()).sum(),
            Value::Set(members) => members.iter().map(Bytes::len).sum(),
        }
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::String(b)
    }
}

impl From<&'static str> for Value {
    fn from(s: &'static str) -> Self {
        Value::String(Bytes::from(s))
    }
}
