//! Hash commands

use super::{CommandError, CommandResult, CommandSpec, Invocation};
use crate::protocol::RespValue;
use crate::storage::Value;
use bytes::Bytes;
use std::collections::HashMap;

pub(crate) const COMMANDS: &[CommandSpec] = &[
    command!("hset", 4, cmd_hset, write),
    command!("hget", 3, cmd_hget),
    command!("hlen", 2, cmd_hlen),
    command!("hgetall", 2, cmd_hgetall),
    command!("hexists", 3, cmd_hexists),
    command!("hdel", 0, cmd_hdel, write),
];

fn read_hash<R>(
    inv: &Invocation<'_>,
    f: impl FnOnce(&HashMap<Bytes, Bytes>) -> R,
) -> Result<Option<R>, CommandError> {
    inv.db.read(inv.arg(1), inv.now, |entry| match entry.map(|e| &e.value) {
        None => Ok(None),
        Some(Value::Hash(fields)) => Ok(Some(f(fields))),
        Some(_) => Err(CommandError::WrongType),
    })
}

/// HSET key field value
///
/// Replies 1 if the field is new, 0 if an existing value was replaced.
fn cmd_hset(inv: &mut Invocation<'_>) -> CommandResult {
    let field = inv.arg(2);
    let value = inv.arg(3);

    let created = inv.db.update(inv.arg(1), inv.now, |slot| {
        match slot.get_or_insert_with(|| Value::Hash(HashMap::new())) {
            Value::Hash(fields) => Ok(fields.insert(field.clone(), value.clone()).is_none()),
            _ => Err(CommandError::WrongType),
        }
    })?;

    inv.dirty += 1;
    Ok(RespValue::integer(i64::from(created)))
}

/// HGET key field
fn cmd_hget(inv: &mut Invocation<'_>) -> CommandResult {
    let field = inv.arg(2);
    let value = read_hash(inv, |fields| fields.get(field).cloned())?.flatten();
    Ok(value.map_or_else(RespValue::null, RespValue::bulk_string))
}

/// HLEN key
fn cmd_hlen(inv: &mut Invocation<'_>) -> CommandResult {
    let len = read_hash(inv, |fields| fields.len())?.unwrap_or(0);
    Ok(RespValue::integer(len as i64))
}

/// HGETALL key
///
/// Field/value pairs flattened, ordered by field.
fn cmd_hgetall(inv: &mut Invocation<'_>) -> CommandResult {
    let pairs = read_hash(inv, |fields| {
        let mut pairs: Vec<_> = fields.iter().map(|(f, v)| (f.clone(), v.clone())).collect();
        pairs.sort_unstable();
        pairs
    })?
    .unwrap_or_default();

    let flat = pairs
        .into_iter()
        .flat_map(|(f, v)| [RespValue::bulk_string(f), RespValue::bulk_string(v)])
        .collect();
    Ok(RespValue::array(flat))
}

/// HEXISTS key field
fn cmd_hexists(inv: &mut Invocation<'_>) -> CommandResult {
    let field = inv.arg(2);
    let exists = read_hash(inv, |fields| fields.contains_key(field))?.unwrap_or(false);
    Ok(RespValue::integer(i64::from(exists)))
}

/// HDEL key field [field ...]
fn cmd_hdel(inv: &mut Invocation<'_>) -> CommandResult {
    inv.require_args(3)?;
    let targets = &inv.args[2..];

    let removed = inv.db.update(inv.arg(1), inv.now, |slot| match slot {
        None => Ok(0),
        Some(Value::Hash(fields)) => Ok(targets
            .iter()
            .filter(|field| fields.remove(*field).is_some())
            .count()),
        Some(_) => Err(CommandError::WrongType),
    })?;

    inv.dirty += removed as u64;
    Ok(RespValue::integer(removed as i64))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{bulk, Harness};
    use super::*;

    #[test]
    fn test_hset_hget() {
        let mut h = Harness::new();
        assert_eq!(h.exec(&["HSET", "user", "name", "ada"]), RespValue::integer(1));
        assert_eq!(h.exec(&["HSET", "user", "name", "grace"]), RespValue::integer(0));
        assert_eq!(h.exec(&["HGET", "user", "name"]), bulk("grace"));
        assert_eq!(h.exec(&["HGET", "user", "age"]), RespValue::null());
        assert_eq!(h.exec(&["HGET", "missing", "name"]), RespValue::null());
    }

    #[test]
    fn test_hlen_hexists_hgetall() {
        let mut h = Harness::new();
        h.exec(&["HSET", "h", "b", "2"]);
        h.exec(&["HSET", "h", "a", "1"]);
        assert_eq!(h.exec(&["HLEN", "h"]), RespValue::integer(2));
        assert_eq!(h.exec(&["HEXISTS", "h", "a"]), RespValue::integer(1));
        assert_eq!(h.exec(&["HEXISTS", "h", "z"]), RespValue::integer(0));
        assert_eq!(
            h.exec(&["HGETALL", "h"]),
            RespValue::array(vec![bulk("a"), bulk("1"), bulk("b"), bulk("2")])
        );
        assert_eq!(h.exec(&["HGETALL", "missing"]), RespValue::array(vec![]));
    }

    #[test]
    fn test_hdel_removes_empty_hash() {
        let mut h = Harness::new();
        h.exec(&["HSET", "h", "a", "1"]);
        h.exec(&["HSET", "h", "b", "2"]);
        assert_eq!(h.exec(&["HDEL", "h", "a", "zz"]), RespValue::integer(1));
        assert_eq!(h.exec(&["HDEL", "h", "b"]), RespValue::integer(1));
        assert_eq!(h.exec(&["EXISTS", "h"]), RespValue::integer(0));
        assert_eq!(h.exec(&["HDEL", "h", "b"]), RespValue::integer(0));
    }

    #[test]
    fn test_hash_wrong_type() {
        let mut h = Harness::new();
        h.exec(&["SET", "s", "v"]);
        let wrongtype = RespValue::error(CommandError::WrongType.to_string());
        assert_eq!(h.exec(&["HSET", "s", "f", "v"]), wrongtype);
        assert_eq!(h.exec(&["HGET", "s", "f"]), wrongtype);
        assert_eq!(h.exec(&["HDEL", "s", "f"]), wrongtype);
    }
}
