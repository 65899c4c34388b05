//! String commands

use super::{normalize_range, parse_int, CommandError, CommandResult, CommandSpec, Invocation};
use crate::protocol::RespValue;
use crate::storage::Value;
use bytes::{Bytes, BytesMut};

pub(crate) const COMMANDS: &[CommandSpec] = &[
    command!("get", 2, cmd_get),
    command!("set", 3, cmd_set, write),
    command!("strlen", 2, cmd_strlen),
    command!("append", 3, cmd_append, write),
    command!("getrange", 4, cmd_getrange),
    command!("mget", 0, cmd_mget),
    command!("incr", 2, cmd_incr, write),
    command!("incrby", 3, cmd_incrby, write),
    command!("decr", 2, cmd_decr, write),
    command!("decrby", 3, cmd_decrby, write),
];

/// Reads the string at `key`; `None` if absent.
fn read_string(inv: &Invocation<'_>, key: &Bytes) -> Result<Option<Bytes>, CommandError> {
    inv.db.read(key, inv.now, |entry| match entry.map(|e| &e.value) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(CommandError::WrongType),
    })
}

/// GET key
fn cmd_get(inv: &mut Invocation<'_>) -> CommandResult {
    Ok(match read_string(inv, inv.arg(1))? {
        Some(s) => RespValue::bulk_string(s),
        None => RespValue::null(),
    })
}

/// SET key value
///
/// Overwrites any value of any type and clears the expiry.
fn cmd_set(inv: &mut Invocation<'_>) -> CommandResult {
    let key = inv.arg(1).clone();
    let value = inv.arg(2).clone();
    inv.db.set(key, Value::String(value), inv.now);
    inv.dirty += 1;
    Ok(RespValue::ok())
}

/// STRLEN key
fn cmd_strlen(inv: &mut Invocation<'_>) -> CommandResult {
    let len = read_string(inv, inv.arg(1))?.map_or(0, |s| s.len());
    Ok(RespValue::integer(len as i64))
}

/// APPEND key value
fn cmd_append(inv: &mut Invocation<'_>) -> CommandResult {
    let suffix = inv.arg(2);
    let len = inv.db.update(inv.arg(1), inv.now, |slot| match slot {
        None => {
            *slot = Some(Value::String(suffix.clone()));
            Ok(suffix.len())
        }
        Some(Value::String(s)) => {
            let mut joined = BytesMut::with_capacity(s.len() + suffix.len());
            joined.extend_from_slice(s);
            joined.extend_from_slice(suffix);
            *s = joined.freeze();
            Ok(s.len())
        }
        Some(_) => Err(CommandError::WrongType),
    })?;

    inv.dirty += 1;
    Ok(RespValue::integer(len as i64))
}

/// GETRANGE key start end
fn cmd_getrange(inv: &mut Invocation<'_>) -> CommandResult {
    let start = inv.int_arg(2)?;
    let end = inv.int_arg(3)?;

    let s = read_string(inv, inv.arg(1))?.unwrap_or_default();
    Ok(match normalize_range(start, end, s.len()) {
        Some((from, to)) => RespValue::bulk_string(s.slice(from..=to)),
        None => RespValue::bulk_string(Bytes::new()),
    })
}

/// MGET key [key ...]
///
/// Keys holding another type read as nil.
fn cmd_mget(inv: &mut Invocation<'_>) -> CommandResult {
    inv.require_args(2)?;
    let inv = &*inv;

    let values = inv.args[1..]
        .iter()
        .map(|key| match read_string(inv, key) {
            Ok(Some(s)) => RespValue::bulk_string(s),
            _ => RespValue::null(),
        })
        .collect();
    Ok(RespValue::array(values))
}

/// Adds `delta` to the integer stored at the key argument.
fn incr_by(inv: &mut Invocation<'_>, delta: i64) -> CommandResult {
    let result = inv.db.update(inv.arg(1), inv.now, |slot| {
        let current = match slot {
            None => 0,
            Some(Value::String(s)) => parse_int(s)?,
            Some(_) => return Err(CommandError::WrongType),
        };
        let next = current.checked_add(delta).ok_or(CommandError::Overflow)?;
        *slot = Some(Value::String(Bytes::from(next.to_string())));
        Ok(next)
    })?;

    inv.dirty += 1;
    Ok(RespValue::integer(result))
}

/// INCR key
fn cmd_incr(inv: &mut Invocation<'_>) -> CommandResult {
    incr_by(inv, 1)
}

/// INCRBY key increment
fn cmd_incrby(inv: &mut Invocation<'_>) -> CommandResult {
    let delta = inv.int_arg(2)?;
    incr_by(inv, delta)
}

/// DECR key
fn cmd_decr(inv: &mut Invocation<'_>) -> CommandResult {
    incr_by(inv, -1)
}

/// DECRBY key decrement
fn cmd_decrby(inv: &mut Invocation<'_>) -> CommandResult {
    let delta = inv.int_arg(2)?.checked_neg().ok_or(CommandError::Overflow)?;
    incr_by(inv, delta)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{argv, bulk, Harness};
    use super::*;

    #[test]
    fn test_set_get() {
        let mut h = Harness::new();
        assert_eq!(h.exec(&["SET", "key", "value"]), RespValue::ok());
        assert_eq!(h.exec(&["GET", "key"]), bulk("value"));
        assert_eq!(h.exec(&["GET", "nonexistent"]), RespValue::null());
    }

    #[test]
    fn test_set_is_logged_verbatim() {
        let mut h = Harness::new();
        let (_, logged) = h.run(&["set", "a", "1"]);
        assert_eq!(logged, Some(argv(&["set", "a", "1"])));

        let (_, logged) = h.run(&["get", "a"]);
        assert_eq!(logged, None);
    }

    #[test]
    fn test_incr_decr() {
        let mut h = Harness::new();
        assert_eq!(h.exec(&["INCR", "counter"]), RespValue::integer(1));
        assert_eq!(h.exec(&["INCRBY", "counter", "10"]), RespValue::integer(11));
        assert_eq!(h.exec(&["DECR", "counter"]), RespValue::integer(10));
        assert_eq!(h.exec(&["DECRBY", "counter", "4"]), RespValue::integer(6));
        assert_eq!(h.exec(&["GET", "counter"]), bulk("6"));
    }

    #[test]
    fn test_incr_errors() {
        let mut h = Harness::new();
        h.exec(&["SET", "word", "abc"]);
        assert_eq!(
            h.exec(&["INCR", "word"]),
            RespValue::error(CommandError::NotInteger.to_string())
        );
        assert_eq!(
            h.exec(&["INCRBY", "n", "x"]),
            RespValue::error(CommandError::NotInteger.to_string())
        );

        let max = i64::MAX.to_string();
        h.exec(&["SET", "big", max.as_str()]);
        assert_eq!(
            h.exec(&["INCR", "big"]),
            RespValue::error(CommandError::Overflow.to_string())
        );
        // A failed increment is not logged.
        let (_, logged) = h.run(&["INCR", "big"]);
        assert_eq!(logged, None);
    }

    #[test]
    fn test_incr_keeps_expiry() {
        let mut h = Harness::new();
        h.exec(&["SET", "n", "1"]);
        h.exec(&["PEXPIRE", "n", "5000"]);
        h.exec(&["INCR", "n"]);
        assert_eq!(h.exec(&["PTTL", "n"]), RespValue::integer(5000));
    }

    #[test]
    fn test_append_and_strlen() {
        let mut h = Harness::new();
        assert_eq!(h.exec(&["APPEND", "k", "Hello"]), RespValue::integer(5));
        assert_eq!(h.exec(&["APPEND", "k", " World"]), RespValue::integer(11));
        assert_eq!(h.exec(&["STRLEN", "k"]), RespValue::integer(11));
        assert_eq!(h.exec(&["STRLEN", "missing"]), RespValue::integer(0));
    }

    #[test]
    fn test_getrange() {
        let mut h = Harness::new();
        h.exec(&["SET", "k", "This is a string"]);
        assert_eq!(h.exec(&["GETRANGE", "k", "0", "3"]), bulk("This"));
        assert_eq!(h.exec(&["GETRANGE", "k", "-3", "-1"]), bulk("ing"));
        assert_eq!(h.exec(&["GETRANGE", "k", "0", "-1"]), bulk("This is a string"));
        assert_eq!(h.exec(&["GETRANGE", "k", "10", "100"]), bulk("string"));
        assert_eq!(h.exec(&["GETRANGE", "k", "5", "1"]), bulk(""));
        assert_eq!(h.exec(&["GETRANGE", "missing", "0", "1"]), bulk(""));
    }

    #[test]
    fn test_mget() {
        let mut h = Harness::new();
        h.exec(&["SET", "a", "1"]);
        h.exec(&["LPUSH", "list", "x"]);
        assert_eq!(
            h.exec(&["MGET", "a", "missing", "list"]),
            RespValue::array(vec![bulk("1"), RespValue::null(), RespValue::null()])
        );
        assert!(h.exec(&["MGET"]).is_error());
    }

    #[test]
    fn test_wrong_type() {
        let mut h = Harness::new();
        h.exec(&["LPUSH", "list", "x"]);
        let wrongtype = RespValue::error(CommandError::WrongType.to_string());
        assert_eq!(h.exec(&["GET", "list"]), wrongtype);
        assert_eq!(h.exec(&["APPEND", "list", "y"]), wrongtype);
        assert_eq!(h.exec(&["STRLEN", "list"]), wrongtype);
        // SET replaces any type.
        assert_eq!(h.exec(&["SET", "list", "v"]), RespValue::ok());
        assert_eq!(h.exec(&["GET", "list"]), bulk("v"));
    }
}
