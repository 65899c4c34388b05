//! List commands

use super::{normalize_index, normalize_range, CommandError, CommandResult, CommandSpec, Invocation};
use crate::protocol::RespValue;
use crate::storage::Value;
use bytes::Bytes;
use std::collections::VecDeque;

pub(crate) const COMMANDS: &[CommandSpec] = &[
    command!("lpush", 0, cmd_lpush, write),
    command!("rpush", 0, cmd_rpush, write),
    command!("llen", 2, cmd_llen),
    command!("lindex", 3, cmd_lindex),
    command!("lset", 4, cmd_lset, write),
    command!("linsert", 5, cmd_linsert, write),
    command!("lrange", 4, cmd_lrange),
    command!("lpop", 2, cmd_lpop, write),
    command!("rpop", 2, cmd_rpop, write),
    command!("lrem", 4, cmd_lrem, write),
];

/// Runs `f` on the list at the key argument; `None` if the key is absent.
fn read_list<R>(
    inv: &Invocation<'_>,
    f: impl FnOnce(&VecDeque<Bytes>) -> R,
) -> Result<Option<R>, CommandError> {
    inv.db.read(inv.arg(1), inv.now, |entry| match entry.map(|e| &e.value) {
        None => Ok(None),
        Some(Value::List(items)) => Ok(Some(f(items))),
        Some(_) => Err(CommandError::WrongType),
    })
}

/// Runs `f` on the existing list at the key argument.
fn modify_list<R>(
    inv: &Invocation<'_>,
    f: impl FnOnce(&mut VecDeque<Bytes>) -> R,
) -> Result<Option<R>, CommandError> {
    inv.db.update(inv.arg(1), inv.now, |slot| match slot {
        None => Ok(None),
        Some(Value::List(items)) => Ok(Some(f(items))),
        Some(_) => Err(CommandError::WrongType),
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum End {
    Head,
    Tail,
}

fn push(inv: &mut Invocation<'_>, end: End) -> CommandResult {
    inv.require_args(3)?;
    let values = &inv.args[2..];

    let len = inv.db.update(inv.arg(1), inv.now, |slot| {
        let items = match slot.get_or_insert_with(|| Value::List(VecDeque::new())) {
            Value::List(items) => items,
            _ => return Err(CommandError::WrongType),
        };
        for value in values {
            match end {
                End::Head => items.push_front(value.clone()),
                End::Tail => items.push_back(value.clone()),
            }
        }
        Ok(items.len())
    })?;

    inv.dirty += values.len() as u64;
    Ok(RespValue::integer(len as i64))
}

/// LPUSH key value [value ...]
fn cmd_lpush(inv: &mut Invocation<'_>) -> CommandResult {
    push(inv, End::Head)
}

/// RPUSH key value [value ...]
fn cmd_rpush(inv: &mut Invocation<'_>) -> CommandResult {
    push(inv, End::Tail)
}

/// LLEN key
fn cmd_llen(inv: &mut Invocation<'_>) -> CommandResult {
    let len = read_list(inv, |items| items.len())?.unwrap_or(0);
    Ok(RespValue::integer(len as i64))
}

/// LINDEX key index
fn cmd_lindex(inv: &mut Invocation<'_>) -> CommandResult {
    let index = inv.int_arg(2)?;
    let item = read_list(inv, |items| {
        normalize_index(index, items.len()).map(|i| items[i].clone())
    })?
    .flatten();

    Ok(item.map_or_else(RespValue::null, RespValue::bulk_string))
}

/// LSET key index value
fn cmd_lset(inv: &mut Invocation<'_>) -> CommandResult {
    let index = inv.int_arg(2)?;
    let value = inv.arg(3);

    let updated = modify_list(inv, |items| match normalize_index(index, items.len()) {
        Some(i) => {
            items[i] = value.clone();
            true
        }
        None => false,
    })?;

    match updated {
        None => Err(CommandError::NoSuchKey),
        Some(false) => Err(CommandError::IndexOutOfRange),
        Some(true) => {
            inv.dirty += 1;
            Ok(RespValue::ok())
        }
    }
}

/// LINSERT key BEFORE|AFTER pivot value
///
/// Replies with the new length, -1 if the pivot is missing, 0 if the key is.
fn cmd_linsert(inv: &mut Invocation<'_>) -> CommandResult {
    let after = match inv.arg(2).to_ascii_lowercase().as_slice() {
        b"before" => false,
        b"after" => true,
        _ => return Err(CommandError::Syntax),
    };
    let pivot = inv.arg(3);
    let value = inv.arg(4);

    let result = modify_list(inv, |items| {
        let pos = items.iter().position(|item| item == pivot)?;
        let at = if after { pos + 1 } else { pos };
        items.insert(at, value.clone());
        Some(items.len())
    })?;

    Ok(match result {
        None => RespValue::integer(0),
        Some(None) => RespValue::integer(-1),
        Some(Some(len)) => {
            inv.dirty += 1;
            RespValue::integer(len as i64)
        }
    })
}

/// LRANGE key start stop
fn cmd_lrange(inv: &mut Invocation<'_>) -> CommandResult {
    let start = inv.int_arg(2)?;
    let stop = inv.int_arg(3)?;

    let items = read_list(inv, |items| match normalize_range(start, stop, items.len()) {
        Some((from, to)) => items
            .range(from..=to)
            .cloned()
            .map(RespValue::bulk_string)
            .collect(),
        None => Vec::new(),
    })?
    .unwrap_or_default();

    Ok(RespValue::array(items))
}

fn pop(inv: &mut Invocation<'_>, end: End) -> CommandResult {
    let popped = modify_list(inv, |items| match end {
        End::Head => items.pop_front(),
        End::Tail => items.pop_back(),
    })?
    .flatten();

    Ok(match popped {
        Some(item) => {
            inv.dirty += 1;
            RespValue::bulk_string(item)
        }
        None => RespValue::null(),
    })
}

/// LPOP key
fn cmd_lpop(inv: &mut Invocation<'_>) -> CommandResult {
    pop(inv, End::Head)
}

/// RPOP key
fn cmd_rpop(inv: &mut Invocation<'_>) -> CommandResult {
    pop(inv, End::Tail)
}

/// LREM key count value
///
/// `count > 0` removes from the head, `count < 0` from the tail, `0` all.
fn cmd_lrem(inv: &mut Invocation<'_>) -> CommandResult {
    let count = inv.int_arg(2)?;
    let value = inv.arg(3);
    let limit = if count == 0 {
        usize::MAX
    } else {
        count.unsigned_abs() as usize
    };

    let removed = modify_list(inv, |items| {
        let mut removed = 0;
        if count >= 0 {
            let mut i = 0;
            while i < items.len() && removed < limit {
                if items[i] == *value {
                    items.remove(i);
                    removed += 1;
                } else {
                    i += 1;
                }
            }
        } else {
            let mut i = items.len();
            while i > 0 && removed < limit {
                i -= 1;
                if items[i] == *value {
                    items.remove(i);
                    removed += 1;
                }
            }
        }
        removed
    })?
    .unwrap_or(0);

    inv.dirty += removed as u64;
    Ok(RespValue::integer(removed as i64))
}
