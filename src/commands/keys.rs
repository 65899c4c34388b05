//! Key and expiry commands
//!
//! Relative expiry commands depend on the wall clock, so they are logged as
//! `PEXPIREAT key <absolute ms>` and replaying the log sets the same
//! deadline the live command did.

use super::{CommandError, CommandResult, CommandSpec, Invocation};
use crate::protocol::RespValue;
use bytes::Bytes;

pub(crate) const COMMANDS: &[CommandSpec] = &[
    command!("del", 0, cmd_del, write),
    command!("exists", 0, cmd_exists),
    command!("pexpire", 3, cmd_pexpire, write),
    command!("pexpireat", 3, cmd_pexpireat, write),
    command!("expire", 3, cmd_expire, write),
    command!("expireat", 3, cmd_expireat, write),
    command!("pttl", 2, cmd_pttl),
    command!("ttl", 2, cmd_ttl),
    command!("persist", 2, cmd_persist, write),
    command!("type", 2, cmd_type),
];

/// DEL key [key ...]
fn cmd_del(inv: &mut Invocation<'_>) -> CommandResult {
    inv.require_args(2)?;

    let removed = inv.args[1..]
        .iter()
        .filter(|key| inv.db.remove(key, inv.now))
        .count();
    inv.dirty += removed as u64;
    Ok(RespValue::integer(removed as i64))
}

/// EXISTS key [key ...]
fn cmd_exists(inv: &mut Invocation<'_>) -> CommandResult {
    inv.require_args(2)?;

    let found = inv.args[1..]
        .iter()
        .filter(|key| inv.db.contains(key, inv.now))
        .count();
    Ok(RespValue::integer(found as i64))
}

/// How the time argument of an expire command is read.
#[derive(Clone, Copy)]
struct ExpireForm {
    name: &'static str,
    /// Milliseconds per unit of the argument
    unit_ms: i64,
    /// The argument is a Unix timestamp rather than a delay
    absolute: bool,
}

fn expire_generic(inv: &mut Invocation<'_>, form: ExpireForm) -> CommandResult {
    let key = inv.arg(1);
    let amount = inv.int_arg(2)?;
    let invalid = || CommandError::InvalidExpireTime(form.name);

    let base = if form.absolute { 0 } else { inv.now as i64 };
    let at = amount
        .checked_mul(form.unit_ms)
        .and_then(|ms| ms.checked_add(base))
        .ok_or_else(invalid)?;

    if !inv.db.contains(key, inv.now) {
        return Ok(RespValue::integer(0));
    }

    if at <= inv.now as i64 {
        // A deadline in the past deletes the key right away.
        inv.db.remove(key, inv.now);
        inv.dirty += 1;
        inv.propagate_as = Some(vec![Bytes::from_static(b"del"), key.clone()]);
        return Ok(RespValue::integer(1));
    }

    let at = at as u64;
    if !inv.db.set_expiry(key, at, inv.now) {
        return Ok(RespValue::integer(0));
    }

    inv.dirty += 1;
    if form.name != "pexpireat" {
        inv.propagate_as = Some(vec![
            Bytes::from_static(b"pexpireat"),
            key.clone(),
            Bytes::from(at.to_string()),
        ]);
    }
    Ok(RespValue::integer(1))
}

/// PEXPIRE key milliseconds
fn cmd_pexpire(inv: &mut Invocation<'_>) -> CommandResult {
    expire_generic(
        inv,
        ExpireForm {
            name: "pexpire",
            unit_ms: 1,
            absolute: false,
        },
    )
}

/// PEXPIREAT key unix-time-milliseconds
fn cmd_pexpireat(inv: &mut Invocation<'_>) -> CommandResult {
    expire_generic(
        inv,
        ExpireForm {
            name: "pexpireat",
            unit_ms: 1,
            absolute: true,
        },
    )
}

/// EXPIRE key seconds
fn cmd_expire(inv: &mut Invocation<'_>) -> CommandResult {
    expire_generic(
        inv,
        ExpireForm {
            name: "expire",
            unit_ms: 1000,
            absolute: false,
        },
    )
}

/// EXPIREAT key unix-time-seconds
fn cmd_expireat(inv: &mut Invocation<'_>) -> CommandResult {
    expire_generic(
        inv,
        ExpireForm {
            name: "expireat",
            unit_ms: 1000,
            absolute: true,
        },
    )
}

/// Remaining time to live in milliseconds: -2 if absent, -1 if persistent.
fn remaining_ms(inv: &Invocation<'_>) -> i64 {
    match inv.db.expiry_of(inv.arg(1), inv.now) {
        None => -2,
        Some(None) => -1,
        Some(Some(at)) => at.saturating_sub(inv.now) as i64,
    }
}

/// PTTL key
fn cmd_pttl(inv: &mut Invocation<'_>) -> CommandResult {
    Ok(RespValue::integer(remaining_ms(inv)))
}

/// TTL key
fn cmd_ttl(inv: &mut Invocation<'_>) -> CommandResult {
    let ms = remaining_ms(inv);
    let secs = if ms < 0 { ms } else { (ms + 500) / 1000 };
    Ok(RespValue::integer(secs))
}

/// PERSIST key
fn cmd_persist(inv: &mut Invocation<'_>) -> CommandResult {
    if inv.db.persist(inv.arg(1), inv.now) {
        inv.dirty += 1;
        Ok(RespValue::integer(1))
    } else {
        Ok(RespValue::integer(0))
    }
}

/// TYPE key
fn cmd_type(inv: &mut Invocation<'_>) -> CommandResult {
    let name = inv.db.read(inv.arg(1), inv.now, |entry| {
        entry.map_or("none", |e| e.value.type_name())
    });
    Ok(RespValue::simple_string(name))
}
