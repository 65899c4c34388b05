//! Set commands
//!
//! `SPOP` removes a random member, so it is logged as `SREM key <member>`
//! naming the member that was actually removed.

use super::{CommandError, CommandResult, CommandSpec, Invocation};
use crate::protocol::RespValue;
use crate::storage::Value;
use bytes::Bytes;
use rand::seq::IteratorRandom;
use std::collections::HashSet;

pub(crate) const COMMANDS: &[CommandSpec] = &[
    command!("sadd", 0, cmd_sadd, write),
    command!("scard", 2, cmd_scard),
    command!("sismember", 3, cmd_sismember),
    command!("smembers", 2, cmd_smembers),
    command!("spop", 2, cmd_spop, write),
    command!("srandmember", 2, cmd_srandmember),
    command!("srem", 0, cmd_srem, write),
];

fn read_set<R>(
    inv: &Invocation<'_>,
    f: impl FnOnce(&HashSet<Bytes>) -> R,
) -> Result<Option<R>, CommandError> {
    inv.db.read(inv.arg(1), inv.now, |entry| match entry.map(|e| &e.value) {
        None => Ok(None),
        Some(Value::Set(members)) => Ok(Some(f(members))),
        Some(_) => Err(CommandError::WrongType),
    })
}

/// SADD key member [member ...]
fn cmd_sadd(inv: &mut Invocation<'_>) -> CommandResult {
    inv.require_args(3)?;
    let new_members = &inv.args[2..];

    let added = inv.db.update(inv.arg(1), inv.now, |slot| {
        match slot.get_or_insert_with(|| Value::Set(HashSet::new())) {
            Value::Set(members) => Ok(new_members
                .iter()
                .filter(|m| members.insert((*m).clone()))
                .count()),
            _ => Err(CommandError::WrongType),
        }
    })?;

    inv.dirty += added as u64;
    Ok(RespValue::integer(added as i64))
}

/// SCARD key
fn cmd_scard(inv: &mut Invocation<'_>) -> CommandResult {
    let len = read_set(inv, |members| members.len())?.unwrap_or(0);
    Ok(RespValue::integer(len as i64))
}

/// SISMEMBER key member
fn cmd_sismember(inv: &mut Invocation<'_>) -> CommandResult {
    let member = inv.arg(2);
    let found = read_set(inv, |members| members.contains(member))?.unwrap_or(false);
    Ok(RespValue::integer(i64::from(found)))
}

/// SMEMBERS key
///
/// Members are sorted so replies are stable.
fn cmd_smembers(inv: &mut Invocation<'_>) -> CommandResult {
    let mut members = read_set(inv, |members| members.iter().cloned().collect::<Vec<_>>())?
        .unwrap_or_default();
    members.sort_unstable();
    Ok(RespValue::bulk_array(members))
}

/// SPOP key
fn cmd_spop(inv: &mut Invocation<'_>) -> CommandResult {
    let popped = inv.db.update(inv.arg(1), inv.now, |slot| match slot {
        None => Ok(None),
        Some(Value::Set(members)) => {
            let chosen = members.iter().choose(&mut rand::rng()).cloned();
            if let Some(member) = &chosen {
                members.remove(member);
            }
            Ok(chosen)
        }
        Some(_) => Err(CommandError::WrongType),
    })?;

    Ok(match popped {
        Some(member) => {
            inv.dirty += 1;
            inv.propagate_as = Some(vec![
                Bytes::from_static(b"srem"),
                inv.arg(1).clone(),
                member.clone(),
            ]);
            RespValue::bulk_string(member)
        }
        None => RespValue::null(),
    })
}

/// SRANDMEMBER key
fn cmd_srandmember(inv: &mut Invocation<'_>) -> CommandResult {
    let member = read_set(inv, |members| {
        members.iter().choose(&mut rand::rng()).cloned()
    })?
    .flatten();
    Ok(member.map_or_else(RespValue::null, RespValue::bulk_string))
}

/// SREM key member [member ...]
fn cmd_srem(inv: &mut Invocation<'_>) -> CommandResult {
    inv.require_args(3)?;
    let targets = &inv.args[2..];

    let removed = inv.db.update(inv.arg(1), inv.now, |slot| match slot {
        None => Ok(0),
        Some(Value::Set(members)) => Ok(targets.iter().filter(|m| members.remove(*m)).count()),
        Some(_) => Err(CommandError::WrongType),
    })?;

    inv.dirty += removed as u64;
    Ok(RespValue::integer(removed as i64))
}
