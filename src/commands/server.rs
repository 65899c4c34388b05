//! Server and database commands

use super::{CommandError, CommandResult, CommandSpec, Invocation};
use crate::protocol::RespValue;
use bytes::Bytes;
use std::fmt::Write as _;
use std::sync::atomic::Ordering;

pub(crate) const COMMANDS: &[CommandSpec] = &[
    command!("ping", 0, cmd_ping),
    command!("echo", 2, cmd_echo),
    command!("select", 2, cmd_select),
    command!("keys", 2, cmd_keys),
    command!("dbsize", 1, cmd_dbsize),
    command!("flushdb", 1, cmd_flushdb, write),
    command!("flushall", 1, cmd_flushall, write),
    command!("info", 0, cmd_info),
    command!("quit", 1, cmd_quit),
];

/// PING [message]
fn cmd_ping(inv: &mut Invocation<'_>) -> CommandResult {
    match inv.args.len() {
        1 => Ok(RespValue::pong()),
        2 => Ok(RespValue::bulk_string(inv.arg(1).clone())),
        _ => Err(CommandError::WrongArgCount("ping".to_string())),
    }
}

/// ECHO message
fn cmd_echo(inv: &mut Invocation<'_>) -> CommandResult {
    Ok(RespValue::bulk_string(inv.arg(1).clone()))
}

/// SELECT index
fn cmd_select(inv: &mut Invocation<'_>) -> CommandResult {
    let index = inv.int_arg(1)?;
    let index = usize::try_from(index)
        .ok()
        .filter(|i| *i < inv.keyspace.len())
        .ok_or(CommandError::InvalidDbIndex)?;
    inv.client.db_index = index;
    Ok(RespValue::ok())
}

/// KEYS pattern
fn cmd_keys(inv: &mut Invocation<'_>) -> CommandResult {
    let mut keys = inv.db.keys(inv.arg(1), inv.now);
    keys.sort_unstable();
    Ok(RespValue::bulk_array(keys))
}

/// DBSIZE
fn cmd_dbsize(inv: &mut Invocation<'_>) -> CommandResult {
    Ok(RespValue::integer(inv.db.len() as i64))
}

/// FLUSHDB
fn cmd_flushdb(inv: &mut Invocation<'_>) -> CommandResult {
    let removed = inv.db.clear();
    inv.dirty += 1;
    tracing::debug!(db = inv.db.index(), removed, "Database flushed");
    Ok(RespValue::ok())
}

/// FLUSHALL
fn cmd_flushall(inv: &mut Invocation<'_>) -> CommandResult {
    let removed = inv.keyspace.flush_all();
    inv.dirty += 1;
    tracing::debug!(removed, "All databases flushed");
    Ok(RespValue::ok())
}

/// INFO [section]
fn cmd_info(inv: &mut Invocation<'_>) -> CommandResult {
    if inv.args.len() > 2 {
        return Err(CommandError::WrongArgCount("info".to_string()));
    }
    let section = inv
        .args
        .get(1)
        .map(|s| String::from_utf8_lossy(s).to_ascii_lowercase());
    let wants = |name: &str| section.as_deref().map_or(true, |s| s == name || s == "all");

    let stats = inv.stats;
    let mut out = String::new();

    if wants("server") {
        let _ = write!(
            out,
            "# Server\r\n\
             tidekv_version:{}\r\n\
             os:{}\r\n\
             uptime_in_seconds:{}\r\n\
             hz:{}\r\n\
             registered_commands:{}\r\n\r\n",
            crate::VERSION,
            std::env::consts::OS,
            stats.uptime().as_secs(),
            stats.hz(),
            stats.registered_commands.load(Ordering::Relaxed),
        );
    }

    if wants("clients") {
        let _ = write!(
            out,
            "# Clients\r\n\
             connected_clients:{}\r\n\r\n",
            stats.active_connections.load(Ordering::Relaxed),
        );
    }

    if wants("persistence") {
        let _ = write!(
            out,
            "# Persistence\r\n\
             aof_enabled:{}\r\n\
             aof_write_errors:{}\r\n\r\n",
            u8::from(stats.appendonly()),
            stats.aof_write_errors.load(Ordering::Relaxed),
        );
    }

    if wants("stats") {
        let _ = write!(
            out,
            "# Stats\r\n\
             total_connections_received:{}\r\n\
             total_commands_processed:{}\r\n\
             expired_keys:{}\r\n\
             cron_runs:{}\r\n\r\n",
            stats.connections_accepted.load(Ordering::Relaxed),
            stats.commands_processed.load(Ordering::Relaxed),
            inv.keyspace.expired_keys(),
            stats.cron_runs.load(Ordering::Relaxed),
        );
    }

    if wants("keyspace") {
        out.push_str("# Keyspace\r\n");
        for db in inv.keyspace.iter().filter(|db| !db.is_empty()) {
            let _ = write!(
                out,
                "db{}:keys={},expires={}\r\n",
                db.index(),
                db.len(),
                db.volatile_len()
            );
        }
    }

    Ok(RespValue::bulk_string(Bytes::from(out)))
}

/// QUIT
fn cmd_quit(inv: &mut Invocation<'_>) -> CommandResult {
    inv.client.close_after_reply = true;
    Ok(RespValue::ok())
}
