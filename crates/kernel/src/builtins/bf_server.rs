use crate::builtins::BfRet::Ret;
use crate::builtins::{BfCallState, BfErr, BfRet, BuiltinFunction, register, world_state_bf_err};
use crate::tasks::{SuspendCondition, WakeValue};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};
use warren_common::model::ObjFlag;
use warren_common::tasks::InputRequest;
use warren_var::{
    E_ARGS, E_INVARG, E_PERM, E_TYPE, Obj, Symbol, Var, Variant, v_int, v_list, v_list_iter,
    v_obj, v_str, v_string,
};

lazy_static! {
    /// Pinned at startup by the scheduler; `server_started()` reports it.
    pub static ref SERVER_START_TIME: SystemTime = SystemTime::now();
}

fn obj_arg(args: &[Var], i: usize) -> Result<Obj, BfErr> {
    match args.get(i).map(|v| v.variant()) {
        Some(Variant::Obj(o)) => Ok(*o),
        Some(_) => Err(BfErr::Code(E_TYPE)),
        None => Err(BfErr::Code(E_ARGS)),
    }
}

fn str_arg(args: &[Var], i: usize) -> Result<String, BfErr> {
    match args.get(i).map(|v| v.variant()) {
        Some(Variant::Str(s)) => Ok(s.as_str().to_string()),
        Some(_) => Err(BfErr::Code(E_TYPE)),
        None => Err(BfErr::Code(E_ARGS)),
    }
}

fn bf_server_version(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if !bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    let version = semver::Version::parse(env!("CARGO_PKG_VERSION"))
        .map(|v| v.to_string())
        .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());
    Ok(Ret(v_string(format!("warren {version}"))))
}

/// server_log(message [, level]) -- level 0/absent is info, 1 warning,
/// 2 error.
fn bf_server_log(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.is_empty() || bf_args.args.len() > 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let msg = str_arg(&bf_args.args, 0)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() {
        return Err(BfErr::Code(E_PERM));
    }
    let level = match bf_args.args.get(1) {
        Some(v) => v.as_integer().unwrap_or(0),
        None => 0,
    };
    let who = perms.who;
    match level {
        2 => error!("server_log [{who}]: {msg}"),
        1 => warn!("server_log [{who}]: {msg}"),
        _ => info!("server_log [{who}]: {msg}"),
    }
    Ok(Ret(v_int(1)))
}

fn bf_shutdown(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() > 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() {
        return Err(BfErr::Code(E_PERM));
    }
    let msg = match bf_args.args.first() {
        Some(v) => match v.variant() {
            Variant::Str(s) => Some(s.as_str().to_string()),
            _ => return Err(BfErr::Code(E_TYPE)),
        },
        None => None,
    };
    bf_args.scheduler.shutdown(msg);
    Ok(Ret(v_int(0)))
}

/// memory_usage() -- no block-level allocator stats here; the empty list
/// is the documented "unavailable" result.
fn bf_memory_usage(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if !bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    Ok(Ret(v_list(&[])))
}

/// db_disk_size() -- total bytes under the checkpoint directory.
fn bf_db_disk_size(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if !bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    let dir = bf_args
        .config
        .checkpoint
        .resolved_dir(&bf_args.config.base_dir);
    let mut total: u64 = 0;
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            if let Ok(meta) = entry.metadata() {
                if meta.is_file() {
                    total += meta.len();
                }
            }
        }
    }
    Ok(Ret(v_int(total as i64)))
}

fn bf_dump_database(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if !bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args.scheduler.checkpoint();
    Ok(Ret(v_int(1)))
}

fn bf_server_started(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if !bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    let started = SERVER_START_TIME
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(Ret(v_int(started)))
}

/// notify(player, message) -- FIFO line output on the player's connection.
fn bf_notify(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let player = obj_arg(&bf_args.args, 0)?;
    let msg = bf_args.args[1].to_display_string();
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() && perms.who != player {
        return Err(BfErr::Code(E_PERM));
    }
    match bf_args.session.send_line(player, &msg) {
        Ok(()) => Ok(Ret(v_int(1))),
        Err(_) => Ok(Ret(v_int(0))),
    }
}

/// notify_except(location, excluded, message) -- every player in the
/// location but one.
fn bf_notify_except(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 3 {
        return Err(BfErr::Code(E_ARGS));
    }
    let location = obj_arg(&bf_args.args, 0)?;
    let excluded = obj_arg(&bf_args.args, 1)?;
    let msg = bf_args.args[2].to_display_string();
    let contents = bf_args
        .world
        .contents_of(location)
        .map_err(world_state_bf_err)?;
    for obj in contents {
        if obj == excluded {
            continue;
        }
        let is_player = bf_args
            .world
            .flags_of(obj)
            .map(|f| f.contains(ObjFlag::User))
            .unwrap_or(false);
        if is_player {
            let _ = bf_args.session.send_line(obj, &msg);
        }
    }
    Ok(Ret(v_int(1)))
}

fn bf_connected_players(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if !bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    let players = bf_args.session.connected_players().unwrap_or_default();
    Ok(Ret(v_list_iter(players.into_iter().map(v_obj))))
}

fn bf_connection_name(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let player = obj_arg(&bf_args.args, 0)?;
    match bf_args.session.connection_name(player) {
        Ok(name) => Ok(Ret(v_string(name))),
        Err(_) => Err(BfErr::Code(E_INVARG)),
    }
}

fn bf_boot_player(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let player = obj_arg(&bf_args.args, 0)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() && perms.who != player {
        return Err(BfErr::Code(E_PERM));
    }
    let _ = bf_args.session.disconnect(player);
    Ok(Ret(v_int(0)))
}

/// read([player]) -- park the task until the next input line arrives on
/// the connection.
fn bf_read(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() > 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let player = if bf_args.args.is_empty() {
        bf_args.exec.player
    } else {
        obj_arg(&bf_args.args, 0)?
    };
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() && player != bf_args.exec.player {
        return Err(BfErr::Code(E_PERM));
    }
    let request = InputRequest(rand::random::<u64>());
    if bf_args.session.request_input(player, request).is_err() {
        return Err(BfErr::Code(E_INVARG));
    }
    let frames = bf_args.exec.capture_frames();
    match bf_args
        .scheduler
        .suspend(SuspendCondition::Input(request.0), frames)
    {
        WakeValue::InputLine(line) => Ok(Ret(v_string(line))),
        WakeValue::Resumed(v) => Ok(Ret(v)),
        WakeValue::TimedOut => Ok(Ret(v_int(0))),
        WakeValue::Killed => Err(BfErr::Cancelled),
    }
}

/// force_input(player, line) -- inject a line as if the player typed it.
fn bf_force_input(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let player = obj_arg(&bf_args.args, 0)?;
    let line = str_arg(&bf_args.args, 1)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() && perms.who != player {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args.scheduler.force_input(player, line);
    Ok(Ret(v_int(0)))
}

fn bf_flush_input(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.is_empty() || bf_args.args.len() > 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let player = obj_arg(&bf_args.args, 0)?;
    let show = bf_args.args.get(1).map(|v| v.is_true()).unwrap_or(false);
    match bf_args.session.flush_input(player, show) {
        Ok(n) => Ok(Ret(v_int(n as i64))),
        Err(_) => Err(BfErr::Code(E_INVARG)),
    }
}

fn bf_idle_seconds(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let player = obj_arg(&bf_args.args, 0)?;
    match bf_args.session.idle_seconds(player) {
        Ok(s) => Ok(Ret(v_int(s as i64))),
        Err(_) => Err(BfErr::Code(E_INVARG)),
    }
}

fn bf_connected_seconds(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let player = obj_arg(&bf_args.args, 0)?;
    match bf_args.session.connected_seconds(player) {
        Ok(s) => Ok(Ret(v_int(s as i64))),
        Err(_) => Err(BfErr::Code(E_INVARG)),
    }
}

fn bf_connection_options(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let player = obj_arg(&bf_args.args, 0)?;
    match bf_args.session.connection_options(player) {
        Ok(opts) => {
            let pairs: Vec<Var> = opts
                .into_iter()
                .map(|(name, value)| v_list(&[v_str(&name), value]))
                .collect();
            Ok(Ret(v_list_iter(pairs)))
        }
        Err(_) => Err(BfErr::Code(E_INVARG)),
    }
}

fn bf_connection_option(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let player = obj_arg(&bf_args.args, 0)?;
    let option = str_arg(&bf_args.args, 1)?;
    match bf_args.session.connection_option(player, &option) {
        Ok(v) => Ok(Ret(v)),
        Err(_) => Err(BfErr::Code(E_INVARG)),
    }
}

fn bf_set_connection_option(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 3 {
        return Err(BfErr::Code(E_ARGS));
    }
    let player = obj_arg(&bf_args.args, 0)?;
    let option = str_arg(&bf_args.args, 1)?;
    let value = bf_args.args[2].clone();
    match bf_args
        .session
        .set_connection_option(player, &option, &value)
    {
        Ok(()) => Ok(Ret(v_int(1))),
        Err(_) => Err(BfErr::Code(E_INVARG)),
    }
}

fn bf_output_delimiters(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let player = obj_arg(&bf_args.args, 0)?;
    match bf_args.session.output_delimiters(player) {
        Ok((prefix, suffix)) => Ok(Ret(v_list(&[v_str(&prefix), v_str(&suffix)]))),
        Err(_) => Err(BfErr::Code(E_INVARG)),
    }
}

fn bf_set_output_delimiters(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 3 {
        return Err(BfErr::Code(E_ARGS));
    }
    let player = obj_arg(&bf_args.args, 0)?;
    let prefix = str_arg(&bf_args.args, 1)?;
    let suffix = str_arg(&bf_args.args, 2)?;
    match bf_args
        .session
        .set_output_delimiters(player, prefix, suffix)
    {
        Ok(()) => Ok(Ret(v_int(1))),
        Err(_) => Err(BfErr::Code(E_INVARG)),
    }
}

fn bf_buffered_output_length(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() > 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let player = if bf_args.args.is_empty() {
        bf_args.exec.player
    } else {
        obj_arg(&bf_args.args, 0)?
    };
    match bf_args.session.buffered_output_length(player) {
        Ok(n) => Ok(Ret(v_int(n as i64))),
        Err(_) => Err(BfErr::Code(E_INVARG)),
    }
}

pub(crate) fn register_bf_server(builtins: &mut HashMap<Symbol, BuiltinFunction>) {
    register!(builtins,
        "server_version" => bf_server_version,
        "server_log" => bf_server_log,
        "shutdown" => bf_shutdown,
        "memory_usage" => bf_memory_usage,
        "db_disk_size" => bf_db_disk_size,
        "dump_database" => bf_dump_database,
        "server_started" => bf_server_started,
        "notify" => bf_notify,
        "notify_except" => bf_notify_except,
        "connected_players" => bf_connected_players,
        "connection_name" => bf_connection_name,
        "boot_player" => bf_boot_player,
        "read" => bf_read,
        "force_input" => bf_force_input,
        "flush_input" => bf_flush_input,
        "idle_seconds" => bf_idle_seconds,
        "connected_seconds" => bf_connected_seconds,
        "connection_options" => bf_connection_options,
        "connection_option" => bf_connection_option,
        "set_connection_option" => bf_set_connection_option,
        "output_delimiters" => bf_output_delimiters,
        "set_output_delimiters" => bf_set_output_delimiters,
        "buffered_output_length" => bf_buffered_output_length,
    );
}
