use crate::builtins::BfRet::Ret;
use crate::builtins::{BfCallState, BfErr, BfRet, BuiltinFunction, register, world_state_bf_err};
use crate::tasks::{SuspendCondition, WakeValue};
use std::collections::HashMap;
use std::time::{Duration, Instant, UNIX_EPOCH};
use warren_var::{
    E_ARGS, E_INVARG, E_PERM, E_TYPE, Obj, Symbol, Var, Variant, v_int, v_list, v_list_iter,
    v_obj, v_str,
};

fn int_arg(args: &[Var], i: usize) -> Result<i64, BfErr> {
    match args.get(i).map(|v| v.variant()) {
        Some(Variant::Int(n)) => Ok(*n),
        Some(_) => Err(BfErr::Code(E_TYPE)),
        None => Err(BfErr::Code(E_ARGS)),
    }
}

/// suspend([seconds]) -- park the task. With no argument it sleeps until
/// `resume()`; with one, at least that many seconds. The resource budgets
/// are refreshed on wake.
fn bf_suspend(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() > 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let condition = if bf_args.args.is_empty() {
        SuspendCondition::Never
    } else {
        let seconds = int_arg(&bf_args.args, 0)?;
        if seconds < 0 {
            return Err(BfErr::Raise(E_INVARG.msg("negative suspend time")));
        }
        SuspendCondition::Timeout(Duration::from_secs(seconds as u64))
    };
    let frames = bf_args.exec.capture_frames();
    let woke = bf_args.scheduler.suspend(condition, frames);
    // Fresh budgets for the post-suspend leg of the task.
    bf_args.exec.ticks_left = bf_args.config.default_tick_quota;
    bf_args.exec.start_time = Instant::now();
    match woke {
        WakeValue::Resumed(v) => Ok(Ret(v)),
        WakeValue::TimedOut => Ok(Ret(v_int(0))),
        WakeValue::InputLine(_) => Ok(Ret(v_int(0))),
        WakeValue::Killed => Err(BfErr::Cancelled),
    }
}

/// yield() is suspend(0): requeue and continue in scheduler order.
fn bf_yield(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if !bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    let frames = bf_args.exec.capture_frames();
    let woke = bf_args
        .scheduler
        .suspend(SuspendCondition::Timeout(Duration::ZERO), frames);
    bf_args.exec.ticks_left = bf_args.config.default_tick_quota;
    bf_args.exec.start_time = Instant::now();
    match woke {
        WakeValue::Killed => Err(BfErr::Cancelled),
        WakeValue::Resumed(v) => Ok(Ret(v)),
        _ => Ok(Ret(v_int(0))),
    }
}

fn bf_resume(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.is_empty() || bf_args.args.len() > 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let target = int_arg(&bf_args.args, 0)?;
    if target < 0 {
        return Err(BfErr::Code(E_INVARG));
    }
    let value = bf_args.args.get(1).cloned().unwrap_or(v_int(0));
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    bf_args
        .scheduler
        .resume_task(target as usize, value, perms.who, perms.is_wizard())
        .map(Ret)
        .map_err(BfErr::ErrValue)
}

fn bf_task_id(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if !bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    Ok(Ret(v_int(bf_args.exec.task_id as i64)))
}

/// queued_tasks() -- the registry of suspended tasks: {task-id, started,
/// player, verb, this, wake-at-or-0} per entry.
fn bf_queued_tasks(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if !bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    let tasks = bf_args.scheduler.queued_tasks();
    let entries: Vec<Var> = tasks
        .into_iter()
        .filter(|t| perms.is_wizard() || t.player == perms.who)
        .filter(|t| t.suspended)
        .map(|t| {
            let started = t
                .started
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            let wake = t
                .wake_at
                .and_then(|w| w.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            v_list(&[
                v_int(t.task_id as i64),
                v_int(started),
                v_obj(t.player),
                v_str(&t.verb_name),
                v_obj(t.this),
                v_int(wake),
            ])
        })
        .collect();
    Ok(Ret(v_list_iter(entries)))
}

/// queue_info([player]) -- with a player, that player's queued-task count;
/// without, the players with queued tasks.
fn bf_queue_info(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() > 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let tasks = bf_args.scheduler.queued_tasks();
    match bf_args.args.first() {
        Some(v) => {
            let Variant::Obj(player) = v.variant() else {
                return Err(BfErr::Code(E_TYPE));
            };
            let count = tasks.iter().filter(|t| t.player == *player).count();
            Ok(Ret(v_int(count as i64)))
        }
        None => {
            let mut players: Vec<Obj> = tasks.iter().map(|t| t.player).collect();
            players.sort();
            players.dedup();
            Ok(Ret(v_list_iter(players.into_iter().map(v_obj))))
        }
    }
}

fn bf_kill_task(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let victim = int_arg(&bf_args.args, 0)?;
    if victim < 0 {
        return Err(BfErr::Code(E_INVARG));
    }
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    // Killing the calling task itself lands at its next tick boundary.
    bf_args
        .scheduler
        .kill_task(victim as usize, perms.who, perms.is_wizard())
        .map(Ret)
        .map_err(BfErr::ErrValue)
}

/// task_stack(task-id) -- the frames of a suspended task.
fn bf_task_stack(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let target = int_arg(&bf_args.args, 0)?;
    if target < 0 {
        return Err(BfErr::Code(E_INVARG));
    }
    let frames = bf_args
        .scheduler
        .task_stack(target as usize)
        .map_err(BfErr::ErrValue)?;
    Ok(Ret(v_list_iter(frames.iter().map(|f| f.to_var()))))
}

fn bf_ticks_left(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if !bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    Ok(Ret(v_int(bf_args.exec.ticks_left as i64)))
}

fn bf_seconds_left(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if !bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    Ok(Ret(v_int(bf_args.exec.seconds_left())))
}

fn bf_caller_perms(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if !bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    Ok(Ret(v_obj(bf_args.caller_perms())))
}

/// set_task_perms(who) -- lower (or, for wizards, change) the current
/// frame's authority.
fn bf_set_task_perms(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let Variant::Obj(who) = bf_args.args[0].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let who = *who;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() && who != perms.who {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args.exec.top_mut().perms = who;
    Ok(Ret(v_int(0)))
}

/// callers() -- the stack below the current frame.
fn bf_callers(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if !bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    let frames = bf_args.exec.capture_frames();
    let below: Vec<Var> = frames.iter().skip(1).map(|f| f.to_var()).collect();
    Ok(Ret(v_list_iter(below)))
}

pub(crate) fn register_bf_task(builtins: &mut HashMap<Symbol, BuiltinFunction>) {
    register!(builtins,
        "suspend" => bf_suspend,
        "yield" => bf_yield,
        "resume" => bf_resume,
        "task_id" => bf_task_id,
        "queued_tasks" => bf_queued_tasks,
        "queue_info" => bf_queue_info,
        "kill_task" => bf_kill_task,
        "task_stack" => bf_task_stack,
        "ticks_left" => bf_ticks_left,
        "seconds_left" => bf_seconds_left,
        "caller_perms" => bf_caller_perms,
        "set_task_perms" => bf_set_task_perms,
        "callers" => bf_callers,
    );
}
