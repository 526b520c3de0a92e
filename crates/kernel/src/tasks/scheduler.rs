use crate::builtins::BuiltinRegistry;
use crate::builtins::bf_server::SERVER_START_TIME;
use crate::checkpoint::CheckpointMsg;
use crate::config::Config;
use crate::tasks::task::Task;
use crate::tasks::{
    SchedulerControlMsg, SchedulerError, SuspendCondition, TaskDescription, TaskHandle,
    TaskSchedulerClient, TaskStart, WakeValue,
};
use crate::vm::{FrameInfo, VM};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};
use tracing::{error, info, warn};
use warren_common::tasks::{Session, TaskId};
use warren_db::WorldState;
use warren_var::{E_INVARG, E_PERM, Error as MooError, Obj, Var, v_int};

const SCHEDULER_TICK_TIME: Duration = Duration::from_millis(5);

/// Responsible for the dispatching, control, and accounting of tasks.
/// There is exactly one per server; hosts talk to it through an
/// `Arc<Scheduler>`, tasks through their `TaskSchedulerClient`.
pub struct Scheduler {
    world: WorldState,
    config: Arc<Config>,
    builtins: Arc<BuiltinRegistry>,
    control_sender: flume::Sender<(TaskId, SchedulerControlMsg)>,
    control_receiver: flume::Receiver<(TaskId, SchedulerControlMsg)>,
    checkpoint_sender: flume::Sender<CheckpointMsg>,
    running: AtomicBool,
    next_task_id: AtomicUsize,
    task_q: Mutex<TaskQ>,
    /// The session each logged-in player last submitted through, for
    /// `force_input` and disconnect cleanup.
    player_sessions: Mutex<HashMap<Obj, Arc<dyn Session>>>,
}

#[derive(Default)]
struct TaskQ {
    active: HashMap<TaskId, RunningTaskControl>,
    suspended: HashMap<TaskId, SuspendedTask>,
}

/// Scheduler-side record of a running task; the `Task` itself is owned by
/// its thread.
struct RunningTaskControl {
    player: Obj,
    this: Obj,
    verb_name: String,
    started: SystemTime,
    kill_switch: Arc<AtomicBool>,
}

/// A parked task, waiting on its wake condition. The task thread is
/// blocked on the paired receiver of `wake`.
struct SuspendedTask {
    control: RunningTaskControl,
    condition: WakeCondition,
    wake: oneshot::Sender<WakeValue>,
    frames: Vec<FrameInfo>,
}

enum WakeCondition {
    Time(Instant),
    Never,
    Input(u64),
}

impl Scheduler {
    pub fn new(
        world: WorldState,
        config: Arc<Config>,
        checkpoint_sender: flume::Sender<CheckpointMsg>,
    ) -> Arc<Self> {
        let (control_sender, control_receiver) = flume::unbounded();
        Arc::new(Self {
            world,
            config,
            builtins: Arc::new(BuiltinRegistry::new()),
            control_sender,
            control_receiver,
            checkpoint_sender,
            running: AtomicBool::new(false),
            next_task_id: AtomicUsize::new(1),
            task_q: Mutex::new(TaskQ::default()),
            player_sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// The scheduler loop: wake timed-out suspensions, process control
    /// messages, until shutdown. Returns the shutdown message.
    pub fn run(self: &Arc<Self>) -> Option<String> {
        self.running.store(true, Ordering::SeqCst);
        // Pin the start time before the first task can ask for it.
        let _ = *SERVER_START_TIME;
        info!("scheduler loop started");
        let mut shutdown_msg = None;
        loop {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.wake_timed_tasks();
            match self.control_receiver.recv_timeout(SCHEDULER_TICK_TIME) {
                Ok((task_id, msg)) => {
                    if let Some(msg) = self.handle_msg(task_id, msg) {
                        shutdown_msg = msg;
                        self.running.store(false, Ordering::SeqCst);
                    }
                }
                Err(flume::RecvTimeoutError::Timeout) => {}
                Err(flume::RecvTimeoutError::Disconnected) => {
                    error!("scheduler control channel closed");
                    break;
                }
            }
        }
        info!("scheduler loop stopping");
        self.kill_everything();
        shutdown_msg
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    // ---- host-facing submission ----------------------------------------

    /// Handle one command line from a logged-in player. Built-in commands
    /// (`quit`, `@who`, `@stats`) are handled inline and spawn no task.
    pub fn submit_command_task(
        self: &Arc<Self>,
        player: Obj,
        line: &str,
        session: Arc<dyn Session>,
    ) -> Result<Option<TaskHandle>, SchedulerError> {
        self.player_sessions
            .lock()
            .unwrap()
            .insert(player, session.clone());

        match line.trim() {
            "quit" => {
                let _ = session.send_system_msg(player, "*** Disconnected ***");
                let _ = session.disconnect(player);
                return Ok(None);
            }
            "@who" => {
                self.builtin_who(player, &session);
                return Ok(None);
            }
            "@stats" => {
                self.builtin_stats(player, &session);
                return Ok(None);
            }
            _ => {}
        }

        // `;` is the eval prefix; everything else goes through command
        // parse and verb dispatch.
        let start = if let Some(source) = line.trim_start().strip_prefix(';') {
            TaskStart::Eval {
                player,
                source: source.to_string(),
            }
        } else {
            TaskStart::Command {
                player,
                line: line.to_string(),
            }
        };
        self.spawn_task(player, first_word(line), start, session)
            .map(Some)
    }

    /// Run a verb as a new task (login dispatch, server-initiated calls).
    pub fn submit_verb_task(
        self: &Arc<Self>,
        player: Obj,
        this: Obj,
        verb: &str,
        args: Vec<Var>,
        session: Arc<dyn Session>,
    ) -> Result<TaskHandle, SchedulerError> {
        self.spawn_task(
            player,
            verb.to_string(),
            TaskStart::Verb {
                player,
                this,
                verb: verb.to_string(),
                args,
            },
            session,
        )
    }

    /// The host delivers a line a `read()` is waiting on.
    pub fn submit_input(&self, request_id: u64, line: String) -> Result<(), SchedulerError> {
        let mut q = self.task_q.lock().unwrap();
        let found = q
            .suspended
            .iter()
            .find(|(_, t)| matches!(t.condition, WakeCondition::Input(id) if id == request_id))
            .map(|(id, _)| *id);
        let Some(task_id) = found else {
            return Err(SchedulerError::InputRequestNotFound(request_id));
        };
        let task = q.suspended.remove(&task_id).expect("just found");
        q.active.insert(task_id, task.control);
        if task.wake.send(WakeValue::InputLine(line)).is_err() {
            warn!("input-waiting task {task_id} is gone");
        }
        Ok(())
    }

    /// Is some task of this player's parked waiting for input?
    pub fn has_pending_input_request(&self, player: Obj) -> bool {
        let q = self.task_q.lock().unwrap();
        q.suspended.values().any(|t| {
            t.control.player == player && matches!(t.condition, WakeCondition::Input(_))
        })
    }

    /// Disconnect cleanup: every task owned by the player dies.
    pub fn disconnect_player(&self, player: Obj) {
        self.player_sessions.lock().unwrap().remove(&player);
        let mut q = self.task_q.lock().unwrap();
        for control in q.active.values() {
            if control.player == player {
                control.kill_switch.store(true, Ordering::SeqCst);
            }
        }
        let to_kill: Vec<TaskId> = q
            .suspended
            .iter()
            .filter(|(_, t)| t.control.player == player)
            .map(|(id, _)| *id)
            .collect();
        for id in to_kill {
            let t = q.suspended.remove(&id).expect("collected above");
            t.control.kill_switch.store(true, Ordering::SeqCst);
            let _ = t.wake.send(WakeValue::Killed);
        }
    }

    pub fn active_task_count(&self) -> usize {
        let q = self.task_q.lock().unwrap();
        q.active.len()
    }

    pub fn suspended_task_count(&self) -> usize {
        let q = self.task_q.lock().unwrap();
        q.suspended.len()
    }

    // ---- internals ------------------------------------------------------

    fn spawn_task(
        self: &Arc<Self>,
        player: Obj,
        verb_name: String,
        start: TaskStart,
        session: Arc<dyn Session>,
    ) -> Result<TaskHandle, SchedulerError> {
        {
            let q = self.task_q.lock().unwrap();
            let owned = q.active.values().filter(|t| t.player == player).count()
                + q.suspended
                    .values()
                    .filter(|t| t.control.player == player)
                    .count();
            if owned >= self.config.max_tasks_per_player {
                let _ = session.send_system_msg(player, "Too many tasks.");
                return Err(SchedulerError::TaskLimitReached(player));
            }
        }

        let task_id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let kill_switch = Arc::new(AtomicBool::new(false));
        let (result_sender, result_receiver) = oneshot::channel();

        {
            let mut q = self.task_q.lock().unwrap();
            q.active.insert(
                task_id,
                RunningTaskControl {
                    player,
                    this: player,
                    verb_name,
                    started: SystemTime::now(),
                    kill_switch: kill_switch.clone(),
                },
            );
        }

        let vm = VM {
            world: self.world.clone(),
            session,
            scheduler: TaskSchedulerClient::new(task_id, self.control_sender.clone()),
            config: self.config.clone(),
            kill_switch,
            builtins: self.builtins.clone(),
        };
        let task = Task {
            task_id,
            vm,
            result_sender: Some(result_sender),
        };

        let spawned = std::thread::Builder::new()
            .name(format!("warren-task-{task_id}"))
            .spawn(move || task.run(start));
        if spawned.is_err() {
            self.task_q.lock().unwrap().active.remove(&task_id);
            return Err(SchedulerError::CouldNotStartTask);
        }

        Ok(TaskHandle {
            task_id,
            receiver: result_receiver,
        })
    }

    fn wake_timed_tasks(&self) {
        let now = Instant::now();
        let mut q = self.task_q.lock().unwrap();
        let due: Vec<TaskId> = q
            .suspended
            .iter()
            .filter(|(_, t)| matches!(t.condition, WakeCondition::Time(at) if at <= now))
            .map(|(id, _)| *id)
            .collect();
        for id in due {
            let t = q.suspended.remove(&id).expect("collected above");
            q.active.insert(id, t.control);
            if t.wake.send(WakeValue::TimedOut).is_err() {
                warn!("timed-out task {id} is gone");
                q.active.remove(&id);
            }
        }
    }

    /// Handle one control message. Returns `Some(msg)` to shut down.
    fn handle_msg(
        self: &Arc<Self>,
        task_id: TaskId,
        msg: SchedulerControlMsg,
    ) -> Option<Option<String>> {
        match msg {
            SchedulerControlMsg::TaskFinished => {
                let mut q = self.task_q.lock().unwrap();
                q.active.remove(&task_id);
                q.suspended.remove(&task_id);
            }
            SchedulerControlMsg::TaskSuspend {
                condition,
                wake,
                frames,
            } => {
                let mut q = self.task_q.lock().unwrap();
                let Some(control) = q.active.remove(&task_id) else {
                    warn!("suspend from unknown task {task_id}");
                    let _ = wake.send(WakeValue::Killed);
                    return None;
                };
                let condition = match condition {
                    SuspendCondition::Timeout(d) => WakeCondition::Time(Instant::now() + d),
                    SuspendCondition::Never => WakeCondition::Never,
                    SuspendCondition::Input(id) => WakeCondition::Input(id),
                };
                q.suspended.insert(
                    task_id,
                    SuspendedTask {
                        control,
                        condition,
                        wake,
                        frames,
                    },
                );
            }
            SchedulerControlMsg::RequestQueuedTasks { reply } => {
                let _ = reply.send(self.describe_tasks());
            }
            SchedulerControlMsg::RequestTaskStack { target, reply } => {
                let q = self.task_q.lock().unwrap();
                let result = match q.suspended.get(&target) {
                    Some(t) => Ok(t.frames.clone()),
                    None => Err(MooError::from(E_INVARG)),
                };
                let _ = reply.send(result);
            }
            SchedulerControlMsg::KillTask {
                victim,
                perms,
                perms_is_wizard,
                reply,
            } => {
                let _ = reply.send(self.kill_task(victim, perms, perms_is_wizard));
            }
            SchedulerControlMsg::ResumeTask {
                target,
                value,
                perms,
                perms_is_wizard,
                reply,
            } => {
                let _ = reply.send(self.resume_task(target, value, perms, perms_is_wizard));
            }
            SchedulerControlMsg::ForceInput { player, line } => {
                self.force_input(player, line);
            }
            SchedulerControlMsg::Checkpoint => {
                if self
                    .checkpoint_sender
                    .send(CheckpointMsg::CheckpointNow)
                    .is_err()
                {
                    error!("checkpoint thread is gone");
                }
            }
            SchedulerControlMsg::Shutdown { msg } => {
                info!("shutdown requested: {msg:?}");
                return Some(msg);
            }
        }
        None
    }

    fn describe_tasks(&self) -> Vec<TaskDescription> {
        let q = self.task_q.lock().unwrap();
        let mut out = vec![];
        for (id, t) in &q.active {
            out.push(TaskDescription {
                task_id: *id,
                player: t.player,
                this: t.this,
                verb_name: t.verb_name.clone(),
                started: t.started,
                suspended: false,
                wake_at: None,
            });
        }
        for (id, t) in &q.suspended {
            let wake_at = match t.condition {
                WakeCondition::Time(at) => {
                    let delta = at.saturating_duration_since(Instant::now());
                    Some(SystemTime::now() + delta)
                }
                _ => None,
            };
            out.push(TaskDescription {
                task_id: *id,
                player: t.control.player,
                this: t.control.this,
                verb_name: t.control.verb_name.clone(),
                started: t.control.started,
                suspended: true,
                wake_at,
            });
        }
        out.sort_by_key(|t| t.task_id);
        out
    }

    fn kill_task(&self, victim: TaskId, perms: Obj, perms_is_wizard: bool) -> Result<Var, MooError> {
        let mut q = self.task_q.lock().unwrap();
        if let Some(t) = q.suspended.get(&victim) {
            if !perms_is_wizard && t.control.player != perms {
                return Err(E_PERM.into());
            }
            let t = q.suspended.remove(&victim).expect("present");
            t.control.kill_switch.store(true, Ordering::SeqCst);
            let _ = t.wake.send(WakeValue::Killed);
            return Ok(v_int(0));
        }
        if let Some(t) = q.active.get(&victim) {
            if !perms_is_wizard && t.player != perms {
                return Err(E_PERM.into());
            }
            t.kill_switch.store(true, Ordering::SeqCst);
            return Ok(v_int(0));
        }
        Err(E_INVARG.into())
    }

    fn resume_task(
        &self,
        target: TaskId,
        value: Var,
        perms: Obj,
        perms_is_wizard: bool,
    ) -> Result<Var, MooError> {
        let mut q = self.task_q.lock().unwrap();
        let Some(t) = q.suspended.get(&target) else {
            return Err(E_INVARG.into());
        };
        if !perms_is_wizard && t.control.player != perms {
            return Err(E_PERM.into());
        }
        if matches!(t.condition, WakeCondition::Input(_)) {
            // Input waits resume through the host, not resume().
            return Err(E_INVARG.into());
        }
        let t = q.suspended.remove(&target).expect("present");
        q.active.insert(target, t.control);
        if t.wake.send(WakeValue::Resumed(value)).is_err() {
            q.active.remove(&target);
            return Err(E_INVARG.into());
        }
        Ok(v_int(0))
    }

    fn force_input(self: &Arc<Self>, player: Obj, line: String) {
        // An input-waiting task for the player gets the line; otherwise it
        // runs as a fresh command.
        {
            let mut q = self.task_q.lock().unwrap();
            let found = q
                .suspended
                .iter()
                .find(|(_, t)| {
                    t.control.player == player
                        && matches!(t.condition, WakeCondition::Input(_))
                })
                .map(|(id, _)| *id);
            if let Some(task_id) = found {
                let t = q.suspended.remove(&task_id).expect("just found");
                q.active.insert(task_id, t.control);
                let _ = t.wake.send(WakeValue::InputLine(line));
                return;
            }
        }
        let session = self.player_sessions.lock().unwrap().get(&player).cloned();
        let Some(session) = session else {
            warn!("force_input for {player} with no session");
            return;
        };
        if let Err(e) = self.submit_command_task(player, &line, session) {
            warn!("force_input command failed for {player}: {e}");
        }
    }

    fn kill_everything(&self) {
        let mut q = self.task_q.lock().unwrap();
        for t in q.active.values() {
            t.kill_switch.store(true, Ordering::SeqCst);
        }
        let ids: Vec<TaskId> = q.suspended.keys().copied().collect();
        for id in ids {
            let t = q.suspended.remove(&id).expect("collected above");
            t.control.kill_switch.store(true, Ordering::SeqCst);
            let _ = t.wake.send(WakeValue::Killed);
        }
    }

    // ---- built-in commands ----------------------------------------------

    fn builtin_who(&self, player: Obj, session: &Arc<dyn Session>) {
        let connected = session.connected_players().unwrap_or_default();
        let _ = session.send_line(player, "Player                   Connected  Idle");
        let _ = session.send_line(player, "------                   ---------  ----");
        for p in connected {
            let name = self.world.name_of(p).unwrap_or_else(|_| "?".to_string());
            let connected = session
                .connected_seconds(p)
                .map(|s| format!("{}s", s as u64))
                .unwrap_or_else(|_| "-".to_string());
            let idle = session
                .idle_seconds(p)
                .map(|s| format!("{}s", s as u64))
                .unwrap_or_else(|_| "-".to_string());
            let _ = session.send_line(
                player,
                &format!("{:24} {:>9}  {:>4}  ({p})", name, connected, idle),
            );
        }
    }

    fn builtin_stats(&self, player: Obj, session: &Arc<dyn Session>) {
        let (objects, max_object) = self
            .world
            .with_read(|s| (s.object_count(), s.max_object()));
        let uptime = SERVER_START_TIME.elapsed().map(|d| d.as_secs()).unwrap_or(0);
        let (active, suspended) = {
            let q = self.task_q.lock().unwrap();
            (q.active.len(), q.suspended.len())
        };
        let lines = [
            format!("Objects: {objects} (max_object #{max_object})"),
            format!("Tasks: {active} active, {suspended} suspended"),
            format!("Uptime: {uptime}s"),
        ];
        for line in lines {
            let _ = session.send_line(player, &line);
        }
    }
}

fn first_word(line: &str) -> String {
    line.trim()
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string()
}
