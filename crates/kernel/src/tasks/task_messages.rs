use crate::vm::FrameInfo;
use std::time::{Duration, SystemTime};
use warren_common::tasks::TaskId;
use warren_var::{Error as MooError, Obj, Var};

/// What a suspended task is waiting for.
#[derive(Debug)]
pub enum SuspendCondition {
    /// Wake after at least this long.
    Timeout(Duration),
    /// Wake only on `resume()` (or `kill_task`).
    Never,
    /// Wake when the host delivers the input line for this request token.
    Input(u64),
}

/// The value a suspended task wakes with.
#[derive(Debug)]
pub enum WakeValue {
    /// `resume(task_id, value)` supplied this.
    Resumed(Var),
    /// The timer fired.
    TimedOut,
    /// The requested input line arrived.
    InputLine(String),
    /// The task was killed or the player disconnected.
    Killed,
}

/// Messages task threads send up to the scheduler loop.
pub enum SchedulerControlMsg {
    /// The task thread is done (result already delivered to its
    /// subscriber); drop the bookkeeping.
    TaskFinished,
    /// Park this task. The scheduler holds `wake` and fires it per the
    /// condition; the task thread blocks on the paired receiver.
    TaskSuspend {
        condition: SuspendCondition,
        wake: oneshot::Sender<WakeValue>,
        /// Stack capture for `task_stack()` while parked.
        frames: Vec<FrameInfo>,
    },
    RequestQueuedTasks {
        reply: oneshot::Sender<Vec<TaskDescription>>,
    },
    RequestTaskStack {
        target: TaskId,
        reply: oneshot::Sender<Result<Vec<FrameInfo>, MooError>>,
    },
    KillTask {
        victim: TaskId,
        perms: Obj,
        perms_is_wizard: bool,
        reply: oneshot::Sender<Result<Var, MooError>>,
    },
    ResumeTask {
        target: TaskId,
        value: Var,
        perms: Obj,
        perms_is_wizard: bool,
        reply: oneshot::Sender<Result<Var, MooError>>,
    },
    /// `force_input()`: treat a line as if the player had typed it.
    ForceInput { player: Obj, line: String },
    /// `dump_database()`: ask the checkpoint thread for a snapshot now.
    Checkpoint,
    /// `shutdown()`: stop the server.
    Shutdown { msg: Option<String> },
}

/// A queued/active task as reported by `queued_tasks()` and `@who`-style
/// introspection.
#[derive(Clone, Debug)]
pub struct TaskDescription {
    pub task_id: TaskId,
    pub player: Obj,
    pub this: Obj,
    pub verb_name: String,
    pub started: SystemTime,
    pub suspended: bool,
    pub wake_at: Option<SystemTime>,
}

/// The handle task threads use to reach the scheduler loop. Cloneable and
/// cheap; one per task, tagged with the task id.
#[derive(Clone)]
pub struct TaskSchedulerClient {
    task_id: TaskId,
    sender: flume::Sender<(TaskId, SchedulerControlMsg)>,
}

impl TaskSchedulerClient {
    pub fn new(task_id: TaskId, sender: flume::Sender<(TaskId, SchedulerControlMsg)>) -> Self {
        Self { task_id, sender }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Park the calling thread until the scheduler wakes it. Returns
    /// `Killed` if the scheduler is gone.
    pub fn suspend(&self, condition: SuspendCondition, frames: Vec<FrameInfo>) -> WakeValue {
        let (wake, wait) = oneshot::channel();
        if self
            .sender
            .send((
                self.task_id,
                SchedulerControlMsg::TaskSuspend {
                    condition,
                    wake,
                    frames,
                },
            ))
            .is_err()
        {
            return WakeValue::Killed;
        }
        wait.recv().unwrap_or(WakeValue::Killed)
    }

    pub fn queued_tasks(&self) -> Vec<TaskDescription> {
        let (reply, wait) = oneshot::channel();
        if self
            .sender
            .send((self.task_id, SchedulerControlMsg::RequestQueuedTasks { reply }))
            .is_err()
        {
            return vec![];
        }
        wait.recv().unwrap_or_default()
    }

    pub fn task_stack(&self, target: TaskId) -> Result<Vec<FrameInfo>, MooError> {
        let (reply, wait) = oneshot::channel();
        self.sender
            .send((
                self.task_id,
                SchedulerControlMsg::RequestTaskStack { target, reply },
            ))
            .map_err(|_| MooError::from(warren_var::E_INVARG))?;
        wait.recv()
            .unwrap_or_else(|_| Err(warren_var::E_INVARG.into()))
    }

    pub fn kill_task(
        &self,
        victim: TaskId,
        perms: Obj,
        perms_is_wizard: bool,
    ) -> Result<Var, MooError> {
        let (reply, wait) = oneshot::channel();
        self.sender
            .send((
                self.task_id,
                SchedulerControlMsg::KillTask {
                    victim,
                    perms,
                    perms_is_wizard,
                    reply,
                },
            ))
            .map_err(|_| MooError::from(warren_var::E_INVARG))?;
        wait.recv()
            .unwrap_or_else(|_| Err(warren_var::E_INVARG.into()))
    }

    pub fn resume_task(
        &self,
        target: TaskId,
        value: Var,
        perms: Obj,
        perms_is_wizard: bool,
    ) -> Result<Var, MooError> {
        let (reply, wait) = oneshot::channel();
        self.sender
            .send((
                self.task_id,
                SchedulerControlMsg::ResumeTask {
                    target,
                    value,
                    perms,
                    perms_is_wizard,
                    reply,
                },
            ))
            .map_err(|_| MooError::from(warren_var::E_INVARG))?;
        wait.recv()
            .unwrap_or_else(|_| Err(warren_var::E_INVARG.into()))
    }

    pub(crate) fn send_raw(&self, msg: SchedulerControlMsg) -> Result<(), ()> {
        self.sender.send((self.task_id, msg)).map_err(|_| ())
    }

    pub fn force_input(&self, player: Obj, line: String) {
        let _ = self
            .sender
            .send((self.task_id, SchedulerControlMsg::ForceInput { player, line }));
    }

    pub fn checkpoint(&self) {
        let _ = self
            .sender
            .send((self.task_id, SchedulerControlMsg::Checkpoint));
    }

    pub fn shutdown(&self, msg: Option<String>) {
        let _ = self
            .sender
            .send((self.task_id, SchedulerControlMsg::Shutdown { msg }));
    }
}
