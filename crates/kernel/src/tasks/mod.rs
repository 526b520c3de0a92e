mod match_env;
mod scheduler;
mod task;
mod task_messages;

pub use match_env::WsMatchEnv;
pub use scheduler::Scheduler;
pub use task_messages::{
    SchedulerControlMsg, SuspendCondition, TaskDescription, TaskSchedulerClient, WakeValue,
};

use crate::vm::Exception;
use thiserror::Error;
use warren_common::tasks::{AbortLimitReason, CommandError, TaskId};
use warren_compiler::CompileError;
use warren_var::{Obj, Var};

/// Why a task never ran or stopped running, delivered to subscribers.
#[derive(Debug, Error, Clone)]
pub enum SchedulerError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("Could not start task")]
    CouldNotStartTask,
    #[error("Task limit reached for player {0}")]
    TaskLimitReached(Obj),
    #[error("Could not start command")]
    CommandExecutionError(#[source] CommandError),
    #[error("Compilation error")]
    CompilationError(#[source] CompileError),
    #[error("Task aborted due to limit: {0:?}")]
    TaskAbortedLimit(AbortLimitReason),
    #[error("Task aborted due to exception")]
    TaskAbortedException(Exception),
    #[error("Task aborted due to cancellation")]
    TaskAbortedCancelled,
    #[error("Input request not found: {0}")]
    InputRequestNotFound(u64),
    #[error("Server is shutting down")]
    SchedulerShutdown,
}

/// What a task finally produced.
#[derive(Debug)]
pub enum TaskResult {
    Success(Var),
    Error(SchedulerError),
}

/// A subscription to a task's final result.
pub struct TaskHandle {
    pub task_id: TaskId,
    pub receiver: oneshot::Receiver<TaskResult>,
}

impl TaskHandle {
    /// Block until the task completes. A dropped sender means the
    /// scheduler went away.
    pub fn join(self) -> Result<TaskResult, SchedulerError> {
        self.receiver
            .recv()
            .map_err(|_| SchedulerError::SchedulerShutdown)
    }
}

/// How a task begins: a parsed player command, a direct verb invocation,
/// or an eval of raw source.
pub enum TaskStart {
    Command {
        player: Obj,
        line: String,
    },
    Verb {
        player: Obj,
        this: Obj,
        verb: String,
        args: Vec<Var>,
    },
    Eval {
        player: Obj,
        source: String,
    },
}
