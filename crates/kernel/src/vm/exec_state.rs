use crate::vm::{Activation, FrameInfo};
use std::time::Instant;
use warren_common::matching::ParsedCommand;
use warren_common::tasks::{AbortLimitReason, TaskId};
use warren_var::{NOTHING, Obj};

/// The mutable execution state of one task: its call stack and its
/// resource accounting. Owned by the task thread; builtins reach it
/// through `BfCallState`.
pub struct VMExecState {
    pub task_id: TaskId,
    pub player: Obj,
    pub stack: Vec<Activation>,
    pub ticks_left: usize,
    pub tick_quota: usize,
    pub start_time: Instant,
    pub max_seconds: u64,
    /// Set when a quota raise fires, so an uncaught E_QUOTA is reported as
    /// a limit abort rather than a plain exception.
    pub limit_hit: Option<AbortLimitReason>,
    /// The command decomposition this task was spawned from, if any; seeds
    /// every verb frame's environment.
    pub command: Option<ParsedCommand>,
    /// Lengths of the collections currently being indexed, innermost last;
    /// what a bare `$` resolves against.
    pub index_lengths: Vec<i64>,
}

impl VMExecState {
    pub fn new(task_id: TaskId, player: Obj, tick_quota: usize, max_seconds: u64) -> Self {
        Self {
            task_id,
            player,
            stack: vec![],
            ticks_left: tick_quota,
            tick_quota,
            start_time: Instant::now(),
            max_seconds,
            limit_hit: None,
            command: None,
            index_lengths: vec![],
        }
    }

    pub fn top(&self) -> &Activation {
        self.stack.last().expect("no verb frame")
    }

    pub fn top_mut(&mut self) -> &mut Activation {
        self.stack.last_mut().expect("no verb frame")
    }

    /// The authority the current frame acts with.
    pub fn task_perms(&self) -> Obj {
        self.stack.last().map(|a| a.perms).unwrap_or(self.player)
    }

    /// The authority of the frame below the current one; `#-1` at the top.
    pub fn caller_perms(&self) -> Obj {
        if self.stack.len() >= 2 {
            self.stack[self.stack.len() - 2].perms
        } else {
            NOTHING
        }
    }

    pub fn seconds_left(&self) -> i64 {
        let elapsed = self.start_time.elapsed().as_secs() as i64;
        (self.max_seconds as i64 - elapsed).max(0)
    }

    /// Snapshot the stack, innermost frame first, as raises and
    /// `callers()` see it.
    pub fn capture_frames(&self) -> Vec<FrameInfo> {
        self.stack
            .iter()
            .rev()
            .map(|a| FrameInfo {
                this: a.this,
                verb_name: a.verb_name.clone(),
                programmer: a.perms,
                verb_definer: a.verb_definer,
                player: a.player,
                line: a.line,
            })
            .collect()
    }
}
