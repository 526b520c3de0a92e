use crate::tasks::{SchedulerControlMsg, SchedulerError, TaskResult, TaskStart, WsMatchEnv};
use crate::vm::{TaskOutcome, VM, VMExecState};
use tracing::warn;
use warren_common::matching::{ParseCommandError, ParsedCommand, parse_command};
use warren_common::model::{ArgSpec, ObjFlag, VerbArgsSpec};
use warren_common::tasks::{CommandError, TaskId};
use warren_compiler::compile;
use warren_db::VerbDef;
use warren_var::{NOTHING, Obj, Var, Variant, v_int};

/// One task: a thread of control executing a command, verb invocation, or
/// eval. Runs on its own OS thread; cooperative only at tick boundaries
/// and explicit suspends.
pub(crate) struct Task {
    pub task_id: TaskId,
    pub vm: VM,
    pub result_sender: Option<oneshot::Sender<TaskResult>>,
}

impl Task {
    pub(crate) fn run(mut self, start: TaskStart) {
        let result = match start {
            TaskStart::Command { player, line } => self.run_command(player, &line),
            TaskStart::Verb {
                player,
                this,
                verb,
                args,
            } => {
                let mut exec = self.fresh_exec(player);
                let outcome = self.vm.execute_verb(&mut exec, this, &verb, args, player);
                self.outcome_to_result(outcome, player)
            }
            TaskStart::Eval { player, source } => self.run_eval(player, &source),
        };

        if let Some(sender) = self.result_sender.take() {
            let _ = sender.send(result);
        }
        let _ = self.vm.scheduler.send_raw(SchedulerControlMsg::TaskFinished);
    }

    fn fresh_exec(&self, player: Obj) -> VMExecState {
        VMExecState::new(
            self.task_id,
            player,
            self.vm.config.default_tick_quota,
            self.vm.config.max_task_seconds,
        )
    }

    fn run_command(&self, player: Obj, line: &str) -> TaskResult {
        let env = WsMatchEnv {
            world: &self.vm.world,
            player,
        };
        let parsed = match parse_command(line, &env) {
            Ok(pc) => pc,
            Err(ParseCommandError::EmptyCommand) => {
                return TaskResult::Success(v_int(0));
            }
            Err(_) => {
                self.notify_command_error(player, &CommandError::CouldNotParseCommand);
                return TaskResult::Error(SchedulerError::CommandExecutionError(
                    CommandError::CouldNotParseCommand,
                ));
            }
        };

        let Some((receiver, definer, index, verbdef)) = self.match_command_verb(player, &parsed)
        else {
            self.notify_command_error(player, &CommandError::NoCommandMatch);
            return TaskResult::Error(SchedulerError::CommandExecutionError(
                CommandError::NoCommandMatch,
            ));
        };

        let mut exec = self.fresh_exec(player);
        let args = parsed.args.clone();
        let verb_name = parsed.verb.clone();
        exec.command = Some(parsed);
        let outcome = self.vm.execute_command_verb(
            &mut exec, receiver, definer, index, &verbdef, &verb_name, args,
        );
        self.outcome_to_result(outcome, player)
    }

    /// The LambdaMOO candidate order: the player, the room, then the
    /// command's direct and indirect objects; first name-and-argspec match
    /// wins. A "huh" verb on the room is the fallback.
    fn match_command_verb(
        &self,
        player: Obj,
        parsed: &ParsedCommand,
    ) -> Option<(Obj, Obj, usize, VerbDef)> {
        let location = self.vm.world.location_of(player).unwrap_or(NOTHING);
        let mut candidates = vec![player];
        if location != NOTHING {
            candidates.push(location);
        }
        if parsed.dobj.is_positive() && self.vm.world.valid(parsed.dobj) {
            candidates.push(parsed.dobj);
        }
        if parsed.iobj.is_positive() && self.vm.world.valid(parsed.iobj) {
            candidates.push(parsed.iobj);
        }

        for candidate in candidates {
            let spec = VerbArgsSpec {
                dobj: spec_for(parsed.dobj, &parsed.dobjstr, candidate),
                prep: parsed.prep,
                iobj: spec_for(parsed.iobj, &parsed.iobjstr, candidate),
            };
            match self
                .vm
                .world
                .find_command_verb(candidate, &parsed.verb, &spec)
            {
                Ok(Some((definer, index, verbdef))) => {
                    return Some((candidate, definer, index, verbdef));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("command verb lookup failed on {candidate}: {e}");
                }
            }
        }

        if location != NOTHING {
            if let Ok((definer, index, verbdef)) = self.vm.world.find_verb(location, "huh") {
                return Some((location, definer, index, verbdef));
            }
        }
        None
    }

    fn run_eval(&self, player: Obj, source: &str) -> TaskResult {
        let is_programmer = self
            .vm
            .world
            .flags_of(player)
            .map(|f| f.contains(ObjFlag::Programmer) || f.contains(ObjFlag::Wizard))
            .unwrap_or(false);
        if !is_programmer {
            self.notify_command_error(player, &CommandError::PermissionDenied);
            return TaskResult::Error(SchedulerError::CommandExecutionError(
                CommandError::PermissionDenied,
            ));
        }

        // Bare expressions are the common case at the `;` prompt; wrap them
        // into a return statement when that parses.
        let wrapped = format!("return {};", source.trim().trim_end_matches(';'));
        let chosen = if compile(&wrapped).is_ok() {
            wrapped
        } else {
            source.to_string()
        };

        let mut exec = self.fresh_exec(player);
        let outcome = self.vm.execute_eval(&mut exec, &chosen);
        match outcome {
            TaskOutcome::Success(v) => {
                // The eval contract: {1, value} or {0, error-string}.
                self.notify_eval_result(player, &v);
                TaskResult::Success(v)
            }
            other => self.outcome_to_result(other, player),
        }
    }

    fn notify_eval_result(&self, player: Obj, result: &Var) {
        let Variant::List(pair) = result.variant() else {
            return;
        };
        if pair.len() != 2 {
            return;
        }
        let ok = pair.index(1).map(|v| v.is_true()).unwrap_or(false);
        let Ok(payload) = pair.index(2) else {
            return;
        };
        let line = if ok {
            format!("=> {}", payload.to_literal())
        } else {
            payload.to_display_string()
        };
        let _ = self.vm.session.send_line(player, &line);
    }

    fn notify_command_error(&self, player: Obj, err: &CommandError) {
        let _ = self
            .vm
            .session
            .send_system_msg(player, err.to_player_message());
    }

    fn outcome_to_result(&self, outcome: TaskOutcome, player: Obj) -> TaskResult {
        match outcome {
            TaskOutcome::Success(v) => TaskResult::Success(v),
            TaskOutcome::Exception(ex) => {
                for line in ex.traceback_lines() {
                    let _ = self.vm.session.send_system_msg(player, &line);
                }
                TaskResult::Error(SchedulerError::TaskAbortedException(ex))
            }
            TaskOutcome::AbortLimit(reason) => {
                let what = match reason {
                    warren_common::tasks::AbortLimitReason::Ticks(_) => "ticks",
                    warren_common::tasks::AbortLimitReason::Time(_) => "seconds",
                };
                let _ = self
                    .vm
                    .session
                    .send_system_msg(player, &format!("Task aborted (out of {what})."));
                TaskResult::Error(SchedulerError::TaskAbortedLimit(reason))
            }
            TaskOutcome::Cancelled => TaskResult::Error(SchedulerError::TaskAbortedCancelled),
        }
    }
}

/// The command-side argument spec relative to one dispatch candidate.
fn spec_for(obj: Obj, objstr: &str, candidate: Obj) -> ArgSpec {
    if objstr.is_empty() {
        ArgSpec::None
    } else if obj == candidate {
        ArgSpec::This
    } else {
        ArgSpec::Any
    }
}
