use crate::builtins::{BfCallState, BfErr, BfRet, BuiltinRegistry};
use crate::config::Config;
use crate::tasks::TaskSchedulerClient;
use crate::vm::exec_state::VMExecState;
use crate::vm::{Activation, Exception, VmError};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use warren_common::model::{ObjFlag, VerbFlag};
use warren_common::tasks::{AbortLimitReason, Session};
use warren_compiler::{
    Arg, BinaryOp, CatchCodes, Expr, Program, ScatterItem, ScatterKind, Stmt, StmtNode, UnaryOp,
    compile,
};
use warren_db::WorldState;
use warren_var::{
    E_ARGS, E_INVIND, E_MAXREC, E_PERM, E_QUOTA, E_TYPE, E_VARNF, E_VERBNF, Error as MooError,
    ErrorCode, NOTHING, Obj, Symbol, Var, Variant, v_bool, v_err, v_error, v_int, v_list, v_obj,
    v_str,
};

pub const MAX_CALL_DEPTH: usize = 50;

/// How a finished task ended, as seen by the scheduler.
#[derive(Debug)]
pub enum TaskOutcome {
    Success(Var),
    Exception(Exception),
    AbortLimit(AbortLimitReason),
    Cancelled,
}

/// Statement-level control flow, threaded explicitly so tick accounting
/// and stack restoration stay visible.
enum StmtFlow {
    Normal,
    Return(Var),
    Break,
    Continue,
}

/// The tree-walking evaluator, bound to the database and the task's
/// session and scheduler handles. One per task; all state lives in the
/// `VMExecState` threaded through every call.
pub struct VM {
    pub world: WorldState,
    pub session: Arc<dyn Session>,
    pub scheduler: TaskSchedulerClient,
    pub config: Arc<Config>,
    pub kill_switch: Arc<AtomicBool>,
    pub builtins: Arc<BuiltinRegistry>,
}

impl VM {
    /// Run a verb as the body of a task, translating the unwind into a
    /// task outcome.
    pub fn execute_verb(
        &self,
        exec: &mut VMExecState,
        receiver: Obj,
        verb: &str,
        args: Vec<Var>,
        caller: Obj,
    ) -> TaskOutcome {
        let r = self.call_verb(exec, receiver, receiver, verb, args, caller);
        self.to_outcome(exec, r)
    }

    /// Run raw source as a task (`;` commands). The source has already
    /// been through the `return`-wrapping of the submitter.
    pub fn execute_eval(&self, exec: &mut VMExecState, source: &str) -> TaskOutcome {
        let r = self.do_eval(exec, source);
        self.to_outcome(exec, r)
    }

    fn to_outcome(&self, exec: &VMExecState, r: Result<Var, VmError>) -> TaskOutcome {
        match r {
            Ok(v) => TaskOutcome::Success(v),
            Err(VmError::Raise(ex)) => {
                // An uncaught quota raise is reported as the limit abort it
                // came from.
                if let Some(limit) = exec.limit_hit {
                    if ex.code == v_err(E_QUOTA) {
                        return TaskOutcome::AbortLimit(limit);
                    }
                }
                TaskOutcome::Exception(ex)
            }
            Err(VmError::Cancelled) => TaskOutcome::Cancelled,
        }
    }

    // ---- raise helpers --------------------------------------------------

    fn raise(&self, exec: &VMExecState, err: MooError) -> VmError {
        VmError::Raise(Exception {
            code: v_error(MooError::from(err.err_type)),
            msg: err.message(),
            value: err.raise_value(),
            frames: exec.capture_frames(),
        })
    }

    fn raise_code(&self, exec: &VMExecState, code: ErrorCode) -> VmError {
        self.raise(exec, code.into())
    }

    /// One tick per evaluated node: the kill switch, the tick budget, and
    /// the wall-clock budget are all checked here.
    fn tick(&self, exec: &mut VMExecState) -> Result<(), VmError> {
        if self.kill_switch.load(Ordering::Relaxed) {
            return Err(VmError::Cancelled);
        }
        if exec.ticks_left == 0 {
            exec.limit_hit
                .get_or_insert(AbortLimitReason::Ticks(exec.tick_quota));
            return Err(self.raise(exec, E_QUOTA.msg("Task ran out of ticks")));
        }
        exec.ticks_left -= 1;
        if exec.start_time.elapsed().as_secs() >= exec.max_seconds {
            exec.limit_hit.get_or_insert(AbortLimitReason::Time(
                Duration::from_secs(exec.max_seconds),
            ));
            return Err(self.raise(exec, E_QUOTA.msg("Task ran out of seconds")));
        }
        Ok(())
    }

    // ---- statements -----------------------------------------------------

    fn exec_stmts(&self, exec: &mut VMExecState, stmts: &[Stmt]) -> Result<StmtFlow, VmError> {
        for stmt in stmts {
            match self.exec_stmt(exec, stmt)? {
                StmtFlow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(StmtFlow::Normal)
    }

    fn exec_stmt(&self, exec: &mut VMExecState, stmt: &Stmt) -> Result<StmtFlow, VmError> {
        exec.top_mut().line = stmt.line;
        self.tick(exec)?;
        match &stmt.node {
            StmtNode::Expr(e) => {
                self.eval_expr(exec, e)?;
                Ok(StmtFlow::Normal)
            }
            StmtNode::Return(e) => {
                let v = match e {
                    Some(e) => self.eval_expr(exec, e)?,
                    None => v_int(0),
                };
                Ok(StmtFlow::Return(v))
            }
            StmtNode::Break => Ok(StmtFlow::Break),
            StmtNode::Continue => Ok(StmtFlow::Continue),
            StmtNode::Cond { arms, otherwise } => {
                for arm in arms {
                    if self.eval_expr(exec, &arm.condition)?.is_true() {
                        return self.exec_stmts(exec, &arm.statements);
                    }
                }
                self.exec_stmts(exec, otherwise)
            }
            StmtNode::While { condition, body } => loop {
                if !self.eval_expr(exec, condition)?.is_true() {
                    return Ok(StmtFlow::Normal);
                }
                match self.exec_stmts(exec, body)? {
                    StmtFlow::Normal | StmtFlow::Continue => {}
                    StmtFlow::Break => return Ok(StmtFlow::Normal),
                    StmtFlow::Return(v) => return Ok(StmtFlow::Return(v)),
                }
            },
            StmtNode::ForList { id, expr, body } => {
                let over = self.eval_expr(exec, expr)?;
                let Some(list) = over.as_list() else {
                    return Err(self.raise_code(exec, E_TYPE));
                };
                let items: Vec<Var> = list.iter().cloned().collect();
                for item in items {
                    exec.top_mut().env.insert(id.clone(), item);
                    match self.exec_stmts(exec, body)? {
                        StmtFlow::Normal | StmtFlow::Continue => {}
                        StmtFlow::Break => return Ok(StmtFlow::Normal),
                        StmtFlow::Return(v) => return Ok(StmtFlow::Return(v)),
                    }
                }
                Ok(StmtFlow::Normal)
            }
            StmtNode::ForRange { id, from, to, body } => {
                let from = self.eval_expr(exec, from)?;
                let to = self.eval_expr(exec, to)?;
                let (Some(from), Some(to)) = (from.as_integer(), to.as_integer()) else {
                    return Err(self.raise_code(exec, E_TYPE));
                };
                let mut i = from;
                while i <= to {
                    exec.top_mut().env.insert(id.clone(), v_int(i));
                    match self.exec_stmts(exec, body)? {
                        StmtFlow::Normal | StmtFlow::Continue => {}
                        StmtFlow::Break => return Ok(StmtFlow::Normal),
                        StmtFlow::Return(v) => return Ok(StmtFlow::Return(v)),
                    }
                    i += 1;
                }
                Ok(StmtFlow::Normal)
            }
            StmtNode::TryExcept { body, excepts } => {
                match self.exec_stmts(exec, body) {
                    Err(VmError::Raise(ex)) => {
                        for arm in excepts {
                            if self.codes_match(exec, &arm.codes, &ex)? {
                                if let Some(id) = &arm.id {
                                    exec.top_mut()
                                        .env
                                        .insert(id.clone(), ex.to_exception_var());
                                }
                                return self.exec_stmts(exec, &arm.statements);
                            }
                        }
                        Err(VmError::Raise(ex))
                    }
                    other => other,
                }
            }
            StmtNode::TryFinally { body, handler } => {
                let body_result = self.exec_stmts(exec, body);
                // The handler always runs; its own unwinds win over the
                // body's.
                match self.exec_stmts(exec, handler)? {
                    StmtFlow::Normal => body_result,
                    flow => Ok(flow),
                }
            }
        }
    }

    /// Does this except/catch code set cover the raised error? `ANY`
    /// always does; otherwise membership by MOO equality over the
    /// evaluated code list.
    fn codes_match(
        &self,
        exec: &mut VMExecState,
        codes: &CatchCodes,
        ex: &Exception,
    ) -> Result<bool, VmError> {
        match codes {
            CatchCodes::Any => Ok(true),
            CatchCodes::Codes(args) => {
                let codes = self.eval_args(exec, args)?;
                Ok(codes.iter().any(|c| *c == ex.code))
            }
        }
    }

    // ---- expressions ----------------------------------------------------

    pub(crate) fn eval_expr(&self, exec: &mut VMExecState, expr: &Expr) -> Result<Var, VmError> {
        self.tick(exec)?;
        match expr {
            Expr::Value(v) => Ok(v.clone()),
            Expr::Id(name) => match exec.top().env.get(name) {
                Some(v) => Ok(v.clone()),
                None => Err(self.raise(
                    exec,
                    E_VARNF.msg(format!("Variable not found: {name}")),
                )),
            },
            Expr::And(l, r) => {
                let lv = self.eval_expr(exec, l)?;
                if lv.is_true() {
                    self.eval_expr(exec, r)
                } else {
                    Ok(lv)
                }
            }
            Expr::Or(l, r) => {
                let lv = self.eval_expr(exec, l)?;
                if lv.is_true() { Ok(lv) } else { self.eval_expr(exec, r) }
            }
            Expr::Unary(op, e) => {
                let v = self.eval_expr(exec, e)?;
                match op {
                    UnaryOp::Neg => v.negate().map_err(|e| self.raise(exec, e)),
                    UnaryOp::Not => Ok(v.not()),
                }
            }
            Expr::Binary(op, l, r) => {
                let lv = self.eval_expr(exec, l)?;
                let rv = self.eval_expr(exec, r)?;
                self.binary_op(exec, *op, &lv, &rv)
            }
            Expr::Cond {
                condition,
                consequence,
                alternative,
            } => {
                if self.eval_expr(exec, condition)?.is_true() {
                    self.eval_expr(exec, consequence)
                } else {
                    self.eval_expr(exec, alternative)
                }
            }
            Expr::Index(base, index) => {
                let base = self.eval_expr(exec, base)?;
                exec.index_lengths.push(base.len().unwrap_or(0));
                let index = self.eval_expr(exec, index);
                exec.index_lengths.pop();
                base.index(&index?).map_err(|e| self.raise(exec, e))
            }
            Expr::Range { base, from, to } => {
                let base = self.eval_expr(exec, base)?;
                exec.index_lengths.push(base.len().unwrap_or(0));
                let bounds = self
                    .eval_expr(exec, from)
                    .and_then(|f| self.eval_expr(exec, to).map(|t| (f, t)));
                exec.index_lengths.pop();
                let (from, to) = bounds?;
                base.range(&from, &to).map_err(|e| self.raise(exec, e))
            }
            Expr::Length => match exec.index_lengths.last() {
                Some(l) => Ok(v_int(*l)),
                None => Err(self.raise_code(exec, E_VARNF)),
            },
            Expr::List(args) => {
                let items = self.eval_args(exec, args)?;
                Ok(v_list(&items))
            }
            Expr::Prop { location, property } => {
                let (obj, name) = self.eval_prop_ref(exec, location, property)?;
                self.check_property_read(exec, obj, &name)?;
                self.world
                    .retrieve_property(obj, &name)
                    .map_err(|e| self.raise(exec, e.to_error()))
            }
            Expr::Verb {
                location,
                verb,
                args,
            } => {
                let obj = self.eval_expr(exec, location)?;
                let Some(obj) = obj.as_object() else {
                    return Err(self.raise_code(exec, E_TYPE));
                };
                let name = self.eval_expr(exec, verb)?;
                let Some(name) = name.as_string().map(|s| s.as_str().to_string()) else {
                    return Err(self.raise_code(exec, E_TYPE));
                };
                let args = self.eval_args(exec, args)?;
                let caller = exec.top().this;
                self.call_verb(exec, obj, obj, &name, args, caller)
            }
            Expr::Call { function, args } => {
                let args = self.eval_args(exec, args)?;
                self.dispatch_builtin(exec, function, args)
            }
            Expr::Pass { args } => {
                let args = self.eval_args(exec, args)?;
                let top = exec.top();
                let (this, verb_name, definer, caller) = (
                    top.this,
                    top.verb_name.clone(),
                    top.verb_definer,
                    top.caller,
                );
                let parent = self
                    .world
                    .parent_of(definer)
                    .map_err(|e| self.raise(exec, e.to_error()))?;
                if parent == NOTHING {
                    return Err(self.raise(
                        exec,
                        E_VERBNF.msg(format!("No verb {verb_name} above {definer}")),
                    ));
                }
                self.call_verb(exec, this, parent, &verb_name, args, caller)
            }
            Expr::Catch {
                trye,
                codes,
                except,
            } => match self.eval_expr(exec, trye) {
                Ok(v) => Ok(v),
                Err(VmError::Raise(ex)) => {
                    if self.codes_match(exec, codes, &ex)? {
                        match except {
                            Some(d) => self.eval_expr(exec, d),
                            None => Ok(ex.code.clone()),
                        }
                    } else {
                        Err(VmError::Raise(ex))
                    }
                }
                Err(other) => Err(other),
            },
            Expr::Assign { left, right } => {
                let value = self.eval_expr(exec, right)?;
                self.assign_to(exec, left, value.clone())?;
                Ok(value)
            }
            Expr::Scatter(items, right) => {
                let value = self.eval_expr(exec, right)?;
                self.run_scatter(exec, items, &value)?;
                Ok(value)
            }
        }
    }

    fn binary_op(
        &self,
        exec: &VMExecState,
        op: BinaryOp,
        l: &Var,
        r: &Var,
    ) -> Result<Var, VmError> {
        let raised = |e| self.raise(exec, e);
        match op {
            BinaryOp::Add => l.add(r).map_err(raised),
            BinaryOp::Sub => l.sub(r).map_err(raised),
            BinaryOp::Mul => l.mul(r).map_err(raised),
            BinaryOp::Div => l.div(r).map_err(raised),
            BinaryOp::Mod => l.modulus(r).map_err(raised),
            BinaryOp::Exp => l.pow(r).map_err(raised),
            BinaryOp::Eq => Ok(v_bool(l == r)),
            BinaryOp::NEq => Ok(v_bool(l != r)),
            BinaryOp::Lt => l.cmp_values(r).map(|o| v_bool(o.is_lt())).map_err(raised),
            BinaryOp::LtE => l.cmp_values(r).map(|o| v_bool(o.is_le())).map_err(raised),
            BinaryOp::Gt => l.cmp_values(r).map(|o| v_bool(o.is_gt())).map_err(raised),
            BinaryOp::GtE => l.cmp_values(r).map(|o| v_bool(o.is_ge())).map_err(raised),
            BinaryOp::In => l.index_in(r).map_err(raised),
        }
    }

    /// Evaluate an argument list, inlining `@` splices.
    fn eval_args(&self, exec: &mut VMExecState, args: &[Arg]) -> Result<Vec<Var>, VmError> {
        let mut out = vec![];
        for arg in args {
            match arg {
                Arg::Normal(e) => out.push(self.eval_expr(exec, e)?),
                Arg::Splice(e) => {
                    let v = self.eval_expr(exec, e)?;
                    let Some(l) = v.as_list() else {
                        return Err(self.raise_code(exec, E_TYPE));
                    };
                    out.extend(l.iter().cloned());
                }
            }
        }
        Ok(out)
    }

    fn eval_prop_ref(
        &self,
        exec: &mut VMExecState,
        location: &Expr,
        property: &Expr,
    ) -> Result<(Obj, Symbol), VmError> {
        let obj = self.eval_expr(exec, location)?;
        let Some(obj) = obj.as_object() else {
            return Err(self.raise_code(exec, E_TYPE));
        };
        if !self.world.valid(obj) {
            return Err(self.raise_code(exec, E_INVIND));
        }
        let name = self.eval_expr(exec, property)?;
        let Some(name) = name.as_string() else {
            return Err(self.raise_code(exec, E_TYPE));
        };
        Ok((obj, Symbol::mk(name.as_str())))
    }

    fn perms_flags(&self, who: Obj) -> warren_common::util::BitEnum<ObjFlag> {
        self.world.flags_of(who).unwrap_or_default()
    }

    fn check_property_read(
        &self,
        exec: &VMExecState,
        obj: Obj,
        name: &Symbol,
    ) -> Result<(), VmError> {
        let Ok((owner, flags)) = self.world.property_info(obj, name) else {
            // Built-in properties, or E_PROPNF about to surface from the
            // retrieve itself.
            return Ok(());
        };
        let who = exec.task_perms();
        if self.perms_flags(who).contains(ObjFlag::Wizard)
            || who == owner
            || flags.contains(warren_common::model::PropFlag::Read)
        {
            Ok(())
        } else {
            Err(self.raise_code(exec, E_PERM))
        }
    }

    fn check_property_write(
        &self,
        exec: &VMExecState,
        obj: Obj,
        name: &Symbol,
    ) -> Result<(), VmError> {
        let Ok((owner, flags)) = self.world.property_info(obj, name) else {
            // Built-in property writes: owner or wizard only.
            let who = exec.task_perms();
            let obj_owner = self.world.owner_of(obj).unwrap_or(NOTHING);
            if self.perms_flags(who).contains(ObjFlag::Wizard) || who == obj_owner {
                return Ok(());
            }
            return Err(self.raise_code(exec, E_PERM));
        };
        let who = exec.task_perms();
        if self.perms_flags(who).contains(ObjFlag::Wizard)
            || who == owner
            || flags.contains(warren_common::model::PropFlag::Write)
        {
            Ok(())
        } else {
            Err(self.raise_code(exec, E_PERM))
        }
    }

    /// Store a value through an assignment target, rebuilding container
    /// chains from the inside out.
    fn assign_to(&self, exec: &mut VMExecState, target: &Expr, value: Var) -> Result<(), VmError> {
        match target {
            Expr::Id(name) => {
                exec.top_mut().env.insert(name.clone(), value);
                Ok(())
            }
            Expr::Prop { location, property } => {
                let (obj, name) = self.eval_prop_ref(exec, location, property)?;
                self.check_property_write(exec, obj, &name)?;
                self.world
                    .update_property(obj, &name, value)
                    .map_err(|e| self.raise(exec, e.to_error()))
            }
            Expr::Index(base, index) => {
                let current = self.eval_expr(exec, base)?;
                exec.index_lengths.push(current.len().unwrap_or(0));
                let index = self.eval_expr(exec, index);
                exec.index_lengths.pop();
                let updated = current
                    .index_set(&index?, &value)
                    .map_err(|e| self.raise(exec, e))?;
                self.assign_to(exec, base, updated)
            }
            Expr::Range { base, from, to } => {
                let current = self.eval_expr(exec, base)?;
                exec.index_lengths.push(current.len().unwrap_or(0));
                let bounds = self
                    .eval_expr(exec, from)
                    .and_then(|f| self.eval_expr(exec, to).map(|t| (f, t)));
                exec.index_lengths.pop();
                let (from, to) = bounds?;
                let updated = current
                    .range_set(&from, &to, &value)
                    .map_err(|e| self.raise(exec, e))?;
                self.assign_to(exec, base, updated)
            }
            _ => Err(self.raise_code(exec, E_TYPE)),
        }
    }

    /// Destructure `value` into the scatter targets.
    fn run_scatter(
        &self,
        exec: &mut VMExecState,
        items: &[ScatterItem],
        value: &Var,
    ) -> Result<(), VmError> {
        let Some(list) = value.as_list() else {
            return Err(self.raise_code(exec, E_TYPE));
        };
        let args = list.as_slice();
        let nargs = args.len();
        let required = items
            .iter()
            .filter(|i| i.kind == ScatterKind::Required)
            .count();
        let optional = items
            .iter()
            .filter(|i| i.kind == ScatterKind::Optional)
            .count();
        let has_rest = items.iter().any(|i| i.kind == ScatterKind::Rest);
        if nargs < required || (!has_rest && nargs > required + optional) {
            return Err(self.raise_code(exec, E_ARGS));
        }
        let mut fill_opt = optional.min(nargs - required);
        let rest_len = nargs - required - fill_opt;
        let mut i = 0usize;
        for item in items {
            match item.kind {
                ScatterKind::Required => {
                    exec.top_mut().env.insert(item.id.clone(), args[i].clone());
                    i += 1;
                }
                ScatterKind::Optional => {
                    if fill_opt > 0 {
                        exec.top_mut().env.insert(item.id.clone(), args[i].clone());
                        i += 1;
                        fill_opt -= 1;
                    } else if let Some(default) = &item.expr {
                        let v = self.eval_expr(exec, default)?;
                        exec.top_mut().env.insert(item.id.clone(), v);
                    }
                }
                ScatterKind::Rest => {
                    let rest = v_list(&args[i..i + rest_len]);
                    exec.top_mut().env.insert(item.id.clone(), rest);
                    i += rest_len;
                }
            }
        }
        Ok(())
    }

    // ---- verb dispatch --------------------------------------------------

    /// Dispatch a verb call: resolve starting at `search_from` (the
    /// receiver normally, the definer's parent for `pass()`), switch to
    /// the verb owner's authority, push a frame, run the body.
    pub(crate) fn call_verb(
        &self,
        exec: &mut VMExecState,
        receiver: Obj,
        search_from: Obj,
        verb_name: &str,
        args: Vec<Var>,
        caller: Obj,
    ) -> Result<Var, VmError> {
        if exec.stack.len() >= MAX_CALL_DEPTH {
            return Err(self.raise_code(exec, E_MAXREC));
        }
        if !self.world.valid(receiver) || !self.world.valid(search_from) {
            return Err(self.raise_code(exec, E_INVIND));
        }
        let (definer, index, verbdef) = self
            .world
            .find_verb(search_from, verb_name)
            .map_err(|_| self.raise(exec, E_VERBNF.msg(format!("Verb not found: {verb_name}"))))?;
        if !verbdef.flags.contains(VerbFlag::Exec) {
            return Err(self.raise_code(exec, E_PERM));
        }
        self.run_resolved_verb(exec, receiver, definer, index, &verbdef, verb_name, args, caller)
    }

    /// Execute an already-resolved verb. Command dispatch lands here
    /// directly, since command verbs are not subject to the x-bit check.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn run_resolved_verb(
        &self,
        exec: &mut VMExecState,
        receiver: Obj,
        definer: Obj,
        index: usize,
        verbdef: &warren_db::VerbDef,
        verb_name: &str,
        args: Vec<Var>,
        caller: Obj,
    ) -> Result<Var, VmError> {
        if exec.stack.len() >= MAX_CALL_DEPTH {
            return Err(self.raise_code(exec, E_MAXREC));
        }
        let program = self.verb_program(exec, definer, index, verbdef.program.clone(), || {
            verbdef.source()
        })?;

        let mut activation = Activation::new(
            receiver,
            exec.player,
            verbdef.owner,
            definer,
            index,
            verb_name.to_string(),
            caller,
        );
        self.seed_environment(&mut activation, &args, exec.command.as_ref());
        exec.stack.push(activation);
        let result = self.exec_stmts(exec, &program.stmts);
        exec.stack.pop();
        match result {
            Ok(StmtFlow::Return(v)) => Ok(v),
            Ok(_) => Ok(v_int(0)),
            Err(e) => Err(e),
        }
    }

    /// Entry point for command tasks, with the verb already matched.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_command_verb(
        &self,
        exec: &mut VMExecState,
        receiver: Obj,
        definer: Obj,
        index: usize,
        verbdef: &warren_db::VerbDef,
        verb_name: &str,
        args: Vec<Var>,
    ) -> TaskOutcome {
        let caller = exec.player;
        let r = self.run_resolved_verb(
            exec, receiver, definer, index, verbdef, verb_name, args, caller,
        );
        self.to_outcome(exec, r)
    }

    /// The verb's AST, from the cache or by compiling and writing the
    /// cache back. Either path runs the same tree.
    fn verb_program(
        &self,
        exec: &VMExecState,
        definer: Obj,
        index: usize,
        cached: Option<Arc<Program>>,
        source: impl FnOnce() -> String,
    ) -> Result<Arc<Program>, VmError> {
        if let Some(p) = cached {
            return Ok(p);
        }
        match compile(&source()) {
            Ok(p) => {
                let p = Arc::new(p);
                let _ = self.world.cache_verb_program(definer, index, p.clone());
                Ok(p)
            }
            Err(e) => Err(self.raise(
                exec,
                E_VERBNF.msg(format!("Verb program failed to compile: {e}")),
            )),
        }
    }

    /// Seed a fresh verb frame: call info, the task's command split, the
    /// type-code constants, and every error-name constant.
    fn seed_environment(
        &self,
        activation: &mut Activation,
        args: &[Var],
        command: Option<&warren_common::matching::ParsedCommand>,
    ) {
        let env = &mut activation.env;
        env.insert(Symbol::mk("args"), v_list(args));
        env.insert(Symbol::mk("this"), v_obj(activation.this));
        env.insert(Symbol::mk("player"), v_obj(activation.player));
        env.insert(Symbol::mk("caller"), v_obj(activation.caller));
        env.insert(Symbol::mk("verb"), v_str(&activation.verb_name));

        match command {
            Some(pc) => {
                env.insert(Symbol::mk("argstr"), v_str(&pc.argstr));
                env.insert(Symbol::mk("dobjstr"), v_str(&pc.dobjstr));
                env.insert(Symbol::mk("dobj"), v_obj(pc.dobj));
                env.insert(Symbol::mk("prepstr"), v_str(&pc.prepstr));
                env.insert(Symbol::mk("iobjstr"), v_str(&pc.iobjstr));
                env.insert(Symbol::mk("iobj"), v_obj(pc.iobj));
            }
            None => {
                env.insert(Symbol::mk("argstr"), v_str(""));
                env.insert(Symbol::mk("dobjstr"), v_str(""));
                env.insert(Symbol::mk("dobj"), v_obj(NOTHING));
                env.insert(Symbol::mk("prepstr"), v_str(""));
                env.insert(Symbol::mk("iobjstr"), v_str(""));
                env.insert(Symbol::mk("iobj"), v_obj(NOTHING));
            }
        }

        env.insert(Symbol::mk("INT"), v_int(0));
        env.insert(Symbol::mk("NUM"), v_int(0));
        env.insert(Symbol::mk("OBJ"), v_int(1));
        env.insert(Symbol::mk("STR"), v_int(2));
        env.insert(Symbol::mk("ERR"), v_int(3));
        env.insert(Symbol::mk("LIST"), v_int(4));
        env.insert(Symbol::mk("FLOAT"), v_int(9));

        for repr in 0..16u8 {
            let code = ErrorCode::from_repr(repr).expect("error code table");
            env.insert(Symbol::mk(code.name()), v_err(code));
        }
    }

    // ---- builtin dispatch -----------------------------------------------

    fn dispatch_builtin(
        &self,
        exec: &mut VMExecState,
        name: &Symbol,
        mut args: Vec<Var>,
    ) -> Result<Var, VmError> {
        // `raise`, `eval`, and `call_function` need the interpreter itself
        // and are dispatched here rather than through the registry.
        if name == &Symbol::mk("raise") {
            if args.is_empty() || args.len() > 3 {
                return Ok(v_err(E_ARGS));
            }
            // The code may be any value, not just an error; except clauses
            // match it by value.
            let code = args[0].clone();
            let msg = match args.get(1) {
                Some(m) => match m.variant() {
                    Variant::Str(s) => s.as_str().to_string(),
                    _ => return Ok(v_err(E_TYPE)),
                },
                None => match code.variant() {
                    Variant::Err(e) => e.message(),
                    _ => code.to_display_string(),
                },
            };
            let value = args.get(2).cloned().unwrap_or_else(warren_var::v_none);
            return Err(VmError::Raise(Exception {
                code,
                msg,
                value,
                frames: exec.capture_frames(),
            }));
        }
        if name == &Symbol::mk("eval") {
            if args.len() != 1 {
                return Ok(v_err(E_ARGS));
            }
            let Variant::Str(src) = args[0].variant() else {
                return Ok(v_err(E_TYPE));
            };
            let src = src.as_str().to_string();
            return self.do_eval(exec, &src);
        }
        if name == &Symbol::mk("call_function") {
            if args.is_empty() {
                return Ok(v_err(E_ARGS));
            }
            let fname = args.remove(0);
            let Variant::Str(fname) = fname.variant() else {
                return Ok(v_err(E_TYPE));
            };
            let fname = Symbol::mk(fname.as_str());
            return self.dispatch_builtin(exec, &fname, args);
        }

        let Some(bf) = self.builtins.builtin_for(name) else {
            return Err(self.raise(
                exec,
                E_VERBNF.msg(format!("Unknown built-in function: {name}")),
            ));
        };
        let result = {
            let mut state = BfCallState {
                name: name.clone(),
                args,
                exec,
                world: &self.world,
                session: self.session.clone(),
                scheduler: self.scheduler.clone(),
                config: self.config.clone(),
            };
            bf(&mut state)
        };
        match result {
            Ok(BfRet::Ret(v)) => Ok(v),
            Err(BfErr::Code(c)) => Ok(v_err(c)),
            Err(BfErr::ErrValue(e)) => Ok(v_error(e)),
            Err(BfErr::Raise(e)) => Err(self.raise(exec, e)),
            Err(BfErr::Cancelled) => Err(VmError::Cancelled),
        }
    }

    /// The synchronous sub-task of `eval()`: the caller's context and
    /// environment, a fresh tick budget, and the `{1, value} / {0,
    /// error-string}` result contract.
    fn do_eval(&self, exec: &mut VMExecState, source: &str) -> Result<Var, VmError> {
        let (this, perms, caller, base_env) = match exec.stack.last() {
            Some(a) => (a.this, a.perms, a.this, a.env.clone()),
            None => (exec.player, exec.player, exec.player, HashMap::new()),
        };
        let pflags = self.perms_flags(perms);
        if !pflags.contains(ObjFlag::Programmer) && !pflags.contains(ObjFlag::Wizard) {
            return Err(self.raise_code(exec, E_PERM));
        }

        let program = match compile(source) {
            Ok(p) => p,
            Err(e) => {
                return Ok(v_list(&[v_int(0), v_str(&e.to_string())]));
            }
        };

        let mut activation = Activation::new(
            this,
            exec.player,
            perms,
            NOTHING,
            0,
            "eval".to_string(),
            caller,
        );
        self.seed_environment(&mut activation, &[], exec.command.as_ref());
        // The caller's environment shows through, under the fresh seeds.
        for (k, v) in base_env {
            activation.env.entry(k).or_insert(v);
        }

        let saved_ticks = exec.ticks_left;
        exec.ticks_left = self.config.default_tick_quota;
        exec.stack.push(activation);
        let result = self.exec_stmts(exec, &program.stmts);
        exec.stack.pop();
        exec.ticks_left = saved_ticks;

        match result {
            Ok(StmtFlow::Return(v)) => Ok(v_list(&[v_int(1), v])),
            Ok(_) => Ok(v_list(&[v_int(1), v_int(0)])),
            Err(VmError::Raise(ex)) => {
                let line = ex
                    .traceback_lines()
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| ex.msg.clone());
                Ok(v_list(&[v_int(0), v_str(&line)]))
            }
            Err(VmError::Cancelled) => Err(VmError::Cancelled),
        }
    }
}
