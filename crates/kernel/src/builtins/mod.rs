use crate::config::Config;
use crate::tasks::TaskSchedulerClient;
use crate::vm::VMExecState;
use std::collections::HashMap;
use std::sync::Arc;
use warren_common::model::{Perms, WorldStateError};
use warren_common::tasks::Session;
use warren_db::WorldState;
use warren_var::{Error as MooError, ErrorCode, Obj, Symbol, Var};

mod bf_list_sets;
mod bf_num;
mod bf_objects;
mod bf_properties;
pub(crate) mod bf_server;
mod bf_strings;
mod bf_task;
mod bf_values;
mod bf_verbs;

/// The arguments and surrounding state passed to a built-in function.
pub struct BfCallState<'a> {
    /// The name the function was invoked by.
    pub name: Symbol,
    pub args: Vec<Var>,
    /// The task's execution state; builtins may inspect the stack.
    pub exec: &'a mut VMExecState,
    pub world: &'a WorldState,
    pub session: Arc<dyn Session>,
    pub scheduler: TaskSchedulerClient,
    pub config: Arc<Config>,
}

impl BfCallState<'_> {
    pub fn task_perms_who(&self) -> Obj {
        self.exec.task_perms()
    }

    pub fn caller_perms(&self) -> Obj {
        self.exec.caller_perms()
    }

    /// The current frame's authority with its flags, for permission checks.
    pub fn task_perms(&self) -> Result<Perms, WorldStateError> {
        let who = self.task_perms_who();
        let flags = self.world.flags_of(who).unwrap_or_default();
        Ok(Perms::new(who, flags))
    }
}

/// Return from a built-in: a value for the expression.
pub enum BfRet {
    Ret(Var),
}

/// Failure from a built-in. `Code`/`ErrValue` become error *values* in the
/// expression result (the caller inspects them); `Raise` unwinds like a
/// raised error; `Cancelled` is the kill switch.
#[derive(Debug)]
pub enum BfErr {
    Code(ErrorCode),
    ErrValue(MooError),
    Raise(MooError),
    Cancelled,
}

pub fn world_state_bf_err(err: WorldStateError) -> BfErr {
    BfErr::ErrValue(err.to_error())
}

pub type BuiltinFunction = fn(&mut BfCallState<'_>) -> Result<BfRet, BfErr>;

/// The bundle of builtins, shared by every task.
pub struct BuiltinRegistry {
    builtins: HashMap<Symbol, BuiltinFunction>,
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        let mut builtins = HashMap::new();
        bf_values::register_bf_values(&mut builtins);
        bf_strings::register_bf_strings(&mut builtins);
        bf_list_sets::register_bf_list_sets(&mut builtins);
        bf_num::register_bf_num(&mut builtins);
        bf_objects::register_bf_objects(&mut builtins);
        bf_properties::register_bf_properties(&mut builtins);
        bf_verbs::register_bf_verbs(&mut builtins);
        bf_server::register_bf_server(&mut builtins);
        bf_task::register_bf_task(&mut builtins);
        Self { builtins }
    }

    pub fn builtin_for(&self, name: &Symbol) -> Option<&BuiltinFunction> {
        self.builtins.get(name)
    }

    pub fn names(&self) -> Vec<Symbol> {
        self.builtins.keys().cloned().collect()
    }
}

macro_rules! register {
    ($map:expr, $($name:literal => $fn:path),+ $(,)?) => {
        $(
            $map.insert(warren_var::Symbol::mk($name), $fn as $crate::builtins::BuiltinFunction);
        )+
    };
}
pub(crate) use register;
