use std::collections::HashMap;
use warren_var::{Obj, Symbol, Var};

/// One verb frame: the context a verb body executes in. `perms` starts as
/// the verb owner ("wnd" semantics) and may be lowered by
/// `set_task_perms()`.
#[derive(Clone, Debug)]
pub struct Activation {
    pub this: Obj,
    pub player: Obj,
    pub perms: Obj,
    pub verb_definer: Obj,
    pub verb_index: usize,
    pub verb_name: String,
    pub caller: Obj,
    /// Line currently executing, for tracebacks.
    pub line: usize,
    pub env: HashMap<Symbol, Var>,
}

impl Activation {
    pub fn new(
        this: Obj,
        player: Obj,
        perms: Obj,
        verb_definer: Obj,
        verb_index: usize,
        verb_name: String,
        caller: Obj,
    ) -> Self {
        Self {
            this,
            player,
            perms,
            verb_definer,
            verb_index,
            verb_name,
            caller,
            line: 0,
            env: HashMap::new(),
        }
    }
}
