mod activation;
mod exec;
mod exec_state;

pub use activation::Activation;
pub use exec::{MAX_CALL_DEPTH, TaskOutcome, VM};
pub use exec_state::VMExecState;

use warren_var::{Obj, Var, v_int, v_list, v_obj, v_str};

/// A raised MOO error in flight: the code value (usually an error value,
/// but `raise()` may throw any value), the message, the payload, and the
/// frames captured where the raise happened.
#[derive(Clone, Debug)]
pub struct Exception {
    pub code: Var,
    pub msg: String,
    pub value: Var,
    pub frames: Vec<FrameInfo>,
}

/// One captured stack frame, for tracebacks and `callers()`.
#[derive(Clone, Debug)]
pub struct FrameInfo {
    pub this: Obj,
    pub verb_name: String,
    pub programmer: Obj,
    pub verb_definer: Obj,
    pub player: Obj,
    pub line: usize,
}

impl FrameInfo {
    /// The `callers()`-shaped tuple: {this, verb-name, programmer,
    /// verb-loc, player, line-number}.
    pub fn to_var(&self) -> Var {
        v_list(&[
            v_obj(self.this),
            v_str(&self.verb_name),
            v_obj(self.programmer),
            v_obj(self.verb_definer),
            v_obj(self.player),
            v_int(self.line as i64),
        ])
    }
}

impl Exception {
    /// The traceback lines delivered to the player when the error goes
    /// uncaught.
    pub fn traceback_lines(&self) -> Vec<String> {
        let mut lines = vec![];
        for (i, f) in self.frames.iter().enumerate() {
            let what = format!("{}:{}", f.verb_definer, f.verb_name);
            if i == 0 {
                lines.push(format!(
                    "{} (this == {}), line {}:  {}",
                    what, f.this, f.line, self.msg
                ));
            } else {
                lines.push(format!(
                    "... called from {} (this == {}), line {}",
                    what, f.this, f.line
                ));
            }
        }
        lines.push("(End of traceback)".to_string());
        lines
    }

    /// The 4-tuple bound by an `except` clause: {code, msg, value,
    /// traceback}.
    pub fn to_exception_var(&self) -> Var {
        let traceback: Vec<Var> = self.frames.iter().map(|f| f.to_var()).collect();
        v_list(&[
            self.code.clone(),
            v_str(&self.msg),
            self.value.clone(),
            v_list(&traceback),
        ])
    }
}

/// Non-local exits from evaluation. `Raise` is catchable by try/except and
/// catch expressions; `Cancelled` is the kill switch and unwinds the whole
/// task unconditionally.
#[derive(Debug)]
pub enum VmError {
    Raise(Exception),
    Cancelled,
}
