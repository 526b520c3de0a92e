//! The primitive MOO value types: integers, object references, strings,
//! error codes, and lists, plus the property sentinels (`Clear`, `None`) and
//! the opaque float carrier. Values are immutable; all mutating operations
//! produce new values, so sharing across tasks is safe.

use strum::FromRepr;

mod error;
mod list;
mod obj;
mod string;
mod symbol;
mod var;
mod variant;

pub use error::{Error, ErrorCode};
pub use list::List;
pub use obj::{AMBIGUOUS, FAILED_MATCH, NOTHING, Obj, SYSTEM_OBJECT};
pub use string::Str;
pub use symbol::Symbol;
pub use var::Var;
pub use variant::Variant;

pub use error::ErrorCode::{
    E_ARGS, E_DIV, E_FLOAT, E_INVARG, E_INVIND, E_MAXREC, E_NACC, E_NONE, E_PERM, E_PROPNF,
    E_QUOTA, E_RANGE, E_RECMOVE, E_TYPE, E_VARNF, E_VERBNF,
};

/// Type codes as they appear in the portable database format and as returned
/// by `typeof()`.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, FromRepr)]
#[allow(non_camel_case_types)]
pub enum VarType {
    TYPE_INT = 0,
    TYPE_OBJ = 1,
    TYPE_STR = 2,
    TYPE_ERR = 3,
    TYPE_LIST = 4,
    TYPE_CLEAR = 5,
    TYPE_NONE = 6,
    TYPE_FLOAT = 9,
}

pub fn v_int(i: i64) -> Var {
    Var::mk_integer(i)
}

pub fn v_obj(o: Obj) -> Var {
    Var::mk_object(o)
}

pub fn v_objid(id: i64) -> Var {
    Var::mk_object(Obj::mk_id(id))
}

pub fn v_str(s: &str) -> Var {
    Var::mk_str(s)
}

pub fn v_string(s: String) -> Var {
    Var::mk_string(s)
}

pub fn v_err(e: ErrorCode) -> Var {
    Var::mk_error(Error::from(e))
}

pub fn v_error(e: Error) -> Var {
    Var::mk_error(e)
}

pub fn v_list(values: &[Var]) -> Var {
    Var::mk_list(values)
}

pub fn v_list_iter<IT: IntoIterator<Item = Var>>(values: IT) -> Var {
    Var::mk_list_iter(values)
}

pub fn v_empty_list() -> Var {
    Var::mk_list(&[])
}

pub fn v_empty_str() -> Var {
    Var::mk_str("")
}

pub fn v_float(f: f64) -> Var {
    Var::mk_float(f)
}

pub fn v_none() -> Var {
    Var::mk_none()
}

pub fn v_clear() -> Var {
    Var::mk_clear()
}

pub fn v_bool(b: bool) -> Var {
    v_int(if b { 1 } else { 0 })
}
