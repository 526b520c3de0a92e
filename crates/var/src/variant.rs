use crate::error::Error;
use crate::list::List;
use crate::obj::Obj;
use crate::string::Str;
use std::fmt::{Debug, Formatter};

/// The set of value shapes. `Clear` and `None` are property-layer sentinels:
/// `Clear` marks an inherited property deferring to its parent, `None` marks
/// absence. Neither is constructible from MOO source. Floats are carried and
/// printed but treated as opaque by arithmetic.
#[derive(Clone)]
pub enum Variant {
    Int(i64),
    Obj(Obj),
    Str(Str),
    Err(Box<Error>),
    List(List),
    Float(f64),
    Clear,
    None,
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variant::Int(l), Variant::Int(r)) => l == r,
            (Variant::Obj(l), Variant::Obj(r)) => l == r,
            (Variant::Str(l), Variant::Str(r)) => l == r,
            (Variant::Err(l), Variant::Err(r)) => l == r,
            (Variant::List(l), Variant::List(r)) => l == r,
            (Variant::Float(l), Variant::Float(r)) => l == r,
            (Variant::Clear, Variant::Clear) => true,
            (Variant::None, Variant::None) => true,
            _ => false,
        }
    }
}

impl Debug for Variant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Int(i) => write!(f, "{i}"),
            Variant::Obj(o) => write!(f, "{o}"),
            Variant::Str(s) => write!(f, "{s:?}"),
            Variant::Err(e) => write!(f, "{e:?}"),
            Variant::List(l) => write!(f, "{l:?}"),
            Variant::Float(x) => write!(f, "{x}"),
            Variant::Clear => write!(f, "<clear>"),
            Variant::None => write!(f, "<none>"),
        }
    }
}
