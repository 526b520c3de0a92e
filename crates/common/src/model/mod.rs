mod defs;
mod r#match;
mod permissions;

pub use defs::{ObjFlag, PropFlag, VerbFlag, prop_perms_string, verb_perms_string};
pub use r#match::{ArgSpec, PrepSpec, VerbArgsSpec};
pub use permissions::Perms;

use thiserror::Error;
use warren_var::{
    E_INVARG, E_INVIND, E_NACC, E_PERM, E_PROPNF, E_RECMOVE, E_VERBNF, Error as MooError, Obj,
};

/// Host-level failures from world-state operations. Each maps onto a MOO
/// error value at the language boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorldStateError {
    #[error("Object not found: {0}")]
    ObjectNotFound(Obj),
    #[error("Invalid parent for object: {0}")]
    InvalidParent(Obj),
    #[error("Could not recycle object: {0}")]
    CouldNotRecycle(Obj),
    #[error("Permission denied on object: {0}")]
    ObjectPermissionDenied(Obj),
    #[error("Recursive move: {0} into {1}")]
    RecursiveMove(Obj, Obj),
    #[error("Move refused by destination: {0} into {1}")]
    MoveRefused(Obj, Obj),

    #[error("Property not found: {0}.{1}")]
    PropertyNotFound(Obj, String),
    #[error("Property permission denied: {0}.{1}")]
    PropertyPermissionDenied(Obj, String),
    #[error("Duplicate property definition: {0}.{1}")]
    DuplicatePropertyDefinition(Obj, String),

    #[error("Verb not found: {0}:{1}")]
    VerbNotFound(Obj, String),
    #[error("Verb permission denied: {0}:{1}")]
    VerbPermissionDenied(Obj, String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl WorldStateError {
    /// The MOO error value surfaced to programs for this failure.
    pub fn to_error(&self) -> MooError {
        match self {
            Self::ObjectNotFound(_) => E_INVIND.msg(self.to_string()),
            Self::InvalidParent(_) => E_INVARG.msg(self.to_string()),
            Self::CouldNotRecycle(_) => E_INVARG.msg(self.to_string()),
            Self::ObjectPermissionDenied(_) => E_PERM.into(),
            Self::RecursiveMove(_, _) => E_RECMOVE.into(),
            Self::MoveRefused(_, _) => E_NACC.into(),
            Self::PropertyNotFound(_, _) => E_PROPNF.into(),
            Self::PropertyPermissionDenied(_, _) => E_PERM.into(),
            Self::DuplicatePropertyDefinition(_, _) => E_INVARG.msg(self.to_string()),
            Self::VerbNotFound(_, _) => E_VERBNF.into(),
            Self::VerbPermissionDenied(_, _) => E_PERM.into(),
            Self::InvalidArgument(_) => E_INVARG.msg(self.to_string()),
        }
    }
}

impl From<WorldStateError> for MooError {
    fn from(e: WorldStateError) -> Self {
        e.to_error()
    }
}
