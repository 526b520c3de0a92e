use bincode::{Decode, Encode};
use std::fmt::{Debug, Display, Formatter};

/// A reference to an object by id. May or may not denote a live object; the
/// store decides validity.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Encode, Decode)]
pub struct Obj(i64);

/// The null object reference.
pub const NOTHING: Obj = Obj(-1);
/// Sentinel returned by object matching when more than one candidate fits.
pub const AMBIGUOUS: Obj = Obj(-2);
/// Sentinel returned by object matching when nothing fits.
pub const FAILED_MATCH: Obj = Obj(-3);
/// The system object, root of `$name` resolution.
pub const SYSTEM_OBJECT: Obj = Obj(0);

impl Obj {
    pub const fn mk_id(id: i64) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> i64 {
        self.0
    }

    pub fn is_nothing(&self) -> bool {
        *self == NOTHING
    }

    /// Negative ids are placeholders (un-logged-in connections, match
    /// sentinels) and never live objects.
    pub fn is_positive(&self) -> bool {
        self.0 >= 0
    }
}

impl Display for Obj {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Debug for Obj {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
