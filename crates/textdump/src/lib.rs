//! The LambdaMOO Format-4 textdump: the portable text representation of the
//! whole object graph, readable by other MOO servers. Reading and writing
//! are split from conversion, so the intermediate [`Textdump`] mirrors the
//! file layout exactly and the store conversion handles the structural
//! threading (contents/children chains) and property-slot flattening.

use std::collections::BTreeMap;
use thiserror::Error;
use warren_common::model::WorldStateError;
use warren_var::{Obj, Var};

mod convert;
mod read;
mod write;

pub use convert::{load_textdump, make_textdump};
pub use read::TextdumpReader;
pub use write::TextdumpWriter;

pub const VERSION_STRING: &str = "** LambdaMOO Database, Format Version 4 **";

// Verb permission packing in verbdef flag words.
pub(crate) const VF_READ: u16 = 1;
pub(crate) const VF_WRITE: u16 = 2;
pub(crate) const VF_EXEC: u16 = 4;
pub(crate) const VF_DEBUG: u16 = 8;
pub(crate) const VF_PERMMASK: u16 = 0xf;
pub(crate) const VF_DOBJSHIFT: u16 = 4;
pub(crate) const VF_IOBJSHIFT: u16 = 6;
pub(crate) const VF_OBJMASK: u16 = 0x3;

// Typed value encoding.
pub(crate) const TYPE_INT: i64 = 0;
pub(crate) const TYPE_OBJ: i64 = 1;
pub(crate) const TYPE_STR: i64 = 2;
pub(crate) const TYPE_ERR: i64 = 3;
pub(crate) const TYPE_LIST: i64 = 4;
pub(crate) const TYPE_CLEAR: i64 = 5;
pub(crate) const TYPE_NONE: i64 = 6;
pub(crate) const TYPE_FLOAT: i64 = 9;

#[derive(Clone, Debug)]
pub struct Verbdef {
    pub name: String,
    pub owner: Obj,
    pub flags: u16,
    pub prep: i16,
}

#[derive(Clone, Debug)]
pub struct Propval {
    pub value: Var,
    pub owner: Obj,
    pub flags: u8,
    pub is_clear: bool,
}

/// One object exactly as it sits in the file, including the four structural
/// chain pointers the portable format threads contents and children with.
#[derive(Clone, Debug)]
pub struct Object {
    pub id: Obj,
    pub name: String,
    pub flags: u8,
    pub owner: Obj,
    pub location: Obj,
    pub first_content: Obj,
    pub next: Obj,
    pub parent: Obj,
    pub first_child: Obj,
    pub sibling: Obj,
    pub verbdefs: Vec<Verbdef>,
    pub propdefs: Vec<String>,
    pub propvals: Vec<Propval>,
}

pub struct Textdump {
    pub version_string: String,
    pub objects: BTreeMap<Obj, Object>,
    pub users: Vec<Obj>,
    /// Verb programs, keyed by `(object, verb index)`, as line lists.
    pub programs: BTreeMap<(Obj, usize), Vec<String>>,
}

#[derive(Debug, Error)]
pub enum TextdumpError {
    #[error("io error: {0} @ line {1}")]
    IoError(std::io::Error, usize),
    #[error("parse error: {0} @ line {1}")]
    ParseError(String, usize),
    #[error("textdump version error: {0}")]
    VersionError(String),
    #[error("db error while {0}: {1}")]
    LoadError(String, WorldStateError),
}
