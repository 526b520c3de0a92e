use crate::Symbol;
use crate::var::Var;
use ErrorCode::*;
use bincode::{Decode, Encode};
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use strum::FromRepr;

/// The closed set of MOO error codes. The discriminants are the numbering
/// used in the portable database format.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, FromRepr, Encode, Decode)]
#[allow(non_camel_case_types)]
pub enum ErrorCode {
    E_NONE = 0,
    E_TYPE = 1,
    E_DIV = 2,
    E_PERM = 3,
    E_PROPNF = 4,
    E_VERBNF = 5,
    E_VARNF = 6,
    E_INVIND = 7,
    E_RECMOVE = 8,
    E_MAXREC = 9,
    E_RANGE = 10,
    E_ARGS = 11,
    E_NACC = 12,
    E_INVARG = 13,
    E_QUOTA = 14,
    E_FLOAT = 15,
}

impl ErrorCode {
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "E_NONE" => Some(E_NONE),
            "E_TYPE" => Some(E_TYPE),
            "E_DIV" => Some(E_DIV),
            "E_PERM" => Some(E_PERM),
            "E_PROPNF" => Some(E_PROPNF),
            "E_VERBNF" => Some(E_VERBNF),
            "E_VARNF" => Some(E_VARNF),
            "E_INVIND" => Some(E_INVIND),
            "E_RECMOVE" => Some(E_RECMOVE),
            "E_MAXREC" => Some(E_MAXREC),
            "E_RANGE" => Some(E_RANGE),
            "E_ARGS" => Some(E_ARGS),
            "E_NACC" => Some(E_NACC),
            "E_INVARG" => Some(E_INVARG),
            "E_QUOTA" => Some(E_QUOTA),
            "E_FLOAT" => Some(E_FLOAT),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            E_NONE => "E_NONE",
            E_TYPE => "E_TYPE",
            E_DIV => "E_DIV",
            E_PERM => "E_PERM",
            E_PROPNF => "E_PROPNF",
            E_VERBNF => "E_VERBNF",
            E_VARNF => "E_VARNF",
            E_INVIND => "E_INVIND",
            E_RECMOVE => "E_RECMOVE",
            E_MAXREC => "E_MAXREC",
            E_RANGE => "E_RANGE",
            E_ARGS => "E_ARGS",
            E_NACC => "E_NACC",
            E_INVARG => "E_INVARG",
            E_QUOTA => "E_QUOTA",
            E_FLOAT => "E_FLOAT",
        }
    }

    /// The canonical descriptive string for each code, as LambdaMOO reports
    /// them in tracebacks.
    pub fn description(&self) -> &'static str {
        match self {
            E_NONE => "No error",
            E_TYPE => "Type mismatch",
            E_DIV => "Division by zero",
            E_PERM => "Permission denied",
            E_PROPNF => "Property not found",
            E_VERBNF => "Verb not found",
            E_VARNF => "Variable not found",
            E_INVIND => "Invalid indirection",
            E_RECMOVE => "Recursive move",
            E_MAXREC => "Too many verb calls",
            E_RANGE => "Range error",
            E_ARGS => "Incorrect number of arguments",
            E_NACC => "Move refused by destination",
            E_INVARG => "Invalid argument",
            E_QUOTA => "Resource limit exceeded",
            E_FLOAT => "Floating-point arithmetic error",
        }
    }

    pub fn msg<S: ToString>(self, s: S) -> Error {
        Error::new(self, Some(s.to_string()), None)
    }

    pub fn with_msg<F>(self, f: F) -> Error
    where
        F: FnOnce() -> String,
    {
        Error::new(self, Some(f()), None)
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An error value: the code, plus the optional message and payload attached
/// by `raise()`. Equality and hashing consider only the code, so error
/// values compare the way MOO programs expect.
#[derive(Clone, Encode, Decode)]
pub struct Error {
    pub err_type: ErrorCode,
    pub msg: Option<String>,
    pub value: Option<Box<Var>>,
}

impl Error {
    pub fn new(err_type: ErrorCode, msg: Option<String>, value: Option<Var>) -> Self {
        Self {
            err_type,
            msg,
            value: value.map(Box::new),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.err_type
    }

    pub fn message(&self) -> String {
        match &self.msg {
            Some(m) => m.clone(),
            None => self.err_type.description().to_string(),
        }
    }

    pub fn name(&self) -> Symbol {
        Symbol::mk(self.err_type.name())
    }

    pub fn raise_value(&self) -> Var {
        match &self.value {
            Some(v) => (**v).clone(),
            None => Var::mk_none(),
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.err_type == other.err_type
    }
}

impl Eq for Error {}

impl PartialEq<ErrorCode> for Error {
    fn eq(&self, other: &ErrorCode) -> bool {
        self.err_type == *other
    }
}

impl Hash for Error {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.err_type.hash(state);
    }
}

impl From<ErrorCode> for Error {
    fn from(val: ErrorCode) -> Self {
        Error::new(val, None, None)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.err_type)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.msg.is_some() {
            write!(f, "{} ({})", self.err_type, self.message())
        } else {
            write!(f, "{}", self.err_type)
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_roundtrip() {
        for i in 0..16u8 {
            let code = ErrorCode::from_repr(i).unwrap();
            assert_eq!(code as u8, i);
            assert_eq!(ErrorCode::parse_str(code.name()), Some(code));
        }
    }

    #[test]
    fn equality_ignores_message() {
        let bare = Error::from(E_PERM);
        let msgful = E_PERM.msg("you may not");
        assert_eq!(bare, msgful);
        assert_eq!(msgful, E_PERM);
    }
}
