use crate::matching::Preposition;
use strum::FromRepr;

/// What a command verb accepts for its direct or indirect object slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr, Hash, Ord, PartialOrd)]
#[repr(u8)]
pub enum ArgSpec {
    None = 0,
    Any = 1,
    This = 2,
}

impl ArgSpec {
    #[must_use]
    pub fn to_string(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Any => "any",
            Self::This => "this",
        }
    }

    #[must_use]
    pub fn from_string(repr: &str) -> Option<Self> {
        match repr {
            "none" => Some(Self::None),
            "any" => Some(Self::Any),
            "this" => Some(Self::This),
            _ => None,
        }
    }
}

/// The preposition slot of a verb's argument spec. Serialized as -2 (any),
/// -1 (none), or the canonical preposition index.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum PrepSpec {
    Any,
    None,
    Other(Preposition),
}

impl PrepSpec {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "any" => Some(Self::Any),
            "none" => Some(Self::None),
            _ => Preposition::parse(s).map(Self::Other),
        }
    }

    #[must_use]
    pub fn to_i16(self) -> i16 {
        match self {
            Self::Any => -2,
            Self::None => -1,
            Self::Other(p) => p as i16,
        }
    }

    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            -2 => Some(Self::Any),
            -1 => Some(Self::None),
            p => Preposition::from_repr(p as u16).map(Self::Other),
        }
    }

    pub fn to_string(&self) -> String {
        match self {
            Self::Any => "any".to_string(),
            Self::None => "none".to_string(),
            Self::Other(p) => p.to_string().to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct VerbArgsSpec {
    pub dobj: ArgSpec,
    pub prep: PrepSpec,
    pub iobj: ArgSpec,
}

impl VerbArgsSpec {
    #[must_use]
    pub fn this_none_this() -> Self {
        Self {
            dobj: ArgSpec::This,
            prep: PrepSpec::None,
            iobj: ArgSpec::This,
        }
    }

    /// Whether a parsed command's spec satisfies this verb's declaration.
    #[must_use]
    pub fn matches(&self, v: &Self) -> bool {
        (self.dobj == ArgSpec::Any || self.dobj == v.dobj)
            && (self.prep == PrepSpec::Any || self.prep == v.prep)
            && (self.iobj == ArgSpec::Any || self.iobj == v.iobj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argspec_matching() {
        let decl = VerbArgsSpec {
            dobj: ArgSpec::Any,
            prep: PrepSpec::Other(Preposition::IntoIn),
            iobj: ArgSpec::Any,
        };
        let cmd = VerbArgsSpec {
            dobj: ArgSpec::This,
            prep: PrepSpec::Other(Preposition::IntoIn),
            iobj: ArgSpec::This,
        };
        assert!(decl.matches(&cmd));
        let wrong_prep = VerbArgsSpec {
            prep: PrepSpec::Other(Preposition::AtTo),
            ..cmd
        };
        assert!(!decl.matches(&wrong_prep));
    }

    #[test]
    fn prep_spec_indices() {
        assert_eq!(PrepSpec::Any.to_i16(), -2);
        assert_eq!(PrepSpec::None.to_i16(), -1);
        assert_eq!(PrepSpec::Other(Preposition::IntoIn).to_i16(), 3);
        assert_eq!(
            PrepSpec::from_i16(3),
            Some(PrepSpec::Other(Preposition::IntoIn))
        );
    }
}
