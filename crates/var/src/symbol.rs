use bincode::de::Decoder;
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{BorrowDecode, Decode, Encode};
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use unicase::UniCase;

/// A case-insensitive name, used for verb names, property names, and
/// variable names. The original spelling is preserved for display; equality,
/// ordering, and hashing fold case, matching MOO identifier semantics.
#[derive(Clone)]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn mk(s: &str) -> Self {
        Symbol(Arc::from(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        UniCase::new(self.as_str()) == UniCase::new(other.as_str())
    }
}

impl Eq for Symbol {}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        UniCase::new(self.as_str()).cmp(&UniCase::new(other.as_str()))
    }
}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        UniCase::new(self.as_str()).hash(state);
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Debug for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}", self.as_str())
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::mk(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Symbol(Arc::from(s.as_str()))
    }
}

impl Encode for Symbol {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.as_str().encode(encoder)
    }
}

impl<Context> Decode<Context> for Symbol {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let s = String::decode(decoder)?;
        Ok(Symbol::from(s))
    }
}

impl<'de, Context> BorrowDecode<'de, Context> for Symbol {
    fn borrow_decode<D: bincode::de::BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        let s = String::decode(decoder)?;
        Ok(Symbol::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::Symbol;
    use std::collections::HashMap;

    #[test]
    fn case_insensitive_eq_and_hash() {
        assert_eq!(Symbol::mk("Foo"), Symbol::mk("foo"));
        assert_eq!(Symbol::mk("FOO"), Symbol::mk("foo"));
        assert_ne!(Symbol::mk("foo"), Symbol::mk("bar"));

        let mut m = HashMap::new();
        m.insert(Symbol::mk("Description"), 1);
        assert_eq!(m.get(&Symbol::mk("description")), Some(&1));
    }

    #[test]
    fn preserves_spelling() {
        assert_eq!(Symbol::mk("MixedCase").as_str(), "MixedCase");
    }
}
