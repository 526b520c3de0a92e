use crate::error::{Error, ErrorCode::E_RANGE};
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use unicase::UniCase;
use unicode_segmentation::UnicodeSegmentation;

/// An immutable shared string. Length, indexing, and ranges are measured in
/// extended grapheme clusters, not bytes. Equality and ordering fold case,
/// matching MOO `==` / `<` on strings; `strcmp`-family operations use
/// [`Str::eq_case_sensitive`] / [`Str::cmp_case_sensitive`].
#[derive(Clone)]
pub struct Str(Arc<String>);

impl Str {
    pub fn mk_str(s: &str) -> Self {
        Str(Arc::new(s.to_string()))
    }

    pub fn mk_string(s: String) -> Self {
        Str(Arc::new(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in grapheme clusters.
    pub fn len(&self) -> usize {
        self.0.graphemes(true).count()
    }

    /// The grapheme at 1-based position `index`.
    pub fn index(&self, index: usize) -> Result<Str, Error> {
        if index < 1 {
            return Err(E_RANGE.into());
        }
        match self.0.graphemes(true).nth(index - 1) {
            Some(g) => Ok(Str::mk_str(g)),
            None => Err(E_RANGE.into()),
        }
    }

    /// The 1-based inclusive range `[from..to]`. An empty result is legal
    /// when `from == to + 1` (including `[1..0]` on any string).
    pub fn range(&self, from: i64, to: i64) -> Result<Str, Error> {
        let len = self.len() as i64;
        if from > to {
            if from < 1 || from > len + 1 || to < 0 {
                return Err(E_RANGE.into());
            }
            return Ok(Str::mk_str(""));
        }
        if from < 1 || to > len {
            return Err(E_RANGE.into());
        }
        let s: String = self
            .0
            .graphemes(true)
            .skip((from - 1) as usize)
            .take((to - from + 1) as usize)
            .collect();
        Ok(Str::mk_string(s))
    }

    /// Replace the 1-based inclusive range `[from..to]` with `replacement`,
    /// producing a new string.
    pub fn range_set(&self, from: i64, to: i64, replacement: &str) -> Result<Str, Error> {
        let len = self.len() as i64;
        if from < 1 || from > len + 1 || to < from - 1 || to > len {
            return Err(E_RANGE.into());
        }
        let mut out = String::with_capacity(self.0.len() + replacement.len());
        for (i, g) in self.0.graphemes(true).enumerate() {
            let pos = (i + 1) as i64;
            if pos == from {
                out.push_str(replacement);
            }
            if pos < from || pos > to {
                out.push_str(g);
            }
        }
        if from == len + 1 {
            out.push_str(replacement);
        }
        Ok(Str::mk_string(out))
    }

    /// Replace the grapheme at 1-based `index` with `value` (itself a single
    /// grapheme-or-longer string), producing a new string.
    pub fn index_set(&self, index: usize, value: &str) -> Result<Str, Error> {
        if index < 1 || index > self.len() {
            return Err(E_RANGE.into());
        }
        let mut out = String::with_capacity(self.0.len());
        for (i, g) in self.0.graphemes(true).enumerate() {
            if i + 1 == index {
                out.push_str(value);
            } else {
                out.push_str(g);
            }
        }
        Ok(Str::mk_string(out))
    }

    pub fn append(&self, other: &Str) -> Str {
        let mut s = String::with_capacity(self.0.len() + other.0.len());
        s.push_str(&self.0);
        s.push_str(&other.0);
        Str::mk_string(s)
    }

    /// 1-based grapheme position of the first occurrence of `needle`,
    /// case-insensitive unless `case_matters`. 0 when absent, per `index()`.
    pub fn index_of(&self, needle: &str, case_matters: bool) -> i64 {
        let hay: Vec<&str> = self.0.graphemes(true).collect();
        let nee: Vec<&str> = needle.graphemes(true).collect();
        if nee.is_empty() {
            return if hay.is_empty() { 0 } else { 1 };
        }
        if nee.len() > hay.len() {
            return 0;
        }
        for start in 0..=(hay.len() - nee.len()) {
            if graphemes_match(&hay[start..start + nee.len()], &nee, case_matters) {
                return (start + 1) as i64;
            }
        }
        0
    }

    /// 1-based grapheme position of the last occurrence of `needle`.
    pub fn rindex_of(&self, needle: &str, case_matters: bool) -> i64 {
        let hay: Vec<&str> = self.0.graphemes(true).collect();
        let nee: Vec<&str> = needle.graphemes(true).collect();
        if nee.is_empty() {
            return hay.len() as i64;
        }
        if nee.len() > hay.len() {
            return 0;
        }
        for start in (0..=(hay.len() - nee.len())).rev() {
            if graphemes_match(&hay[start..start + nee.len()], &nee, case_matters) {
                return (start + 1) as i64;
            }
        }
        0
    }

    pub fn eq_case_sensitive(&self, other: &Str) -> bool {
        self.0 == other.0
    }

    pub fn cmp_case_sensitive(&self, other: &Str) -> Ordering {
        self.0.as_str().cmp(other.0.as_str())
    }
}

fn graphemes_match(hay: &[&str], needle: &[&str], case_matters: bool) -> bool {
    hay.iter().zip(needle.iter()).all(|(h, n)| {
        if case_matters {
            h == n
        } else {
            UniCase::new(*h) == UniCase::new(*n)
        }
    })
}

impl PartialEq for Str {
    fn eq(&self, other: &Self) -> bool {
        UniCase::new(self.0.as_str()) == UniCase::new(other.0.as_str())
    }
}

impl Eq for Str {}

impl PartialOrd for Str {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Str {
    fn cmp(&self, other: &Self) -> Ordering {
        UniCase::new(self.0.as_str()).cmp(&UniCase::new(other.0.as_str()))
    }
}

impl Display for Str {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for Str {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl From<&str> for Str {
    fn from(s: &str) -> Self {
        Str::mk_str(s)
    }
}

impl From<String> for Str {
    fn from(s: String) -> Self {
        Str::mk_string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grapheme_length() {
        assert_eq!(Str::mk_str("").len(), 0);
        assert_eq!(Str::mk_str("abc").len(), 3);
        // A family emoji is many codepoints but one grapheme.
        assert_eq!(Str::mk_str("👨‍👩‍👧").len(), 1);
        assert_eq!(Str::mk_str("e\u{301}").len(), 1);
    }

    #[test]
    fn index_bounds() {
        let s = Str::mk_str("moo");
        assert_eq!(s.index(1).unwrap().as_str(), "m");
        assert_eq!(s.index(3).unwrap().as_str(), "o");
        assert!(s.index(0).is_err());
        assert!(s.index(4).is_err());
    }

    #[test]
    fn ranges() {
        let s = Str::mk_str("frobozz");
        assert_eq!(s.range(2, 4).unwrap().as_str(), "rob");
        assert_eq!(s.range(1, 0).unwrap().as_str(), "");
        assert_eq!(s.range(8, 7).unwrap().as_str(), "");
        assert!(s.range(0, 3).is_err());
        assert!(s.range(2, 8).is_err());
    }

    #[test]
    fn range_set_replaces() {
        let s = Str::mk_str("abcdef");
        assert_eq!(s.range_set(2, 4, "XY").unwrap().as_str(), "aXYef");
        assert_eq!(s.range_set(7, 6, "!").unwrap().as_str(), "abcdef!");
    }

    #[test]
    fn case_insensitive_equality() {
        assert_eq!(Str::mk_str("Foo"), Str::mk_str("foo"));
        assert!(!Str::mk_str("Foo").eq_case_sensitive(&Str::mk_str("foo")));
    }

    #[test]
    fn find() {
        let s = Str::mk_str("foobarbaz");
        assert_eq!(s.index_of("bar", false), 4);
        assert_eq!(s.index_of("BAR", false), 4);
        assert_eq!(s.index_of("BAR", true), 0);
        assert_eq!(s.rindex_of("ba", false), 7);
        assert_eq!(s.index_of("quux", false), 0);
    }
}
