use strum::FromRepr;

/// The canonical preposition groups a command verb may declare,
/// corresponding to the string constants in LambdaMOO 1.8 with their fixed
/// indices.
#[repr(u16)]
#[derive(Copy, Clone, Debug, FromRepr, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Preposition {
    WithUsing = 0,
    AtTo = 1,
    InFrontOf = 2,
    IntoIn = 3,
    OnTopOfOn = 4,
    OutOf = 5,
    Over = 6,
    Through = 7,
    Under = 8,
    Behind = 9,
    Beside = 10,
    ForAbout = 11,
    Is = 12,
    As = 13,
    OffOf = 14,
}

impl Preposition {
    /// Parse either a single alias ("into"), a full group spelling
    /// ("in/inside/into"), or a multi-word alias ("on top of").
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "with/using" | "with" | "using" => Some(Self::WithUsing),
            "at/to" | "at" | "to" => Some(Self::AtTo),
            "in front of" => Some(Self::InFrontOf),
            "in/inside/into" | "in" | "inside" | "into" => Some(Self::IntoIn),
            "on top of/on/onto/upon" | "on top of" | "on" | "onto" | "upon" => {
                Some(Self::OnTopOfOn)
            }
            "out of/from inside/from" | "out of" | "from inside" | "from" => Some(Self::OutOf),
            "over" => Some(Self::Over),
            "through" => Some(Self::Through),
            "under/underneath/beneath" | "under" | "underneath" | "beneath" => Some(Self::Under),
            "behind" => Some(Self::Behind),
            "beside" => Some(Self::Beside),
            "for/about" | "for" | "about" => Some(Self::ForAbout),
            "is" => Some(Self::Is),
            "as" => Some(Self::As),
            "off/off of" | "off" | "off of" => Some(Self::OffOf),
            _ => None,
        }
    }

    /// The full group spelling, as shown by `verb_args()` and the portable
    /// dump.
    pub fn to_string(&self) -> &str {
        match self {
            Self::WithUsing => "with/using",
            Self::AtTo => "at/to",
            Self::InFrontOf => "in front of",
            Self::IntoIn => "in/inside/into",
            Self::OnTopOfOn => "on top of/on/onto/upon",
            Self::OutOf => "out of/from inside/from",
            Self::Over => "over",
            Self::Through => "through",
            Self::Under => "under/underneath/beneath",
            Self::Behind => "behind",
            Self::Beside => "beside",
            Self::ForAbout => "for/about",
            Self::Is => "is",
            Self::As => "as",
            Self::OffOf => "off/off of",
        }
    }
}

/// Find a preposition starting at word `at`, trying the longest multi-word
/// aliases first. Returns the preposition and how many words it consumed.
pub fn match_preposition_at(words: &[String], at: usize) -> Option<(Preposition, usize)> {
    // Longest alias is three words ("on top of", "out of"... "in front of").
    for take in (1..=3usize).rev() {
        if at + take > words.len() {
            continue;
        }
        let candidate = words[at..at + take].join(" ").to_ascii_lowercase();
        if let Some(p) = Preposition::parse(&candidate) {
            return Some((p, take));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_aliases() {
        assert_eq!(Preposition::parse("into"), Some(Preposition::IntoIn));
        assert_eq!(Preposition::parse("on top of"), Some(Preposition::OnTopOfOn));
        assert_eq!(Preposition::parse("banana"), None);
    }

    #[test]
    fn longest_first() {
        let words: Vec<String> = ["put", "it", "on", "top", "of", "shelf"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        // At index 2 the three-word alias wins over bare "on".
        assert_eq!(
            match_preposition_at(&words, 2),
            Some((Preposition::OnTopOfOn, 3))
        );
        assert_eq!(match_preposition_at(&words, 0), None);
    }

    #[test]
    fn indices_are_fixed() {
        assert_eq!(Preposition::IntoIn as u16, 3);
        assert_eq!(Preposition::OffOf as u16, 14);
        assert_eq!(Preposition::from_repr(1), Some(Preposition::AtTo));
    }
}
