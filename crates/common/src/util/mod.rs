mod bitenum;

pub use bitenum::BitEnum;

/// Match a single verb-name pattern against a word, with LambdaMOO's
/// abbreviation semantics:
///
/// - no `*`: exact (case-insensitive) match;
/// - `*` at the end: the word need only begin with the part before the star;
/// - `*` in the middle: the word matches any prefix of the full expansion
///   that is at least as long as the part before the star, so `foo*bar`
///   matches `foo`, `foob`, `fooba`, and `foobar`;
/// - leading `*`s are consumed but are not wildcards; exact matching resumes
///   after them.
///
/// Splitting multi-name patterns on whitespace happens at the caller.
#[must_use]
pub fn verbcasecmp(pattern: &str, word: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let word = word.to_ascii_lowercase();
    if pattern == word {
        return true;
    }
    if !pattern.is_empty() && pattern.chars().all(|c| c == '*') {
        return true;
    }
    if pattern.starts_with('*') {
        let rest = pattern.trim_start_matches('*');
        return verbcasecmp(rest, &word);
    }
    let Some(star) = pattern.find('*') else {
        return false;
    };
    let prefix = &pattern[..star];
    if pattern.ends_with('*') && pattern[star..].chars().all(|c| c == '*') {
        return word.starts_with(prefix);
    }
    let expansion: String = pattern.chars().filter(|c| *c != '*').collect();
    word.starts_with(prefix) && expansion.starts_with(&word)
}

/// Split a command line into words, honoring double quotes and backslash
/// escapes the way the LambdaMOO command reader does.
#[must_use]
pub fn parse_into_words(input: &str) -> Vec<String> {
    let mut words = vec![];
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for c in input.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            in_quotes = !in_quotes;
        } else if c.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::{parse_into_words, verbcasecmp};

    #[test]
    fn verb_match_exact_and_star() {
        assert!(verbcasecmp("give", "give"));
        assert!(verbcasecmp("give", "GIVE"));
        assert!(!verbcasecmp("give", "giv"));
        assert!(verbcasecmp("*", "anything"));

        // Inner star: any prefix of the expansion at least as long as the
        // part before the star.
        for w in ["foo", "foob", "fooba", "foobar"] {
            assert!(verbcasecmp("foo*bar", w), "foo*bar should match {w}");
        }
        assert!(!verbcasecmp("foo*bar", "fo"));
        assert!(!verbcasecmp("foo*bar", "foobaar"));
        assert!(!verbcasecmp("foo*bar", "foobarx"));

        // Trailing star: prefix match.
        assert!(verbcasecmp("foo*", "foo"));
        assert!(verbcasecmp("foo*", "foogleman"));
        assert!(!verbcasecmp("foo*", "fo"));

        // Regression: "do" must not match "do_object".
        assert!(!verbcasecmp("do", "do_object"));
    }

    #[test]
    fn verb_match_pronoun_patterns() {
        assert!(verbcasecmp("ps*c", "psc"));
        assert!(verbcasecmp("ps*c", "PSC"));
        assert!(verbcasecmp("ps*c", "ps"));
        assert!(!verbcasecmp("ps*c", "psomc"));
        assert!(!verbcasecmp("ps*c", "psc_extra"));
    }

    #[test]
    fn verb_match_leading_stars_are_literal() {
        assert!(verbcasecmp("*p", "p"));
        assert!(!verbcasecmp("*p", "ap"));
        assert!(verbcasecmp("**p", "p"));
        assert!(verbcasecmp("*foo*bar", "foobar"));
        assert!(verbcasecmp("*foo*bar", "foo"));
        assert!(!verbcasecmp("*foo*bar", "xfoobar"));
    }

    #[test]
    fn words_simple() {
        assert_eq!(parse_into_words("hello world"), vec!["hello", "world"]);
        assert_eq!(
            parse_into_words("  padded   out  "),
            vec!["padded", "out"]
        );
    }

    #[test]
    fn words_quoted_and_escaped() {
        assert_eq!(
            parse_into_words("hello \"big world\""),
            vec!["hello", "big world"]
        );
        assert_eq!(
            parse_into_words(r"hello\ world frankly"),
            vec!["hello world", "frankly"]
        );
        assert_eq!(
            parse_into_words(r#"put "blue box" on shelf"#),
            vec!["put", "blue box", "on", "shelf"]
        );
    }
}
