use crate::matching::{ObjectNameMatcher, match_preposition_at};
use crate::model::{PrepSpec, WorldStateError};
use crate::util::parse_into_words;
use thiserror::Error;
use warren_var::{NOTHING, Obj, Var, v_str};

/// The decomposition of one command line, in the shape the verb environment
/// is seeded from: `verb`, `argstr`, `args`, and the dobj/prep/iobj split.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedCommand {
    pub verb: String,
    pub argstr: String,
    pub args: Vec<Var>,
    pub dobjstr: String,
    pub dobj: Obj,
    pub prepstr: String,
    pub prep: PrepSpec,
    pub iobjstr: String,
    pub iobj: Obj,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseCommandError {
    #[error("Empty command")]
    EmptyCommand,
    #[error("Error during object match")]
    ErrorDuringMatch(WorldStateError),
}

/// Parse one command line per the LambdaMOO 1.8 rules: alias the `"`/`:`/`;`
/// prefixes to say/emote/eval, split off the verb word, then scan the
/// remaining words for the first preposition (longest alias first) to divide
/// direct from indirect object strings.
pub fn parse_command<M: ObjectNameMatcher>(
    input: &str,
    env: &M,
) -> Result<ParsedCommand, ParseCommandError> {
    let mut command = input.trim_start().to_string();
    match command.chars().next() {
        Some('"') => command.replace_range(..1, "say "),
        Some(':') => command.replace_range(..1, "emote "),
        Some(';') => command.replace_range(..1, "eval "),
        Some(_) => {}
        None => return Err(ParseCommandError::EmptyCommand),
    }

    if parse_into_words(&command).is_empty() {
        return Err(ParseCommandError::EmptyCommand);
    }

    let mut parts = command.splitn(2, ' ');
    let verb = parts.next().unwrap_or_default().to_string();
    let argstr = parts.next().unwrap_or_default().to_string();
    let words = parse_into_words(&argstr);

    let mut prep_match = None;
    for j in 0..words.len() {
        if let Some((prep, consumed)) = match_preposition_at(&words, j) {
            prep_match = Some((j, consumed, prep));
            break;
        }
    }

    let (dobjstr, prepstr, prep, iobjstr) = match prep_match {
        Some((j, consumed, prep)) => (
            words[..j].join(" "),
            words[j..j + consumed].join(" "),
            PrepSpec::Other(prep),
            words[j + consumed..].join(" "),
        ),
        None => (words.join(" "), String::new(), PrepSpec::None, String::new()),
    };

    let dobj = if dobjstr.is_empty() {
        NOTHING
    } else {
        env.match_object(&dobjstr)
            .map_err(ParseCommandError::ErrorDuringMatch)?
    };
    let iobj = if iobjstr.is_empty() {
        NOTHING
    } else {
        env.match_object(&iobjstr)
            .map_err(ParseCommandError::ErrorDuringMatch)?
    };

    let args: Vec<Var> = words.iter().map(|w| v_str(w)).collect();

    Ok(ParsedCommand {
        verb,
        argstr,
        args,
        dobjstr,
        dobj,
        prepstr,
        prep,
        iobjstr,
        iobj,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::Preposition;
    use warren_var::FAILED_MATCH;

    struct SimpleMatcher;
    impl ObjectNameMatcher for SimpleMatcher {
        fn match_object(&self, name: &str) -> Result<Obj, WorldStateError> {
            Ok(match name {
                "ball" => Obj::mk_id(1),
                "box" => Obj::mk_id(2),
                "player" => Obj::mk_id(3),
                _ => FAILED_MATCH,
            })
        }
    }

    #[test]
    fn bare_verb() {
        let pc = parse_command("look", &SimpleMatcher).unwrap();
        assert_eq!(pc.verb, "look");
        assert_eq!(pc.dobjstr, "");
        assert_eq!(pc.dobj, NOTHING);
        assert_eq!(pc.prep, PrepSpec::None);
    }

    #[test]
    fn dobj_prep_iobj() {
        let pc = parse_command("put ball in box", &SimpleMatcher).unwrap();
        assert_eq!(pc.verb, "put");
        assert_eq!(pc.dobjstr, "ball");
        assert_eq!(pc.dobj, Obj::mk_id(1));
        assert_eq!(pc.prepstr, "in");
        assert_eq!(pc.prep, PrepSpec::Other(Preposition::IntoIn));
        assert_eq!(pc.iobjstr, "box");
        assert_eq!(pc.iobj, Obj::mk_id(2));
        assert_eq!(pc.argstr, "ball in box");
        assert_eq!(pc.args.len(), 3);
    }

    #[test]
    fn multiword_preposition() {
        let pc = parse_command("put ball on top of box", &SimpleMatcher).unwrap();
        assert_eq!(pc.prepstr, "on top of");
        assert_eq!(pc.prep, PrepSpec::Other(Preposition::OnTopOfOn));
        assert_eq!(pc.iobjstr, "box");
    }

    #[test]
    fn say_alias() {
        let pc = parse_command("\"hello there", &SimpleMatcher).unwrap();
        assert_eq!(pc.verb, "say");
        assert_eq!(pc.argstr, "hello there");
    }

    #[test]
    fn eval_alias() {
        let pc = parse_command(";1 + 1", &SimpleMatcher).unwrap();
        assert_eq!(pc.verb, "eval");
        assert_eq!(pc.argstr, "1 + 1");
    }

    #[test]
    fn empty_is_error() {
        assert_eq!(
            parse_command("   ", &SimpleMatcher),
            Err(ParseCommandError::EmptyCommand)
        );
    }

    #[test]
    fn failed_match_is_sentinel() {
        let pc = parse_command("take frisbee", &SimpleMatcher).unwrap();
        assert_eq!(pc.dobj, FAILED_MATCH);
    }
}
