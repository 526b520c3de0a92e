mod command_parse;
mod prepositions;

pub use command_parse::{ParseCommandError, ParsedCommand, parse_command};
pub use prepositions::{Preposition, match_preposition_at};

use crate::model::WorldStateError;
use warren_var::Obj;

/// Resolves an object name from a command ("ball", "me", "#12") to an object
/// id in the player's environment. Returns `FAILED_MATCH` / `AMBIGUOUS`
/// sentinels rather than failing, matching the command-parse contract.
pub trait ObjectNameMatcher {
    fn match_object(&self, name: &str) -> Result<Obj, WorldStateError>;
}
