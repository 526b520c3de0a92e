use thiserror::Error;
use warren_var::{Obj, Var};

/// Opaque token correlating a `read()` request with the input line the host
/// eventually hands back.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct InputRequest(pub u64);

/// The connection-side interface the core consumes, per connection-capable
/// host. The core never sees sockets; it sees lines out, lines in, and
/// connection metadata. One player is associated with at most one session at
/// a time; un-logged-in connections use negative placeholder ids.
pub trait Session: Send + Sync {
    /// Queue one line of output to the player's connection, preserving FIFO
    /// order on that connection.
    fn send_line(&self, player: Obj, line: &str) -> Result<(), SessionError>;

    /// Out-of-band output: login banners, task-abort notices. Not subject to
    /// output delimiters.
    fn send_system_msg(&self, player: Obj, msg: &str) -> Result<(), SessionError>;

    /// The peer description for `connection_name()`; hostname-ish.
    fn connection_name(&self, player: Obj) -> Result<String, SessionError>;

    /// Close the player's connection (`boot_player`).
    fn disconnect(&self, player: Obj) -> Result<(), SessionError>;

    fn connected_players(&self) -> Result<Vec<Obj>, SessionError>;

    fn connected_seconds(&self, player: Obj) -> Result<f64, SessionError>;

    fn idle_seconds(&self, player: Obj) -> Result<f64, SessionError>;

    /// Ask the host to deliver the next input line to the scheduler tagged
    /// with `request`, rather than treating it as a command (`read()`).
    fn request_input(&self, player: Obj, request: InputRequest) -> Result<(), SessionError>;

    /// Discard any pending, unread input on the connection. Returns how many
    /// lines were dropped.
    fn flush_input(&self, player: Obj, show_messages: bool) -> Result<usize, SessionError>;

    fn connection_option(&self, player: Obj, option: &str) -> Result<Var, SessionError>;

    fn set_connection_option(
        &self,
        player: Obj,
        option: &str,
        value: &Var,
    ) -> Result<(), SessionError>;

    /// All options with their current values, as {name, value} pairs.
    fn connection_options(&self, player: Obj) -> Result<Vec<(String, Var)>, SessionError>;

    fn output_delimiters(&self, player: Obj) -> Result<(String, String), SessionError>;

    fn set_output_delimiters(
        &self,
        player: Obj,
        prefix: String,
        suffix: String,
    ) -> Result<(), SessionError>;

    /// Bytes queued but not yet flushed to the connection.
    fn buffered_output_length(&self, player: Obj) -> Result<usize, SessionError>;
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum SessionError {
    #[error("No connection for player: {0}")]
    NoConnectionForPlayer(Obj),
    #[error("Could not deliver session message")]
    DeliveryError,
    #[error("Invalid connection option: {0}")]
    InvalidOption(String),
}

/// A session that swallows everything; used by checkpoint-triggered and
/// server-internal tasks, and by tests that don't care about output.
pub struct NoopSession;

impl Session for NoopSession {
    fn send_line(&self, _player: Obj, _line: &str) -> Result<(), SessionError> {
        Ok(())
    }

    fn send_system_msg(&self, _player: Obj, _msg: &str) -> Result<(), SessionError> {
        Ok(())
    }

    fn connection_name(&self, player: Obj) -> Result<String, SessionError> {
        Ok(format!("<no connection for {player}>"))
    }

    fn disconnect(&self, _player: Obj) -> Result<(), SessionError> {
        Ok(())
    }

    fn connected_players(&self) -> Result<Vec<Obj>, SessionError> {
        Ok(vec![])
    }

    fn connected_seconds(&self, player: Obj) -> Result<f64, SessionError> {
        Err(SessionError::NoConnectionForPlayer(player))
    }

    fn idle_seconds(&self, player: Obj) -> Result<f64, SessionError> {
        Err(SessionError::NoConnectionForPlayer(player))
    }

    fn request_input(&self, player: Obj, _request: InputRequest) -> Result<(), SessionError> {
        Err(SessionError::NoConnectionForPlayer(player))
    }

    fn flush_input(&self, _player: Obj, _show_messages: bool) -> Result<usize, SessionError> {
        Ok(0)
    }

    fn connection_option(&self, player: Obj, _option: &str) -> Result<Var, SessionError> {
        Err(SessionError::NoConnectionForPlayer(player))
    }

    fn set_connection_option(
        &self,
        player: Obj,
        _option: &str,
        _value: &Var,
    ) -> Result<(), SessionError> {
        Err(SessionError::NoConnectionForPlayer(player))
    }

    fn connection_options(&self, player: Obj) -> Result<Vec<(String, Var)>, SessionError> {
        Err(SessionError::NoConnectionForPlayer(player))
    }

    fn output_delimiters(&self, _player: Obj) -> Result<(String, String), SessionError> {
        Ok((String::new(), String::new()))
    }

    fn set_output_delimiters(
        &self,
        player: Obj,
        _prefix: String,
        _suffix: String,
    ) -> Result<(), SessionError> {
        Err(SessionError::NoConnectionForPlayer(player))
    }

    fn buffered_output_length(&self, _player: Obj) -> Result<usize, SessionError> {
        Ok(0)
    }
}
