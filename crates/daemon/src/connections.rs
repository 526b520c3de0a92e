use std::collections::HashMap;
use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::warn;
use warren_common::tasks::{InputRequest, Session, SessionError};
use warren_var::{Obj, Var, v_int};

/// One live TCP connection. Before login its identity is a negative
/// placeholder id; after login, the player object.
struct ConnectionRec {
    writer: TcpStream,
    peer: String,
    player: Obj,
    connected_at: Instant,
    last_activity: Instant,
    options: HashMap<String, Var>,
    prefix: String,
    suffix: String,
    pending_input: Option<InputRequest>,
}

/// The connection table: the single logical owner of all live
/// connections, shared between the host threads and the sessions handed
/// to tasks.
pub struct Connections {
    inner: Mutex<HashMap<i64, ConnectionRec>>,
    next_placeholder: AtomicI64,
}

impl Default for Connections {
    fn default() -> Self {
        Self::new()
    }
}

impl Connections {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            // Un-logged-in connections count down from -10, the MOO
            // convention for connection placeholder ids.
            next_placeholder: AtomicI64::new(-10),
        }
    }

    /// Register a new connection; returns its placeholder identity.
    pub fn register(&self, stream: TcpStream, peer: String) -> Obj {
        let id = self.next_placeholder.fetch_sub(1, Ordering::SeqCst);
        let player = Obj::mk_id(id);
        let rec = ConnectionRec {
            writer: stream,
            peer,
            player,
            connected_at: Instant::now(),
            last_activity: Instant::now(),
            options: HashMap::new(),
            prefix: String::new(),
            suffix: String::new(),
            pending_input: None,
        };
        self.inner.lock().unwrap().insert(id, rec);
        player
    }

    /// Switch a connection's identity after login. An existing connection
    /// for the same player is booted first (reconnection).
    pub fn set_player(&self, conn: Obj, player: Obj) {
        let mut inner = self.inner.lock().unwrap();
        let existing = inner
            .iter()
            .find(|(_, r)| r.player == player)
            .map(|(k, _)| *k);
        if let Some(old) = existing {
            if let Some(rec) = inner.remove(&old) {
                let _ = writeln!(&rec.writer, "*** Redirecting connection to new port ***\r");
                let _ = rec.writer.shutdown(Shutdown::Both);
            }
        }
        if let Some(rec) = inner.get_mut(&conn.id()) {
            rec.player = player;
        }
    }

    pub fn unregister(&self, conn: Obj) {
        self.inner.lock().unwrap().remove(&conn.id());
    }

    pub fn touch(&self, conn: Obj) {
        if let Some(rec) = self.inner.lock().unwrap().get_mut(&conn.id()) {
            rec.last_activity = Instant::now();
        }
    }

    pub fn take_pending_input(&self, conn: Obj) -> Option<InputRequest> {
        self.inner
            .lock()
            .unwrap()
            .get_mut(&conn.id())
            .and_then(|rec| rec.pending_input.take())
    }

    fn with_player<R>(
        &self,
        player: Obj,
        f: impl FnOnce(&mut ConnectionRec) -> R,
    ) -> Result<R, SessionError> {
        let mut inner = self.inner.lock().unwrap();
        let rec = inner
            .values_mut()
            .find(|r| r.player == player)
            .ok_or(SessionError::NoConnectionForPlayer(player))?;
        Ok(f(rec))
    }
}

/// The `Session` the kernel sees: the connection interface of the host,
/// FIFO per connection, routed by player identity.
pub struct HostSession(pub Arc<Connections>);

impl Session for HostSession {
    fn send_line(&self, player: Obj, line: &str) -> Result<(), SessionError> {
        self.0.with_player(player, |rec| {
            writeln!(&rec.writer, "{line}\r").map_err(|_| SessionError::DeliveryError)
        })?
    }

    fn send_system_msg(&self, player: Obj, msg: &str) -> Result<(), SessionError> {
        self.send_line(player, msg)
    }

    fn connection_name(&self, player: Obj) -> Result<String, SessionError> {
        self.0.with_player(player, |rec| rec.peer.clone())
    }

    fn disconnect(&self, player: Obj) -> Result<(), SessionError> {
        self.0.with_player(player, |rec| {
            if rec.writer.shutdown(Shutdown::Both).is_err() {
                warn!("failed to shut down connection for {player}");
            }
        })
    }

    fn connected_players(&self) -> Result<Vec<Obj>, SessionError> {
        let inner = self.0.inner.lock().unwrap();
        let mut players: Vec<Obj> = inner
            .values()
            .map(|r| r.player)
            .filter(|p| p.is_positive())
            .collect();
        players.sort();
        Ok(players)
    }

    fn connected_seconds(&self, player: Obj) -> Result<f64, SessionError> {
        self.0
            .with_player(player, |rec| rec.connected_at.elapsed().as_secs_f64())
    }

    fn idle_seconds(&self, player: Obj) -> Result<f64, SessionError> {
        self.0
            .with_player(player, |rec| rec.last_activity.elapsed().as_secs_f64())
    }

    fn request_input(&self, player: Obj, request: InputRequest) -> Result<(), SessionError> {
        self.0.with_player(player, |rec| {
            rec.pending_input = Some(request);
        })
    }

    fn flush_input(&self, player: Obj, show_messages: bool) -> Result<usize, SessionError> {
        // Lines are handed to the scheduler as they arrive; there is no
        // host-side buffer to flush.
        if show_messages {
            let _ = self.send_line(player, ">> No pending input to flush <<");
        }
        Ok(0)
    }

    fn connection_option(&self, player: Obj, option: &str) -> Result<Var, SessionError> {
        self.0.with_player(player, |rec| {
            rec.options
                .get(option)
                .cloned()
                .unwrap_or_else(|| v_int(0))
        })
    }

    fn set_connection_option(
        &self,
        player: Obj,
        option: &str,
        value: &Var,
    ) -> Result<(), SessionError> {
        self.0.with_player(player, |rec| {
            rec.options.insert(option.to_string(), value.clone());
        })
    }

    fn connection_options(&self, player: Obj) -> Result<Vec<(String, Var)>, SessionError> {
        self.0.with_player(player, |rec| {
            let mut opts: Vec<(String, Var)> = rec
                .options
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            opts.sort_by(|a, b| a.0.cmp(&b.0));
            opts
        })
    }

    fn output_delimiters(&self, player: Obj) -> Result<(String, String), SessionError> {
        self.0
            .with_player(player, |rec| (rec.prefix.clone(), rec.suffix.clone()))
    }

    fn set_output_delimiters(
        &self,
        player: Obj,
        prefix: String,
        suffix: String,
    ) -> Result<(), SessionError> {
        self.0.with_player(player, |rec| {
            rec.prefix = prefix;
            rec.suffix = suffix;
        })
    }

    fn buffered_output_length(&self, player: Obj) -> Result<usize, SessionError> {
        // Output is written through; nothing sits in a host buffer.
        self.0.with_player(player, |_| 0)
    }
}
