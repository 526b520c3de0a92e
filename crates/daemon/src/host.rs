use crate::connections::{Connections, HostSession};
use std::io::{BufRead, BufReader};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use warren_common::tasks::Session;
use warren_kernel::tasks::Scheduler;
use warren_kernel::{TaskHandle, TaskResult};
use warren_var::{NOTHING, Obj, SYSTEM_OBJECT, Symbol, Variant, v_str};

const WELCOME: &[&str] = &[
    "*** Welcome to warren ***",
    "",
    "Type `connect <player> [<password>]' to connect.",
];
const LOGIN_FAILED: &str = "Either that player does not exist, or has a different password.";
const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept loop for the line-based TCP host. One thread per connection;
/// lines go to the scheduler, output comes back through the session.
pub fn run_listener(
    listen: &str,
    scheduler: Arc<Scheduler>,
    connections: Arc<Connections>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(listen)?;
    info!("listening on {listen}");
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let scheduler = scheduler.clone();
                let connections = connections.clone();
                let spawned = std::thread::Builder::new()
                    .name("warren-connection".to_string())
                    .spawn(move || serve_connection(stream, scheduler, connections));
                if let Err(e) = spawned {
                    error!("could not spawn connection thread: {e}");
                }
            }
            Err(e) => warn!("accept failed: {e}"),
        }
    }
    Ok(())
}

fn serve_connection(stream: TcpStream, scheduler: Arc<Scheduler>, connections: Arc<Connections>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    info!("connection from {peer}");

    let Ok(write_half) = stream.try_clone() else {
        return;
    };
    let conn = connections.register(write_half, peer.clone());
    let session: Arc<dyn Session> = Arc::new(HostSession(connections.clone()));

    for line in WELCOME {
        let _ = session.send_line(conn, line);
    }

    let mut identity = conn;
    let mut logged_in = false;
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let Ok(line) = line else {
            break;
        };
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        connections.touch(conn);

        if !logged_in {
            match try_login(&scheduler, &session, conn, &line) {
                LoginOutcome::LoggedIn(player) => {
                    connections.set_player(conn, player);
                    identity = player;
                    logged_in = true;
                    let name = scheduler
                        .world()
                        .name_of(player)
                        .unwrap_or_else(|_| "someone".to_string());
                    let _ = session.send_line(player, &format!("*** Connected ({name}) ***"));
                }
                LoginOutcome::Quit => break,
                LoginOutcome::NotYet => {}
            }
            continue;
        }

        // A task waiting in read() gets the line; otherwise it is a
        // command.
        if let Some(request) = connections.take_pending_input(identity) {
            if let Err(e) = scheduler.submit_input(request.0, line) {
                warn!("input delivery failed for {identity}: {e}");
            }
            continue;
        }
        match scheduler.submit_command_task(identity, &line, session.clone()) {
            Ok(_) => {}
            Err(e) => {
                warn!("command submission failed for {identity}: {e}");
            }
        }
        if line.trim() == "quit" {
            break;
        }
    }

    info!("connection closed: {peer}");
    if logged_in {
        scheduler.disconnect_player(identity);
    }
    connections.unregister(conn);
}

enum LoginOutcome {
    LoggedIn(Obj),
    NotYet,
    Quit,
}

/// The pre-login surface: `connect` (optionally routed through
/// `#0:do_login_command` when the core defines it) and `quit`. A failed
/// login gets one canonical banner, never the reason.
fn try_login(
    scheduler: &Arc<Scheduler>,
    session: &Arc<dyn Session>,
    conn: Obj,
    line: &str,
) -> LoginOutcome {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some(&command) = words.first() else {
        return LoginOutcome::NotYet;
    };
    if command.eq_ignore_ascii_case("quit") {
        return LoginOutcome::Quit;
    }

    let world = scheduler.world();
    // A core with its own login dispatch gets the whole line.
    if world.find_verb(SYSTEM_OBJECT, "do_login_command").is_ok() {
        let args: Vec<_> = words.iter().map(|w| v_str(w)).collect();
        let handle = scheduler.submit_verb_task(
            conn,
            SYSTEM_OBJECT,
            "do_login_command",
            args,
            session.clone(),
        );
        return match handle {
            Ok(handle) => wait_for_login(handle, session, conn),
            Err(e) => {
                warn!("do_login_command failed to start: {e}");
                let _ = session.send_line(conn, LOGIN_FAILED);
                LoginOutcome::NotYet
            }
        };
    }

    if !(command.eq_ignore_ascii_case("connect")
        || command.eq_ignore_ascii_case("co")
        || command.eq_ignore_ascii_case("c"))
    {
        let _ = session.send_line(conn, "(Type `connect <player> [<password>]' to connect.)");
        return LoginOutcome::NotYet;
    }
    let Some(name) = words.get(1) else {
        let _ = session.send_line(conn, LOGIN_FAILED);
        return LoginOutcome::NotYet;
    };
    let password = words.get(2).copied().unwrap_or("");

    let player = world.with_read(|s| {
        s.players()
            .into_iter()
            .find(|p| {
                s.get(*p)
                    .map(|o| o.name.eq_ignore_ascii_case(name))
                    .unwrap_or(false)
            })
    });
    let Some(player) = player else {
        let _ = session.send_line(conn, LOGIN_FAILED);
        return LoginOutcome::NotYet;
    };

    let stored = world.retrieve_property(player, &Symbol::mk("password"));
    let password_ok = match stored {
        Ok(v) => match v.variant() {
            Variant::Str(hash) if !hash.is_empty() => {
                pwhash::unix::verify(password, hash.as_str())
            }
            // No usable password set: open door (bootstrap worlds).
            _ => true,
        },
        Err(_) => true,
    };
    if !password_ok {
        let _ = session.send_line(conn, LOGIN_FAILED);
        return LoginOutcome::NotYet;
    }
    LoginOutcome::LoggedIn(player)
}

/// A login task decides the outcome by returning a player object.
fn wait_for_login(
    handle: TaskHandle,
    session: &Arc<dyn Session>,
    conn: Obj,
) -> LoginOutcome {
    match handle.receiver.recv_timeout(LOGIN_TIMEOUT) {
        Ok(TaskResult::Success(v)) => {
            if let Variant::Obj(player) = v.variant() {
                if *player != NOTHING && player.is_positive() {
                    return LoginOutcome::LoggedIn(*player);
                }
            }
            let _ = session.send_line(conn, LOGIN_FAILED);
            LoginOutcome::NotYet
        }
        Ok(TaskResult::Error(_)) | Err(_) => {
            let _ = session.send_line(conn, LOGIN_FAILED);
            LoginOutcome::NotYet
        }
    }
}

/// Let every live connection know the server is going down.
pub fn broadcast_shutdown(connections: &Arc<Connections>, msg: &str) {
    let session = HostSession(connections.clone());
    if let Ok(players) = session.connected_players() {
        for p in players {
            let _ = session.send_line(p, &format!("*** Shutting down: {msg} ***"));
            let _ = session.disconnect(p);
        }
    }
}
