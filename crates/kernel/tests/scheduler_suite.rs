//! End-to-end task scheduling: command submission, suspend/resume, kill,
//! per-player limits, and quota aborts, through a real scheduler loop with
//! thread-per-task execution.

use std::sync::Arc;
use std::time::Duration;
use warren_common::tasks::{AbortLimitReason, NoopSession};
use warren_db::{ObjectStore, WorldState};
use warren_kernel::checkpoint::CheckpointMsg;
use warren_kernel::config::Config;
use warren_kernel::tasks::Scheduler;
use warren_kernel::{SchedulerError, TaskResult};
use warren_var::{Obj, v_int};

const WIZARD: Obj = Obj::mk_id(1);

struct Server {
    scheduler: Arc<Scheduler>,
    loop_handle: Option<std::thread::JoinHandle<Option<String>>>,
    _checkpoint_rx: flume::Receiver<CheckpointMsg>,
}

impl Server {
    fn start() -> Self {
        Self::start_with_config(Config::default())
    }

    fn start_with_config(config: Config) -> Self {
        let world = WorldState::new(ObjectStore::bootstrap_minimal());
        let (ck_tx, ck_rx) = flume::unbounded();
        let scheduler = Scheduler::new(world, Arc::new(config), ck_tx);
        let runner = scheduler.clone();
        let loop_handle = std::thread::spawn(move || runner.run());
        Self {
            scheduler,
            loop_handle: Some(loop_handle),
            _checkpoint_rx: ck_rx,
        }
    }

    fn submit(&self, line: &str) -> TaskResult {
        let handle = self
            .scheduler
            .submit_command_task(WIZARD, line, Arc::new(NoopSession))
            .expect("submit")
            .expect("spawns a task");
        handle
            .receiver
            .recv_timeout(Duration::from_secs(10))
            .expect("task result")
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.scheduler.stop();
        if let Some(h) = self.loop_handle.take() {
            let _ = h.join();
        }
    }
}

fn expect_eval_value(result: TaskResult) -> warren_var::Var {
    match result {
        TaskResult::Success(v) => {
            let l = v.as_list().expect("eval pair").clone();
            assert_eq!(l.index(1).unwrap(), v_int(1), "eval failed: {l:?}");
            l.index(2).unwrap()
        }
        TaskResult::Error(e) => panic!("task failed: {e}"),
    }
}

#[test]
fn eval_command_roundtrip() {
    let server = Server::start();
    let v = expect_eval_value(server.submit(";1 + 1"));
    assert_eq!(v, v_int(2));
}

#[test]
fn suspend_wakes_on_timer() {
    let server = Server::start();
    let v = expect_eval_value(server.submit(";suspend(0)"));
    // A timer wake returns 0 from suspend().
    assert_eq!(v, v_int(0));
}

#[test]
fn suspend_and_resume_passes_value() {
    let server = Server::start();
    // First task parks forever (task ids start at 1).
    let sleeper = server
        .scheduler
        .submit_command_task(WIZARD, ";suspend()", Arc::new(NoopSession))
        .unwrap()
        .unwrap();
    let sleeper_id = sleeper.task_id;
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(server.scheduler.suspended_task_count(), 1);

    let v = expect_eval_value(server.submit(&format!(";resume({sleeper_id}, 99)")));
    assert_eq!(v, v_int(0));

    let woke = sleeper
        .receiver
        .recv_timeout(Duration::from_secs(10))
        .expect("sleeper result");
    assert_eq!(expect_eval_value(woke), v_int(99));
}

#[test]
fn kill_task_terminates_suspended_task() {
    let server = Server::start();
    let sleeper = server
        .scheduler
        .submit_command_task(WIZARD, ";suspend()", Arc::new(NoopSession))
        .unwrap()
        .unwrap();
    let sleeper_id = sleeper.task_id;
    std::thread::sleep(Duration::from_millis(200));

    let v = expect_eval_value(server.submit(&format!(";kill_task({sleeper_id})")));
    assert_eq!(v, v_int(0));

    let killed = sleeper
        .receiver
        .recv_timeout(Duration::from_secs(10))
        .expect("sleeper result");
    assert!(
        matches!(killed, TaskResult::Error(SchedulerError::TaskAbortedCancelled)),
        "got: {killed:?}"
    );
}

#[test]
fn tick_quota_aborts_runaway_command() {
    let server = Server::start();
    let result = server.submit(";while (1) endwhile");
    match result {
        TaskResult::Error(SchedulerError::TaskAbortedLimit(AbortLimitReason::Ticks(n))) => {
            assert_eq!(n, 10_000);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn per_player_task_limit() {
    let mut config = Config::default();
    config.max_tasks_per_player = 2;
    let server = Server::start_with_config(config);

    let _a = server
        .scheduler
        .submit_command_task(WIZARD, ";suspend()", Arc::new(NoopSession))
        .unwrap();
    let _b = server
        .scheduler
        .submit_command_task(WIZARD, ";suspend()", Arc::new(NoopSession))
        .unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let third = server
        .scheduler
        .submit_command_task(WIZARD, ";1 + 1", Arc::new(NoopSession));
    assert!(
        matches!(third, Err(SchedulerError::TaskLimitReached(p)) if p == WIZARD),
        "third task should hit the cap"
    );
}

#[test]
fn disconnect_kills_player_tasks() {
    let server = Server::start();
    let sleeper = server
        .scheduler
        .submit_command_task(WIZARD, ";suspend()", Arc::new(NoopSession))
        .unwrap()
        .unwrap();
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(server.scheduler.suspended_task_count(), 1);

    server.scheduler.disconnect_player(WIZARD);
    let killed = sleeper
        .receiver
        .recv_timeout(Duration::from_secs(10))
        .expect("sleeper result");
    assert!(
        matches!(killed, TaskResult::Error(SchedulerError::TaskAbortedCancelled)),
        "got: {killed:?}"
    );
    assert_eq!(server.scheduler.suspended_task_count(), 0);
}

#[test]
fn queued_tasks_sees_suspended_task() {
    let server = Server::start();
    let _sleeper = server
        .scheduler
        .submit_command_task(WIZARD, ";suspend()", Arc::new(NoopSession))
        .unwrap()
        .unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let v = expect_eval_value(server.submit(";length(queued_tasks())"));
    assert_eq!(v, v_int(1));
}

#[test]
fn builtin_commands_spawn_no_task() {
    let server = Server::start();
    let r = server
        .scheduler
        .submit_command_task(WIZARD, "@stats", Arc::new(NoopSession))
        .unwrap();
    assert!(r.is_none());
    let r = server
        .scheduler
        .submit_command_task(WIZARD, "quit", Arc::new(NoopSession))
        .unwrap();
    assert!(r.is_none());
}

#[test]
fn dump_database_reaches_checkpoint_thread() {
    let server = Server::start();
    let v = expect_eval_value(server.submit(";dump_database()"));
    assert_eq!(v, v_int(1));
    let msg = server
        ._checkpoint_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("checkpoint request");
    assert!(matches!(msg, CheckpointMsg::CheckpointNow));
}

#[test]
fn shutdown_stops_the_loop() {
    let world = WorldState::new(ObjectStore::bootstrap_minimal());
    let (ck_tx, _ck_rx) = flume::unbounded();
    let scheduler = Scheduler::new(world, Arc::new(Config::default()), ck_tx);
    let runner = scheduler.clone();
    let loop_handle = std::thread::spawn(move || runner.run());

    let handle = scheduler
        .submit_command_task(WIZARD, ";shutdown(\"bye\")", Arc::new(NoopSession))
        .unwrap()
        .unwrap();
    let _ = handle.receiver.recv_timeout(Duration::from_secs(10));

    let msg = loop_handle.join().expect("loop exits");
    assert_eq!(msg, Some("bye".to_string()));
}
