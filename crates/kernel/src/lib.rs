//! The kernel: the tree-walking interpreter for the MOO language, the
//! built-in function suite, the task scheduler, and the checkpoint
//! subsystem. Hosts (network transports) sit above this crate and talk to
//! the scheduler through `Arc<Scheduler>` and the `Session` trait.

mod builtins;
pub mod checkpoint;
pub mod config;
pub mod tasks;
pub mod vm;

pub use builtins::BuiltinRegistry;
pub use tasks::{Scheduler, SchedulerError, TaskHandle, TaskResult};
