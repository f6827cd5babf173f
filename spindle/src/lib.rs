// spindle: dedicated-thread runners, single-slot workers and a bounded worker
// pool with two-tier cancellation.
//
// The contracts (tasks, cleanup handlers, the execution context and the
// execution handle) live in `spindle-api`; this crate provides the threads
// that run them.

pub mod logging;
pub mod thread;

pub use spindle_api::{
    Cancellation, Cancelled, Cleanup, CleanupRef, Context, ExecutionHandle, FnTask, KillSignal,
    Priority, Task, TaskError, TaskRef, TaskResult,
};
pub use thread::{
    Exit, Pool, Runner, RunnerState, ThreadError, ThreadGroup, ThreadParams, ThreadPool,
    ThreadPoolConfig, Worker,
};
