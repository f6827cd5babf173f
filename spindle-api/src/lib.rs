//! # Spindle API
//!
//! Contracts for running cancellable units of work on dedicated threads.
//!
//! ## Core Components
//!
//! - **Task**: a cancellable, possibly-failing action
//! - **Cleanup**: a finalizer run at most once on graceful termination
//! - **Context**: the opaque attribute store threaded through every invocation
//! - **ExecutionHandle**: the per-thread cancellation target and blocking primitive
//!
//! The thread-owning implementations (runner, worker, pool) live in the
//! `spindle` crate.
//!
//! ## Module Organization
//!
//! - [`task`]: unit of work and cleanup handler traits
//! - [`context`]: execution context
//! - [`handle`]: cooperative and forceful cancellation
//! - [`errors`]: recoverable execution failures
//! - [`types`]: common type definitions

pub mod context;
pub mod errors;
pub mod handle;
pub mod task;
pub mod types;

pub use context::Context;
pub use errors::{TaskError, TaskResult};
pub use handle::{Cancellation, Cancelled, ExecutionHandle, KillSignal};
pub use task::{Cleanup, FnTask, Task};
pub use types::{CleanupRef, Priority, TaskRef};
