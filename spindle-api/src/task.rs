//! # Unit of Work and Cleanup Handler contracts
//!
//! [`Task`] is a cancellable, possibly-failing action executed on a dedicated
//! thread. [`Cleanup`] is the finalizer a runner invokes at most once, after
//! its task has finished on a graceful path.
//!
//! ## Cancellation
//!
//! The owning runner calls [`Task::request_cancellation`] when it is asked to
//! stop. The default issues a cooperative request; a task may override it to
//! call [`ExecutionHandle::kill`] instead, which bypasses cleanup.
//!
//! ## Example
//!
//! ```rust
//! use spindle_api::{Context, ExecutionHandle, FnTask, Priority, Task, TaskError};
//!
//! let task = FnTask::new("greeter", |context: &Context, _handle: &ExecutionHandle| {
//!     context.set("greeted", true);
//!     Ok::<_, TaskError>(())
//! });
//!
//! let context = Context::new();
//! let handle = ExecutionHandle::new("test", Priority::NORM);
//! task.run(&context, &handle).unwrap();
//! assert_eq!(task.name(), "greeter");
//! assert!(context.contains("greeted"));
//! ```

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::errors::TaskResult;
use crate::handle::ExecutionHandle;

/// A cancellable unit of work.
pub trait Task: Send + Sync {
    /// Name used for thread naming and diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Performs the work.
    ///
    /// Blocking must go through `handle` so that cancellation is observed.
    fn run(&self, context: &Context, handle: &ExecutionHandle) -> TaskResult;

    /// Invoked by the owning runner when it is stopped.
    fn request_cancellation(&self, handle: &ExecutionHandle) {
        handle.cancel();
    }
}

/// Finalizer run once after a task terminates gracefully.
pub trait Cleanup: Send + Sync {
    fn run(&self, context: &Context) -> TaskResult;
}

impl<F> Cleanup for F
where
    F: Fn(&Context) -> TaskResult + Send + Sync,
{
    fn run(&self, context: &Context) -> TaskResult {
        self(context)
    }
}

/// Closure-backed task.
pub struct FnTask<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> FnTask<F>
where
    F: Fn(&Context, &ExecutionHandle) -> TaskResult + Send + Sync,
{
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { name: name.into(), f }
    }

    /// Creates the task and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F> Task for FnTask<F>
where
    F: Fn(&Context, &ExecutionHandle) -> TaskResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, context: &Context, handle: &ExecutionHandle) -> TaskResult {
        (self.f)(context, handle)
    }
}

impl<F> fmt::Debug for FnTask<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask").field("name", &self.name).finish()
    }
}
