//! # Runner Module
//!
//! A runner owns exactly one dedicated OS thread and executes one unit of work
//! on it, followed by the optional cleanup handler.
//!
//! ## Lifecycle
//! - `Running`: the thread is executing the task
//! - `CleaningUp`: the task returned (normally or with a recoverable failure)
//!   and the cleanup handler is running
//! - `Terminated(Graceful)`: the thread finished its shutdown sequence
//! - `Terminated(Killed)`: a kill signal unwound the thread; cleanup was skipped
//!
//! ## Guarantees
//! - The cleanup handler runs exactly once on every graceful path and never
//!   after a kill. The kill payload is re-raised before the cleanup step is
//!   reached, so no unwind guard can run it by accident.
//! - [`Runner::stop`] blocks until the thread has exited. It is idempotent:
//!   later calls neither request cancellation again nor run cleanup again.
//! - Recoverable failures of the task or the cleanup handler, including
//!   ordinary panics, are logged and swallowed on the runner thread.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use spindle_api::{CleanupRef, Context, ExecutionHandle, KillSignal, TaskError, TaskRef};
use tracing::{debug, error, info, warn, Dispatch};

use crate::thread::config::ThreadParams;
use crate::thread::error::ThreadError;
use crate::thread::panic_message;

/// How a runner thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The task returned or failed recoverably, and cleanup (if any) ran.
    Graceful,
    /// A kill signal unwound the thread; cleanup did not run.
    Killed,
}

/// States a runner can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Running,
    CleaningUp,
    Terminated(Exit),
}

/// Owns one dedicated thread executing one unit of work.
pub struct Runner {
    name: String,
    work: TaskRef,
    handle: ExecutionHandle,
    state: Arc<Mutex<RunnerState>>,
    stop_requested: Arc<AtomicBool>,
    /// Taken by the first `stop`; held while joining so concurrent callers wait too.
    thread: Mutex<Option<JoinHandle<()>>>,
    logger: Dispatch,
}

impl Runner {
    /// Starts a thread running `work`.
    ///
    /// The thread is named after `params.name`, or after the task when unset,
    /// and logs through `logger`.
    pub fn new(
        work: TaskRef,
        params: ThreadParams,
        logger: Dispatch,
        context: Arc<Context>,
        cleanup: Option<CleanupRef>,
    ) -> Result<Self, ThreadError> {
        let name = params.name.clone().unwrap_or_else(|| work.name().to_string());
        let handle = ExecutionHandle::new(name.clone(), params.priority);
        let state = Arc::new(Mutex::new(RunnerState::Running));
        let stop_requested = Arc::new(AtomicBool::new(false));

        // Registered before the thread exists so the group never under-reports it.
        let membership = params.group.as_ref().map(|group| group.register(&handle));

        let execution = Execution {
            name: name.clone(),
            work: Arc::clone(&work),
            handle: handle.clone(),
            context,
            cleanup,
            state: Arc::clone(&state),
            stop_requested: Arc::clone(&stop_requested),
        };

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(stack_size) = params.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let thread_logger = logger.clone();
        let thread = builder
            .spawn(move || {
                let _membership = membership;
                tracing::dispatcher::with_default(&thread_logger, || execution.run());
            })
            .map_err(|source| ThreadError::Spawn {
                name: name.clone(),
                source,
            })?;

        Ok(Self {
            name,
            work,
            handle,
            state,
            stop_requested,
            thread: Mutex::new(Some(thread)),
            logger,
        })
    }

    /// Requests termination and blocks until the thread has exited.
    pub fn stop(&self) {
        tracing::dispatcher::with_default(&self.logger, || self.stop_and_join());
    }

    fn stop_and_join(&self) {
        let mut thread = self.thread.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(join_handle) = thread.take() else {
            debug!(runner = %self.name, "stop requested again, already stopped");
            return;
        };
        self.stop_requested.store(true, Ordering::SeqCst);

        if self.is_terminated() {
            debug!(runner = %self.name, "{} is not running", self.name);
        } else {
            info!(runner = %self.name, "asking {} to terminate", self.name);
            let requested = panic::catch_unwind(AssertUnwindSafe(|| {
                self.work.request_cancellation(&self.handle)
            }));
            if let Err(payload) = requested {
                error!(
                    runner = %self.name,
                    panic = %panic_message(payload.as_ref()),
                    "cancellation request panicked, falling back to cooperative cancellation"
                );
                self.handle.cancel();
            }
        }

        if join_handle.thread().id() == thread::current().id() {
            warn!(runner = %self.name, "{} stopped from its own thread, not waiting", self.name);
            return;
        }

        match join_handle.join() {
            Ok(()) => debug!(runner = %self.name, "thread exited"),
            Err(payload) if KillSignal::is_kill(payload.as_ref()) => {
                debug!(runner = %self.name, "thread had been killed")
            }
            Err(payload) => error!(
                runner = %self.name,
                panic = %panic_message(payload.as_ref()),
                "thread terminated abnormally"
            ),
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !matches!(*state, RunnerState::Terminated(_)) {
            *state = RunnerState::Terminated(Exit::Killed);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unit of work this runner executes.
    pub fn task(&self) -> &TaskRef {
        &self.work
    }

    /// The execution handle of the runner thread.
    pub fn handle(&self) -> &ExecutionHandle {
        &self.handle
    }

    pub fn state(&self) -> RunnerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.state(), RunnerState::Terminated(_))
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("stop_requested", &self.is_stop_requested())
            .finish()
    }
}

/// Everything the runner thread owns.
struct Execution {
    name: String,
    work: TaskRef,
    handle: ExecutionHandle,
    context: Arc<Context>,
    cleanup: Option<CleanupRef>,
    state: Arc<Mutex<RunnerState>>,
    stop_requested: Arc<AtomicBool>,
}

impl Execution {
    fn run(self) {
        let span = crate::runner_span!(self.name, priority = %self.handle.priority());
        let _entered = span.enter();

        info!("starting {}", self.name);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.work.run(&self.context, &self.handle)
        }));
        match outcome {
            Ok(Ok(())) | Ok(Err(TaskError::Cancelled)) => self.log_return(),
            Ok(Err(error)) => error!(error = %error, "unhandled error in {}", self.name),
            Err(payload) if KillSignal::is_kill(payload.as_ref()) => {
                warn!("{} was forcibly stopped", self.name);
                self.killed(payload);
            }
            Err(payload) => error!(
                panic = %panic_message(payload.as_ref()),
                "{} panicked", self.name
            ),
        }

        self.run_cleanup();
        self.set_state(RunnerState::Terminated(Exit::Graceful));
    }

    fn run_cleanup(&self) {
        let Some(cleanup) = &self.cleanup else {
            return;
        };
        self.set_state(RunnerState::CleaningUp);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| cleanup.run(&self.context)));
        match outcome {
            Ok(Ok(())) => debug!("cleanup after {} finished", self.name),
            Ok(Err(error)) => error!(error = %error, "uncaught error in cleanup after {}", self.name),
            Err(payload) if KillSignal::is_kill(payload.as_ref()) => {
                warn!("{} was forcibly stopped during cleanup", self.name);
                self.killed(payload);
            }
            Err(payload) => error!(
                panic = %panic_message(payload.as_ref()),
                "cleanup after {} panicked", self.name
            ),
        }
    }

    fn log_return(&self) {
        if self.stop_requested.load(Ordering::SeqCst) {
            info!("finished {}", self.name);
        } else {
            warn!("{} has quit before it was asked to stop", self.name);
        }
    }

    fn killed(&self, payload: Box<dyn std::any::Any + Send>) -> ! {
        self.set_state(RunnerState::Terminated(Exit::Killed));
        panic::resume_unwind(payload)
    }

    fn set_state(&self, next: RunnerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}
