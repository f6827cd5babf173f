//! # Worker Module
//!
//! A worker is a [`Runner`] whose unit of work is a dispatch loop: it waits for
//! a task to be handed over, runs it, and goes back to waiting.
//!
//! ## Key Concepts
//! - Single-slot handoff: at most one task in flight or queued for handoff.
//!   [`Worker::dispatch`] rejects work while the slot is taken.
//! - Failure isolation: a task's recoverable failure (or ordinary panic) is
//!   logged and the loop keeps serving.
//! - Shutdown: stopping the worker forwards the cancellation request to the
//!   running task, so a task that kills on cancellation kills the worker.
//!   Because the loop is the runner's unit of work, the cleanup handler runs
//!   once when the worker shuts down, and not at all after a kill.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use spindle_api::{
    CleanupRef, Context, ExecutionHandle, KillSignal, Task, TaskError, TaskRef, TaskResult,
};
use tracing::{debug, error, info, warn, Dispatch};

use crate::thread::config::ThreadParams;
use crate::thread::error::ThreadError;
use crate::thread::panic_message;
use crate::thread::runner::Runner;

/// Runs externally dispatched tasks one at a time on a dedicated thread.
pub struct Worker {
    name: String,
    slot: Arc<Slot>,
    runner: Runner,
}

impl Worker {
    /// Starts the worker thread, optionally with a first task already handed over.
    ///
    /// `params.name` is replaced by `name`.
    pub fn new(
        name: impl Into<String>,
        params: ThreadParams,
        initial: Option<TaskRef>,
        logger: Dispatch,
        context: Arc<Context>,
        cleanup: Option<CleanupRef>,
    ) -> Result<Self, ThreadError> {
        let name = name.into();
        let slot = Arc::new(Slot::default());
        if let Some(task) = initial {
            slot.lock().pending = Some(task);
        }

        let dispatch_loop = Arc::new(DispatchLoop {
            name: name.clone(),
            slot: Arc::clone(&slot),
        });
        let runner = Runner::new(
            dispatch_loop,
            params.with_name(name.clone()),
            logger,
            context,
            cleanup,
        )?;

        Ok(Self { name, slot, runner })
    }

    /// Hands `task` to this worker.
    ///
    /// Fails with [`ThreadError::WorkerBusy`] while another task is in flight or
    /// waiting to start, and with [`ThreadError::Stopped`] after `stop`.
    pub fn dispatch(&self, task: TaskRef) -> Result<(), ThreadError> {
        if self.is_stopped() {
            return Err(ThreadError::Stopped(self.name.clone()));
        }
        {
            let mut slot = self.slot.lock();
            if slot.is_taken() {
                return Err(ThreadError::WorkerBusy(self.name.clone()));
            }
            debug!(worker = %self.name, task = %task.name(), "task dispatched");
            slot.pending = Some(task);
        }
        self.runner.handle().unpark();
        Ok(())
    }

    /// The task in flight or waiting to start, `None` when idle.
    pub fn current_task(&self) -> Option<TaskRef> {
        let slot = self.slot.lock();
        slot.current.clone().or_else(|| slot.pending.clone())
    }

    pub fn is_idle(&self) -> bool {
        !self.slot.lock().is_taken()
    }

    /// Stops the dispatch loop and waits for the thread to exit.
    pub fn stop(&self) {
        self.runner.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.runner.is_stop_requested() || self.runner.is_terminated()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &ExecutionHandle {
        self.runner.handle()
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("idle", &self.is_idle())
            .field("runner", &self.runner)
            .finish()
    }
}

#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
}

#[derive(Default)]
struct SlotState {
    /// Handed over, not started yet.
    pending: Option<TaskRef>,
    /// Running now. Left in place when a kill unwinds the loop.
    current: Option<TaskRef>,
}

impl SlotState {
    fn is_taken(&self) -> bool {
        self.pending.is_some() || self.current.is_some()
    }
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_pending(&self) -> Option<TaskRef> {
        let mut state = self.lock();
        let task = state.pending.take()?;
        state.current = Some(Arc::clone(&task));
        Some(task)
    }

    fn finish(&self) {
        self.lock().current = None;
    }
}

/// The worker runner's unit of work.
struct DispatchLoop {
    name: String,
    slot: Arc<Slot>,
}

impl DispatchLoop {
    fn execute(&self, task: TaskRef, context: &Context, handle: &ExecutionHandle) {
        let span = crate::task_span!(task.name(), worker = %self.name);
        let _entered = span.enter();

        debug!("{} starting {}", self.name, task.name());
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run(context, handle)));
        match outcome {
            Ok(Ok(())) => debug!("{} done {}", self.name, task.name()),
            Ok(Err(TaskError::Cancelled)) => info!("{} cancelled {}", self.name, task.name()),
            Ok(Err(error)) => error!(error = %error, "{}: uncaught error in {}", self.name, task.name()),
            Err(payload) if KillSignal::is_kill(payload.as_ref()) => {
                warn!("{} was forcibly stopped while running {}", self.name, task.name());
                panic::resume_unwind(payload);
            }
            Err(payload) => error!(
                panic = %panic_message(payload.as_ref()),
                "{}: {} panicked", self.name, task.name()
            ),
        }
        self.slot.finish();
    }
}

impl Task for DispatchLoop {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, context: &Context, handle: &ExecutionHandle) -> TaskResult {
        loop {
            if handle.checkpoint().is_err() {
                break;
            }
            match self.slot.start_pending() {
                Some(task) => self.execute(task, context, handle),
                None => {
                    if handle.park().is_err() {
                        break;
                    }
                }
            }
        }

        if let Some(task) = self.slot.lock().pending.take() {
            warn!("{} discarding {}, it was never started", self.name, task.name());
        }
        debug!("{} leaving dispatch loop", self.name);
        Ok(())
    }

    fn request_cancellation(&self, handle: &ExecutionHandle) {
        let running = self.slot.lock().current.clone();
        if let Some(task) = running {
            info!("{} attempting to terminate {}", self.name, task.name());
            task.request_cancellation(handle);
        }
        // The loop itself must still exit once the task has returned; a kill
        // requested by the task is not downgraded by this.
        handle.cancel();
    }
}
