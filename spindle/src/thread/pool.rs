//! # Pool Module
//!
//! A fixed set of [`Worker`]s fed from a FIFO admission queue.
//!
//! ## Key Concepts
//! - Admission: [`Pool::dispatch`] appends to an unbounded lock-free queue and
//!   returns immediately.
//! - Scheduling: the matching loop is a plain unit of work obtained from
//!   [`Pool::scheduling_unit`]. The pool does not run it; the caller hosts it
//!   in a runner of its own.
//! - Capacity: every task runs on a worker and a worker runs one task at a
//!   time, so at most `capacity` tasks execute concurrently.
//! - A killed worker keeps its slot occupied for good; it is not replaced.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_queue::SegQueue;
use spindle_api::{CleanupRef, Context, ExecutionHandle, Task, TaskRef, TaskResult};
use tracing::{debug, trace, warn, Dispatch};
use uuid::Uuid;

use crate::thread::config::{ThreadParams, DEFAULT_POLL_INTERVAL};
use crate::thread::error::ThreadError;
use crate::thread::worker::Worker;

const DEFAULT_WORKER_PREFIX: &str = "worker";
const SCHEDULER_NAME: &str = "worker scheduler";

/// Bounded pool of workers with a FIFO admission queue.
pub struct Pool {
    shared: Arc<Shared>,
    poll_interval: Duration,
}

struct Shared {
    prefix: String,
    workers: Vec<Worker>,
    queue: SegQueue<TaskRef>,
    /// Handle of the running scheduling loop, unparked on every dispatch.
    scheduler: Mutex<Option<ExecutionHandle>>,
    stopped: AtomicBool,
}

impl Pool {
    /// Starts `capacity` idle workers sharing `context` and `cleanup`.
    ///
    /// Workers are named `"<prefix> #<n>"`, where the prefix is `params.name`
    /// or `"worker"`. Every worker inherits the priority and group of `params`.
    pub fn new(
        capacity: usize,
        params: ThreadParams,
        logger: Dispatch,
        context: Arc<Context>,
        cleanup: Option<CleanupRef>,
    ) -> Result<Self, ThreadError> {
        if capacity == 0 {
            return Err(ThreadError::InvalidCapacity(capacity));
        }
        let prefix = params
            .name
            .clone()
            .unwrap_or_else(|| DEFAULT_WORKER_PREFIX.to_string());

        let workers = (1..=capacity)
            .map(|n| {
                Worker::new(
                    format!("{prefix} #{n}"),
                    params.clone(),
                    None,
                    logger.clone(),
                    Arc::clone(&context),
                    cleanup.clone(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::dispatcher::with_default(&logger, || {
            crate::log_lifecycle!("pool", prefix, "started", capacity)
        });

        Ok(Self {
            shared: Arc::new(Shared {
                prefix,
                workers,
                queue: SegQueue::new(),
                scheduler: Mutex::new(None),
                stopped: AtomicBool::new(false),
            }),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Sets how long the scheduling loop waits before re-checking for an idle
    /// worker. Applies to scheduling units obtained afterwards.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Enqueues `task` for execution and returns immediately.
    pub fn dispatch(&self, task: TaskRef) -> Result<(), ThreadError> {
        if self.shared.is_stopped() {
            return Err(ThreadError::Stopped(self.shared.prefix.clone()));
        }
        debug!(pool = %self.shared.prefix, task = %task.name(), "task queued");
        self.shared.queue.push(task);
        if let Some(scheduler) = self.shared.scheduler().as_ref() {
            scheduler.unpark();
        }
        Ok(())
    }

    /// The loop assigning queued tasks to idle workers.
    ///
    /// Run it in a [`Runner`](crate::thread::Runner); stopping that runner ends
    /// the loop without touching the workers.
    pub fn scheduling_unit(&self) -> TaskRef {
        Arc::new(SchedulingUnit {
            shared: Arc::clone(&self.shared),
            poll_interval: self.poll_interval,
        })
    }

    pub fn capacity(&self) -> usize {
        self.shared.workers.len()
    }

    /// Number of tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Number of workers with a task in flight. Killed workers count as busy.
    pub fn busy(&self) -> usize {
        self.shared.workers.iter().filter(|w| !w.is_idle()).count()
    }

    pub fn workers(&self) -> &[Worker] {
        &self.shared.workers
    }

    /// Stops every worker and rejects further dispatches. Tasks still queued
    /// are dropped. Idempotent.
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        for worker in &self.shared.workers {
            worker.stop();
        }
        let mut dropped = 0;
        while self.shared.queue.pop().is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(pool = %self.shared.prefix, dropped, "pool stopped with tasks still queued");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("prefix", &self.shared.prefix)
            .field("capacity", &self.capacity())
            .field("busy", &self.busy())
            .field("queued", &self.queued())
            .finish()
    }
}

impl Shared {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn scheduler(&self) -> MutexGuard<'_, Option<ExecutionHandle>> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn idle_worker(&self) -> Option<&Worker> {
        self.workers.iter().find(|w| w.is_idle() && !w.is_stopped())
    }
}

/// Matches queued tasks to idle workers.
struct SchedulingUnit {
    shared: Arc<Shared>,
    poll_interval: Duration,
}

impl SchedulingUnit {
    /// Hands the queue head to an idle worker. Returns false when there was
    /// nothing to do.
    fn assign_next(&self) -> bool {
        if self.shared.queue.is_empty() || self.shared.is_stopped() {
            return false;
        }
        let Some(worker) = self.shared.idle_worker() else {
            trace!(pool = %self.shared.prefix, "no idle worker");
            return false;
        };
        let Some(task) = self.shared.queue.pop() else {
            return false;
        };
        let name = task.name().to_string();
        if let Err(error) = worker.dispatch(task) {
            warn!(error = %error, task = %name, "failed to hand task to {}", worker.name());
        }
        true
    }
}

impl Task for SchedulingUnit {
    fn name(&self) -> &str {
        SCHEDULER_NAME
    }

    fn run(&self, _context: &Context, handle: &ExecutionHandle) -> TaskResult {
        let _attached = Attached::new(&self.shared, handle);
        loop {
            handle.checkpoint()?;
            if self.assign_next() {
                continue;
            }
            handle.park_timeout(self.poll_interval)?;
        }
    }
}

/// Registers the scheduling loop's handle with the pool for its lifetime.
struct Attached<'a> {
    shared: &'a Shared,
    id: Uuid,
}

impl<'a> Attached<'a> {
    fn new(shared: &'a Shared, handle: &ExecutionHandle) -> Self {
        let previous = shared.scheduler().replace(handle.clone());
        if previous.is_some() {
            warn!(pool = %shared.prefix, "another scheduling loop is already attached");
        }
        Self {
            shared,
            id: handle.id(),
        }
    }
}

impl Drop for Attached<'_> {
    fn drop(&mut self) {
        let mut scheduler = self.shared.scheduler();
        if scheduler.as_ref().is_some_and(|h| h.id() == self.id) {
            *scheduler = None;
        }
    }
}
