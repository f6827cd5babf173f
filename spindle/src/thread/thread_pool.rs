//! # Thread Pool
//!
//! Application-facing facade: one thread group, one worker pool and a set of
//! daemon runners, all sharing the same context and cleanup handler.
//!
//! The pool's scheduling loop is itself the first daemon, so stopping the
//! facade ends scheduling before the workers are stopped.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use spindle_api::{CleanupRef, Context, TaskRef};
use tracing::{debug, info, Dispatch};

use crate::thread::config::{ThreadParams, ThreadPoolConfig};
use crate::thread::error::ThreadError;
use crate::thread::group::ThreadGroup;
use crate::thread::pool::Pool;
use crate::thread::runner::Runner;

const WORKER_PREFIX: &str = "worker";

/// Runs daemon tasks on dedicated threads and worker tasks on a bounded pool.
pub struct ThreadPool {
    config: ThreadPoolConfig,
    group: ThreadGroup,
    logger: Dispatch,
    context: Arc<Context>,
    cleanup: Option<CleanupRef>,
    pool: Pool,
    daemons: Mutex<Vec<Runner>>,
    stopped: AtomicBool,
}

impl ThreadPool {
    /// Validates `config`, starts the worker pool and its scheduling daemon.
    pub fn new(
        config: ThreadPoolConfig,
        logger: Dispatch,
        context: Arc<Context>,
        cleanup: Option<CleanupRef>,
    ) -> Result<Self, ThreadError> {
        config.validate()?;
        let group = ThreadGroup::new(config.group_name.clone());

        let worker_params = ThreadParams::new()
            .with_name(WORKER_PREFIX)
            .with_priority(config.worker_priority)
            .with_group(group.clone());
        let pool = Pool::new(
            config.worker_pool_capacity,
            worker_params,
            logger.clone(),
            Arc::clone(&context),
            cleanup.clone(),
        )?
        .with_poll_interval(config.poll_interval);

        let thread_pool = Self {
            config,
            group,
            logger,
            context,
            cleanup,
            pool,
            daemons: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        };
        thread_pool.run_daemon(thread_pool.pool.scheduling_unit())?;

        tracing::dispatcher::with_default(&thread_pool.logger, || {
            info!(
                group = %thread_pool.group.name(),
                capacity = thread_pool.config.worker_pool_capacity,
                "thread pool started"
            )
        });
        Ok(thread_pool)
    }

    /// Queues `task` on the worker pool.
    pub fn run_worker(&self, task: TaskRef) -> Result<(), ThreadError> {
        self.pool.dispatch(task)
    }

    /// Starts `task` on a dedicated daemon thread at daemon priority.
    pub fn run_daemon(&self, task: TaskRef) -> Result<(), ThreadError> {
        let mut daemons = self.daemons();
        if self.is_stopped() {
            return Err(ThreadError::Stopped(self.group.name().to_string()));
        }
        let params = ThreadParams::new()
            .with_priority(self.config.daemon_priority)
            .with_group(self.group.clone());
        let runner = Runner::new(
            task,
            params,
            self.logger.clone(),
            Arc::clone(&self.context),
            self.cleanup.clone(),
        )?;
        daemons.push(runner);
        Ok(())
    }

    /// Stops every daemon, the scheduler included, then the worker pool.
    /// Idempotent.
    pub fn stop(&self) {
        let daemons = {
            let mut daemons = self.daemons();
            if self.stopped.swap(true, Ordering::SeqCst) {
                return;
            }
            std::mem::take(&mut *daemons)
        };
        tracing::dispatcher::with_default(&self.logger, || {
            debug!(daemons = daemons.len(), "stopping thread pool")
        });
        for daemon in &daemons {
            daemon.stop();
        }
        self.pool.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// The group every thread of this pool belongs to.
    pub fn group(&self) -> &ThreadGroup {
        &self.group
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn config(&self) -> &ThreadPoolConfig {
        &self.config
    }

    /// Number of daemons started and not yet stopped, the scheduler included.
    pub fn daemon_count(&self) -> usize {
        self.daemons().len()
    }

    fn daemons(&self) -> MutexGuard<'_, Vec<Runner>> {
        self.daemons.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("group", &self.group)
            .field("pool", &self.pool)
            .field("daemons", &self.daemon_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
