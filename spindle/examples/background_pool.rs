/// # Background Pool Example
///
/// Runs a handful of jobs on a small worker pool next to a heartbeat daemon,
/// then shuts everything down.
///
/// - Configuring the pool from JSON-like settings
/// - Worker tasks that report progress through the shared context
/// - A daemon that loops until it is asked to stop
/// - A cleanup handler that runs once per thread

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context as _;
use spindle::logging;
use spindle::thread::{ThreadPool, ThreadPoolConfig};
use spindle_api::{Context, ExecutionHandle, FnTask, Priority, TaskError, TaskResult};
use tracing::info;

/// Logs a beat every `interval` until cancelled.
struct Heartbeat {
    interval: Duration,
    beats: AtomicUsize,
}

impl spindle_api::Task for Heartbeat {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn run(&self, _context: &Context, handle: &ExecutionHandle) -> TaskResult {
        loop {
            handle.sleep(self.interval)?;
            let beat = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
            info!(beat, "still alive");
        }
    }
}

fn main() -> anyhow::Result<()> {
    logging::init_development();

    let config = ThreadPoolConfig::new(Priority::MIN, Priority::NORM, 2)
        .with_poll_interval(Duration::from_millis(5))
        .with_group_name("example");
    let context = Context::shared();
    let cleanup = |context: &Context| -> TaskResult {
        context.set("last cleanup", std::time::Instant::now());
        Ok(())
    };

    let pool = ThreadPool::new(config, logging::current_subscriber(), Arc::clone(&context), Some(Arc::new(cleanup)))
        .context("starting the thread pool")?;

    pool.run_daemon(Arc::new(Heartbeat {
        interval: Duration::from_millis(100),
        beats: AtomicUsize::new(0),
    }))?;

    for job in 0..5u64 {
        let task = FnTask::arc(format!("job {job}"), move |context: &Context, handle: &ExecutionHandle| {
            info!(job, "working");
            handle.sleep(Duration::from_millis(50 * (job + 1)))?;
            if job == 3 {
                return Err(TaskError::failed("job 3 always fails"));
            }
            context.set(format!("job {job} done"), true);
            Ok(())
        });
        pool.run_worker(task)?;
    }

    std::thread::sleep(Duration::from_secs(1));
    info!(busy = pool.pool().busy(), queued = pool.pool().queued(), "shutting down");
    pool.stop();

    let mut keys = context.keys();
    keys.retain(|key| key.ends_with("done"));
    info!(?keys, "finished jobs");
    Ok(())
}
