use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use spindle::thread::{Pool, Runner, ThreadError, ThreadGroup, ThreadParams};
use spindle_api::{CleanupRef, Context, Task, TaskRef};

use test_helpers::*;

const TASK_DURATION: Duration = Duration::from_millis(300);

/// A pool together with the runner hosting its scheduling loop.
struct Fixture {
    scheduler: Runner,
    pool: Pool,
    context: Arc<Context>,
}

impl Fixture {
    fn new(capacity: usize) -> Self {
        Self::with_cleanup(capacity, Some(cleanup()))
    }

    fn with_cleanup(capacity: usize, cleanup: Option<CleanupRef>) -> Self {
        let context = Context::shared();
        let pool = Pool::new(
            capacity,
            ThreadParams::new(),
            test_logger(),
            Arc::clone(&context),
            cleanup.clone(),
        )
        .expect("pool should start");
        let scheduler = Runner::new(
            pool.scheduling_unit(),
            ThreadParams::new(),
            test_logger(),
            Arc::clone(&context),
            cleanup,
        )
        .expect("scheduler should start");
        Self {
            scheduler,
            pool,
            context,
        }
    }

    fn started_at(&self, label: &str) -> Option<Instant> {
        self.context.get::<Instant>(&format!("started {label}")).map(|i| *i)
    }

    fn finished_at(&self, label: &str) -> Option<Instant> {
        self.context.get::<Instant>(&format!("finished {label}")).map(|i| *i)
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.scheduler.stop();
        self.pool.stop();
    }
}

#[test]
fn test_sequential() {
    let fixture = Fixture::new(1);
    fixture.pool.dispatch(TimedTask::new("test1", TASK_DURATION)).unwrap();
    fixture.pool.dispatch(TimedTask::new("test2", TASK_DURATION)).unwrap();
    thread::sleep(Duration::from_millis(1000));

    let first_finished = fixture.finished_at("test1").expect("test1 finished");
    let second_started = fixture.started_at("test2").expect("test2 started");
    assert!(fixture.started_at("test1").is_some());
    assert!(second_started >= first_finished);
}

#[test]
fn test_concurrent() {
    let fixture = Fixture::new(2);
    fixture.pool.dispatch(TimedTask::new("test1", TASK_DURATION)).unwrap();
    fixture.pool.dispatch(TimedTask::new("test2", TASK_DURATION)).unwrap();
    thread::sleep(Duration::from_millis(1000));

    let first_finished = fixture.finished_at("test1").expect("test1 finished");
    let second_started = fixture.started_at("test2").expect("test2 started");
    assert!(second_started < first_finished);
}

#[test]
fn test_capacity_bounds_concurrency() {
    let fixture = Fixture::new(2);
    let tracker = Arc::new(Concurrency::default());
    for _ in 0..6 {
        let task: TaskRef = Arc::new(CountingTask {
            tracker: Arc::clone(&tracker),
            duration: Duration::from_millis(50),
        });
        fixture.pool.dispatch(task).unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || tracker.completed() == 6));
    assert!(tracker.peak() <= 2);
    assert!(tracker.peak() >= 1);
}

#[test]
fn test_fifo_assignment() {
    let fixture = Fixture::new(1);
    let order = Arc::new(Mutex::new(Vec::new()));
    for index in 0..5 {
        let task: TaskRef = Arc::new(OrderedTask {
            index,
            order: Arc::clone(&order),
        });
        fixture.pool.dispatch(task).unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || order.lock().unwrap().len() == 5));
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_failure_stays_inside_worker() {
    let fixture = Fixture::new(1);
    fixture.pool.dispatch(Arc::new(FailingTask)).unwrap();
    fixture.pool.dispatch(Arc::new(PanickingTask)).unwrap();
    fixture.pool.dispatch(TimedTask::new("survivor", Duration::from_millis(10))).unwrap();

    assert!(wait_until(Duration::from_secs(5), || fixture.finished_at("survivor").is_some()));
    assert!(!fixture.pool.workers()[0].is_stopped());
}

#[test]
fn test_dispatch_returns_immediately_and_queues() {
    let context = Context::shared();
    let pool = Pool::new(1, ThreadParams::new(), test_logger(), Arc::clone(&context), None).unwrap();

    // no scheduling loop is running, so nothing leaves the queue
    for _ in 0..3 {
        pool.dispatch(Arc::new(EarlyExitTask)).unwrap();
    }
    thread::sleep(DELAY);
    assert_eq!(pool.queued(), 3);
    assert_eq!(pool.busy(), 0);
    assert!(!context.contains(STARTED));
    pool.stop();
    assert_eq!(pool.queued(), 0);
}

#[test]
fn test_zero_capacity_is_rejected() {
    let result = Pool::new(0, ThreadParams::new(), test_logger(), Context::shared(), None);
    assert!(matches!(result, Err(ThreadError::InvalidCapacity(0))));
}

#[test]
fn test_dispatch_after_stop_is_rejected() {
    let fixture = Fixture::new(1);
    fixture.pool.stop();
    fixture.pool.stop();

    let result = fixture.pool.dispatch(Arc::new(EarlyExitTask));
    assert!(matches!(result, Err(ThreadError::Stopped(_))));
    assert!(fixture.pool.is_stopped());
}

#[test]
fn test_stop_runs_cleanup_once_per_worker() {
    let cleanup = Arc::new(CountingCleanup::default());
    let context = Context::shared();
    let pool = Pool::new(3, ThreadParams::new(), test_logger(), Arc::clone(&context), Some(cleanup.clone()))
        .unwrap();
    thread::sleep(DELAY);
    pool.stop();
    pool.stop();
    assert_eq!(cleanup.calls(), 3);
}

#[test]
fn test_worker_naming() {
    let context = Context::shared();
    let pool = Pool::new(2, ThreadParams::new(), test_logger(), Arc::clone(&context), None).unwrap();
    let names: Vec<_> = pool.workers().iter().map(|w| w.name().to_string()).collect();
    assert_eq!(names, vec!["worker #1", "worker #2"]);
    assert_eq!(pool.capacity(), 2);
    assert_eq!(pool.scheduling_unit().name(), "worker scheduler");
    pool.stop();

    let pool = Pool::new(1, ThreadParams::new().with_name("io"), test_logger(), context, None).unwrap();
    assert_eq!(pool.workers()[0].name(), "io #1");
    pool.stop();
}

#[test]
fn test_workers_join_group() {
    let group = ThreadGroup::new("Test group");
    let pool = Pool::new(
        2,
        ThreadParams::new().with_group(group.clone()),
        test_logger(),
        Context::shared(),
        None,
    )
    .unwrap();
    assert_eq!(group.active_count(), 2);
    pool.stop();
    assert_eq!(group.active_count(), 0);
}

#[test]
fn test_killed_worker_is_not_replaced() {
    let fixture = Fixture::with_cleanup(1, None);
    fixture.pool.dispatch(Arc::new(BlockingTask)).unwrap();
    assert!(wait_until(Duration::from_secs(5), || fixture.context.contains(STARTED)));

    let worker = &fixture.pool.workers()[0];
    worker.handle().kill();
    assert!(wait_until(Duration::from_secs(5), || worker.runner().is_terminated()));

    fixture.pool.dispatch(TimedTask::new("orphan", Duration::from_millis(10))).unwrap();
    thread::sleep(DELAY * 2);
    assert!(fixture.started_at("orphan").is_none());
    assert_eq!(fixture.pool.queued(), 1);
    assert_eq!(fixture.pool.busy(), 1);
}

#[test]
fn test_stopping_scheduler_leaves_workers_running() {
    let fixture = Fixture::new(1);
    fixture.scheduler.stop();
    assert!(fixture.context.contains(CLEANED_UP));
    assert!(!fixture.pool.workers()[0].is_stopped());

    fixture.pool.dispatch(TimedTask::new("late", Duration::from_millis(10))).unwrap();
    thread::sleep(DELAY);
    assert!(fixture.started_at("late").is_none());
    assert_eq!(fixture.pool.queued(), 1);
}
