use std::sync::Arc;
use std::thread;

use spindle::thread::{Exit, Runner, RunnerState, ThreadGroup, ThreadParams};
use spindle_api::{CleanupRef, Context, ExecutionHandle, FnTask, TaskRef, TaskResult};

use test_helpers::*;

fn start(task: TaskRef, context: &Arc<Context>, cleanup: Option<CleanupRef>) -> Runner {
    Runner::new(task, params("test runner"), test_logger(), Arc::clone(context), cleanup)
        .expect("runner should start")
}

#[test]
fn test_normal() {
    let context = Context::shared();
    let runner = start(Arc::new(BlockingTask), &context, Some(cleanup()));
    thread::sleep(DELAY);
    runner.stop();

    assert!(context.contains(STARTED));
    assert!(context.contains(INTERRUPTED));
    assert!(context.contains(CLEANED_UP));
    assert_eq!(runner.state(), RunnerState::Terminated(Exit::Graceful));
}

#[test]
fn test_early_exit() {
    let context = Context::shared();
    let runner = start(Arc::new(EarlyExitTask), &context, Some(cleanup()));
    assert!(wait_until(DELAY * 10, || runner.is_terminated()));
    runner.stop();

    assert!(context.contains(STARTED));
    assert!(!context.contains(INTERRUPTED));
    assert!(context.contains(CLEANED_UP));
}

#[test]
fn test_failing() {
    let context = Context::shared();
    let runner = start(Arc::new(FailingTask), &context, Some(cleanup()));
    thread::sleep(DELAY);
    runner.stop();

    assert!(context.contains(STARTED));
    assert!(!context.contains(INTERRUPTED));
    assert!(context.contains(CLEANED_UP));
    assert_eq!(runner.state(), RunnerState::Terminated(Exit::Graceful));
}

#[test]
fn test_panicking_task_still_cleans_up() {
    let context = Context::shared();
    let runner = start(Arc::new(PanickingTask), &context, Some(cleanup()));
    thread::sleep(DELAY);
    runner.stop();

    assert!(context.contains(STARTED));
    assert!(context.contains(CLEANED_UP));
    assert_eq!(runner.state(), RunnerState::Terminated(Exit::Graceful));
}

#[test]
fn test_forced_stop() {
    let context = Context::shared();
    let runner = start(Arc::new(ForcedStopTask), &context, Some(cleanup()));
    thread::sleep(DELAY);
    runner.stop();

    assert!(context.contains(STARTED));
    assert!(!context.contains(INTERRUPTED));
    assert!(!context.contains(CLEANED_UP));
    assert_eq!(runner.state(), RunnerState::Terminated(Exit::Killed));
}

#[test]
fn test_external_stop() {
    let context = Context::shared();
    let group = ThreadGroup::new("Test group");
    let runner = Runner::new(
        Arc::new(BlockingTask),
        params("external").with_group(group.clone()),
        test_logger(),
        Arc::clone(&context),
        Some(cleanup()),
    )
    .unwrap();
    thread::sleep(DELAY);

    assert_eq!(group.active_count(), 1);
    let handles = group.handles();
    handles[0].kill();
    runner.stop();

    assert!(context.contains(STARTED));
    assert!(!context.contains(INTERRUPTED));
    assert!(!context.contains(CLEANED_UP));
    assert_eq!(runner.state(), RunnerState::Terminated(Exit::Killed));
    assert_eq!(group.active_count(), 0);
}

#[test]
fn test_double_stop() {
    let context = Context::shared();
    let cleanup = Arc::new(CountingCleanup::default());
    let runner = start(Arc::new(BlockingTask), &context, Some(cleanup.clone()));
    thread::sleep(DELAY);
    runner.stop();
    thread::sleep(DELAY);
    runner.stop();

    assert!(context.contains(STARTED));
    assert!(context.contains(INTERRUPTED));
    assert_eq!(cleanup.calls(), 1);
    assert!(runner.is_stop_requested());
}

#[test]
fn test_no_cleanup() {
    let context = Context::shared();
    let runner = start(Arc::new(BlockingTask), &context, None);
    thread::sleep(DELAY);
    runner.stop();

    assert!(context.contains(STARTED));
    assert!(context.contains(INTERRUPTED));
    assert!(!context.contains(CLEANED_UP));
}

#[test]
fn test_failed_cleanup() {
    let context = Context::shared();
    let runner = start(Arc::new(BlockingTask), &context, Some(failing_cleanup()));
    thread::sleep(DELAY);
    runner.stop();

    assert!(context.contains(STARTED));
    assert!(context.contains(INTERRUPTED));
    assert!(!context.contains(CLEANED_UP));
    assert_eq!(runner.state(), RunnerState::Terminated(Exit::Graceful));
}

#[test]
fn test_stop_after_thread_exit_skips_cancellation() {
    let context = Context::shared();
    let runner = start(Arc::new(EarlyExitTask), &context, None);
    assert!(wait_until(DELAY * 10, || runner.is_terminated()));
    runner.stop();
    assert!(!runner.handle().is_cancelled());
}

#[test]
fn test_drop_stops_runner() {
    let context = Context::shared();
    {
        let _runner = start(Arc::new(BlockingTask), &context, Some(cleanup()));
        thread::sleep(DELAY);
    }
    assert!(context.contains(INTERRUPTED));
    assert!(context.contains(CLEANED_UP));
}

#[test]
fn test_thread_is_named_after_params() {
    let context = Context::shared();
    let task = FnTask::arc("named", |context: &Context, _handle: &ExecutionHandle| -> TaskResult {
        context.set("thread name", thread::current().name().map(str::to_string));
        Ok(())
    });
    let runner = start(task, &context, None);
    runner.stop();

    let name = context.get::<Option<String>>("thread name").unwrap();
    assert_eq!(name.as_deref(), Some("test runner"));
    assert_eq!(runner.name(), "test runner");
}

#[test]
fn test_thread_name_defaults_to_task_name() {
    let context = Context::shared();
    let runner = Runner::new(
        Arc::new(EarlyExitTask),
        ThreadParams::default(),
        test_logger(),
        Arc::clone(&context),
        None,
    )
    .unwrap();
    runner.stop();
    assert_eq!(runner.name(), "early exit");
    assert_eq!(runner.handle().name(), "early exit");
}

#[test]
fn test_logs_go_to_supplied_logger() {
    let logs = LogBuffer::default();
    let context = Context::shared();

    let quitter = Runner::new(Arc::new(EarlyExitTask), params("quitter"), logs.logger(), Arc::clone(&context), None)
        .unwrap();
    assert!(wait_until(DELAY * 10, || quitter.is_terminated()));
    quitter.stop();

    let stopped = Runner::new(Arc::new(BlockingTask), params("stopped"), logs.logger(), Arc::clone(&context), None)
        .unwrap();
    thread::sleep(DELAY);
    stopped.stop();

    let output = logs.contents();
    assert!(output.contains("quitter has quit before it was asked to stop"));
    assert!(output.contains("finished stopped"));
}
