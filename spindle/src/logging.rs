// Logging for spindle
//
// Every runner thread logs through the `tracing::Dispatch` it was constructed
// with, so the subscriber a caller sets up here (or anywhere else) receives the
// diagnostics of all threads started on its behalf.
//
// # Usage
//
// ```rust,ignore
// use spindle::logging;
//
// // INFO level, human-readable console output
// logging::init_default();
//
// // Hand the current subscriber to a runner
// let logger = logging::current_subscriber();
// let runner = Runner::new(task, ThreadParams::default(), logger, context, None)?;
// ```
//
// Without installing anything globally, `logging::dispatch(config)` builds a
// dispatcher that can be passed as the logger of a single pool.

use std::io;
use std::sync::Once;

use tracing::{Dispatch, Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Configuration for the spindle logging setup
///
/// ```rust
/// use spindle::logging::LogConfig;
/// use tracing::Level;
///
/// let config = LogConfig {
///     level: Level::DEBUG,
///     target_filters: Some("spindle::thread=trace".to_string()),
///     ..Default::default()
/// };
/// assert!(!config.json_format);
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

static INIT: Once = Once::new();

fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env().add_directive(config.level.into());
    if let Some(filters) = &config.target_filters {
        for directive in filters.split(',').filter_map(|f| f.trim().parse().ok()) {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Builds a subscriber for `config` without installing it.
fn build(config: &LogConfig) -> Box<dyn Subscriber + Send + Sync> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    if config.json_format {
        let layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .with_thread_names(config.show_thread_info)
            .with_thread_ids(config.show_thread_info);
        return Box::new(registry.with(layer));
    }

    let layer = fmt::layer()
        .with_ansi(atty::is(atty::Stream::Stdout))
        .with_file(config.show_file_line)
        .with_line_number(config.show_file_line)
        .with_thread_names(config.show_thread_info)
        .with_thread_ids(config.show_thread_info);
    if config.show_time {
        Box::new(registry.with(layer))
    } else {
        Box::new(registry.with(layer.without_time()))
    }
}

/// A dispatcher for `config`, suitable as the logger of a runner, worker or
/// pool. Nothing is installed globally.
pub fn dispatch(config: &LogConfig) -> Dispatch {
    Dispatch::new(build(config))
}

/// Installs the global subscriber. Only the first call of any `init*`
/// function takes effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| set_global_subscriber(build(&config)));
}

fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Opens `path` for appending, creating it when missing.
pub fn file_writer(path: &str) -> io::Result<Box<dyn io::Write + Send + Sync + 'static>> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(Box::new(file))
}

/// Installs a global subscriber writing to the console and to `log_file`.
///
/// The file is opened up front so an unwritable path is reported to the
/// caller; file output is always plain text with location and thread info.
pub fn init_with_file(config: LogConfig, log_file: &str) -> io::Result<()> {
    drop(file_writer(log_file)?);

    INIT.call_once(|| {
        let console_layer = fmt::layer()
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .with_thread_names(config.show_thread_info)
            .with_thread_ids(config.show_thread_info);

        let path = log_file.to_string();
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || match file_writer(&path) {
                Ok(writer) => writer,
                Err(_) => Box::new(io::stderr()),
            })
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer)
            .with(file_layer);
        set_global_subscriber(subscriber);
    });
    Ok(())
}

/// INFO level, human-readable console output.
pub fn init_default() {
    init(LogConfig::default());
}

/// DEBUG level with thread internals at TRACE, colours and source locations.
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        target_filters: Some("spindle=debug,spindle::thread=trace".to_string()),
        ..Default::default()
    });
}

/// INFO level JSON output without source locations.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    });
}

/// Warnings and errors only, compact output.
///
/// ```rust
/// spindle::logging::init_test();
/// tracing::warn!("visible in test output");
/// ```
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    });
}

/// Span wrapping everything a runner thread does.
///
/// ```rust
/// let span = spindle::runner_span!("indexer", priority = 1);
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! runner_span {
    ($name:expr) => {
        tracing::info_span!("runner", name = %$name)
    };
    ($name:expr, $($fields:tt)*) => {
        tracing::info_span!("runner", name = %$name, $($fields)*)
    };
}

/// Span wrapping one task executed by a worker.
#[macro_export]
macro_rules! task_span {
    ($name:expr) => {
        tracing::debug_span!("task", name = %$name)
    };
    ($name:expr, $($fields:tt)*) => {
        tracing::debug_span!("task", name = %$name, $($fields)*)
    };
}

/// Logs a lifecycle transition of a runner, worker or pool.
///
/// ```rust
/// spindle::log_lifecycle!("runner", "indexer", "stopped");
/// spindle::log_lifecycle!("pool", "worker", "started", capacity = 4);
/// ```
#[macro_export]
macro_rules! log_lifecycle {
    ($kind:expr, $name:expr, $event:expr) => {
        tracing::info!(kind = $kind, name = %$name, event = $event)
    };
    ($kind:expr, $name:expr, $event:expr, $($fields:tt)*) => {
        tracing::info!(kind = $kind, name = %$name, event = $event, $($fields)*)
    };
}

/// The dispatcher in effect on the calling thread.
///
/// Pass it as the `logger` of a runner so the runner thread logs where the
/// caller does.
#[inline]
pub fn current_subscriber() -> Dispatch {
    tracing::dispatcher::get_default(|d| d.clone())
}

pub use tracing::{debug, error, info, trace, warn};
