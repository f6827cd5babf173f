use std::time::Duration;

use serde::{Deserialize, Deserializer};
use spindle_api::Priority;

use crate::thread::error::ThreadError;
use crate::thread::group::ThreadGroup;

pub const DEFAULT_WORKER_POOL_CAPACITY: usize = 10;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const DEFAULT_GROUP_NAME: &str = "spindle";

// --- Thread placement ---

/// Placement parameters handed to the thread-creation primitive.
///
/// The priority is recorded on the thread's execution handle and span; the
/// standard library has no portable way to apply it to the OS thread.
#[derive(Clone, Debug, Default)]
pub struct ThreadParams {
    /// Thread name. Runners fall back to the task name when unset.
    pub name: Option<String>,

    /// Scheduling priority.
    pub priority: Priority,

    /// Group the thread registers with while it is alive.
    pub group: Option<ThreadGroup>,

    /// Stack size in bytes, platform default when unset.
    pub stack_size: Option<usize>,
}

impl ThreadParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_group(mut self, group: ThreadGroup) -> Self {
        self.group = Some(group);
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

// --- Thread pool configuration ---

/// Configuration for [`ThreadPool`](crate::thread::ThreadPool).
///
/// Deserialises from kebab-case keys; missing keys keep their defaults.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ThreadPoolConfig {
    /// Priority of daemon threads, including the pool scheduler.
    #[serde(deserialize_with = "deserialize_priority")]
    pub daemon_priority: Priority,

    /// Priority of worker threads.
    #[serde(deserialize_with = "deserialize_priority")]
    pub worker_priority: Priority,

    /// Number of workers in the pool.
    pub worker_pool_capacity: usize,

    /// How long the scheduler waits before re-checking for an idle worker.
    #[serde(rename = "poll-interval-ms", deserialize_with = "deserialize_millis")]
    pub poll_interval: Duration,

    /// Name of the thread group owning every pool thread.
    pub group_name: String,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            daemon_priority: Priority::MIN,
            worker_priority: Priority::MIN,
            worker_pool_capacity: DEFAULT_WORKER_POOL_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            group_name: DEFAULT_GROUP_NAME.to_string(),
        }
    }
}

impl ThreadPoolConfig {
    /// Builds a configuration from the three tunables, keeping the other defaults.
    pub fn new(daemon_priority: Priority, worker_priority: Priority, worker_pool_capacity: usize) -> Self {
        Self {
            daemon_priority,
            worker_priority,
            worker_pool_capacity,
            ..Default::default()
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_group_name(mut self, group_name: impl Into<String>) -> Self {
        self.group_name = group_name.into();
        self
    }

    pub fn validate(&self) -> Result<(), ThreadError> {
        if self.worker_pool_capacity == 0 {
            return Err(ThreadError::ConfigError(
                "worker-pool-capacity must be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ThreadError::ConfigError(
                "poll-interval-ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn deserialize_priority<'de, D>(deserializer: D) -> Result<Priority, D::Error>
where
    D: Deserializer<'de>,
{
    u8::deserialize(deserializer).map(Priority::new)
}

fn deserialize_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
