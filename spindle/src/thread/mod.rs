#![doc = " Dedicated-thread execution: runners, workers, the worker pool and its facade."]

pub mod config;
pub mod error;
pub mod group;
pub mod pool;
pub mod runner;
pub mod thread_pool;
pub mod worker;

use std::any::Any;

// Re-export key types for easier usage
pub use config::{ThreadParams, ThreadPoolConfig};
pub use error::ThreadError;
pub use group::ThreadGroup;
pub use pool::Pool;
pub use runner::{Exit, Runner, RunnerState};
pub use thread_pool::ThreadPool;
pub use worker::Worker;

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    }
}
