use std::io;

use thiserror::Error;

/// Errors raised while constructing or operating runners, workers and pools.
#[derive(Error, Debug)]
pub enum ThreadError {
    #[error("Failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("Invalid pool capacity: {0}")]
    InvalidCapacity(usize),
    #[error("Worker {0} is already executing a task")]
    WorkerBusy(String),
    #[error("{0} has been stopped")]
    Stopped(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
