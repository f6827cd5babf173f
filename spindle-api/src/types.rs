//! Common type definitions shared by the contracts and their implementations.

use std::fmt;
use std::sync::Arc;

use crate::task::{Cleanup, Task};

/// Shared reference to a unit of work.
pub type TaskRef = Arc<dyn Task>;

/// Shared reference to a cleanup handler.
pub type CleanupRef = Arc<dyn Cleanup>;

/// Scheduling priority handed to the thread-creation primitive.
///
/// Values are clamped to `MIN..=MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    pub const MIN: Priority = Priority(1);
    pub const NORM: Priority = Priority(5);
    pub const MAX: Priority = Priority(10);

    pub fn new(value: u8) -> Self {
        Priority(value.clamp(Self::MIN.0, Self::MAX.0))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NORM
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        Priority::new(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
