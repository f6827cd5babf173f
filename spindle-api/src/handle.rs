//! # Execution Handle
//!
//! The per-thread cancellation target shared between a runner and the unit of
//! work it executes.
//!
//! ## Key Concepts
//! - Cooperative cancellation: [`ExecutionHandle::cancel`] makes every blocking
//!   point return [`Cancelled`], so the unit of work unwinds through its normal
//!   control flow.
//! - Forceful kill: [`ExecutionHandle::kill`] makes every blocking point unwind
//!   the thread with a [`KillSignal`] payload. Application code never receives
//!   it as a value, and the owning runner re-raises it without running cleanup.
//! - Parking: [`ExecutionHandle::park`] and [`ExecutionHandle::unpark`] follow
//!   token semantics, an `unpark` that happens before `park` is not lost.
//!
//! A kill always wins over a cooperative request; once a handle is killed,
//! `cancel` does not downgrade it.
//!
//! Cancellation is only observed at blocking points and at
//! [`ExecutionHandle::checkpoint`]; code that never reaches one cannot be
//! stopped by either tier.

use std::any::Any;
use std::fmt;
use std::panic;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;
use uuid::Uuid;

use crate::types::Priority;

/// Tier of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancellation {
    /// Observed at the next blocking point, which returns [`Cancelled`].
    Cooperative,
    /// Unwinds the thread at the next blocking point with [`KillSignal`].
    Forceful,
}

/// Returned by blocking points once cooperative cancellation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("cancellation requested")
    }
}

impl std::error::Error for Cancelled {}

/// Unwind payload of a forceful kill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillSignal;

impl KillSignal {
    /// Returns true if a caught unwind payload is a kill signal.
    pub fn is_kill(payload: &(dyn Any + Send)) -> bool {
        payload.is::<KillSignal>()
    }

    /// Unwinds the current thread with a kill signal.
    ///
    /// `resume_unwind` skips the panic hook, so a kill produces no panic message.
    pub fn raise() -> ! {
        panic::resume_unwind(Box::new(KillSignal))
    }
}

#[derive(Debug, Default)]
struct SignalState {
    cancellation: Option<Cancellation>,
    unparked: bool,
}

/// Cancellation target and blocking primitive of one execution thread.
///
/// Cloning yields another reference to the same thread's handle.
#[derive(Clone)]
pub struct ExecutionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: Uuid,
    name: String,
    priority: Priority,
    state: Mutex<SignalState>,
    condvar: Condvar,
}

impl ExecutionHandle {
    pub fn new(name: impl Into<String>, priority: Priority) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4(),
                name: name.into(),
                priority,
                state: Mutex::new(SignalState::default()),
                condvar: Condvar::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn priority(&self) -> Priority {
        self.inner.priority
    }

    /// Requests cooperative cancellation.
    pub fn cancel(&self) {
        let mut state = self.lock();
        if state.cancellation.is_none() {
            trace!(thread = %self.inner.name, "cooperative cancellation requested");
            state.cancellation = Some(Cancellation::Cooperative);
        }
        drop(state);
        self.inner.condvar.notify_all();
    }

    /// Requests a forceful kill.
    pub fn kill(&self) {
        let mut state = self.lock();
        trace!(thread = %self.inner.name, "kill requested");
        state.cancellation = Some(Cancellation::Forceful);
        drop(state);
        self.inner.condvar.notify_all();
    }

    /// The pending cancellation request, if any.
    pub fn cancellation(&self) -> Option<Cancellation> {
        self.lock().cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation().is_some()
    }

    /// Makes the next (or current) `park` return.
    pub fn unpark(&self) {
        let mut state = self.lock();
        state.unparked = true;
        drop(state);
        self.inner.condvar.notify_all();
    }

    /// Non-blocking cancellation check.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        Self::observe(self.lock()).map(drop)
    }

    /// Blocks until unparked or cancelled.
    pub fn park(&self) -> Result<(), Cancelled> {
        let mut state = self.lock();
        loop {
            state = Self::observe(state)?;
            if state.unparked {
                state.unparked = false;
                return Ok(());
            }
            state = self.inner.condvar.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until unparked, cancelled, or `timeout` elapses.
    pub fn park_timeout(&self, timeout: Duration) -> Result<(), Cancelled> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.lock();
        loop {
            state = Self::observe(state)?;
            if state.unparked {
                state.unparked = false;
                return Ok(());
            }
            state = match remaining(deadline) {
                Some(left) if left.is_zero() => return Ok(()),
                Some(left) => {
                    self.inner.condvar
                        .wait_timeout(state, left)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.inner.condvar.wait(state).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Sleeps for `duration` unless cancelled first. Unpark tokens are ignored.
    pub fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        let deadline = Instant::now().checked_add(duration);
        let mut state = self.lock();
        loop {
            state = Self::observe(state)?;
            state = match remaining(deadline) {
                Some(left) if left.is_zero() => return Ok(()),
                Some(left) => {
                    self.inner.condvar
                        .wait_timeout(state, left)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.inner.condvar.wait(state).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Blocks until cancellation is requested.
    pub fn wait_for_cancellation(&self) -> Cancelled {
        let mut state = self.lock();
        loop {
            state = match Self::observe(state) {
                Ok(state) => self.inner.condvar.wait(state).unwrap_or_else(PoisonError::into_inner),
                Err(cancelled) => return cancelled,
            };
        }
    }

    // A killed thread unwinds through here, so the guard is released first
    // and every lock site tolerates poisoning.
    fn observe(state: MutexGuard<'_, SignalState>) -> Result<MutexGuard<'_, SignalState>, Cancelled> {
        let cancellation = state.cancellation;
        match cancellation {
            None => Ok(state),
            Some(Cancellation::Cooperative) => Err(Cancelled),
            Some(Cancellation::Forceful) => {
                drop(state);
                KillSignal::raise()
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
}

impl fmt::Debug for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("priority", &self.inner.priority)
            .field("cancellation", &self.cancellation())
            .finish()
    }
}
