use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use spindle_api::ExecutionHandle;
use tracing::trace;
use uuid::Uuid;

/// Named registry of live execution threads.
///
/// Cloning yields another reference to the same group. A thread is a member
/// from the moment its runner is constructed until the thread exits, on every
/// exit path.
#[derive(Clone)]
pub struct ThreadGroup {
    inner: Arc<GroupInner>,
}

struct GroupInner {
    name: String,
    members: Mutex<HashMap<Uuid, ExecutionHandle>>,
}

impl ThreadGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                name: name.into(),
                members: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of member threads that have not exited yet.
    pub fn active_count(&self) -> usize {
        self.members().len()
    }

    /// Snapshot of the live members' handles, ordered by name.
    pub fn handles(&self) -> Vec<ExecutionHandle> {
        let mut handles: Vec<_> = self.members().values().cloned().collect();
        handles.sort_by(|a, b| a.name().cmp(b.name()));
        handles
    }

    pub(crate) fn register(&self, handle: &ExecutionHandle) -> Membership {
        trace!(group = %self.inner.name, thread = %handle.name(), "joined group");
        self.members().insert(handle.id(), handle.clone());
        Membership {
            group: self.clone(),
            id: handle.id(),
        }
    }

    fn members(&self) -> MutexGuard<'_, HashMap<Uuid, ExecutionHandle>> {
        self.inner.members.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ThreadGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadGroup")
            .field("name", &self.inner.name)
            .field("active", &self.active_count())
            .finish()
    }
}

/// Leaves the group when dropped.
pub(crate) struct Membership {
    group: ThreadGroup,
    id: Uuid,
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.group.members().remove(&self.id);
    }
}
