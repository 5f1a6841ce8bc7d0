//! Per-task subtask lists, loaded lazily.
//!
//! Entries are fetched on first access and considered stale after a
//! configurable window. The cache also tracks subtasks with a status toggle
//! in flight and derives a local [`ProgressPreview`], which is separate from
//! the task's server-computed `progress`.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

use taskboard_proto::task::{Progress, Subtask, SubtaskId, TaskId};

use crate::backend::{BackendError, RetryConfig, TaskBackend, with_retries};

/// Default staleness window for cached subtask lists.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

/// Completion ratio computed locally from a cached subtask list.
///
/// Display only: the authoritative value is the parent task's `progress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressPreview {
    /// Completed subtasks.
    pub completed: usize,
    /// All subtasks.
    pub total: usize,
    /// `round(100 * completed / total)`, zero for an empty list.
    pub percent: u8,
}

impl ProgressPreview {
    /// Computes the preview for a subtask list.
    #[must_use]
    pub fn from_subtasks(subtasks: &[Subtask]) -> Self {
        let total = subtasks.len();
        let completed = subtasks.iter().filter(|s| s.status.is_completed()).count();
        Self {
            completed,
            total,
            percent: Progress::from_ratio(completed, total).value(),
        }
    }
}

/// The state of one cache entry before a local change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtaskSnapshot {
    task_id: TaskId,
    prior: Option<Vec<Subtask>>,
}

impl SubtaskSnapshot {
    /// The parent task whose entry this snapshot restores.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        &self.task_id
    }
}

#[derive(Debug)]
struct Entry {
    subtasks: Vec<Subtask>,
    fetched_at: Instant,
    pending: HashSet<SubtaskId>,
}

/// Lazily populated subtask lists keyed by parent task.
pub struct SubtaskCache {
    entries: RwLock<HashMap<TaskId, Entry>>,
    stale_after: Duration,
}

impl Default for SubtaskCache {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}

impl SubtaskCache {
    /// Creates an empty cache whose entries go stale after `stale_after`.
    #[must_use]
    pub fn new(stale_after: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stale_after,
        }
    }

    /// Returns the cached list for a task, if any.
    #[must_use]
    pub fn get(&self, task_id: &TaskId) -> Option<Vec<Subtask>> {
        self.entries.read().get(task_id).map(|e| e.subtasks.clone())
    }

    /// Returns `true` if the task has a cache entry, stale or not.
    #[must_use]
    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.entries.read().contains_key(task_id)
    }

    /// Returns `true` if the entry is missing or older than the staleness
    /// window.
    #[must_use]
    pub fn is_stale(&self, task_id: &TaskId) -> bool {
        self.entries
            .read()
            .get(task_id)
            .is_none_or(|e| e.fetched_at.elapsed() >= self.stale_after)
    }

    /// Returns the cached list, fetching it first if missing or stale.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the fetch fails.
    pub async fn load<B: TaskBackend>(
        &self,
        backend: &B,
        task_id: &TaskId,
        retry: &RetryConfig,
    ) -> Result<Vec<Subtask>, BackendError> {
        if let Some(subtasks) = self.get(task_id).filter(|_| !self.is_stale(task_id)) {
            return Ok(subtasks);
        }
        self.refetch(backend, task_id, retry).await
    }

    /// Fetches the task's subtask list unconditionally and caches it.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the fetch fails; the entry is left as is.
    pub async fn refetch<B: TaskBackend>(
        &self,
        backend: &B,
        task_id: &TaskId,
        retry: &RetryConfig,
    ) -> Result<Vec<Subtask>, BackendError> {
        let subtasks =
            with_retries(retry, "list subtasks", || backend.list_subtasks(task_id)).await?;
        tracing::debug!(task_id = %task_id, count = subtasks.len(), "subtasks fetched");
        self.replace(task_id.clone(), subtasks.clone());
        Ok(subtasks)
    }

    /// Stores a fresh server listing, resetting the staleness clock. Pending
    /// toggle markers survive.
    pub fn replace(&self, task_id: TaskId, subtasks: Vec<Subtask>) {
        let mut entries = self.entries.write();
        let pending = entries
            .remove(&task_id)
            .map(|e| e.pending)
            .unwrap_or_default();
        entries.insert(
            task_id,
            Entry {
                subtasks,
                fetched_at: Instant::now(),
                pending,
            },
        );
    }

    /// Captures the current state of a task's entry.
    #[must_use]
    pub fn snapshot(&self, task_id: &TaskId) -> SubtaskSnapshot {
        SubtaskSnapshot {
            task_id: task_id.clone(),
            prior: self.get(task_id),
        }
    }

    /// Appends a subtask to a loaded entry. Tasks whose list has never been
    /// fetched are left alone.
    pub fn append(&self, task_id: &TaskId, subtask: Subtask) -> SubtaskSnapshot {
        let snapshot = self.snapshot(task_id);
        if let Some(entry) = self.entries.write().get_mut(task_id) {
            entry.subtasks.push(subtask);
        }
        snapshot
    }

    /// Replaces the subtask identified by `placeholder` with `subtask`, or
    /// appends `subtask` if the placeholder is gone.
    pub fn swap(&self, task_id: &TaskId, placeholder: &SubtaskId, subtask: Subtask) {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(task_id) else {
            return;
        };
        if let Some(slot) = entry.subtasks.iter_mut().find(|s| s.id == *placeholder) {
            *slot = subtask;
        } else if !entry.subtasks.iter().any(|s| s.id == subtask.id) {
            entry.subtasks.push(subtask);
        }
    }

    /// Replaces one subtask in its parent's entry with the server's copy.
    pub fn put(&self, subtask: Subtask) {
        let mut entries = self.entries.write();
        let slot = entries
            .get_mut(&subtask.task_id)
            .and_then(|e| e.subtasks.iter_mut().find(|s| s.id == subtask.id));
        if let Some(slot) = slot {
            *slot = subtask;
        }
    }

    /// Removes a subtask from its parent's entry.
    pub fn remove(&self, task_id: &TaskId, subtask_id: &SubtaskId) -> SubtaskSnapshot {
        let snapshot = self.snapshot(task_id);
        if let Some(entry) = self.entries.write().get_mut(task_id) {
            entry.subtasks.retain(|s| s.id != *subtask_id);
            entry.pending.remove(subtask_id);
        }
        snapshot
    }

    /// Puts an entry back exactly as captured. An entry that did not exist at
    /// capture time is evicted.
    pub fn restore(&self, snapshot: SubtaskSnapshot) {
        let SubtaskSnapshot { task_id, prior } = snapshot;
        let mut entries = self.entries.write();
        match prior {
            Some(subtasks) => {
                if let Some(entry) = entries.get_mut(&task_id) {
                    entry.subtasks = subtasks;
                } else {
                    entries.insert(
                        task_id,
                        Entry {
                            subtasks,
                            fetched_at: Instant::now(),
                            pending: HashSet::new(),
                        },
                    );
                }
            }
            None => {
                entries.remove(&task_id);
            }
        }
    }

    /// Drops a task's entry.
    pub fn evict(&self, task_id: &TaskId) {
        self.entries.write().remove(task_id);
    }

    /// Marks or clears a status toggle in flight.
    pub fn set_pending(&self, task_id: &TaskId, subtask_id: &SubtaskId, pending: bool) {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(task_id) else {
            return;
        };
        if pending {
            entry.pending.insert(subtask_id.clone());
        } else {
            entry.pending.remove(subtask_id);
        }
    }

    /// Returns `true` while a status toggle for the subtask is in flight.
    #[must_use]
    pub fn is_pending(&self, task_id: &TaskId, subtask_id: &SubtaskId) -> bool {
        self.entries
            .read()
            .get(task_id)
            .is_some_and(|e| e.pending.contains(subtask_id))
    }

    /// Local completion preview for a cached task.
    #[must_use]
    pub fn preview(&self, task_id: &TaskId) -> Option<ProgressPreview> {
        self.entries
            .read()
            .get(task_id)
            .map(|e| ProgressPreview::from_subtasks(&e.subtasks))
    }
}
