//! Authoritative client-side cache of a project's tasks.
//!
//! [`TaskStore`] holds the task list in fetch order behind a
//! `parking_lot::RwLock`. Every write replaces whole entities under a single
//! write lock, so readers never observe a half-applied patch, and bumps a
//! revision counter published on a `tokio::sync::watch` channel.

use parking_lot::RwLock;
use tokio::sync::watch;

use taskboard_proto::api::TaskPatch;
use taskboard_proto::member::{ProjectId, UserId};
use taskboard_proto::task::{Task, TaskId};

use crate::backend::{BackendError, RetryConfig, TaskBackend, with_retries};

/// Errors raised by store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The addressed task is not in the store.
    #[error("task {0} is not on the board")]
    TaskNotFound(TaskId),
}

/// A local change staged before the server confirms it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimisticPatch {
    /// Overwrite the fields present in the patch.
    Fields(TaskPatch),
    /// Add users to the assignee set.
    Assign(Vec<UserId>),
    /// Remove one user from the assignee set.
    Unassign(UserId),
    /// Remove the task from the board.
    Remove,
}

/// The pre-mutation state of one task, used to undo an optimistic patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    index: usize,
    prior: Task,
}

impl Snapshot {
    /// Identifier of the task this snapshot restores.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        &self.prior.id
    }

    /// The task as it was before the patch.
    #[must_use]
    pub const fn prior(&self) -> &Task {
        &self.prior
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    tasks: Vec<Task>,
    loaded: bool,
    stale: bool,
}

impl StoreInner {
    fn position(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == *id)
    }
}

/// In-memory task cache for one project; the single source of truth for the
/// board.
pub struct TaskStore {
    project_id: ProjectId,
    inner: RwLock<StoreInner>,
    revision: watch::Sender<u64>,
}

impl TaskStore {
    /// Creates an empty, not yet loaded store.
    #[must_use]
    pub fn new(project_id: ProjectId) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            project_id,
            inner: RwLock::new(StoreInner::default()),
            revision,
        }
    }

    /// The project whose tasks this store holds.
    #[must_use]
    pub const fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    /// Returns a copy of every task in fetch order.
    #[must_use]
    pub fn all(&self) -> Vec<Task> {
        self.inner.read().tasks.clone()
    }

    /// Runs `f` over the task list without cloning it.
    pub fn with_tasks<R>(&self, f: impl FnOnce(&[Task]) -> R) -> R {
        f(&self.inner.read().tasks)
    }

    /// Returns a copy of one task.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<Task> {
        let inner = self.inner.read();
        inner.position(id).map(|i| inner.tasks[i].clone())
    }

    /// Returns `true` if the task is in the store.
    #[must_use]
    pub fn contains(&self, id: &TaskId) -> bool {
        self.inner.read().position(id).is_some()
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().tasks.len()
    }

    /// Returns `true` if the store holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().tasks.is_empty()
    }

    /// Returns `true` once a task list has been fetched.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.inner.read().loaded
    }

    /// Returns `true` while the store is known to diverge from the server.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.inner.read().stale
    }

    /// Applies `patch` locally and returns what is needed to undo it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if the task is not in the store.
    pub fn apply_optimistic(
        &self,
        id: &TaskId,
        patch: &OptimisticPatch,
    ) -> Result<Snapshot, StoreError> {
        let snapshot = {
            let mut inner = self.inner.write();
            let index = inner
                .position(id)
                .ok_or_else(|| StoreError::TaskNotFound(id.clone()))?;
            let prior = inner.tasks[index].clone();
            match patch {
                OptimisticPatch::Remove => {
                    inner.tasks.remove(index);
                }
                OptimisticPatch::Fields(fields) => fields.apply_to(&mut inner.tasks[index]),
                OptimisticPatch::Assign(users) => {
                    for user in users {
                        inner.tasks[index].assigned_to.insert(user.clone());
                    }
                }
                OptimisticPatch::Unassign(user) => {
                    inner.tasks[index].assigned_to.remove(user);
                }
            }
            Snapshot { index, prior }
        };
        tracing::debug!(task_id = %id, ?patch, "staged optimistic patch");
        self.notify();
        Ok(snapshot)
    }

    /// Replaces the stored task with the server's copy.
    ///
    /// Returns `false`, leaving the store untouched, when the task has been
    /// removed while the request was in flight.
    pub fn commit(&self, task: Task) -> bool {
        {
            let mut inner = self.inner.write();
            let Some(index) = inner.position(&task.id) else {
                drop(inner);
                tracing::warn!(
                    task_id = %task.id,
                    "discarding response for a task no longer on the board"
                );
                return false;
            };
            tracing::debug!(task_id = %task.id, progress = %task.progress, "committed server task");
            inner.tasks[index] = task;
        }
        self.notify();
        true
    }

    /// Appends a newly created task, or replaces it if already present.
    pub fn insert(&self, task: Task) {
        {
            let mut inner = self.inner.write();
            match inner.position(&task.id) {
                Some(index) => inner.tasks[index] = task,
                None => inner.tasks.push(task),
            }
        }
        self.notify();
    }

    /// Restores the task captured by `snapshot` at its original position.
    pub fn rollback(&self, snapshot: Snapshot) {
        let Snapshot { index, prior } = snapshot;
        tracing::debug!(task_id = %prior.id, "rolling back optimistic patch");
        {
            let mut inner = self.inner.write();
            if let Some(current) = inner.position(&prior.id) {
                inner.tasks[current] = prior;
            } else {
                let index = index.min(inner.tasks.len());
                inner.tasks.insert(index, prior);
            }
        }
        self.notify();
    }

    /// Removes a task, returning it if it was present.
    pub fn remove(&self, id: &TaskId) -> Option<Task> {
        let removed = {
            let mut inner = self.inner.write();
            inner.position(id).map(|i| inner.tasks.remove(i))
        };
        if removed.is_some() {
            self.notify();
        }
        removed
    }

    /// Replaces the whole task list with a fresh server listing.
    pub fn replace_all(&self, tasks: Vec<Task>) {
        {
            let mut inner = self.inner.write();
            inner.tasks = tasks;
            inner.loaded = true;
            inner.stale = false;
        }
        self.notify();
    }

    /// Flags the store as diverging from the server.
    pub fn mark_stale(&self) {
        self.inner.write().stale = true;
        self.notify();
    }

    /// Marks the store stale and reloads the project's task list.
    ///
    /// Transient failures are retried according to `retry`. On failure the
    /// store keeps its current contents and stays stale.
    ///
    /// # Errors
    ///
    /// Returns the last [`BackendError`] if every attempt fails.
    pub async fn invalidate_and_refetch<B: TaskBackend>(
        &self,
        backend: &B,
        retry: &RetryConfig,
    ) -> Result<usize, BackendError> {
        self.mark_stale();
        let project = &self.project_id;
        match with_retries(retry, "list tasks", || backend.list_tasks(project)).await {
            Ok(tasks) => {
                let count = tasks.len();
                self.replace_all(tasks);
                tracing::info!(project = %project, count, "task list refetched");
                Ok(count)
            }
            Err(err) => {
                tracing::warn!(project = %project, error = %err, "task list refetch failed");
                Err(err)
            }
        }
    }

    /// Subscribes to revision changes. The value increases on every write.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Current revision number.
    #[must_use]
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn notify(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}
