//! Optimistic mutation machinery.
//!
//! Every write to the board has the same shape, captured by [`Mutation`]:
//! a synchronous precondition, an optional optimistic stage, a lazy backend
//! call, and a success handler. [`MutationExecutor`] runs that shape:
//!
//! 1. precondition (no lock, no request, no cache write on rejection)
//! 2. per-task lock, when the mutation targets a task and serialization is on
//! 3. optimistic stage into the Task Store or Subtask Cache
//! 4. backend call
//! 5. success handler, or reconciliation per [`ReconcilePolicy`]

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;

use taskboard_proto::ParseError;
use taskboard_proto::task::{SubtaskId, TaskId};

use crate::backend::{BackendError, RetryConfig, TaskBackend};
use crate::drag::TransitionRejected;
use crate::guard::PermissionDenied;
use crate::store::{Snapshot, StoreError, TaskStore};
use crate::subtasks::{SubtaskCache, SubtaskSnapshot};

/// What a mutation does, for logs and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Create a task.
    CreateTask,
    /// Edit task fields.
    UpdateTask,
    /// Delete a task.
    DeleteTask,
    /// Change a task's status by drag or explicit move.
    ChangeStatus,
    /// Add users to a task.
    Assign,
    /// Remove a user from a task.
    Unassign,
    /// Create a subtask.
    AddSubtask,
    /// Delete a subtask.
    RemoveSubtask,
    /// Flip a subtask's completion.
    ToggleSubtask,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::CreateTask => "create task",
            Self::UpdateTask => "update task",
            Self::DeleteTask => "delete task",
            Self::ChangeStatus => "move task",
            Self::Assign => "assign users",
            Self::Unassign => "unassign user",
            Self::AddSubtask => "add subtask",
            Self::RemoveSubtask => "remove subtask",
            Self::ToggleSubtask => "toggle subtask",
        };
        f.write_str(text)
    }
}

/// How a failed optimistic mutation is brought back to server truth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcilePolicy {
    /// Refetch the affected cache; restore the snapshot if that fails too.
    #[default]
    Refetch,
    /// Restore the snapshot without asking the server.
    Rollback,
}

impl std::str::FromStr for ReconcilePolicy {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refetch" => Ok(Self::Refetch),
            "rollback" => Ok(Self::Rollback),
            _ => Err(ParseError::new("reconcile policy", s)),
        }
    }
}

impl std::fmt::Display for ReconcilePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Refetch => write!(f, "refetch"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// What a mutation changed locally before the server answered.
#[derive(Debug)]
pub enum Staged {
    /// No optimistic change.
    Nothing,
    /// A Task Store patch.
    Task(Snapshot),
    /// A Subtask Cache patch.
    Subtasks(SubtaskSnapshot),
    /// A toggle-in-flight marker on a subtask.
    Pending {
        /// Parent task.
        task_id: TaskId,
        /// Marked subtask.
        subtask_id: SubtaskId,
    },
}

/// Reconciliation performed after a failed backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Nothing was staged, nothing to undo.
    None,
    /// The affected cache was reloaded from the server.
    Refetched,
    /// The pre-mutation snapshot was restored.
    RolledBack,
}

/// Input rejected before any request is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Task title is empty or whitespace.
    #[error("task title cannot be empty")]
    TitleEmpty,

    /// Task title is too long.
    #[error("task title exceeds {max} characters")]
    TitleTooLong {
        /// Configured maximum in characters.
        max: usize,
    },

    /// Subtask title is empty or whitespace.
    #[error("subtask title cannot be empty")]
    SubtaskTitleEmpty,

    /// An assign request named no users.
    #[error("no users selected")]
    NoAssignees,
}

/// Trims a task title and checks it is non-empty and at most `max` chars.
///
/// # Errors
///
/// Returns [`ValidationError::TitleEmpty`] or [`ValidationError::TitleTooLong`].
pub fn validate_title(title: &str, max: usize) -> Result<String, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::TitleEmpty);
    }
    if title.chars().count() > max {
        return Err(ValidationError::TitleTooLong { max });
    }
    Ok(title.to_string())
}

/// Trims a subtask title and checks it is non-empty.
///
/// # Errors
///
/// Returns [`ValidationError::SubtaskTitleEmpty`].
pub fn validate_subtask_title(title: &str) -> Result<String, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::SubtaskTitleEmpty);
    }
    Ok(title.to_string())
}

/// Errors a mutation can end with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    /// The actor may not perform this mutation.
    #[error(transparent)]
    Permission(#[from] PermissionDenied),

    /// The input is invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The drop target is not reachable from the task's column.
    #[error(transparent)]
    Transition(#[from] TransitionRejected),

    /// The task is not on the board.
    #[error("task {0} is not on the board")]
    TaskNotFound(TaskId),

    /// The subtask is not in the loaded list.
    #[error("subtask {0} not found")]
    SubtaskNotFound(SubtaskId),

    /// The backend call failed; the cache was reconciled as reported.
    #[error("could not {kind}: {source}")]
    Failed {
        /// The mutation that failed.
        kind: MutationKind,
        /// The backend failure.
        source: BackendError,
        /// How the caches were brought back to server truth.
        reconciliation: Reconciliation,
    },
}

impl From<StoreError> for MutationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TaskNotFound(id) => Self::TaskNotFound(id),
        }
    }
}

/// Borrowed view of the caches a mutation may touch.
#[derive(Clone, Copy)]
pub struct Caches<'a> {
    /// Task Store.
    pub store: &'a TaskStore,
    /// Subtask Cache.
    pub subtasks: &'a SubtaskCache,
}

/// One write to the board.
///
/// `call` is only invoked once the precondition passed and the stage
/// succeeded, so a rejected mutation never reaches the backend.
pub struct Mutation<P, S, C, O> {
    /// What this mutation does.
    pub kind: MutationKind,
    /// Task to serialize on, if any.
    pub target: Option<TaskId>,
    /// Synchronous permission and validation check.
    pub precondition: P,
    /// Optimistic local change.
    pub stage: S,
    /// Produces the backend request.
    pub call: C,
    /// Applies the server response.
    pub on_success: O,
}

/// Per-task async locks. Entries nobody holds or waits on are pruned on the
/// next acquisition.
#[derive(Debug, Default)]
pub struct TaskLocks {
    locks: parking_lot::Mutex<HashMap<TaskId, Arc<tokio::sync::Mutex<()>>>>,
}

impl TaskLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `task_id`.
    pub async fn acquire(&self, task_id: &TaskId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(task_id.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of lock entries currently kept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns `true` if no entries are kept.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

/// Runs [`Mutation`]s and reconciles failures.
pub struct MutationExecutor {
    policy: ReconcilePolicy,
    retry: RetryConfig,
    locks: Option<TaskLocks>,
}

impl MutationExecutor {
    /// Creates an executor. With `serialize_same_task` set, mutations on the
    /// same task run one at a time.
    #[must_use]
    pub fn new(policy: ReconcilePolicy, retry: RetryConfig, serialize_same_task: bool) -> Self {
        Self {
            policy,
            retry,
            locks: serialize_same_task.then(TaskLocks::new),
        }
    }

    /// Reconciliation policy in effect.
    #[must_use]
    pub const fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    /// Runs one mutation to completion.
    ///
    /// # Errors
    ///
    /// Returns the precondition or staging error unchanged, or
    /// [`MutationError::Failed`] after reconciling a backend failure.
    pub async fn execute<'a, B, T, R, P, S, C, Fut, O>(
        &self,
        backend: &B,
        caches: Caches<'a>,
        mutation: Mutation<P, S, C, O>,
    ) -> Result<R, MutationError>
    where
        B: TaskBackend,
        P: FnOnce(Caches<'a>) -> Result<(), MutationError>,
        S: FnOnce(Caches<'a>) -> Result<Staged, MutationError>,
        C: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
        O: FnOnce(Caches<'a>, T) -> R,
    {
        let Mutation {
            kind,
            target,
            precondition,
            stage,
            call,
            on_success,
        } = mutation;

        precondition(caches)?;

        let _guard = match (&self.locks, &target) {
            (Some(locks), Some(task_id)) => Some(locks.acquire(task_id).await),
            _ => None,
        };

        let staged = stage(caches)?;
        match call().await {
            Ok(response) => {
                if let Staged::Pending {
                    task_id,
                    subtask_id,
                } = &staged
                {
                    caches.subtasks.set_pending(task_id, subtask_id, false);
                }
                tracing::debug!(%kind, task_id = ?target, "mutation confirmed");
                Ok(on_success(caches, response))
            }
            Err(source) => {
                tracing::warn!(%kind, task_id = ?target, error = %source, "mutation failed");
                let reconciliation = self.reconcile(backend, caches, staged).await;
                Err(MutationError::Failed {
                    kind,
                    source,
                    reconciliation,
                })
            }
        }
    }

    async fn reconcile<B: TaskBackend>(
        &self,
        backend: &B,
        caches: Caches<'_>,
        staged: Staged,
    ) -> Reconciliation {
        match staged {
            Staged::Nothing => Reconciliation::None,
            Staged::Pending {
                task_id,
                subtask_id,
            } => {
                caches.subtasks.set_pending(&task_id, &subtask_id, false);
                Reconciliation::None
            }
            Staged::Task(snapshot) => match self.policy {
                ReconcilePolicy::Rollback => {
                    caches.store.rollback(snapshot);
                    Reconciliation::RolledBack
                }
                ReconcilePolicy::Refetch => {
                    match caches.store.invalidate_and_refetch(backend, &self.retry).await {
                        Ok(_) => Reconciliation::Refetched,
                        Err(err) => {
                            tracing::warn!(
                                task_id = %snapshot.task_id(),
                                error = %err,
                                "refetch failed, restoring snapshot"
                            );
                            caches.store.rollback(snapshot);
                            Reconciliation::RolledBack
                        }
                    }
                }
            },
            Staged::Subtasks(snapshot) => match self.policy {
                ReconcilePolicy::Rollback => {
                    caches.subtasks.restore(snapshot);
                    Reconciliation::RolledBack
                }
                ReconcilePolicy::Refetch => {
                    let task_id = snapshot.task_id().clone();
                    match caches.subtasks.refetch(backend, &task_id, &self.retry).await {
                        Ok(_) => Reconciliation::Refetched,
                        Err(err) => {
                            tracing::warn!(
                                %task_id,
                                error = %err,
                                "subtask refetch failed, restoring snapshot"
                            );
                            caches.subtasks.restore(snapshot);
                            Reconciliation::RolledBack
                        }
                    }
                }
            },
        }
    }
}
