//! Board controller.
//!
//! [`Board`] owns the Task Store, the Subtask Cache and the mutation
//! executor for one project and exposes every gesture the board supports.
//! Each operation returns a `Result` and also reports its outcome on the
//! [`BoardEvent`] channel, so a renderer can react without awaiting the call.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use taskboard_proto::api::{
    Ack, AssignRequest, NewSubtask, NewTask, SubtaskStatusRequest, SubtaskStatusResponse,
    TaskPatch, UnassignRequest,
};
use taskboard_proto::member::UserId;
use taskboard_proto::task::{Priority, Subtask, SubtaskId, SubtaskStatus, Task, TaskId, TaskStatus};

use crate::backend::{BackendError, RetryConfig, TaskBackend};
use crate::drag::{DragSession, DropDecision, DropEvent, TransitionTable};
use crate::guard::{self, ProjectContext};
use crate::mutation::{
    Caches, Mutation, MutationError, MutationExecutor, MutationKind, ReconcilePolicy, Staged,
    validate_subtask_title, validate_title,
};
use crate::store::{OptimisticPatch, TaskStore};
use crate::subtasks::{ProgressPreview, SubtaskCache};
use crate::view::{self, Column, ViewParams};

/// Tunables for a [`Board`].
#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// Reconciliation applied to failed optimistic mutations.
    pub policy: ReconcilePolicy,
    /// Serialize mutations that target the same task.
    pub serialize_same_task: bool,
    /// Allowed drag moves.
    pub transitions: TransitionTable,
    /// Staleness window of cached subtask lists.
    pub subtask_stale_after: Duration,
    /// Maximum task title length in characters.
    pub max_task_title_len: usize,
    /// Retry behavior of refetches.
    pub retry: RetryConfig,
    /// Capacity of the event channel.
    pub event_buffer: usize,
    /// View parameters the board starts with.
    pub default_view: ViewParams,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            policy: ReconcilePolicy::default(),
            serialize_same_task: true,
            transitions: TransitionTable::default(),
            subtask_stale_after: crate::subtasks::DEFAULT_STALE_AFTER,
            max_task_title_len: taskboard_proto::task::MAX_TASK_TITLE_LENGTH,
            retry: RetryConfig::default(),
            event_buffer: 64,
            default_view: ViewParams::default(),
        }
    }
}

/// Answer to a confirmation prompt for a destructive operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Go ahead.
    Confirmed,
    /// Abort without touching anything.
    Declined,
}

/// Notifications for the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    /// The task list was (re)loaded from the server.
    Reloaded {
        /// Number of tasks now on the board.
        count: usize,
    },
    /// A task was created or changed.
    TaskChanged {
        /// The affected task.
        task_id: TaskId,
    },
    /// A task was deleted.
    TaskRemoved {
        /// The deleted task.
        task_id: TaskId,
    },
    /// A task's subtask list changed.
    SubtasksChanged {
        /// The parent task.
        task_id: TaskId,
    },
    /// An operation failed. `message` is suitable for inline display.
    Error {
        /// User-facing description.
        message: String,
    },
}

/// Errors returned by board operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// A mutation was rejected or failed.
    #[error(transparent)]
    Mutation(#[from] MutationError),

    /// Loading data from the backend failed.
    #[error("could not load board: {0}")]
    Load(#[from] BackendError),

    /// The user declined a confirmation prompt.
    #[error("cancelled")]
    Cancelled,
}

/// Fields of a task to be created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    /// Title, trimmed before sending.
    pub title: String,
    /// Description.
    pub description: String,
    /// Priority.
    pub priority: Priority,
    /// Optional due date.
    pub due_date: Option<DateTime<Utc>>,
    /// Users to assign at creation; requires the assign capability.
    pub assigned_to: Vec<UserId>,
}

impl TaskDraft {
    /// A draft with only a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// The task board of one project as seen by one user.
pub struct Board<B> {
    backend: Arc<B>,
    store: TaskStore,
    subtasks: SubtaskCache,
    executor: MutationExecutor,
    user: UserId,
    project: RwLock<ProjectContext>,
    view: RwLock<ViewParams>,
    drag: Mutex<DragSession>,
    transitions: TransitionTable,
    max_title_len: usize,
    retry: RetryConfig,
    event_tx: mpsc::Sender<BoardEvent>,
}

impl<B: TaskBackend> Board<B> {
    /// Creates a board for `user` in `project`, returning it together with
    /// the receiving end of its event channel. The task list is not fetched
    /// until [`Board::load`].
    #[must_use]
    pub fn new(
        backend: Arc<B>,
        project: ProjectContext,
        user: UserId,
        config: BoardConfig,
    ) -> (Self, mpsc::Receiver<BoardEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let board = Self {
            backend,
            store: TaskStore::new(project.project_id.clone()),
            subtasks: SubtaskCache::new(config.subtask_stale_after),
            executor: MutationExecutor::new(
                config.policy,
                config.retry.clone(),
                config.serialize_same_task,
            ),
            user,
            project: RwLock::new(project),
            view: RwLock::new(config.default_view),
            drag: Mutex::new(DragSession::new()),
            transitions: config.transitions,
            max_title_len: config.max_task_title_len,
            retry: config.retry,
            event_tx,
        };
        (board, event_rx)
    }

    /// The Task Store.
    pub const fn store(&self) -> &TaskStore {
        &self.store
    }

    /// The Subtask Cache.
    pub const fn subtasks(&self) -> &SubtaskCache {
        &self.subtasks
    }

    /// The acting user.
    pub const fn user(&self) -> &UserId {
        &self.user
    }

    /// A copy of the current project context.
    pub fn project(&self) -> ProjectContext {
        self.project.read().clone()
    }

    /// Replaces the roster and capabilities, e.g. after the membership
    /// provider reloaded.
    pub fn set_project_context(&self, project: ProjectContext) {
        *self.project.write() = project;
    }

    /// Updates the externally computed assign capability.
    pub fn set_assign_capability(&self, can_assign: bool) {
        self.project.write().can_assign = can_assign;
    }

    // -- Loading -----------------------------------------------------------

    /// Fetches the project's task list.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Load`] if the fetch fails after retries.
    pub async fn load(&self) -> Result<usize, BoardError> {
        match self
            .store
            .invalidate_and_refetch(self.backend.as_ref(), &self.retry)
            .await
        {
            Ok(count) => {
                self.emit(BoardEvent::Reloaded { count });
                Ok(count)
            }
            Err(err) => Err(self.fail(BoardError::Load(err))),
        }
    }

    /// Reloads the task list after something outside the board changed it
    /// (for example a batch of generated tasks).
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Load`] if the fetch fails after retries.
    pub async fn refresh(&self) -> Result<usize, BoardError> {
        tracing::info!(
            project = %self.store.project_id(),
            "external invalidation, reloading board"
        );
        self.load().await
    }

    // -- View --------------------------------------------------------------

    /// Current view parameters.
    pub fn view_params(&self) -> ViewParams {
        self.view.read().clone()
    }

    /// Replaces the view parameters.
    pub fn set_view(&self, params: ViewParams) {
        *self.view.write() = params;
    }

    /// The filtered and sorted task list.
    pub fn visible_tasks(&self) -> Vec<Task> {
        let params = self.view_params();
        self.store
            .with_tasks(|tasks| view::view(tasks, &params).into_iter().cloned().collect())
    }

    /// The visible tasks grouped into status columns.
    pub fn columns(&self) -> Vec<Column> {
        let params = self.view_params();
        self.store.with_tasks(|tasks| view::columns(tasks, &params))
    }

    // -- Task mutations ----------------------------------------------------

    /// Creates a task. Admin only.
    ///
    /// # Errors
    ///
    /// Returns a permission, validation or backend error.
    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task, BoardError> {
        let request = NewTask {
            project_id: self.store.project_id().clone(),
            title: draft.title.trim().to_string(),
            description: draft.description,
            priority: draft.priority,
            due_date: draft.due_date,
            assigned_to: draft.assigned_to,
        };
        let backend = self.backend.as_ref();
        let result = self
            .executor
            .execute(
                backend,
                self.caches(),
                Mutation {
                    kind: MutationKind::CreateTask,
                    target: None,
                    precondition: |_: Caches<'_>| {
                        let project = self.project.read();
                        guard::require_editor(&self.user, &project, "create")?;
                        if !request.assigned_to.is_empty() {
                            guard::require_assign(&project)?;
                        }
                        validate_title(&request.title, self.max_title_len)?;
                        Ok(())
                    },
                    stage: |_: Caches<'_>| Ok(Staged::Nothing),
                    call: || backend.create_task(&request),
                    on_success: |caches: Caches<'_>, task: Task| {
                        caches.store.insert(task.clone());
                        task
                    },
                },
            )
            .await;
        let task = self.surface(result)?;
        tracing::info!(task_id = %task.id, title = %task.title, "task created");
        self.emit(BoardEvent::TaskChanged {
            task_id: task.id.clone(),
        });
        Ok(task)
    }

    /// Edits task fields. Admin only. An empty patch returns the stored task
    /// without a request.
    ///
    /// # Errors
    ///
    /// Returns a permission, validation, not-found or backend error.
    pub async fn update_task(&self, id: &TaskId, mut patch: TaskPatch) -> Result<Task, BoardError> {
        if let Some(title) = patch.title.as_mut() {
            *title = title.trim().to_string();
        }
        if patch.is_empty() {
            return self
                .store
                .get(id)
                .ok_or_else(|| self.fail(MutationError::TaskNotFound(id.clone()).into()));
        }
        let backend = self.backend.as_ref();
        let result = self
            .executor
            .execute(
                backend,
                self.caches(),
                Mutation {
                    kind: MutationKind::UpdateTask,
                    target: Some(id.clone()),
                    precondition: |_: Caches<'_>| {
                        guard::require_editor(&self.user, &self.project.read(), "edit")?;
                        if let Some(title) = &patch.title {
                            validate_title(title, self.max_title_len)?;
                        }
                        Ok(())
                    },
                    stage: |caches: Caches<'_>| {
                        let staged = OptimisticPatch::Fields(patch.clone());
                        Ok(Staged::Task(caches.store.apply_optimistic(id, &staged)?))
                    },
                    call: || backend.update_task(id, &patch),
                    on_success: Self::commit_task,
                },
            )
            .await;
        let task = self.surface(result)?;
        self.emit(BoardEvent::TaskChanged { task_id: id.clone() });
        Ok(task)
    }

    /// Deletes a task and drops its cached subtasks. Admin only.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Cancelled`] if declined, otherwise a permission,
    /// not-found or backend error.
    pub async fn delete_task(
        &self,
        id: &TaskId,
        confirmation: Confirmation,
    ) -> Result<(), BoardError> {
        if confirmation == Confirmation::Declined {
            tracing::debug!(task_id = %id, "delete declined");
            return Err(BoardError::Cancelled);
        }
        let backend = self.backend.as_ref();
        let result = self
            .executor
            .execute(
                backend,
                self.caches(),
                Mutation {
                    kind: MutationKind::DeleteTask,
                    target: Some(id.clone()),
                    precondition: |_: Caches<'_>| {
                        guard::require_editor(&self.user, &self.project.read(), "delete")?;
                        Ok(())
                    },
                    stage: |caches: Caches<'_>| {
                        let snapshot = caches.store.apply_optimistic(id, &OptimisticPatch::Remove)?;
                        Ok(Staged::Task(snapshot))
                    },
                    call: || backend.delete_task(id),
                    on_success: |caches: Caches<'_>, _: Ack| {
                        // A list refetch that landed in flight may have put it back.
                        caches.store.remove(id);
                        caches.subtasks.evict(id);
                    },
                },
            )
            .await;
        self.surface(result)?;
        tracing::info!(task_id = %id, "task deleted");
        self.emit(BoardEvent::TaskRemoved { task_id: id.clone() });
        Ok(())
    }

    /// Moves a task to another column. Dropping on the current column
    /// returns the task unchanged without a request.
    ///
    /// The transition is checked against the task's status once the per-task
    /// lock is held, so moves queued behind another mutation see the status
    /// that mutation left behind.
    ///
    /// # Errors
    ///
    /// Returns a not-found, transition or backend error.
    pub async fn move_task(&self, id: &TaskId, status: TaskStatus) -> Result<Task, BoardError> {
        let patch = TaskPatch::status(status);
        // Filled by `stage` when the task already sits in the target column.
        let unchanged: Mutex<Option<Task>> = Mutex::new(None);
        let backend = self.backend.as_ref();
        let result = self
            .executor
            .execute(
                backend,
                self.caches(),
                Mutation {
                    kind: MutationKind::ChangeStatus,
                    target: Some(id.clone()),
                    precondition: |_: Caches<'_>| Ok(()),
                    stage: |caches: Caches<'_>| {
                        let current = caches
                            .store
                            .get(id)
                            .ok_or_else(|| MutationError::TaskNotFound(id.clone()))?;
                        match self.transitions.resolve(current.status, status)? {
                            DropDecision::Unchanged => {
                                *unchanged.lock() = Some(current);
                                Ok(Staged::Nothing)
                            }
                            DropDecision::Move { from, to } => {
                                tracing::debug!(task_id = %id, %from, %to, "moving task");
                                let staged = OptimisticPatch::Fields(patch.clone());
                                Ok(Staged::Task(caches.store.apply_optimistic(id, &staged)?))
                            }
                        }
                    },
                    call: || {
                        let settled = unchanged.lock().clone();
                        let patch = &patch;
                        async move {
                            match settled {
                                Some(task) => Ok(task),
                                None => backend.update_task(id, patch).await,
                            }
                        }
                    },
                    on_success: |caches: Caches<'_>, task: Task| {
                        if unchanged.lock().is_some() {
                            task
                        } else {
                            Self::commit_task(caches, task)
                        }
                    },
                },
            )
            .await;
        let task = self.surface(result)?;
        if unchanged.into_inner().is_none() {
            self.emit(BoardEvent::TaskChanged { task_id: id.clone() });
        }
        Ok(task)
    }

    // -- Drag and drop -----------------------------------------------------

    /// Picks up a card.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the task is not on the board.
    pub fn begin_drag(&self, id: &TaskId) -> Result<(), BoardError> {
        let task = self
            .store
            .get(id)
            .ok_or_else(|| self.fail(MutationError::TaskNotFound(id.clone()).into()))?;
        self.drag.lock().begin(task.id, task.status);
        Ok(())
    }

    /// Abandons the current drag, returning the held task.
    pub fn cancel_drag(&self) -> Option<TaskId> {
        self.drag.lock().cancel()
    }

    /// Returns `true` while a card is held.
    pub fn is_dragging(&self) -> bool {
        self.drag.lock().is_dragging()
    }

    /// Drops the held card on `target`. Returns `None` if nothing was held.
    ///
    /// # Errors
    ///
    /// See [`Board::move_task`].
    pub async fn drop_dragged(&self, target: TaskStatus) -> Result<Option<Task>, BoardError> {
        let event = self.drag.lock().finish(target);
        match event {
            Some(event) => self.drop_task(event).await.map(Some),
            None => Ok(None),
        }
    }

    /// Applies a drop event.
    ///
    /// # Errors
    ///
    /// See [`Board::move_task`].
    pub async fn drop_task(&self, event: DropEvent) -> Result<Task, BoardError> {
        self.move_task(&event.task_id, event.target).await
    }

    // -- Assignment --------------------------------------------------------

    /// Adds users to a task. The server merges them into the existing set.
    ///
    /// # Errors
    ///
    /// Returns a permission, validation, not-found or backend error.
    pub async fn assign_users(&self, id: &TaskId, users: Vec<UserId>) -> Result<Task, BoardError> {
        let request = AssignRequest { user_ids: users };
        let backend = self.backend.as_ref();
        let result = self
            .executor
            .execute(
                backend,
                self.caches(),
                Mutation {
                    kind: MutationKind::Assign,
                    target: Some(id.clone()),
                    precondition: |_: Caches<'_>| {
                        guard::require_assign(&self.project.read())?;
                        if request.user_ids.is_empty() {
                            return Err(crate::mutation::ValidationError::NoAssignees.into());
                        }
                        Ok(())
                    },
                    stage: |caches: Caches<'_>| {
                        let staged = OptimisticPatch::Assign(request.user_ids.clone());
                        Ok(Staged::Task(caches.store.apply_optimistic(id, &staged)?))
                    },
                    call: || backend.assign_users(id, &request),
                    on_success: Self::commit_task,
                },
            )
            .await;
        let task = self.surface(result)?;
        self.emit(BoardEvent::TaskChanged { task_id: id.clone() });
        Ok(task)
    }

    /// Removes a user from a task.
    ///
    /// # Errors
    ///
    /// Returns a permission, not-found or backend error.
    pub async fn unassign_user(&self, id: &TaskId, user: UserId) -> Result<Task, BoardError> {
        let request = UnassignRequest { user_id: user };
        let backend = self.backend.as_ref();
        let result = self
            .executor
            .execute(
                backend,
                self.caches(),
                Mutation {
                    kind: MutationKind::Unassign,
                    target: Some(id.clone()),
                    precondition: |_: Caches<'_>| {
                        guard::require_assign(&self.project.read())?;
                        Ok(())
                    },
                    stage: |caches: Caches<'_>| {
                        let staged = OptimisticPatch::Unassign(request.user_id.clone());
                        Ok(Staged::Task(caches.store.apply_optimistic(id, &staged)?))
                    },
                    call: || backend.unassign_user(id, &request),
                    on_success: Self::commit_task,
                },
            )
            .await;
        let task = self.surface(result)?;
        self.emit(BoardEvent::TaskChanged { task_id: id.clone() });
        Ok(task)
    }

    /// Assigns `user` if absent, unassigns otherwise.
    ///
    /// # Errors
    ///
    /// See [`Board::assign_users`] and [`Board::unassign_user`].
    pub async fn toggle_assignee(&self, id: &TaskId, user: UserId) -> Result<Task, BoardError> {
        let assigned = self
            .store
            .get(id)
            .ok_or_else(|| self.fail(MutationError::TaskNotFound(id.clone()).into()))?
            .is_assigned(&user);
        if assigned {
            self.unassign_user(id, user).await
        } else {
            self.assign_users(id, vec![user]).await
        }
    }

    // -- Subtasks ----------------------------------------------------------

    /// Returns a task's subtasks, fetching them if missing or stale.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Load`] if the fetch fails.
    pub async fn open_subtasks(&self, task_id: &TaskId) -> Result<Vec<Subtask>, BoardError> {
        self.subtasks
            .load(self.backend.as_ref(), task_id, &self.retry)
            .await
            .map_err(|err| self.fail(BoardError::Load(err)))
    }

    /// Adds a subtask. Only users assigned to the task may do this. After the
    /// server confirms, the task list is refetched so the parent's recomputed
    /// progress lands.
    ///
    /// # Errors
    ///
    /// Returns a permission, validation, not-found or backend error.
    pub async fn add_subtask(&self, task_id: &TaskId, title: &str) -> Result<Subtask, BoardError> {
        let request = NewSubtask::new(title.trim());
        let placeholder = Subtask {
            id: SubtaskId::new(),
            task_id: task_id.clone(),
            title: request.title.clone(),
            description: String::new(),
            status: SubtaskStatus::Pending,
        };
        let placeholder_id = placeholder.id.clone();
        let backend = self.backend.as_ref();
        let result = self
            .executor
            .execute(
                backend,
                self.caches(),
                Mutation {
                    kind: MutationKind::AddSubtask,
                    target: Some(task_id.clone()),
                    precondition: |caches: Caches<'_>| {
                        self.require_subtask_access(caches, task_id)?;
                        validate_subtask_title(&request.title)?;
                        Ok(())
                    },
                    stage: |caches: Caches<'_>| {
                        Ok(Staged::Subtasks(caches.subtasks.append(task_id, placeholder)))
                    },
                    call: || backend.create_subtask(task_id, &request),
                    on_success: |caches: Caches<'_>, created: Subtask| {
                        caches.subtasks.swap(task_id, &placeholder_id, created.clone());
                        created
                    },
                },
            )
            .await;
        let created = self.surface(result)?;
        self.emit(BoardEvent::SubtasksChanged {
            task_id: task_id.clone(),
        });
        self.refetch_parent(task_id).await;
        Ok(created)
    }

    /// Deletes a subtask. Only users assigned to the task may do this.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Cancelled`] if declined, otherwise a permission,
    /// not-found or backend error.
    pub async fn remove_subtask(
        &self,
        task_id: &TaskId,
        subtask_id: &SubtaskId,
        confirmation: Confirmation,
    ) -> Result<(), BoardError> {
        if confirmation == Confirmation::Declined {
            tracing::debug!(%subtask_id, "subtask removal declined");
            return Err(BoardError::Cancelled);
        }
        let backend = self.backend.as_ref();
        let result = self
            .executor
            .execute(
                backend,
                self.caches(),
                Mutation {
                    kind: MutationKind::RemoveSubtask,
                    target: Some(task_id.clone()),
                    precondition: |caches: Caches<'_>| {
                        self.require_subtask_access(caches, task_id)?;
                        let known = caches
                            .subtasks
                            .get(task_id)
                            .is_none_or(|list| list.iter().any(|s| s.id == *subtask_id));
                        if known {
                            Ok(())
                        } else {
                            Err(MutationError::SubtaskNotFound(subtask_id.clone()))
                        }
                    },
                    stage: |caches: Caches<'_>| {
                        Ok(Staged::Subtasks(caches.subtasks.remove(task_id, subtask_id)))
                    },
                    call: || backend.delete_subtask(subtask_id),
                    on_success: |_: Caches<'_>, _: Ack| (),
                },
            )
            .await;
        self.surface(result)?;
        self.emit(BoardEvent::SubtasksChanged {
            task_id: task_id.clone(),
        });
        self.refetch_parent(task_id).await;
        Ok(())
    }

    /// Flips a subtask between pending and completed. The server answers
    /// with the subtask and its parent carrying the recomputed progress.
    ///
    /// # Errors
    ///
    /// Returns a permission, not-found or backend error.
    pub async fn toggle_subtask(
        &self,
        task_id: &TaskId,
        subtask_id: &SubtaskId,
    ) -> Result<Subtask, BoardError> {
        let backend = self.backend.as_ref();
        let result = self
            .executor
            .execute(
                backend,
                self.caches(),
                Mutation {
                    kind: MutationKind::ToggleSubtask,
                    target: Some(task_id.clone()),
                    precondition: |caches: Caches<'_>| {
                        self.require_subtask_access(caches, task_id)?;
                        if Self::cached_subtask(caches, task_id, subtask_id).is_none() {
                            return Err(MutationError::SubtaskNotFound(subtask_id.clone()));
                        }
                        Ok(())
                    },
                    stage: |caches: Caches<'_>| {
                        caches.subtasks.set_pending(task_id, subtask_id, true);
                        Ok(Staged::Pending {
                            task_id: task_id.clone(),
                            subtask_id: subtask_id.clone(),
                        })
                    },
                    call: || {
                        let completed = Self::cached_subtask(self.caches(), task_id, subtask_id)
                            .is_none_or(|s| !s.status.is_completed());
                        backend.set_subtask_status(subtask_id, SubtaskStatusRequest { completed })
                    },
                    on_success: |caches: Caches<'_>, response: SubtaskStatusResponse| {
                        caches.subtasks.put(response.subtask.clone());
                        caches.store.commit(response.task);
                        response.subtask
                    },
                },
            )
            .await;
        let subtask = self.surface(result)?;
        self.emit(BoardEvent::SubtasksChanged {
            task_id: task_id.clone(),
        });
        self.emit(BoardEvent::TaskChanged {
            task_id: task_id.clone(),
        });
        Ok(subtask)
    }

    /// Local completion preview of a task's cached subtasks.
    pub fn subtask_preview(&self, task_id: &TaskId) -> Option<ProgressPreview> {
        self.subtasks.preview(task_id)
    }

    // -- Internal helpers --------------------------------------------------

    const fn caches(&self) -> Caches<'_> {
        Caches {
            store: &self.store,
            subtasks: &self.subtasks,
        }
    }

    fn commit_task(caches: Caches<'_>, task: Task) -> Task {
        caches.store.commit(task.clone());
        task
    }

    fn cached_subtask(
        caches: Caches<'_>,
        task_id: &TaskId,
        subtask_id: &SubtaskId,
    ) -> Option<Subtask> {
        caches
            .subtasks
            .get(task_id)?
            .into_iter()
            .find(|s| s.id == *subtask_id)
    }

    fn require_subtask_access(
        &self,
        caches: Caches<'_>,
        task_id: &TaskId,
    ) -> Result<(), MutationError> {
        let task = caches
            .store
            .get(task_id)
            .ok_or_else(|| MutationError::TaskNotFound(task_id.clone()))?;
        guard::require_subtask_access(&task, &self.user)?;
        Ok(())
    }

    /// Reloads the task list after a subtask change so the parent's
    /// server-computed progress is shown. A failure leaves the store stale
    /// and is reported, but does not fail the subtask operation.
    async fn refetch_parent(&self, task_id: &TaskId) {
        match self
            .store
            .invalidate_and_refetch(self.backend.as_ref(), &self.retry)
            .await
        {
            Ok(_) => self.emit(BoardEvent::TaskChanged {
                task_id: task_id.clone(),
            }),
            Err(err) => {
                self.fail(BoardError::Load(err));
            }
        }
    }

    fn surface<T>(&self, result: Result<T, MutationError>) -> Result<T, BoardError> {
        result.map_err(|err| self.fail(err.into()))
    }

    /// Logs `err` and reports it on the event channel.
    fn fail(&self, err: BoardError) -> BoardError {
        tracing::warn!(error = %err, "board operation failed");
        self.emit(BoardEvent::Error {
            message: err.to_string(),
        });
        err
    }

    fn emit(&self, event: BoardEvent) {
        if let Err(err) = self.event_tx.try_send(event) {
            tracing::debug!(error = %err, "board event dropped");
        }
    }
}
