//! In-process task backend.
//!
//! [`InMemoryBackend`] keeps the server-side state behind a mutex and answers
//! requests with the same semantics the REST backend has: assignment is a
//! union applied in arrival order, subtask mutations recompute the parent's
//! progress, and deleting a task deletes its subtasks. Every response body is
//! encoded and decoded with the wire codec before it is returned, so callers
//! see exactly what a JSON client would. Tests use the failure injection and
//! request counter to observe what the engine sends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use taskboard_proto::api::{
    Ack, AssignRequest, Endpoint, NewSubtask, NewTask, SubtaskStatusRequest,
    SubtaskStatusResponse, TaskPatch, UnassignRequest,
};
use taskboard_proto::codec;
use taskboard_proto::member::{ProjectId, UserId};
use taskboard_proto::task::{
    AssigneeList, Progress, Subtask, SubtaskId, SubtaskStatus, Task, TaskId, TaskStatus,
};

use super::{BackendError, TaskBackend};

#[derive(Debug, Default)]
struct ServerState {
    tasks: Vec<Task>,
    subtasks: Vec<Subtask>,
}

impl ServerState {
    fn task_mut(&mut self, id: &TaskId) -> Result<&mut Task, BackendError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == *id)
            .ok_or_else(|| BackendError::NotFound(format!("task {id}")))
    }

    /// Recomputes `progress` and the subtask id list of a task from its subtasks.
    fn recompute(&mut self, task_id: &TaskId) {
        let children: Vec<&Subtask> = self
            .subtasks
            .iter()
            .filter(|s| s.task_id == *task_id)
            .collect();
        let completed = children.iter().filter(|s| s.status.is_completed()).count();
        let progress = Progress::from_ratio(completed, children.len());
        let ids = children.iter().map(|s| s.id.clone()).collect();
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == *task_id) {
            task.progress = progress;
            task.subtasks = ids;
        }
    }
}

/// Sends a response body over the wire format and back.
fn respond<T: Serialize + DeserializeOwned>(body: &T) -> Result<T, BackendError> {
    let bytes = codec::encode(body)?;
    Ok(codec::decode(&bytes)?)
}

#[derive(Debug, Default)]
struct FailurePlan {
    offline: bool,
    fail_next: usize,
}

/// Task backend that lives in process memory.
pub struct InMemoryBackend {
    state: Mutex<ServerState>,
    failures: Mutex<FailurePlan>,
    requests: AtomicUsize,
    latency: Duration,
    acting_user: UserId,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// Creates an empty backend with no latency.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServerState::default()),
            failures: Mutex::new(FailurePlan::default()),
            requests: AtomicUsize::new(0),
            latency: Duration::ZERO,
            acting_user: UserId::new("server"),
        }
    }

    /// Delays every request by `latency` before it is applied.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Records `user` as the creator of tasks created through this backend.
    #[must_use]
    pub fn with_acting_user(mut self, user: UserId) -> Self {
        self.acting_user = user;
        self
    }

    /// Inserts a task directly into server state, bypassing the request path.
    pub fn seed_task(&self, task: Task) {
        let mut state = self.state.lock();
        state.tasks.retain(|t| t.id != task.id);
        state.tasks.push(task);
    }

    /// Inserts a subtask directly into server state and recomputes its
    /// parent's progress.
    pub fn seed_subtask(&self, subtask: Subtask) {
        let mut state = self.state.lock();
        let parent = subtask.task_id.clone();
        state.subtasks.retain(|s| s.id != subtask.id);
        state.subtasks.push(subtask);
        state.recompute(&parent);
    }

    /// Changes a task's status as if another client had done it.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] if the task does not exist.
    pub fn set_status_externally(
        &self,
        id: &TaskId,
        status: TaskStatus,
    ) -> Result<(), BackendError> {
        self.state.lock().task_mut(id)?.status = status;
        Ok(())
    }

    /// Returns the server's copy of a task.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.state.lock().tasks.iter().find(|t| t.id == *id).cloned()
    }

    /// Returns the server's copies of all tasks in a project, in creation order.
    #[must_use]
    pub fn tasks(&self, project: &ProjectId) -> Vec<Task> {
        self.state
            .lock()
            .tasks
            .iter()
            .filter(|t| t.project_id == *project)
            .cloned()
            .collect()
    }

    /// Returns the server's copies of a task's subtasks.
    #[must_use]
    pub fn subtasks_of(&self, task: &TaskId) -> Vec<Subtask> {
        self.state
            .lock()
            .subtasks
            .iter()
            .filter(|s| s.task_id == *task)
            .cloned()
            .collect()
    }

    /// While `offline` is set every request fails with
    /// [`BackendError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.failures.lock().offline = offline;
    }

    /// Makes the next `count` requests fail with [`BackendError::Unavailable`].
    pub fn fail_next(&self, count: usize) {
        self.failures.lock().fail_next = count;
    }

    /// Number of requests received so far, including failed ones.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Counts the request, applies latency, then checks injected failures.
    async fn begin(&self, endpoint: &Endpoint) -> Result<(), BackendError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%endpoint, "backend request");
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut failures = self.failures.lock();
        if failures.offline {
            return Err(BackendError::Unavailable(format!("{endpoint}: offline")));
        }
        if failures.fail_next > 0 {
            failures.fail_next -= 1;
            return Err(BackendError::Unavailable(format!("{endpoint}: injected failure")));
        }
        Ok(())
    }
}

impl TaskBackend for InMemoryBackend {
    async fn list_tasks(&self, project: &ProjectId) -> Result<Vec<Task>, BackendError> {
        self.begin(&Endpoint::ListTasks(project.clone())).await?;
        respond(&self.tasks(project))
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task, BackendError> {
        self.begin(&Endpoint::CreateTask).await?;
        if task.title.trim().is_empty() {
            return Err(BackendError::Rejected("title is required".to_string()));
        }
        let created = Task {
            id: TaskId::new(),
            project_id: task.project_id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            status: TaskStatus::Todo,
            priority: task.priority,
            assigned_to: task.assigned_to.iter().cloned().collect::<AssigneeList>(),
            progress: Progress::ZERO,
            due_date: task.due_date,
            created_at: Utc::now(),
            created_by: self.acting_user.clone(),
            subtasks: Vec::new(),
        };
        self.state.lock().tasks.push(created.clone());
        respond(&created)
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, BackendError> {
        self.begin(&Endpoint::UpdateTask(id.clone())).await?;
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(BackendError::Rejected("title cannot be empty".to_string()));
        }
        let mut state = self.state.lock();
        let task = state.task_mut(id)?;
        patch.apply_to(task);
        respond(&*task)
    }

    async fn delete_task(&self, id: &TaskId) -> Result<Ack, BackendError> {
        self.begin(&Endpoint::DeleteTask(id.clone())).await?;
        let mut state = self.state.lock();
        state.task_mut(id)?;
        state.tasks.retain(|t| t.id != *id);
        state.subtasks.retain(|s| s.task_id != *id);
        respond(&Ack {
            message: Some("task deleted".to_string()),
        })
    }

    async fn assign_users(
        &self,
        id: &TaskId,
        request: &AssignRequest,
    ) -> Result<Task, BackendError> {
        self.begin(&Endpoint::AssignUsers(id.clone())).await?;
        let mut state = self.state.lock();
        let task = state.task_mut(id)?;
        for user in &request.user_ids {
            task.assigned_to.insert(user.clone());
        }
        respond(&*task)
    }

    async fn unassign_user(
        &self,
        id: &TaskId,
        request: &UnassignRequest,
    ) -> Result<Task, BackendError> {
        self.begin(&Endpoint::UnassignUser(id.clone())).await?;
        let mut state = self.state.lock();
        let task = state.task_mut(id)?;
        task.assigned_to.remove(&request.user_id);
        respond(&*task)
    }

    async fn list_subtasks(&self, task: &TaskId) -> Result<Vec<Subtask>, BackendError> {
        self.begin(&Endpoint::ListSubtasks(task.clone())).await?;
        let mut state = self.state.lock();
        state.task_mut(task)?;
        let subtasks: Vec<Subtask> = state
            .subtasks
            .iter()
            .filter(|s| s.task_id == *task)
            .cloned()
            .collect();
        respond(&subtasks)
    }

    async fn create_subtask(
        &self,
        task: &TaskId,
        subtask: &NewSubtask,
    ) -> Result<Subtask, BackendError> {
        self.begin(&Endpoint::CreateSubtask(task.clone())).await?;
        if subtask.title.trim().is_empty() {
            return Err(BackendError::Rejected("subtask title is required".to_string()));
        }
        let mut state = self.state.lock();
        state.task_mut(task)?;
        let created = Subtask {
            id: SubtaskId::new(),
            task_id: task.clone(),
            title: subtask.title.clone(),
            description: subtask.description.clone(),
            status: SubtaskStatus::Pending,
        };
        state.subtasks.push(created.clone());
        state.recompute(task);
        respond(&created)
    }

    async fn delete_subtask(&self, id: &SubtaskId) -> Result<Ack, BackendError> {
        self.begin(&Endpoint::DeleteSubtask(id.clone())).await?;
        let mut state = self.state.lock();
        let parent = state
            .subtasks
            .iter()
            .find(|s| s.id == *id)
            .map(|s| s.task_id.clone())
            .ok_or_else(|| BackendError::NotFound(format!("subtask {id}")))?;
        state.subtasks.retain(|s| s.id != *id);
        state.recompute(&parent);
        respond(&Ack {
            message: Some("subtask deleted".to_string()),
        })
    }

    async fn set_subtask_status(
        &self,
        id: &SubtaskId,
        request: SubtaskStatusRequest,
    ) -> Result<SubtaskStatusResponse, BackendError> {
        self.begin(&Endpoint::SetSubtaskStatus(id.clone())).await?;
        let mut state = self.state.lock();
        let subtask = state
            .subtasks
            .iter_mut()
            .find(|s| s.id == *id)
            .ok_or_else(|| BackendError::NotFound(format!("subtask {id}")))?;
        subtask.status = if request.completed {
            SubtaskStatus::Completed
        } else {
            SubtaskStatus::Pending
        };
        let subtask = subtask.clone();
        state.recompute(&subtask.task_id);
        let task = state.task_mut(&subtask.task_id)?.clone();
        respond(&SubtaskStatusResponse { subtask, task })
    }
}
