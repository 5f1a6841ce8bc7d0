//! Request and response bodies for the task backend.
//!
//! Each [`Endpoint`] names one backend operation together with its HTTP
//! method and path. The body types below are what the engine sends and
//! expects back; how they travel is left to the `TaskBackend`
//! implementation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::member::{ProjectId, UserId};
use crate::task::{Priority, Subtask, SubtaskId, Task, TaskId, TaskStatus};

/// HTTP method of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A backend endpoint consumed by the board engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// List all tasks of a project.
    ListTasks(ProjectId),
    /// Create a task.
    CreateTask,
    /// Update task fields (including status).
    UpdateTask(TaskId),
    /// Delete a task.
    DeleteTask(TaskId),
    /// Add users to a task's assignee set.
    AssignUsers(TaskId),
    /// Remove a user from a task's assignee set.
    UnassignUser(TaskId),
    /// List a task's subtasks.
    ListSubtasks(TaskId),
    /// Create a subtask under a task.
    CreateSubtask(TaskId),
    /// Delete a subtask.
    DeleteSubtask(SubtaskId),
    /// Set a subtask's completion status.
    SetSubtaskStatus(SubtaskId),
}

impl Endpoint {
    /// HTTP method used by this endpoint.
    #[must_use]
    pub const fn method(&self) -> Method {
        match self {
            Self::ListTasks(_) | Self::ListSubtasks(_) => Method::Get,
            Self::CreateTask | Self::CreateSubtask(_) => Method::Post,
            Self::UpdateTask(_) | Self::AssignUsers(_) | Self::UnassignUser(_) => Method::Put,
            Self::SetSubtaskStatus(_) => Method::Patch,
            Self::DeleteTask(_) | Self::DeleteSubtask(_) => Method::Delete,
        }
    }

    /// Request path relative to the API root, including any query string.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::ListTasks(project) => format!("tasks?projectId={project}"),
            Self::CreateTask => "tasks".to_string(),
            Self::UpdateTask(id) | Self::DeleteTask(id) => format!("tasks/{id}"),
            Self::AssignUsers(id) => format!("tasks/{id}/assign"),
            Self::UnassignUser(id) => format!("tasks/{id}/unassign"),
            Self::ListSubtasks(id) | Self::CreateSubtask(id) => format!("task/{id}/subtasks"),
            Self::DeleteSubtask(id) => format!("subtasks/{id}"),
            Self::SetSubtaskStatus(id) => format!("subtasks/{id}/status"),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method(), self.path())
    }
}

/// Body of `POST tasks`. The server assigns the identifier, creation
/// metadata and the initial `todo` status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    /// Owning project.
    pub project_id: ProjectId,
    /// Title.
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Priority.
    #[serde(default)]
    pub priority: Priority,
    /// Optional due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// Users to assign at creation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assigned_to: Vec<UserId>,
}

impl NewTask {
    /// Creates a request with only a title set.
    pub fn new(project_id: ProjectId, title: impl Into<String>) -> Self {
        Self {
            project_id,
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            due_date: None,
            assigned_to: Vec::new(),
        }
    }
}

/// Body of `PUT tasks/{id}`: the fields to change. Absent fields are left
/// untouched by the server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// New priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// New due date; `Some(None)` clears it and serializes as `null`.
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    /// A patch that only moves the task to `status`.
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
    }

    /// Writes the present fields into `task`.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            task.description.clone_from(description);
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
    }
}

/// Distinguishes an explicit `null` from an absent field.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Body of `PUT tasks/{id}/assign`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    /// Users to add.
    pub user_ids: Vec<UserId>,
}

/// Body of `PUT tasks/{id}/unassign`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnassignRequest {
    /// User to remove.
    pub user_id: UserId,
}

/// Body of `POST task/{id}/subtasks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubtask {
    /// Title.
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: String,
}

impl NewSubtask {
    /// Creates a request with an empty description.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
        }
    }
}

/// Body of `PATCH subtasks/{id}/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskStatusRequest {
    /// Desired completion state.
    pub completed: bool,
}

/// Response of `PATCH subtasks/{id}/status`: the updated subtask and its
/// parent task carrying the recomputed progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskStatusResponse {
    /// The updated subtask.
    pub subtask: Subtask,
    /// The parent task after progress recomputation.
    pub task: Task,
}

/// Acknowledgement returned by delete endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ack {
    /// Optional human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
