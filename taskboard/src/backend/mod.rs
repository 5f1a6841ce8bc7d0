//! Backend abstraction for `Taskboard`.
//!
//! Defines the [`TaskBackend`] trait: one async request/response method per
//! endpoint the board consumes. Implementations decide how requests travel.
//! - [`memory::InMemoryBackend`]: in-process backend with server semantics,
//!   failure injection and request counting, for tests and the demo binary

pub mod memory;

use std::future::Future;
use std::time::Duration;

use taskboard_proto::api::{
    Ack, AssignRequest, NewSubtask, NewTask, SubtaskStatusRequest, SubtaskStatusResponse,
    TaskPatch, UnassignRequest,
};
use taskboard_proto::codec::CodecError;
use taskboard_proto::member::ProjectId;
use taskboard_proto::task::{Subtask, SubtaskId, Task, TaskId};

/// Errors that can occur while talking to the backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The backend answered with an error status.
    #[error("request failed with status {status}: {message}")]
    Status {
        /// HTTP-style status code.
        status: u16,
        /// Message returned by the server.
        message: String,
    },

    /// The addressed entity does not exist on the server.
    #[error("not found: {0}")]
    NotFound(String),

    /// The server rejected the request as invalid.
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// The response body could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Returns `true` for failures worth retrying (connectivity, timeouts,
    /// server-side 5xx errors).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status >= 500,
            Self::NotFound(_) | Self::Rejected(_) | Self::Decode(_) => false,
        }
    }
}

impl From<CodecError> for BackendError {
    fn from(err: CodecError) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Async request/response interface to the task backend.
///
/// Every method maps to exactly one endpoint (see
/// [`taskboard_proto::api::Endpoint`]). Returned entities are the server's
/// authoritative copies. Calls are lazy: nothing is sent until the returned
/// future is polled.
pub trait TaskBackend: Send + Sync {
    /// `GET tasks?projectId=`
    fn list_tasks(
        &self,
        project: &ProjectId,
    ) -> impl Future<Output = Result<Vec<Task>, BackendError>> + Send;

    /// `POST tasks`
    fn create_task(
        &self,
        task: &NewTask,
    ) -> impl Future<Output = Result<Task, BackendError>> + Send;

    /// `PUT tasks/{id}`
    fn update_task(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> impl Future<Output = Result<Task, BackendError>> + Send;

    /// `DELETE tasks/{id}`
    fn delete_task(&self, id: &TaskId) -> impl Future<Output = Result<Ack, BackendError>> + Send;

    /// `PUT tasks/{id}/assign`
    fn assign_users(
        &self,
        id: &TaskId,
        request: &AssignRequest,
    ) -> impl Future<Output = Result<Task, BackendError>> + Send;

    /// `PUT tasks/{id}/unassign`
    fn unassign_user(
        &self,
        id: &TaskId,
        request: &UnassignRequest,
    ) -> impl Future<Output = Result<Task, BackendError>> + Send;

    /// `GET task/{id}/subtasks`
    fn list_subtasks(
        &self,
        task: &TaskId,
    ) -> impl Future<Output = Result<Vec<Subtask>, BackendError>> + Send;

    /// `POST task/{id}/subtasks`
    fn create_subtask(
        &self,
        task: &TaskId,
        subtask: &NewSubtask,
    ) -> impl Future<Output = Result<Subtask, BackendError>> + Send;

    /// `DELETE subtasks/{id}`
    fn delete_subtask(
        &self,
        id: &SubtaskId,
    ) -> impl Future<Output = Result<Ack, BackendError>> + Send;

    /// `PATCH subtasks/{id}/status`
    fn set_subtask_status(
        &self,
        id: &SubtaskId,
        request: SubtaskStatusRequest,
    ) -> impl Future<Output = Result<SubtaskStatusResponse, BackendError>> + Send;
}

/// Retry behavior for read requests issued during reconciliation.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Number of additional attempts after a transient failure.
    pub retries: u32,
    /// Delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 1,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Runs `op`, retrying transient failures up to `config.retries` times.
///
/// Non-transient errors (not found, rejected, decode) are returned
/// immediately.
///
/// # Errors
///
/// Returns the last error if every attempt fails.
pub async fn with_retries<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    mut op: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < config.retries => {
                attempt += 1;
                tracing::warn!(
                    operation,
                    attempt,
                    error = %err,
                    "transient backend failure, retrying"
                );
                tokio::time::sleep(config.backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}
