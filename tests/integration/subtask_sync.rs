//! Integration tests for the Subtask Cache as driven through the board:
//! lazy loading with staleness, status toggles, creation and removal, and
//! how failures leave the cache.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use taskboard::backend::memory::InMemoryBackend;
use taskboard::board::{Board, BoardConfig, BoardError, Confirmation};
use taskboard::guard::{PermissionDenied, ProjectContext};
use taskboard::mutation::{MutationError, ReconcilePolicy, Reconciliation};
use taskboard_proto::member::{ProjectId, ProjectMember, Role, UserId};
use taskboard_proto::task::{
    AssigneeList, Priority, Progress, Subtask, SubtaskId, SubtaskStatus, Task, TaskId, TaskStatus,
};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn project_id() -> ProjectId {
    ProjectId::new("p1")
}

/// A task assigned to `dev`, with `done` of `total` subtasks completed.
fn seed(backend: &InMemoryBackend, total: usize, done: usize) -> (Task, Vec<Subtask>) {
    let task = Task {
        id: TaskId::new(),
        project_id: project_id(),
        title: "Parent".to_string(),
        description: String::new(),
        status: TaskStatus::InProgress,
        priority: Priority::Medium,
        assigned_to: std::iter::once(UserId::new("dev")).collect::<AssigneeList>(),
        progress: Progress::ZERO,
        due_date: None,
        created_at: Utc::now(),
        created_by: UserId::new("admin"),
        subtasks: Vec::new(),
    };
    backend.seed_task(task.clone());
    let subtasks: Vec<Subtask> = (0..total)
        .map(|i| Subtask {
            id: SubtaskId::new(),
            task_id: task.id.clone(),
            title: format!("step {i}"),
            description: String::new(),
            status: if i < done {
                SubtaskStatus::Completed
            } else {
                SubtaskStatus::Pending
            },
        })
        .collect();
    for subtask in &subtasks {
        backend.seed_subtask(subtask.clone());
    }
    (task, subtasks)
}

async fn open_board(
    backend: &Arc<InMemoryBackend>,
    user: &str,
    policy: ReconcilePolicy,
) -> Board<InMemoryBackend> {
    let project = ProjectContext::new(project_id()).with_members(vec![
        ProjectMember::new(UserId::new("admin"), Role::Admin),
        ProjectMember::new(UserId::new("dev"), Role::Member),
    ]);
    let (board, _events) = Board::new(
        Arc::clone(backend),
        project,
        UserId::new(user),
        BoardConfig {
            policy,
            ..BoardConfig::default()
        },
    );
    board.load().await.unwrap();
    board
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn open_reuses_fresh_list_and_refetches_stale_one() {
    let backend = Arc::new(InMemoryBackend::new());
    let (task, subtasks) = seed(&backend, 2, 0);
    let board = open_board(&backend, "dev", ReconcilePolicy::Refetch).await;

    let first = board.open_subtasks(&task.id).await.unwrap();
    assert_eq!(first, subtasks);
    let after_first = backend.request_count();

    tokio::time::advance(Duration::from_secs(10)).await;
    board.open_subtasks(&task.id).await.unwrap();
    assert_eq!(backend.request_count(), after_first);

    tokio::time::advance(Duration::from_secs(25)).await;
    assert!(board.subtasks().is_stale(&task.id));
    board.open_subtasks(&task.id).await.unwrap();
    assert_eq!(backend.request_count(), after_first + 1);
    assert!(!board.subtasks().is_stale(&task.id));
}

#[tokio::test]
async fn open_for_unknown_task_reports_load_error() {
    let backend = Arc::new(InMemoryBackend::new());
    let board = open_board(&backend, "dev", ReconcilePolicy::Refetch).await;

    let err = board.open_subtasks(&TaskId::new()).await.unwrap_err();

    assert!(matches!(err, BoardError::Load(_)));
}

// ---------------------------------------------------------------------------
// Toggle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn toggle_twice_restores_status_and_progress() {
    let backend = Arc::new(InMemoryBackend::new());
    let (task, subtasks) = seed(&backend, 4, 1);
    let board = open_board(&backend, "dev", ReconcilePolicy::Refetch).await;
    board.open_subtasks(&task.id).await.unwrap();
    let target = &subtasks[3].id;
    assert_eq!(board.store().get(&task.id).unwrap().progress, Progress::new(25));

    let toggled = board.toggle_subtask(&task.id, target).await.unwrap();
    assert_eq!(toggled.status, SubtaskStatus::Completed);
    assert_eq!(board.store().get(&task.id).unwrap().progress, Progress::new(50));
    assert_eq!(board.subtask_preview(&task.id).unwrap().percent, 50);

    let back = board.toggle_subtask(&task.id, target).await.unwrap();
    assert_eq!(back.status, SubtaskStatus::Pending);
    assert_eq!(board.store().get(&task.id).unwrap().progress, Progress::new(25));
    assert_eq!(board.subtasks().get(&task.id).unwrap(), subtasks);
    assert!(!board.subtasks().is_pending(&task.id, target));
}

#[tokio::test(start_paused = true)]
async fn toggle_is_marked_pending_while_in_flight() {
    let backend = Arc::new(InMemoryBackend::new().with_latency(Duration::from_millis(100)));
    let (task, subtasks) = seed(&backend, 1, 0);
    let board = open_board(&backend, "dev", ReconcilePolicy::Refetch).await;
    board.open_subtasks(&task.id).await.unwrap();
    let target = &subtasks[0].id;

    let observe = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        board.subtasks().is_pending(&task.id, target)
    };
    let (result, pending_in_flight) = tokio::join!(board.toggle_subtask(&task.id, target), observe);

    assert!(pending_in_flight);
    assert_eq!(result.unwrap().status, SubtaskStatus::Completed);
    assert!(!board.subtasks().is_pending(&task.id, target));
    assert_eq!(board.store().get(&task.id).unwrap().progress, Progress::FULL);
}

#[tokio::test]
async fn failed_toggle_clears_marker_and_keeps_status() {
    let backend = Arc::new(InMemoryBackend::new());
    let (task, subtasks) = seed(&backend, 2, 0);
    let board = open_board(&backend, "dev", ReconcilePolicy::Refetch).await;
    board.open_subtasks(&task.id).await.unwrap();
    let target = &subtasks[0].id;

    backend.fail_next(1);
    let err = board.toggle_subtask(&task.id, target).await.unwrap_err();

    assert!(matches!(
        err,
        BoardError::Mutation(MutationError::Failed {
            reconciliation: Reconciliation::None,
            ..
        })
    ));
    assert!(!board.subtasks().is_pending(&task.id, target));
    assert_eq!(board.subtasks().get(&task.id).unwrap(), subtasks);
    assert_eq!(backend.subtasks_of(&task.id), subtasks);
}

#[tokio::test]
async fn unassigned_user_cannot_toggle() {
    let backend = Arc::new(InMemoryBackend::new());
    let (task, subtasks) = seed(&backend, 1, 0);
    let board = open_board(&backend, "admin", ReconcilePolicy::Refetch).await;
    board.open_subtasks(&task.id).await.unwrap();
    let before = backend.request_count();

    let err = board
        .toggle_subtask(&task.id, &subtasks[0].id)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        BoardError::Mutation(MutationError::Permission(PermissionDenied::NotAssigned))
    );
    assert_eq!(backend.request_count(), before);
}

// ---------------------------------------------------------------------------
// Add and remove
// ---------------------------------------------------------------------------

#[tokio::test]
async fn declined_removal_sends_nothing() {
    let backend = Arc::new(InMemoryBackend::new());
    let (task, subtasks) = seed(&backend, 2, 0);
    let board = open_board(&backend, "dev", ReconcilePolicy::Refetch).await;
    board.open_subtasks(&task.id).await.unwrap();
    let before = backend.request_count();

    let err = board
        .remove_subtask(&task.id, &subtasks[0].id, Confirmation::Declined)
        .await
        .unwrap_err();

    assert_eq!(err, BoardError::Cancelled);
    assert_eq!(backend.request_count(), before);
    assert_eq!(board.subtasks().get(&task.id).unwrap(), subtasks);
}

#[tokio::test]
async fn confirmed_removal_updates_list_and_parent_progress() {
    let backend = Arc::new(InMemoryBackend::new());
    let (task, subtasks) = seed(&backend, 2, 1);
    let board = open_board(&backend, "dev", ReconcilePolicy::Refetch).await;
    board.open_subtasks(&task.id).await.unwrap();
    assert_eq!(board.store().get(&task.id).unwrap().progress, Progress::new(50));

    board
        .remove_subtask(&task.id, &subtasks[1].id, Confirmation::Confirmed)
        .await
        .unwrap();

    assert_eq!(board.subtasks().get(&task.id).unwrap(), vec![subtasks[0].clone()]);
    let parent = board.store().get(&task.id).unwrap();
    assert_eq!(parent.progress, Progress::FULL);
    assert_eq!(parent.subtasks, vec![subtasks[0].id.clone()]);
}

#[tokio::test]
async fn removing_unknown_subtask_is_refused() {
    let backend = Arc::new(InMemoryBackend::new());
    let (task, _subtasks) = seed(&backend, 1, 0);
    let board = open_board(&backend, "dev", ReconcilePolicy::Refetch).await;
    board.open_subtasks(&task.id).await.unwrap();
    let before = backend.request_count();

    let missing = SubtaskId::new();
    let err = board
        .remove_subtask(&task.id, &missing, Confirmation::Confirmed)
        .await
        .unwrap_err();

    assert_eq!(err, BoardError::Mutation(MutationError::SubtaskNotFound(missing)));
    assert_eq!(backend.request_count(), before);
}

#[tokio::test]
async fn failed_add_refetches_the_list() {
    let backend = Arc::new(InMemoryBackend::new());
    let (task, subtasks) = seed(&backend, 1, 0);
    let board = open_board(&backend, "dev", ReconcilePolicy::Refetch).await;
    board.open_subtasks(&task.id).await.unwrap();

    backend.fail_next(1);
    let err = board.add_subtask(&task.id, "Write tests").await.unwrap_err();

    assert!(matches!(
        err,
        BoardError::Mutation(MutationError::Failed {
            reconciliation: Reconciliation::Refetched,
            ..
        })
    ));
    assert_eq!(board.subtasks().get(&task.id).unwrap(), subtasks);
}

#[tokio::test]
async fn failed_removal_rolls_back_the_list() {
    let backend = Arc::new(InMemoryBackend::new());
    let (task, subtasks) = seed(&backend, 3, 0);
    let board = open_board(&backend, "dev", ReconcilePolicy::Rollback).await;
    board.open_subtasks(&task.id).await.unwrap();

    backend.fail_next(1);
    let err = board
        .remove_subtask(&task.id, &subtasks[1].id, Confirmation::Confirmed)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BoardError::Mutation(MutationError::Failed {
            reconciliation: Reconciliation::RolledBack,
            ..
        })
    ));
    assert_eq!(board.subtasks().get(&task.id).unwrap(), subtasks);
}

#[tokio::test]
async fn blank_subtask_title_is_rejected_locally() {
    let backend = Arc::new(InMemoryBackend::new());
    let (task, _subtasks) = seed(&backend, 0, 0);
    let board = open_board(&backend, "dev", ReconcilePolicy::Refetch).await;
    let before = backend.request_count();

    let err = board.add_subtask(&task.id, "   ").await.unwrap_err();

    assert!(matches!(err, BoardError::Mutation(MutationError::Validation(_))));
    assert_eq!(backend.request_count(), before);
}

#[tokio::test]
async fn deleting_task_drops_its_cached_subtasks() {
    let backend = Arc::new(InMemoryBackend::new());
    let (task, _subtasks) = seed(&backend, 2, 0);
    let board = open_board(&backend, "admin", ReconcilePolicy::Refetch).await;
    board.open_subtasks(&task.id).await.unwrap();
    assert!(board.subtasks().contains(&task.id));

    board
        .delete_task(&task.id, Confirmation::Confirmed)
        .await
        .unwrap();

    assert!(!board.subtasks().contains(&task.id));
    assert!(backend.subtasks_of(&task.id).is_empty());
}
