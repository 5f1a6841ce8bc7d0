//! Integration tests for concurrent mutations: per-task serialization,
//! independence of different tasks, and confirmations that stop a mutation
//! before it reaches the backend.
//!
//! All tests run on a paused clock, so elapsed time counts backend latency
//! exactly.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use taskboard::backend::memory::InMemoryBackend;
use taskboard::board::{Board, BoardConfig, BoardError, Confirmation};
use taskboard::drag::{TransitionRejected, TransitionTable};
use taskboard::guard::ProjectContext;
use taskboard::mutation::MutationError;
use taskboard_proto::api::TaskPatch;
use taskboard_proto::member::{ProjectId, ProjectMember, Role, UserId};
use taskboard_proto::task::{
    AssigneeList, Priority, Progress, Subtask, SubtaskId, SubtaskStatus, Task, TaskId, TaskStatus,
};

const LATENCY: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn project_id() -> ProjectId {
    ProjectId::new("p1")
}

fn make_task(title: &str) -> Task {
    Task {
        id: TaskId::new(),
        project_id: project_id(),
        title: title.to_string(),
        description: String::new(),
        status: TaskStatus::Todo,
        priority: Priority::Low,
        assigned_to: std::iter::once(UserId::new("admin")).collect::<AssigneeList>(),
        progress: Progress::ZERO,
        due_date: None,
        created_at: Utc::now(),
        created_by: UserId::new("admin"),
        subtasks: Vec::new(),
    }
}

async fn open_board(
    backend: &Arc<InMemoryBackend>,
    serialize_same_task: bool,
) -> Board<InMemoryBackend> {
    open_board_with(
        backend,
        BoardConfig {
            serialize_same_task,
            ..BoardConfig::default()
        },
    )
    .await
}

async fn open_board_with(
    backend: &Arc<InMemoryBackend>,
    config: BoardConfig,
) -> Board<InMemoryBackend> {
    let project = ProjectContext::new(project_id())
        .with_members(vec![ProjectMember::new(UserId::new("admin"), Role::Admin)])
        .with_assign_capability(true);
    let (board, _events) = Board::new(Arc::clone(backend), project, UserId::new("admin"), config);
    board.load().await.unwrap();
    board
}

fn slow_backend(tasks: &[&Task]) -> Arc<InMemoryBackend> {
    let backend = Arc::new(InMemoryBackend::new().with_latency(LATENCY));
    for task in tasks {
        backend.seed_task((*task).clone());
    }
    backend
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn same_task_mutations_run_one_after_another() {
    let task = make_task("shared");
    let backend = slow_backend(&[&task]);
    let board = open_board(&backend, true).await;

    let start = Instant::now();
    let (first, second) = tokio::join!(
        board.move_task(&task.id, TaskStatus::InProgress),
        board.update_task(
            &task.id,
            TaskPatch {
                title: Some("renamed".into()),
                ..TaskPatch::default()
            }
        ),
    );
    let elapsed = start.elapsed();

    first.unwrap();
    let second = second.unwrap();
    assert!(elapsed >= 2 * LATENCY, "ran in {elapsed:?}");
    assert_eq!(second.status, TaskStatus::InProgress);
    assert_eq!(second.title, "renamed");
    assert_eq!(board.store().get(&task.id), backend.task(&task.id));
}

#[tokio::test(start_paused = true)]
async fn later_move_wins_when_serialized() {
    let task = make_task("card");
    let backend = slow_backend(&[&task]);
    let board = open_board(&backend, true).await;

    let (first, second) = tokio::join!(
        board.move_task(&task.id, TaskStatus::InReview),
        board.move_task(&task.id, TaskStatus::Completed),
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(board.store().get(&task.id).unwrap().status, TaskStatus::Completed);
    assert_eq!(backend.task(&task.id).unwrap().status, TaskStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn different_tasks_do_not_wait_for_each_other() {
    let a = make_task("a");
    let b = make_task("b");
    let backend = slow_backend(&[&a, &b]);
    let board = open_board(&backend, true).await;

    let start = Instant::now();
    let (first, second) = tokio::join!(
        board.move_task(&a.id, TaskStatus::InProgress),
        board.move_task(&b.id, TaskStatus::InReview),
    );
    let elapsed = start.elapsed();

    first.unwrap();
    second.unwrap();
    assert!(elapsed < 2 * LATENCY, "ran in {elapsed:?}");
    assert_eq!(board.store().all(), backend.tasks(&project_id()));
}

#[tokio::test(start_paused = true)]
async fn serialization_can_be_turned_off() {
    let task = make_task("shared");
    let backend = slow_backend(&[&task]);
    let board = open_board(&backend, false).await;

    let start = Instant::now();
    let (first, second) = tokio::join!(
        board.assign_users(&task.id, vec![UserId::new("u7")]),
        board.assign_users(&task.id, vec![UserId::new("u9")]),
    );
    let elapsed = start.elapsed();

    first.unwrap();
    second.unwrap();
    assert!(elapsed < 2 * LATENCY, "ran in {elapsed:?}");
    // The server merges both; the last response to land carries the union.
    let server = backend.task(&task.id).unwrap();
    assert!(server.is_assigned(&UserId::new("u7")));
    assert!(server.is_assigned(&UserId::new("u9")));
}

#[tokio::test(start_paused = true)]
async fn subtask_toggles_on_one_task_are_serialized() {
    let task = make_task("parent");
    let backend = slow_backend(&[&task]);
    let subtasks: Vec<Subtask> = (0..2)
        .map(|i| Subtask {
            id: SubtaskId::new(),
            task_id: task.id.clone(),
            title: format!("step {i}"),
            description: String::new(),
            status: SubtaskStatus::Pending,
        })
        .collect();
    for subtask in &subtasks {
        backend.seed_subtask(subtask.clone());
    }
    let board = open_board(&backend, true).await;
    board.open_subtasks(&task.id).await.unwrap();

    let (first, second) = tokio::join!(
        board.toggle_subtask(&task.id, &subtasks[0].id),
        board.toggle_subtask(&task.id, &subtasks[1].id),
    );
    first.unwrap();
    second.unwrap();

    // The parent committed last reflects both completions.
    assert_eq!(board.store().get(&task.id).unwrap().progress, Progress::FULL);
    assert_eq!(board.subtask_preview(&task.id).unwrap().completed, 2);
}

// ---------------------------------------------------------------------------
// Confirmations
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn declined_confirmations_issue_no_request() {
    let task = make_task("keep");
    let backend = slow_backend(&[&task]);
    let subtask = Subtask {
        id: SubtaskId::new(),
        task_id: task.id.clone(),
        title: "keep too".to_string(),
        description: String::new(),
        status: SubtaskStatus::Pending,
    };
    backend.seed_subtask(subtask.clone());
    let board = open_board(&backend, true).await;
    let before = backend.request_count();
    let revision = board.store().revision();

    let (delete, remove) = tokio::join!(
        board.delete_task(&task.id, Confirmation::Declined),
        board.remove_subtask(&task.id, &subtask.id, Confirmation::Declined),
    );

    assert_eq!(delete.unwrap_err(), BoardError::Cancelled);
    assert_eq!(remove.unwrap_err(), BoardError::Cancelled);
    assert_eq!(backend.request_count(), before);
    assert_eq!(board.store().revision(), revision);
    assert!(board.store().contains(&task.id));
}

#[tokio::test(start_paused = true)]
async fn store_subscribers_see_optimistic_and_confirmed_writes() {
    let task = make_task("watched");
    let backend = slow_backend(&[&task]);
    let board = open_board(&backend, true).await;
    let mut revisions = board.store().subscribe();

    let watch = async {
        revisions.changed().await.unwrap();
        board.store().get(&task.id).unwrap().status
    };
    let (moved, first_seen) =
        tokio::join!(board.move_task(&task.id, TaskStatus::InProgress), watch);

    moved.unwrap();
    assert_eq!(first_seen, TaskStatus::InProgress);
    assert!(revisions.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn many_concurrent_assigns_lose_nothing() {
    let task = make_task("crowded");
    let backend = slow_backend(&[&task]);
    let board = open_board(&backend, true).await;
    let users: Vec<UserId> = (0..5).map(|i| UserId::new(format!("u{i}"))).collect();

    let results = futures_util::future::join_all(
        users
            .iter()
            .map(|user| board.assign_users(&task.id, vec![user.clone()])),
    )
    .await;

    assert!(results.iter().all(Result::is_ok));
    let local = board.store().get(&task.id).unwrap();
    for user in &users {
        assert!(local.is_assigned(user), "{user} missing");
    }
    assert_eq!(local.assigned_to, backend.task(&task.id).unwrap().assigned_to);
}

// ---------------------------------------------------------------------------
// Queued moves
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn queued_backward_move_is_checked_against_the_settled_status() {
    let task = make_task("gated");
    let backend = slow_backend(&[&task]);
    let board = open_board_with(
        &backend,
        BoardConfig {
            transitions: TransitionTable::forward_only(),
            ..BoardConfig::default()
        },
    )
    .await;

    let (assigned, forward, backward) = tokio::join!(
        board.assign_users(&task.id, vec![UserId::new("u7")]),
        board.move_task(&task.id, TaskStatus::Completed),
        board.move_task(&task.id, TaskStatus::InProgress),
    );

    assigned.unwrap();
    assert_eq!(forward.unwrap().status, TaskStatus::Completed);
    assert_eq!(
        backward.unwrap_err(),
        BoardError::Mutation(MutationError::Transition(TransitionRejected {
            from: TaskStatus::Completed,
            to: TaskStatus::InProgress,
        }))
    );
    assert_eq!(backend.task(&task.id).unwrap().status, TaskStatus::Completed);
    assert_eq!(board.store().get(&task.id), backend.task(&task.id));
}

#[tokio::test(start_paused = true)]
async fn queued_move_back_to_the_starting_column_is_sent() {
    let task = make_task("round trip");
    let backend = slow_backend(&[&task]);
    let board = open_board(&backend, true).await;
    let before = backend.request_count();

    let (away, back) = tokio::join!(
        board.move_task(&task.id, TaskStatus::InProgress),
        board.move_task(&task.id, TaskStatus::Todo),
    );

    away.unwrap();
    assert_eq!(back.unwrap().status, TaskStatus::Todo);
    assert_eq!(backend.request_count(), before + 2);
    assert_eq!(backend.task(&task.id).unwrap().status, TaskStatus::Todo);
    assert_eq!(board.store().get(&task.id).unwrap().status, TaskStatus::Todo);
}

// ---------------------------------------------------------------------------
// Deletes racing list refetches
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn delete_is_not_undone_by_a_refetch_landing_in_flight() {
    let task = make_task("gone");
    let keep = make_task("kept");
    let backend = slow_backend(&[&task, &keep]);
    let board = open_board(&backend, true).await;

    // The listing is read server-side before the delete lands, so it still
    // carries the task when it replaces the store.
    let delete_later = async {
        tokio::time::sleep(LATENCY / 2).await;
        board.delete_task(&task.id, Confirmation::Confirmed).await
    };
    let (refreshed, deleted) = tokio::join!(board.refresh(), delete_later);

    assert_eq!(refreshed.unwrap(), 2);
    deleted.unwrap();
    assert!(backend.task(&task.id).is_none());
    assert!(!board.store().contains(&task.id));
    assert_eq!(board.store().all(), backend.tasks(&project_id()));
}
