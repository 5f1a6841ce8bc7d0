//! Property-based tests for the board view pipeline and the pure helpers
//! around it.
//!
//! 1. Filtering and sorting commute.
//! 2. The view holds exactly the matching tasks, ordered by the sort key.
//! 3. Columns partition the view by status.
//! 4. Subtask progress previews stay in range and toggling twice is a no-op.
//! 5. The forward-only table refuses exactly the backward moves.

#![allow(clippy::unwrap_used)]

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use taskboard::drag::TransitionTable;
use taskboard::subtasks::ProgressPreview;
use taskboard::view::{
    self, PriorityFilter, SortKey, SortOrder, ViewParams, columns, compare, filter, matches, sort,
};
use taskboard_proto::member::{ProjectId, UserId};
use taskboard_proto::task::{
    AssigneeList, Priority, Progress, Subtask, SubtaskId, SubtaskStatus, Task, TaskId, TaskStatus,
};

// --- Strategies ---

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop::sample::select(TaskStatus::ALL.to_vec())
}

fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![Just(Priority::Low), Just(Priority::Medium), Just(Priority::High)]
}

fn arb_user() -> impl Strategy<Value = UserId> {
    (0u8..4).prop_map(|n| UserId::new(format!("u{n}")))
}

/// Strategy for tasks with coarse field values, so ties are common.
fn arb_task() -> impl Strategy<Value = Task> {
    (
        prop::sample::select(vec!["Login page", "Deploy", "API docs", "login bug", "Review"]),
        arb_status(),
        arb_priority(),
        prop::collection::vec(arb_user(), 0..3),
        0u32..=100,
        proptest::option::of(0i64..5),
        0i64..6,
    )
        .prop_map(|(title, status, priority, users, progress, due, created)| {
            let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            Task {
                id: TaskId::new(),
                project_id: ProjectId::new("p1"),
                title: title.to_string(),
                description: String::new(),
                status,
                priority,
                assigned_to: users.into_iter().collect::<AssigneeList>(),
                progress: Progress::new(progress / 25 * 25),
                due_date: due.map(|d| base + Duration::days(d)),
                created_at: base + Duration::hours(created),
                created_by: UserId::new("admin"),
                subtasks: Vec::new(),
            }
        })
}

fn arb_params() -> impl Strategy<Value = ViewParams> {
    (
        prop::sample::select(vec!["", "login", "DEPLOY", "  ", "zzz"]),
        prop_oneof![
            Just(PriorityFilter::All),
            arb_priority().prop_map(PriorityFilter::Only)
        ],
        proptest::option::of(arb_user()),
        prop::sample::select(vec![
            SortKey::CreatedAt,
            SortKey::DueDate,
            SortKey::Priority,
            SortKey::Progress,
        ]),
        prop_oneof![Just(SortOrder::Asc), Just(SortOrder::Desc)],
    )
        .prop_map(|(search, priority, assignee, sort_key, sort_order)| ViewParams {
            search: search.to_string(),
            priority,
            assignee,
            sort_key,
            sort_order,
        })
}

fn ids(tasks: &[&Task]) -> Vec<TaskId> {
    tasks.iter().map(|t| t.id.clone()).collect()
}

proptest! {
    #[test]
    fn filter_and_sort_commute(
        tasks in prop::collection::vec(arb_task(), 0..24),
        params in arb_params(),
    ) {
        let filtered_then_sorted = view::view(&tasks, &params);

        let mut all: Vec<&Task> = tasks.iter().collect();
        sort(&mut all, params.sort_key, params.sort_order);
        let sorted_then_filtered = filter(all, &params);

        prop_assert_eq!(ids(&filtered_then_sorted), ids(&sorted_then_filtered));
    }

    #[test]
    fn view_holds_matching_tasks_in_key_order(
        tasks in prop::collection::vec(arb_task(), 0..24),
        params in arb_params(),
    ) {
        let visible = view::view(&tasks, &params);

        let expected = tasks.iter().filter(|t| matches(t, &params)).count();
        prop_assert_eq!(visible.len(), expected);
        for pair in visible.windows(2) {
            let ordering = compare(pair[0], pair[1], params.sort_key);
            match params.sort_order {
                SortOrder::Asc => prop_assert!(ordering.is_le()),
                SortOrder::Desc => prop_assert!(ordering.is_ge()),
            }
        }
    }

    #[test]
    fn columns_partition_the_view(
        tasks in prop::collection::vec(arb_task(), 0..24),
        params in arb_params(),
    ) {
        let visible = view::view(&tasks, &params);
        let board = columns(&tasks, &params);

        prop_assert_eq!(board.len(), TaskStatus::ALL.len());
        let total: usize = board.iter().map(|c| c.tasks.len()).sum();
        prop_assert_eq!(total, visible.len());
        for (column, status) in board.iter().zip(TaskStatus::ALL) {
            prop_assert_eq!(column.status, status);
            let in_view: Vec<TaskId> = visible
                .iter()
                .filter(|t| t.status == status)
                .map(|t| t.id.clone())
                .collect();
            let in_column: Vec<TaskId> = column.tasks.iter().map(|t| t.id.clone()).collect();
            prop_assert_eq!(in_column, in_view);
        }
    }

    #[test]
    fn preview_is_in_range_and_toggle_twice_is_identity(
        statuses in prop::collection::vec(any::<bool>(), 0..20),
        pick in any::<prop::sample::Index>(),
    ) {
        let task_id = TaskId::new();
        let mut subtasks: Vec<Subtask> = statuses
            .iter()
            .map(|done| Subtask {
                id: SubtaskId::new(),
                task_id: task_id.clone(),
                title: "step".to_string(),
                description: String::new(),
                status: if *done { SubtaskStatus::Completed } else { SubtaskStatus::Pending },
            })
            .collect();
        let before = ProgressPreview::from_subtasks(&subtasks);
        prop_assert!(before.percent <= 100);
        prop_assert!(before.completed <= before.total);

        if !subtasks.is_empty() {
            let i = pick.index(subtasks.len());
            subtasks[i].status = subtasks[i].status.toggled();
            let once = ProgressPreview::from_subtasks(&subtasks);
            prop_assert_ne!(once.completed, before.completed);
            subtasks[i].status = subtasks[i].status.toggled();
        }
        prop_assert_eq!(ProgressPreview::from_subtasks(&subtasks), before);
    }

    #[test]
    fn forward_only_refuses_exactly_backward_moves(from in arb_status(), to in arb_status()) {
        let forward = TransitionTable::forward_only();
        let refused = forward.resolve(from, to).is_err();
        prop_assert_eq!(refused, to.column_index() < from.column_index());
        prop_assert!(TransitionTable::unrestricted().resolve(from, to).is_ok());
    }
}
