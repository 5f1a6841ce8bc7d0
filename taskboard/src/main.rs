//! `taskboard`: prints a project's task board.
//!
//! Loads configuration, seeds an in-process backend with a demo project and
//! renders the filtered, sorted columns to stdout. Logs go to a file.
//!
//! ```bash
//! cargo run --bin taskboard -- --priority high --sort-key dueDate --sort-order asc
//! TASKBOARD_LOG=debug cargo run --bin taskboard -- --search login
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use taskboard::backend::memory::InMemoryBackend;
use taskboard::board::{Board, BoardEvent};
use taskboard::config::{CliArgs, ClientConfig};
use taskboard::guard::ProjectContext;
use taskboard::view::Column;
use taskboard_proto::member::{ProjectId, ProjectMember, Role, UserId};
use taskboard_proto::task::{
    AssigneeList, Priority, Progress, Subtask, SubtaskId, SubtaskStatus, Task, TaskId, TaskStatus,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!(project = %config.project_id, user = %config.user_id, "taskboard starting");

    let project_id = ProjectId::new(config.project_id.as_str());
    let user = UserId::new(config.user_id.as_str());
    let backend = Arc::new(
        InMemoryBackend::new()
            .with_latency(config.latency)
            .with_acting_user(user.clone()),
    );
    seed_demo(&backend, &project_id, &user);

    let project = ProjectContext::new(project_id)
        .with_members(vec![
            ProjectMember::new(user.clone(), Role::Admin),
            ProjectMember::new(UserId::new("u7"), Role::Member),
        ])
        .with_assign_capability(true);
    let (board, mut events) = Board::new(backend, project, user, config.board_config());

    if let Err(e) = board.load().await {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }
    while let Ok(event) = events.try_recv() {
        if let BoardEvent::Error { message } = event {
            eprintln!("warning: {message}");
        }
    }

    for column in board.columns() {
        print_column(&column);
    }

    tracing::info!("taskboard exiting");
    ExitCode::SUCCESS
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskboard.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

fn print_column(column: &Column) {
    println!("== {} ({}) ==", column.status, column.tasks.len());
    for task in &column.tasks {
        let assignees: Vec<&str> = task.assigned_to.ids().map(UserId::as_str).collect();
        let due = task
            .due_date
            .map(|d| format!("  due {}", d.format("%Y-%m-%d")))
            .unwrap_or_default();
        println!(
            "  [{:<6}] {:<28} {:>4}  @{}{due}",
            task.priority,
            task.title,
            task.progress.to_string(),
            assignees.join(",")
        );
    }
}

/// Fills the backend with a small project so the board has something to show.
fn seed_demo(backend: &InMemoryBackend, project: &ProjectId, user: &UserId) {
    let now = Utc::now();
    let demo = [
        ("Design login page", Priority::High, TaskStatus::Todo, Some(3), &["u7"][..], 0),
        ("Write API docs", Priority::Low, TaskStatus::Todo, None, &[][..], 0),
        (
            "Implement auth flow",
            Priority::High,
            TaskStatus::InProgress,
            Some(7),
            &["u7", "admin"][..],
            2,
        ),
        (
            "Review database schema",
            Priority::Medium,
            TaskStatus::InReview,
            Some(1),
            &["admin"][..],
            1,
        ),
        ("Set up CI", Priority::Medium, TaskStatus::Completed, None, &["u7"][..], 0),
    ];

    for (i, (title, priority, status, due_days, assignees, done)) in demo.into_iter().enumerate() {
        let created_offset = Duration::hours(i64::try_from(i).unwrap_or_default());
        let task = Task {
            id: TaskId::new(),
            project_id: project.clone(),
            title: title.to_string(),
            description: String::new(),
            status,
            priority,
            assigned_to: assignees.iter().map(|u| UserId::new(*u)).collect::<AssigneeList>(),
            progress: Progress::ZERO,
            due_date: due_days.map(|d| now + Duration::days(d)),
            created_at: now - Duration::days(7) + created_offset,
            created_by: user.clone(),
            subtasks: Vec::new(),
        };
        let task_id = task.id.clone();
        backend.seed_task(task);
        for step in 0..3 {
            let status = if step < done {
                SubtaskStatus::Completed
            } else {
                SubtaskStatus::Pending
            };
            backend.seed_subtask(Subtask {
                id: SubtaskId::new(),
                task_id: task_id.clone(),
                title: format!("Step {}", step + 1),
                description: String::new(),
                status,
            });
        }
    }
}
