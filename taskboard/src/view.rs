//! Filter and sort pipeline deriving the visible board from the task list.
//!
//! Everything here is pure. Filtering runs before sorting, and sorting is
//! stable, so ties keep fetch order and the two steps commute.

use std::cmp::Ordering;

use taskboard_proto::ParseError;
use taskboard_proto::member::UserId;
use taskboard_proto::task::{Priority, Task, TaskStatus};

/// Priority filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PriorityFilter {
    /// Every priority passes.
    #[default]
    All,
    /// Only tasks with exactly this priority pass.
    Only(Priority),
}

impl std::str::FromStr for PriorityFilter {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse::<Priority>()
            .map(Self::Only)
            .map_err(|_| ParseError::new("priority filter", s))
    }
}

/// Field the board is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Creation time.
    #[default]
    CreatedAt,
    /// Due date; tasks without one sort earliest.
    DueDate,
    /// Priority rank (low < medium < high).
    Priority,
    /// Server-computed progress.
    Progress,
}

impl std::str::FromStr for SortKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "createdat" => Ok(Self::CreatedAt),
            "duedate" => Ok(Self::DueDate),
            "priority" => Ok(Self::Priority),
            "progress" => Ok(Self::Progress),
            _ => Err(ParseError::new("sort key", s)),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first.
    Asc,
    /// Largest first.
    #[default]
    Desc,
}

impl std::str::FromStr for SortOrder {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Asc),
            "desc" | "descending" => Ok(Self::Desc),
            _ => Err(ParseError::new("sort order", s)),
        }
    }
}

/// Current view parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewParams {
    /// Case-insensitive substring matched against title or description.
    pub search: String,
    /// Priority filter.
    pub priority: PriorityFilter,
    /// Only tasks assigned to this user, if set.
    pub assignee: Option<UserId>,
    /// Sort field.
    pub sort_key: SortKey,
    /// Sort direction.
    pub sort_order: SortOrder,
}

/// One board column: a status and its visible tasks in pipeline order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Status shown in this column.
    pub status: TaskStatus,
    /// Tasks in display order.
    pub tasks: Vec<Task>,
}

/// Returns `true` if `task` passes every filter in `params`.
#[must_use]
pub fn matches(task: &Task, params: &ViewParams) -> bool {
    let query = params.search.trim();
    if !query.is_empty() {
        let query = query.to_lowercase();
        if !task.title.to_lowercase().contains(&query)
            && !task.description.to_lowercase().contains(&query)
        {
            return false;
        }
    }
    if matches!(params.priority, PriorityFilter::Only(p) if p != task.priority) {
        return false;
    }
    params
        .assignee
        .as_ref()
        .is_none_or(|user| task.is_assigned(user))
}

/// Ascending comparison of two tasks by `key`.
#[must_use]
pub fn compare(a: &Task, b: &Task, key: SortKey) -> Ordering {
    match key {
        SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        SortKey::DueDate => a.due_date.cmp(&b.due_date),
        SortKey::Priority => a.priority.rank().cmp(&b.priority.rank()),
        SortKey::Progress => a.progress.cmp(&b.progress),
    }
}

/// Keeps the tasks that pass the filters, in input order.
pub fn filter<'a>(tasks: impl IntoIterator<Item = &'a Task>, params: &ViewParams) -> Vec<&'a Task> {
    tasks.into_iter().filter(|t| matches(t, params)).collect()
}

/// Stable sort by `key`. Descending order reverses the comparator, so equal
/// tasks keep their relative order either way.
pub fn sort(tasks: &mut [&Task], key: SortKey, order: SortOrder) {
    match order {
        SortOrder::Asc => tasks.sort_by(|a, b| compare(a, b, key)),
        SortOrder::Desc => tasks.sort_by(|a, b| compare(a, b, key).reverse()),
    }
}

/// The visible, ordered task list.
#[must_use]
pub fn view<'a>(tasks: &'a [Task], params: &ViewParams) -> Vec<&'a Task> {
    let mut visible = filter(tasks, params);
    sort(&mut visible, params.sort_key, params.sort_order);
    visible
}

/// Groups the view into the four status columns in board order.
#[must_use]
pub fn columns(tasks: &[Task], params: &ViewParams) -> Vec<Column> {
    let mut columns: Vec<Column> = TaskStatus::ALL
        .iter()
        .map(|status| Column {
            status: *status,
            tasks: Vec::new(),
        })
        .collect();
    for task in view(tasks, params) {
        columns[task.status.column_index()].tasks.push(task.clone());
    }
    columns
}
