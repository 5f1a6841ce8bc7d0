//! Task and subtask model for `Taskboard`.
//!
//! These are the entities returned by the backend and held in the client
//! caches. The server's copy is authoritative: clients replace whole
//! entities from responses rather than patching fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ParseError;
use crate::member::{ProjectId, UserId};

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Unique identifier for a task, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `TaskId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a subtask, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubtaskId(Uuid);

impl SubtaskId {
    /// Creates a new time-ordered subtask identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `SubtaskId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubtaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubtaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Workflow status of a task. Each value is one board column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started.
    #[default]
    Todo,
    /// Actively being worked on.
    InProgress,
    /// Waiting for review.
    InReview,
    /// Done.
    Completed,
}

impl TaskStatus {
    /// All statuses in board column order.
    pub const ALL: [Self; 4] = [Self::Todo, Self::InProgress, Self::InReview, Self::Completed];

    /// Position of this status's column on the board, left to right.
    #[must_use]
    pub const fn column_index(self) -> usize {
        match self {
            Self::Todo => 0,
            Self::InProgress => 1,
            Self::InReview => 2,
            Self::Completed => 3,
        }
    }

    /// Wire name of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::InReview => "in_review",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "in_review" => Ok(Self::InReview),
            "completed" => Ok(Self::Completed),
            _ => Err(ParseError::new("task status", s)),
        }
    }
}

/// Priority of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority.
    Low,
    /// Medium priority.
    #[default]
    Medium,
    /// High priority.
    High,
}

impl Priority {
    /// Numeric weight used for ordering: low=1, medium=2, high=3.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(ParseError::new("priority", s)),
        }
    }
}

/// Completion status of a subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtaskStatus {
    /// Not yet done.
    #[default]
    Pending,
    /// Done.
    Completed,
}

impl SubtaskStatus {
    /// Returns `true` for [`SubtaskStatus::Completed`].
    #[must_use]
    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns the opposite status.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Pending => Self::Completed,
            Self::Completed => Self::Pending,
        }
    }
}

impl std::fmt::Display for SubtaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Server-computed completion percentage of a task, always within `0..=100`.
///
/// Deserialization clamps out-of-range and fractional values instead of
/// failing, so a misbehaving backend can never push the value outside the
/// valid range.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(from = "f64", into = "u8")]
pub struct Progress(u8);

impl Progress {
    /// Zero percent.
    pub const ZERO: Self = Self(0);
    /// One hundred percent.
    pub const FULL: Self = Self(100);

    /// Creates a progress value, clamping into `0..=100`.
    #[must_use]
    pub fn new(percent: u32) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Self(percent.min(100) as u8)
    }

    /// Computes `round(100 * completed / total)`, or zero when `total` is zero.
    ///
    /// Halves round up.
    #[must_use]
    pub fn from_ratio(completed: usize, total: usize) -> Self {
        if total == 0 {
            return Self::ZERO;
        }
        let completed = completed.min(total);
        let percent = (200 * completed + total) / (2 * total);
        Self::new(u32::try_from(percent).unwrap_or(100))
    }

    /// Returns the percentage.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl From<f64> for Progress {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from(raw: f64) -> Self {
        if raw.is_nan() {
            return Self::ZERO;
        }
        Self(raw.round().clamp(0.0, 100.0) as u8)
    }
}

impl From<Progress> for u8 {
    fn from(progress: Progress) -> Self {
        progress.0
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Display details of a populated assignee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSummary {
    /// The member's user identifier.
    #[serde(alias = "_id")]
    pub id: UserId,
    /// Display name, if the server populated it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Email address, if the server populated it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// One entry of a task's `assignedTo` list.
///
/// The backend returns either bare identifiers or populated member objects
/// depending on the endpoint. Comparisons always go through
/// [`Assignee::user_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Assignee {
    /// A bare user identifier.
    Id(UserId),
    /// A populated member object.
    Member(MemberSummary),
}

impl Assignee {
    /// Returns the identifier of this assignee regardless of form.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        match self {
            Self::Id(id) => id,
            Self::Member(member) => &member.id,
        }
    }
}

impl From<UserId> for Assignee {
    fn from(id: UserId) -> Self {
        Self::Id(id)
    }
}

/// The set of users assigned to a task, kept in insertion order.
///
/// Identifiers are unique: constructing or deserializing a list keeps the
/// first occurrence of each user and drops later duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Assignee>", into = "Vec<Assignee>")]
pub struct AssigneeList(Vec<Assignee>);

impl AssigneeList {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Returns `true` if `user` is assigned.
    #[must_use]
    pub fn contains(&self, user: &UserId) -> bool {
        self.0.iter().any(|a| a.user_id() == user)
    }

    /// Adds an assignee, returning `false` if that user was already present.
    pub fn insert(&mut self, assignee: impl Into<Assignee>) -> bool {
        let assignee = assignee.into();
        if self.contains(assignee.user_id()) {
            return false;
        }
        self.0.push(assignee);
        true
    }

    /// Removes a user, returning `true` if they were present.
    pub fn remove(&mut self, user: &UserId) -> bool {
        let before = self.0.len();
        self.0.retain(|a| a.user_id() != user);
        self.0.len() != before
    }

    /// Iterates over the assigned user identifiers in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &UserId> {
        self.0.iter().map(Assignee::user_id)
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Assignee> {
        self.0.iter()
    }

    /// Number of assigned users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nobody is assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Assignee>> for AssigneeList {
    fn from(entries: Vec<Assignee>) -> Self {
        let mut list = Self::new();
        for entry in entries {
            list.insert(entry);
        }
        list
    }
}

impl From<AssigneeList> for Vec<Assignee> {
    fn from(list: AssigneeList) -> Self {
        list.0
    }
}

impl FromIterator<UserId> for AssigneeList {
    fn from_iter<I: IntoIterator<Item = UserId>>(iter: I) -> Self {
        iter.into_iter().map(Assignee::Id).collect::<Vec<_>>().into()
    }
}

impl<'a> IntoIterator for &'a AssigneeList {
    type Item = &'a Assignee;
    type IntoIter = std::slice::Iter<'a, Assignee>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A work item rendered as a card in one board column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task identifier.
    #[serde(alias = "_id")]
    pub id: TaskId,
    /// Project this task belongs to.
    #[serde(alias = "project")]
    pub project_id: ProjectId,
    /// Short title shown on the card.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Workflow status (board column).
    #[serde(default)]
    pub status: TaskStatus,
    /// Priority.
    #[serde(default)]
    pub priority: Priority,
    /// Assigned users.
    #[serde(default)]
    pub assigned_to: AssigneeList,
    /// Server-computed completion percentage.
    #[serde(default)]
    pub progress: Progress,
    /// Optional due date.
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// User who created the task.
    pub created_by: UserId,
    /// Subtasks in display order.
    #[serde(default)]
    pub subtasks: Vec<SubtaskId>,
}

impl Task {
    /// Returns `true` if `user` is in this task's assignee set.
    #[must_use]
    pub fn is_assigned(&self, user: &UserId) -> bool {
        self.assigned_to.contains(user)
    }
}

/// A checklist item belonging to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    /// Unique subtask identifier.
    #[serde(alias = "_id")]
    pub id: SubtaskId,
    /// Parent task.
    #[serde(alias = "task")]
    pub task_id: TaskId,
    /// Short title.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Completion status.
    #[serde(default)]
    pub status: SubtaskStatus,
}
