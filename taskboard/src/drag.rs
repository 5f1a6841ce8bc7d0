//! Drag-and-drop between status columns.
//!
//! A [`DragSession`] follows one gesture from pick-up to drop. The resulting
//! [`DropEvent`] is checked against a [`TransitionTable`] which decides
//! whether the move becomes a status-change mutation.

use taskboard_proto::task::{TaskId, TaskStatus};

const COLUMNS: usize = TaskStatus::ALL.len();

/// A card released over a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropEvent {
    /// The dragged task.
    pub task_id: TaskId,
    /// The column it was dropped on.
    pub target: TaskStatus,
}

/// A move the transition table does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move a task from {from} to {to}")]
pub struct TransitionRejected {
    /// Current column.
    pub from: TaskStatus,
    /// Requested column.
    pub to: TaskStatus,
}

/// Outcome of resolving a drop against the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropDecision {
    /// The task moves to another column.
    Move {
        /// Current column.
        from: TaskStatus,
        /// New column.
        to: TaskStatus,
    },
    /// Dropped on its own column; nothing to do.
    Unchanged,
}

/// Which status changes a drop may perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    allowed: [[bool; COLUMNS]; COLUMNS],
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::unrestricted()
    }
}

impl TransitionTable {
    /// Every column to every column, including completed back to todo.
    #[must_use]
    pub const fn unrestricted() -> Self {
        Self {
            allowed: [[true; COLUMNS]; COLUMNS],
        }
    }

    /// Moves to an earlier column are refused.
    #[must_use]
    pub fn forward_only() -> Self {
        let mut table = Self::unrestricted();
        for from in TaskStatus::ALL {
            for to in TaskStatus::ALL {
                if to.column_index() < from.column_index() {
                    table = table.deny(from, to);
                }
            }
        }
        table
    }

    /// Builds the table from the `allow_backward_moves` setting.
    #[must_use]
    pub fn from_backward_moves(allow: bool) -> Self {
        if allow {
            Self::unrestricted()
        } else {
            Self::forward_only()
        }
    }

    /// Returns the table with one more move refused.
    #[must_use]
    pub const fn deny(mut self, from: TaskStatus, to: TaskStatus) -> Self {
        self.allowed[from.column_index()][to.column_index()] = false;
        self
    }

    /// Returns `true` if a task in `from` may be moved to `to`.
    #[must_use]
    pub const fn allows(&self, from: TaskStatus, to: TaskStatus) -> bool {
        self.allowed[from.column_index()][to.column_index()]
    }

    /// Decides what a drop from `from` onto `to` does.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionRejected`] if the table refuses the move.
    pub const fn resolve(
        &self,
        from: TaskStatus,
        to: TaskStatus,
    ) -> Result<DropDecision, TransitionRejected> {
        if from.column_index() == to.column_index() {
            Ok(DropDecision::Unchanged)
        } else if self.allows(from, to) {
            Ok(DropDecision::Move { from, to })
        } else {
            Err(TransitionRejected { from, to })
        }
    }
}

/// Gesture state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DragState {
    /// Nothing is being dragged.
    #[default]
    Idle,
    /// A card has been picked up.
    Dragging {
        /// The dragged task.
        task_id: TaskId,
        /// Column it was picked up from.
        origin: TaskStatus,
    },
}

/// Tracks one drag gesture at a time.
#[derive(Debug, Default)]
pub struct DragSession {
    state: DragState,
}

impl DragSession {
    /// Creates an idle session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &DragState {
        &self.state
    }

    /// Returns `true` while a card is held.
    #[must_use]
    pub const fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// Picks up a card. A card already held is silently replaced.
    pub fn begin(&mut self, task_id: TaskId, origin: TaskStatus) {
        self.state = DragState::Dragging { task_id, origin };
    }

    /// Abandons the gesture, returning the task that was held.
    pub fn cancel(&mut self) -> Option<TaskId> {
        match std::mem::take(&mut self.state) {
            DragState::Dragging { task_id, .. } => Some(task_id),
            DragState::Idle => None,
        }
    }

    /// Releases the held card over `target`. Returns `None` when idle.
    pub fn finish(&mut self, target: TaskStatus) -> Option<DropEvent> {
        self.cancel().map(|task_id| DropEvent { task_id, target })
    }
}
