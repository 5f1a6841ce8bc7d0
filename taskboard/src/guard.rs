//! Permission predicates for board mutations.
//!
//! Every mutation precondition goes through this module. All functions are
//! pure: they inspect the roster and the task, never the network.

use taskboard_proto::member::{ProjectId, ProjectMember, UserId};
use taskboard_proto::task::Task;

/// Project data supplied by the membership provider.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// The project whose board is shown.
    pub project_id: ProjectId,
    /// Member roster with roles.
    pub members: Vec<ProjectMember>,
    /// Whether the current user may change task assignments. Computed
    /// outside this crate from task and project context.
    pub can_assign: bool,
}

impl ProjectContext {
    /// Creates a context with an empty roster and no assign capability.
    #[must_use]
    pub const fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            members: Vec::new(),
            can_assign: false,
        }
    }

    /// Replaces the roster.
    #[must_use]
    pub fn with_members(mut self, members: Vec<ProjectMember>) -> Self {
        self.members = members;
        self
    }

    /// Sets the externally computed assign capability.
    #[must_use]
    pub const fn with_assign_capability(mut self, can_assign: bool) -> Self {
        self.can_assign = can_assign;
        self
    }

    /// Looks up a user's roster entry.
    #[must_use]
    pub fn member(&self, user: &UserId) -> Option<&ProjectMember> {
        self.members.iter().find(|m| m.user_id == *user)
    }
}

/// Reasons a mutation is refused before any request is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionDenied {
    /// The action requires the project admin role.
    #[error("only project admins can {action} tasks")]
    NotAdmin {
        /// What the user tried to do ("create", "edit", "delete").
        action: &'static str,
    },

    /// Subtasks may only be managed by users assigned to the task.
    #[error("only users assigned to this task can manage its subtasks")]
    NotAssigned,

    /// The user lacks the assign capability.
    #[error("you are not allowed to change assignments")]
    CannotAssign,
}

/// Returns `true` iff `user`'s membership entry in `project` has the admin role.
#[must_use]
pub fn is_admin(user: &UserId, project: &ProjectContext) -> bool {
    project.member(user).is_some_and(ProjectMember::is_admin)
}

/// Returns `true` if `user` may create, edit or delete tasks.
#[must_use]
pub fn can_edit_tasks(user: &UserId, project: &ProjectContext) -> bool {
    is_admin(user, project)
}

/// Returns `true` if `user` may add, remove or toggle subtasks of `task`.
#[must_use]
pub fn can_manage_subtasks(task: &Task, user: &UserId) -> bool {
    task.is_assigned(user)
}

/// Returns the externally supplied assign capability.
#[must_use]
pub const fn can_assign(project: &ProjectContext) -> bool {
    project.can_assign
}

/// Fails unless `user` can edit tasks.
///
/// # Errors
///
/// Returns [`PermissionDenied::NotAdmin`] naming `action`.
pub fn require_editor(
    user: &UserId,
    project: &ProjectContext,
    action: &'static str,
) -> Result<(), PermissionDenied> {
    if can_edit_tasks(user, project) {
        Ok(())
    } else {
        Err(PermissionDenied::NotAdmin { action })
    }
}

/// Fails unless `user` can manage the subtasks of `task`.
///
/// # Errors
///
/// Returns [`PermissionDenied::NotAssigned`].
pub fn require_subtask_access(task: &Task, user: &UserId) -> Result<(), PermissionDenied> {
    if can_manage_subtasks(task, user) {
        Ok(())
    } else {
        Err(PermissionDenied::NotAssigned)
    }
}

/// Fails unless the project context grants the assign capability.
///
/// # Errors
///
/// Returns [`PermissionDenied::CannotAssign`].
pub const fn require_assign(project: &ProjectContext) -> Result<(), PermissionDenied> {
    if can_assign(project) {
        Ok(())
    } else {
        Err(PermissionDenied::CannotAssign)
    }
}
