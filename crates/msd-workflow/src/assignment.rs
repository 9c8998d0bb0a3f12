//! Assignment resolver.
//!
//! Resolves which diagnostician/mechanic a transition binds to an
//! application. Deliberately carries NO auto-assignment policy: with an
//! explicit id it validates role membership, without one it returns the
//! candidate list for caller-side (admin) selection. Load-balancing or
//! round-robin selection, if ever wanted, plugs in behind this seam.

use msd_schemas::{Role, User};

use crate::error::WorkflowError;
use crate::store::WorkOrderStore;

/// Result of an assignee resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum AssigneeResolution {
    /// An explicit id was given and carries the target role.
    Resolved(User),
    /// No id was given: these users carry the target role; the caller picks.
    Candidates(Vec<User>),
}

/// Resolve a user to bind to an application's `diag_id` / `mechanic_id`.
///
/// `target_role` must be DIAGNOSTIC or MECHANIC, the only assignable roles.
/// An explicit `user_id` must reference an existing user whose role matches,
/// else [`WorkflowError::RoleMismatch`].
pub async fn resolve_assignee<S: WorkOrderStore + ?Sized>(
    store: &S,
    target_role: Role,
    user_id: Option<i64>,
) -> Result<AssigneeResolution, WorkflowError> {
    if !matches!(target_role, Role::Diagnostic | Role::Mechanic) {
        return Err(WorkflowError::RoleMismatch(format!(
            "{} is not an assignable role",
            target_role.as_str()
        )));
    }

    match user_id {
        Some(id) => {
            let user = store.fetch_user(id).await?;
            if user.role != target_role {
                return Err(WorkflowError::RoleMismatch(format!(
                    "user {} has role {}, expected {}",
                    id,
                    user.role.as_str(),
                    target_role.as_str()
                )));
            }
            Ok(AssigneeResolution::Resolved(user))
        }
        None => {
            let candidates = store.list_users_by_role(target_role).await?;
            Ok(AssigneeResolution::Candidates(candidates))
        }
    }
}
