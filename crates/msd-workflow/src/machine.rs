//! Work-order state machine.
//!
//! # Design
//!
//! Every status change goes through [`Transition::apply`], which enforces
//! three invariants, in order:
//!
//! 1. **Role gate.** The caller's role must equal the operation's required
//!    role. Refusals return [`WorkflowError::RoleMismatch`].
//! 2. **Assignee gate.** Where an assignment exists on the application, the
//!    caller's id must equal the bound assignee.
//! 3. **Legal source only.** The current status must be in the operation's
//!    valid-source set, otherwise [`WorkflowError::InvalidTransition`].
//!    Terminal statuses are never a valid source, so a stale double-apply
//!    fails here instead of silently re-applying.
//!
//! A refused transition mutates nothing. An accepted transition mutates only
//! the fields the operation owns, plus `status` and `updated_at`.
//!
//! # Status graph
//!
//! ```text
//!             Schedule        BeginDiagnostic      Diagnose(Repair)
//!   Waiting ───────────► CarWaiting ────────► Diagnostic ────────► Repair
//!      ▲                     ▲                                        │
//!      │      Requeue        │                                 Repair │
//!      └─────────────────────┴──────────────┐                         ▼
//!                                           │        Finish        Ready
//!   Rejected (term.) ◄── Reject / Diagnose(Reject)     ◄────────────┘
//!   Completed (term.) ◄── Finish
//! ```

use chrono::{DateTime, Utc};
use msd_schemas::{Application, Priority, Role, Status};

use crate::error::WorkflowError;

// ---------------------------------------------------------------------------
// Caller
// ---------------------------------------------------------------------------

/// Caller identity as resolved by the upstream authorization layer.
/// The core trusts this binding; it does not authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: i64, role: Role) -> Self {
        Self { user_id, role }
    }
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// Queue an admin may send an application back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueTarget {
    Waiting,
    CarWaiting,
}

/// Outcome of a diagnostic assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagVerdict {
    /// Proceed to repair.
    Repair,
    /// Not worth repairing; reject the work order.
    Reject,
}

/// One tagged variant per workflow operation, each carrying exactly the
/// fields it owns. An operation cannot silently write a field outside its
/// variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Admin accepts a WAITING application: assigns priority and a
    /// diagnostician, moves it to CARWAITING. `diag_id` role membership is
    /// validated by the engine via the assignment resolver before `apply`.
    Schedule {
        admin_comment: Option<String>,
        priority: Priority,
        diag_id: i64,
    },
    /// Admin turns the application down. Allowed from any non-terminal
    /// status.
    Reject { admin_comment: Option<String> },
    /// Admin sends the application back to an earlier queue. Assignments
    /// made after the target queue are cleared so the re-run of later
    /// transitions can bind afresh.
    Requeue { to: RequeueTarget },
    /// The assigned diagnostician checks the car in: CARWAITING →
    /// DIAGNOSTIC.
    BeginDiagnostic,
    /// The assigned diagnostician records the assessment and either sends
    /// the order to repair or rejects it.
    Diagnose {
        diag_comment: Option<String>,
        /// Itemised estimate, not the settled price.
        diag_price: f64,
        verdict: DiagVerdict,
    },
    /// A mechanic records the completed repair: REPAIR → READY. Binds the
    /// caller as the application's mechanic when none is bound yet.
    Repair {
        mechanic_comment: Option<String>,
        /// Itemised estimate, not the settled price.
        mechanic_price: f64,
    },
    /// Admin closes out a READY application: stamps `finished_at`/`pay_at`
    /// and moves to COMPLETED. The engine records the settlement Payment
    /// right after.
    Finish,
}

impl Transition {
    /// Stable operation name used in errors and logs.
    pub fn op(&self) -> &'static str {
        match self {
            Transition::Schedule { .. } => "schedule",
            Transition::Reject { .. } => "reject",
            Transition::Requeue { .. } => "requeue",
            Transition::BeginDiagnostic => "begin_diagnostic",
            Transition::Diagnose { .. } => "diagnose",
            Transition::Repair { .. } => "repair",
            Transition::Finish => "finish",
        }
    }

    /// The single role allowed to invoke this operation. Strict equality:
    /// SUPERADMIN does not implicitly satisfy ADMIN checks.
    pub fn required_role(&self) -> Role {
        match self {
            Transition::Schedule { .. }
            | Transition::Reject { .. }
            | Transition::Requeue { .. }
            | Transition::Finish => Role::Admin,
            Transition::BeginDiagnostic | Transition::Diagnose { .. } => Role::Diagnostic,
            Transition::Repair { .. } => Role::Mechanic,
        }
    }

    fn allows_source(&self, status: Status) -> bool {
        match self {
            Transition::Schedule { .. } => status == Status::Waiting,
            // Rejected is reachable from any non-terminal status.
            Transition::Reject { .. } => !status.is_terminal(),
            // Requeue only targets a queue strictly earlier than the current
            // status; jumping forward would bypass Schedule's assignment.
            Transition::Requeue { to } => match to {
                RequeueTarget::Waiting => matches!(
                    status,
                    Status::CarWaiting | Status::Diagnostic | Status::Repair | Status::Ready
                ),
                RequeueTarget::CarWaiting => matches!(
                    status,
                    Status::Diagnostic | Status::Repair | Status::Ready
                ),
            },
            Transition::BeginDiagnostic => status == Status::CarWaiting,
            Transition::Diagnose { .. } => status == Status::Diagnostic,
            Transition::Repair { .. } => status == Status::Repair,
            Transition::Finish => status == Status::Ready,
        }
    }

    /// Apply this transition to the aggregate.
    ///
    /// On success, mutates only the owned fields plus `status` and
    /// `updated_at`. On any refusal the aggregate is untouched.
    pub fn apply(
        &self,
        app: &mut Application,
        caller: &Caller,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        // 1. Role gate.
        let required = self.required_role();
        if caller.role != required {
            return Err(WorkflowError::RoleMismatch(format!(
                "{} requires role {}, caller has {}",
                self.op(),
                required.as_str(),
                caller.role.as_str()
            )));
        }

        // 2. Assignee gate, only where an assignment exists.
        match self {
            Transition::BeginDiagnostic | Transition::Diagnose { .. } => {
                if let Some(diag_id) = app.diag_id {
                    if diag_id != caller.user_id {
                        return Err(WorkflowError::RoleMismatch(format!(
                            "application {} is assigned to diagnostician {}, not {}",
                            app.id, diag_id, caller.user_id
                        )));
                    }
                }
            }
            Transition::Repair { .. } => {
                if let Some(mechanic_id) = app.mechanic_id {
                    if mechanic_id != caller.user_id {
                        return Err(WorkflowError::RoleMismatch(format!(
                            "application {} is assigned to mechanic {}, not {}",
                            app.id, mechanic_id, caller.user_id
                        )));
                    }
                }
            }
            _ => {}
        }

        // 3. Source-status gate.
        if !self.allows_source(app.status) {
            return Err(WorkflowError::InvalidTransition {
                from: app.status,
                op: self.op(),
            });
        }

        // 4. Owned-field mutation.
        match self {
            Transition::Schedule {
                admin_comment,
                priority,
                diag_id,
            } => {
                app.admin_comment = admin_comment.clone();
                app.priority = *priority;
                app.diag_id = Some(*diag_id);
                app.status = Status::CarWaiting;
            }
            Transition::Reject { admin_comment } => {
                if admin_comment.is_some() {
                    app.admin_comment = admin_comment.clone();
                }
                app.status = Status::Rejected;
            }
            Transition::Requeue { to } => match to {
                RequeueTarget::Waiting => {
                    app.diag_id = None;
                    app.mechanic_id = None;
                    app.status = Status::Waiting;
                }
                RequeueTarget::CarWaiting => {
                    app.mechanic_id = None;
                    app.status = Status::CarWaiting;
                }
            },
            Transition::BeginDiagnostic => {
                app.status = Status::Diagnostic;
            }
            Transition::Diagnose {
                diag_comment,
                diag_price,
                verdict,
            } => {
                app.diag_comment = diag_comment.clone();
                app.diag_price = Some(*diag_price);
                app.status = match verdict {
                    DiagVerdict::Repair => Status::Repair,
                    DiagVerdict::Reject => Status::Rejected,
                };
            }
            Transition::Repair {
                mechanic_comment,
                mechanic_price,
            } => {
                app.mechanic_comment = mechanic_comment.clone();
                app.mechanic_price = Some(*mechanic_price);
                // First-bind: an unassigned repair binds the submitting
                // mechanic. Reassignment requires requeueing first.
                if app.mechanic_id.is_none() {
                    app.mechanic_id = Some(caller.user_id);
                }
                app.status = Status::Ready;
            }
            Transition::Finish => {
                app.finished_at = Some(now);
                app.pay_at = Some(now);
                app.status = Status::Completed;
            }
        }

        app.updated_at = now;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
