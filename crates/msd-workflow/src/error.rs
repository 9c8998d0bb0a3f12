//! Error surface of the workflow core.
//!
//! Every failure is final from the core's point of view: nothing is retried
//! internally. `Conflict` is the one error where the caller layer is expected
//! to reload and retry once.

use msd_schemas::Status;
use thiserror::Error;

/// Which entity a lookup missed. Carried by `NotFound` so the caller layer
/// can map it to a precise response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Client,
    Car,
    User,
    Application,
    Payment,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Entity::Client => "client",
            Entity::Car => "car",
            Entity::User => "user",
            Entity::Application => "application",
            Entity::Payment => "payment",
        };
        write!(f, "{s}")
    }
}

/// Domain errors surfaced to the caller layer.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Referenced entity id does not exist (or the car is soft-deleted).
    #[error("{0} not found")]
    NotFound(Entity),

    /// The operation's source-status precondition is not met. Covers stale
    /// reads and double-apply: callers must re-fetch and decide, never blind
    /// retry.
    #[error("invalid transition: {op} not allowed from {from:?}")]
    InvalidTransition {
        from: Status,
        /// Operation name, e.g. `"schedule"`.
        op: &'static str,
    },

    /// Caller role (or a resolved assignee's role) does not satisfy the
    /// operation's requirement.
    #[error("role mismatch: {0}")]
    RoleMismatch(String),

    /// The car already has an application in an active status.
    #[error("car already has an active application")]
    ActiveApplicationExists,

    /// A Payment already exists for this application.
    #[error("application already settled")]
    AlreadySettled,

    /// Concurrent-write detected by the store. Reload and retry once.
    #[error("concurrent write conflict; reload and retry")]
    Conflict,

    /// Underlying store failure (connectivity, corruption). Outside the
    /// domain error classes; propagated verbatim.
    #[error("store failure: {0}")]
    Store(#[source] anyhow::Error),
}

/// Store-side errors. The engine maps these onto [`WorkflowError`]; adapters
/// (Postgres, in-memory) never surface their own error vocabulary upward.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(Entity),

    /// Status-guarded update missed: the row's status no longer matches the
    /// expected pre-transition status.
    #[error("guarded update missed: stale status")]
    Conflict,

    /// Insert refused by the one-active-application-per-car guard.
    #[error("active application exists for car")]
    ActiveApplicationExists,

    /// Payment row already present for the application id.
    #[error("payment already recorded")]
    PaymentExists,

    /// Generic uniqueness violation (duplicate client/user id or phone).
    #[error("duplicate key")]
    DuplicateKey,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<StoreError> for WorkflowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(kind) => WorkflowError::NotFound(kind),
            StoreError::Conflict => WorkflowError::Conflict,
            StoreError::ActiveApplicationExists => WorkflowError::ActiveApplicationExists,
            StoreError::PaymentExists => WorkflowError::AlreadySettled,
            StoreError::DuplicateKey => WorkflowError::Conflict,
            StoreError::Backend(e) => WorkflowError::Store(e),
        }
    }
}
