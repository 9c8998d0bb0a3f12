//! msd-workflow
//!
//! The work-order workflow core: status state machine, role-gated
//! transitions, per-car scheduling guard, assignment resolution and
//! settlement finalisation.
//!
//! Layering:
//! - `machine`: pure, synchronous transition logic; no IO, injectable time.
//! - `engine`: `WorkflowEngine<S>` doing load / validate / CAS-persist over
//!   any [`WorkOrderStore`].
//! - `store`: the async persistence trait; `mem` provides the in-memory
//!   backend, `msd-db` the Postgres one.
//!
//! Transport (HTTP, bot, CLI) and authentication live above this crate; the
//! engine receives an already-resolved [`Caller`] and trusts its role
//! binding.

mod assignment;
mod engine;
mod error;
mod machine;
pub mod mem;
mod store;

pub use assignment::{resolve_assignee, AssigneeResolution};
pub use engine::{NewApplicationRequest, WorkflowEngine};
pub use error::{Entity, StoreError, WorkflowError};
pub use machine::{Caller, DiagVerdict, RequeueTarget, Transition};
pub use store::WorkOrderStore;
