//! msd-schemas
//!
//! Authoritative domain enums and entity records for the MotorShop Desk core.
//!
//! One enum per concept (`Status`, `Role`, `Priority`, `PayMethod`) lives here
//! and nowhere else. Persistence and transport adapters translate to/from the
//! string forms via `as_str` / `parse`; they never redefine these sets.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an [`Application`].
///
/// The workflow walks `Waiting → CarWaiting → Diagnostic → Repair → Ready →
/// Completed`, with `Rejected` reachable from any non-terminal status.
/// `Completed` and `Rejected` are terminal: no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Submitted by a client; awaiting admin triage.
    Waiting,
    /// Scheduled; waiting for the car to arrive.
    CarWaiting,
    /// Car on site, under diagnostic assessment.
    Diagnostic,
    /// Diagnosis accepted; repair in progress.
    Repair,
    /// Repair done; awaiting settlement.
    Ready,
    /// Turned down at triage or after diagnosis. **Terminal.**
    Rejected,
    /// Settled and closed. **Terminal.**
    Completed,
}

/// Statuses that count as "active" for the one-active-application-per-car
/// guard: everything except the two terminal statuses.
pub const ACTIVE_STATUSES: &[Status] = &[
    Status::Waiting,
    Status::CarWaiting,
    Status::Diagnostic,
    Status::Repair,
    Status::Ready,
];

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Waiting => "WAITING",
            Status::CarWaiting => "CARWAITING",
            Status::Diagnostic => "DIAGNOSTIC",
            Status::Repair => "REPAIR",
            Status::Ready => "READY",
            Status::Rejected => "REJECTED",
            Status::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "WAITING" => Ok(Status::Waiting),
            "CARWAITING" => Ok(Status::CarWaiting),
            "DIAGNOSTIC" => Ok(Status::Diagnostic),
            "REPAIR" => Ok(Status::Repair),
            "READY" => Ok(Status::Ready),
            "REJECTED" => Ok(Status::Rejected),
            "COMPLETED" => Ok(Status::Completed),
            other => Err(anyhow!("invalid application status: {}", other)),
        }
    }

    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Rejected | Status::Completed)
    }

    /// Returns `true` if this status blocks new applications for the same car.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Staff/caller role. Bound upstream by the authorization layer; the core
/// trusts the binding and only checks it against each operation's requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Client,
    Admin,
    SuperAdmin,
    Diagnostic,
    Mechanic,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "CLIENT",
            Role::Admin => "ADMIN",
            Role::SuperAdmin => "SUPERADMIN",
            Role::Diagnostic => "DIAGNOSTIC",
            Role::Mechanic => "MECHANIC",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "CLIENT" => Ok(Role::Client),
            "ADMIN" => Ok(Role::Admin),
            "SUPERADMIN" => Ok(Role::SuperAdmin),
            "DIAGNOSTIC" => Ok(Role::Diagnostic),
            "MECHANIC" => Ok(Role::Mechanic),
            other => Err(anyhow!("invalid role: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Triage priority assigned by the admin at scheduling time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "LOW" => Ok(Priority::Low),
            "MEDIUM" => Ok(Priority::Medium),
            "HIGH" => Ok(Priority::High),
            other => Err(anyhow!("invalid priority: {}", other)),
        }
    }

    /// Queue rank: HIGH sorts first. Matches the numeric encoding of the
    /// intake system (HIGH=1, MEDIUM=2, LOW=3).
    pub fn rank(&self) -> i16 {
        match self {
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// PayMethod
// ---------------------------------------------------------------------------

/// How a settlement was paid. `Unset` until the client chooses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PayMethod {
    Card,
    Cash,
    #[default]
    Unset,
}

impl PayMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayMethod::Card => "CARD",
            PayMethod::Cash => "CASH",
            PayMethod::Unset => "UNSET",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "CARD" => Ok(PayMethod::Card),
            "CASH" => Ok(PayMethod::Cash),
            "UNSET" => Ok(PayMethod::Unset),
            other => Err(anyhow!("invalid payment method: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Entity records
// ---------------------------------------------------------------------------

/// A registered client. `client_id` is externally issued (messenger account
/// id); the core never generates client ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: i64,
    pub user_name: Option<String>,
    /// Unique. The only mutable client field (phone replacement).
    pub phone: String,
}

/// A client's car. Soft-deleted only: applications reference it historically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Car {
    pub id: i64,
    pub client_id: i64,
    pub brand: String,
    pub model: String,
    /// Plate number.
    pub number: String,
    pub year: i32,
    pub deleted: bool,
}

/// Insert record for [`Car`]. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCar {
    pub client_id: i64,
    pub brand: String,
    pub model: String,
    pub number: String,
    pub year: i32,
}

/// A staff identity. Role is immutable after creation; there is no
/// role-change operation anywhere in the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub role: Role,
    pub user_name: Option<String>,
    /// Opaque credential hash. The core stores it; authentication happens
    /// upstream.
    pub hashed_password: String,
    /// Unique.
    pub phone: String,
}

/// The workflow aggregate: one vehicle-repair work order.
///
/// Timestamp invariant: `created_at <= updated_at <= finished_at <= pay_at`
/// (where present). `created_at` is immutable; every mutation stamps
/// `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub client_id: i64,
    pub car_id: i64,
    pub problem: Option<String>,
    /// Preferred contact-channel code supplied by the client.
    pub conn: i32,
    pub admin_comment: Option<String>,
    pub diag_comment: Option<String>,
    pub mechanic_comment: Option<String>,
    pub status: Status,
    pub priority: Priority,
    /// Assigned diagnostician. Set by the Schedule transition only.
    pub diag_id: Option<i64>,
    /// Assigned mechanic. Bound on the first Repair submission when unset.
    pub mechanic_id: Option<i64>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pay_at: Option<DateTime<Utc>>,
    /// Itemised diagnostic estimate, NOT the settled price.
    pub diag_price: Option<f64>,
    /// Itemised repair estimate, NOT the settled price.
    pub mechanic_price: Option<f64>,
}

/// Insert record for [`Application`]. The store assigns the id; status starts
/// at WAITING and priority at LOW.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewApplication {
    pub client_id: i64,
    pub car_id: i64,
    pub problem: Option<String>,
    pub conn: i32,
    pub created_at: DateTime<Utc>,
}

/// Settlement record, one-to-one with a COMPLETED application. Created
/// exactly once; immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Primary key and foreign key onto the application.
    pub application_id: i64,
    /// The settled price, distinct from the itemised estimates on the
    /// application.
    pub price: f64,
    pub method: PayMethod,
    pub pay_time: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
