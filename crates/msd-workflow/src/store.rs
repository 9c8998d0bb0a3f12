//! Persistence trait for all work-order state.
//!
//! The engine operates exclusively through this trait, enabling pluggable
//! backends: [`crate::mem::MemStore`] for tests and embedded use, Postgres
//! (`msd-db`) for production.
//!
//! # Transactional contract
//!
//! - [`insert_application`](WorkOrderStore::insert_application) performs the
//!   existence-check-then-insert for the per-car conflict guard as one atomic
//!   unit: two concurrent creates for the same car must not both succeed.
//! - [`update_application_guarded`](WorkOrderStore::update_application_guarded)
//!   is a compare-and-swap on the application's status: it writes the full
//!   mutable field set only if the stored status still equals
//!   `expected_status`, otherwise fails with [`StoreError::Conflict`]. This
//!   serialises concurrent transitions per application id: exactly one of
//!   two racing transitions wins.
//! - [`insert_payment`](WorkOrderStore::insert_payment) fails with
//!   [`StoreError::PaymentExists`] on a duplicate application id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use msd_schemas::{Application, Car, Client, NewApplication, NewCar, Payment, Role, User};

use crate::error::StoreError;

#[async_trait]
pub trait WorkOrderStore: Send + Sync {
    // ── Clients ──

    async fn insert_client(&self, client: &Client) -> Result<(), StoreError>;
    async fn fetch_client(&self, client_id: i64) -> Result<Client, StoreError>;
    /// Phone replacement, the only client mutation.
    async fn update_client_phone(&self, client_id: i64, phone: &str) -> Result<(), StoreError>;

    // ── Cars ──

    /// Insert a car and return the store-assigned id.
    async fn insert_car(&self, car: &NewCar) -> Result<i64, StoreError>;
    async fn fetch_car(&self, car_id: i64) -> Result<Car, StoreError>;
    async fn cars_of_client(&self, client_id: i64) -> Result<Vec<Car>, StoreError>;
    /// Soft delete: sets the `deleted` flag, never removes the row.
    async fn soft_delete_car(&self, car_id: i64) -> Result<(), StoreError>;

    // ── Users ──

    /// Duplicate `user_id` or phone fails with [`StoreError::DuplicateKey`].
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn fetch_user(&self, user_id: i64) -> Result<User, StoreError>;
    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError>;

    // ── Applications ──

    /// Conflict-guarded insert: fails with
    /// [`StoreError::ActiveApplicationExists`] if the car already has an
    /// application in an active status. Returns the assigned id.
    async fn insert_application(&self, app: &NewApplication) -> Result<i64, StoreError>;
    async fn fetch_application(&self, app_id: i64) -> Result<Application, StoreError>;
    /// Status-guarded compare-and-swap write of the full mutable field set.
    async fn update_application_guarded(
        &self,
        app: &Application,
        expected_status: msd_schemas::Status,
    ) -> Result<(), StoreError>;
    /// Arrival-time metadata update. No status guard: rescheduling is legal
    /// at any point after triage.
    async fn update_arrival_time(
        &self,
        app_id: i64,
        arrival: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // ── Payments ──

    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError>;
    async fn fetch_payment(&self, application_id: i64) -> Result<Payment, StoreError>;
}
