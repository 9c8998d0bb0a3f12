//! Workflow engine: the single choke-point for work-order mutations.
//!
//! Every operation is one bounded check-then-write unit: load the aggregate,
//! validate with the pure state machine, persist through a status-guarded
//! compare-and-swap. A CAS miss surfaces [`WorkflowError::Conflict`] and the
//! caller re-reads; no partial write is ever observable, and no retry or
//! background work happens inside the engine.

use chrono::{DateTime, Utc};
use msd_schemas::{
    Application, Car, Client, NewApplication, NewCar, PayMethod, Payment, Priority, Role, Status,
    User,
};
use tracing::info;

use crate::assignment::{resolve_assignee, AssigneeResolution};
use crate::error::{Entity, WorkflowError};
use crate::machine::{Caller, DiagVerdict, RequeueTarget, Transition};
use crate::store::WorkOrderStore;

/// Creation payload for a new work order, as received from the client layer.
#[derive(Debug, Clone, PartialEq)]
pub struct NewApplicationRequest {
    pub car_id: i64,
    pub problem: Option<String>,
    /// Preferred contact-channel code.
    pub conn: i32,
}

/// The workflow engine. Generic over the store so production (Postgres) and
/// tests (in-memory) run the identical domain path.
pub struct WorkflowEngine<S: WorkOrderStore> {
    store: S,
}

impl<S: WorkOrderStore> WorkflowEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Direct store access for adapters layered on top (read models, CLI).
    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Application lifecycle ──

    /// Client submits a problem against an owned, non-deleted car with no
    /// existing active application. Returns the new application id.
    ///
    /// The active-application check and the insert are one atomic store call,
    /// so concurrent creates for the same car cannot both succeed.
    pub async fn create_application(
        &self,
        caller: &Caller,
        req: NewApplicationRequest,
    ) -> Result<i64, WorkflowError> {
        if caller.role != Role::Client {
            return Err(WorkflowError::RoleMismatch(format!(
                "create_application requires role CLIENT, caller has {}",
                caller.role.as_str()
            )));
        }
        let client = self.store.fetch_client(caller.user_id).await?;
        let car = self.store.fetch_car(req.car_id).await?;
        if car.client_id != client.client_id {
            return Err(WorkflowError::RoleMismatch(format!(
                "car {} does not belong to client {}",
                car.id, client.client_id
            )));
        }
        // Soft-deleted cars are invisible to new work.
        if car.deleted {
            return Err(WorkflowError::NotFound(Entity::Car));
        }

        let now = Utc::now();
        let id = self
            .store
            .insert_application(&NewApplication {
                client_id: client.client_id,
                car_id: car.id,
                problem: req.problem,
                conn: req.conn,
                created_at: now,
            })
            .await?;
        info!(app_id = id, car_id = car.id, client_id = client.client_id, "application created");
        Ok(id)
    }

    pub async fn get_application(&self, app_id: i64) -> Result<Application, WorkflowError> {
        Ok(self.store.fetch_application(app_id).await?)
    }

    /// Admin accepts a WAITING application: validates the diagnostician via
    /// the assignment resolver, then applies the Schedule transition.
    pub async fn schedule(
        &self,
        caller: &Caller,
        app_id: i64,
        admin_comment: Option<String>,
        priority: Priority,
        diag_id: i64,
    ) -> Result<Application, WorkflowError> {
        // Resolver validates role membership of the assignee before the
        // transition can bind it.
        match resolve_assignee(&self.store, Role::Diagnostic, Some(diag_id)).await? {
            AssigneeResolution::Resolved(_) => {}
            AssigneeResolution::Candidates(_) => unreachable!("explicit id always resolves"),
        }
        self.apply(
            caller,
            app_id,
            Transition::Schedule {
                admin_comment,
                priority,
                diag_id,
            },
        )
        .await
    }

    /// Admin turns the application down (any non-terminal status).
    pub async fn reject(
        &self,
        caller: &Caller,
        app_id: i64,
        admin_comment: Option<String>,
    ) -> Result<Application, WorkflowError> {
        self.apply(caller, app_id, Transition::Reject { admin_comment })
            .await
    }

    /// Admin sends the application back to an earlier queue.
    pub async fn requeue(
        &self,
        caller: &Caller,
        app_id: i64,
        to: RequeueTarget,
    ) -> Result<Application, WorkflowError> {
        self.apply(caller, app_id, Transition::Requeue { to }).await
    }

    /// The assigned diagnostician checks the car in.
    pub async fn begin_diagnostic(
        &self,
        caller: &Caller,
        app_id: i64,
    ) -> Result<Application, WorkflowError> {
        self.apply(caller, app_id, Transition::BeginDiagnostic).await
    }

    /// The assigned diagnostician records the assessment.
    pub async fn diagnose(
        &self,
        caller: &Caller,
        app_id: i64,
        diag_comment: Option<String>,
        diag_price: f64,
        verdict: DiagVerdict,
    ) -> Result<Application, WorkflowError> {
        self.apply(
            caller,
            app_id,
            Transition::Diagnose {
                diag_comment,
                diag_price,
                verdict,
            },
        )
        .await
    }

    /// A mechanic records the completed repair.
    pub async fn repair(
        &self,
        caller: &Caller,
        app_id: i64,
        mechanic_comment: Option<String>,
        mechanic_price: f64,
    ) -> Result<Application, WorkflowError> {
        self.apply(
            caller,
            app_id,
            Transition::Repair {
                mechanic_comment,
                mechanic_price,
            },
        )
        .await
    }

    /// Admin closes out a READY application and records the settlement in
    /// one call: READY → COMPLETED, then exactly one Payment row.
    ///
    /// `price` is the settled amount supplied by the caller, never derived
    /// from the itemised `diag_price`/`mechanic_price` estimates.
    pub async fn finish(
        &self,
        caller: &Caller,
        app_id: i64,
        price: f64,
        method: PayMethod,
    ) -> Result<Application, WorkflowError> {
        let now = Utc::now();
        let app = self.apply_at(caller, app_id, Transition::Finish, now).await?;
        self.record_settlement(app_id, price, method, now).await?;
        Ok(app)
    }

    /// Record a settlement for an application that is already COMPLETED but
    /// has no Payment yet. Duplicate attempts fail with `AlreadySettled` and
    /// leave the original Payment unchanged.
    pub async fn finalize_settlement(
        &self,
        caller: &Caller,
        app_id: i64,
        price: f64,
        method: PayMethod,
    ) -> Result<Payment, WorkflowError> {
        if caller.role != Role::Admin {
            return Err(WorkflowError::RoleMismatch(format!(
                "finalize_settlement requires role ADMIN, caller has {}",
                caller.role.as_str()
            )));
        }
        let app = self.store.fetch_application(app_id).await?;
        if app.status != Status::Completed {
            return Err(WorkflowError::InvalidTransition {
                from: app.status,
                op: "finalize_settlement",
            });
        }
        self.record_settlement(app_id, price, method, Utc::now()).await
    }

    /// Admin records or corrects the car's arrival slot. Pure metadata:
    /// idempotent, no status change, accepted in any status after triage
    /// (everything except WAITING).
    pub async fn set_arrival_time(
        &self,
        caller: &Caller,
        app_id: i64,
        arrival: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if caller.role != Role::Admin {
            return Err(WorkflowError::RoleMismatch(format!(
                "set_arrival_time requires role ADMIN, caller has {}",
                caller.role.as_str()
            )));
        }
        let app = self.store.fetch_application(app_id).await?;
        if app.status == Status::Waiting {
            return Err(WorkflowError::InvalidTransition {
                from: app.status,
                op: "set_arrival_time",
            });
        }
        self.store
            .update_arrival_time(app_id, arrival, Utc::now())
            .await?;
        Ok(())
    }

    /// Assignment resolver, exposed for the admin's scheduling flow.
    pub async fn resolve_assignee(
        &self,
        target_role: Role,
        user_id: Option<i64>,
    ) -> Result<AssigneeResolution, WorkflowError> {
        resolve_assignee(&self.store, target_role, user_id).await
    }

    // ── Entity pass-throughs ──

    pub async fn register_client(&self, client: Client) -> Result<(), WorkflowError> {
        self.store.insert_client(&client).await?;
        Ok(())
    }

    pub async fn replace_client_phone(
        &self,
        client_id: i64,
        phone: &str,
    ) -> Result<(), WorkflowError> {
        self.store.update_client_phone(client_id, phone).await?;
        Ok(())
    }

    /// Register a car for an existing client. Returns the car id.
    pub async fn add_car(&self, car: NewCar) -> Result<i64, WorkflowError> {
        self.store.fetch_client(car.client_id).await?;
        Ok(self.store.insert_car(&car).await?)
    }

    pub async fn cars_of_client(&self, client_id: i64) -> Result<Vec<Car>, WorkflowError> {
        Ok(self.store.cars_of_client(client_id).await?)
    }

    /// Soft delete. Allowed to the owning client or an admin.
    pub async fn soft_delete_car(&self, caller: &Caller, car_id: i64) -> Result<(), WorkflowError> {
        let car = self.store.fetch_car(car_id).await?;
        let allowed = match caller.role {
            Role::Client => car.client_id == caller.user_id,
            Role::Admin => true,
            _ => false,
        };
        if !allowed {
            return Err(WorkflowError::RoleMismatch(format!(
                "caller {} may not delete car {}",
                caller.user_id, car_id
            )));
        }
        self.store.soft_delete_car(car_id).await?;
        Ok(())
    }

    /// Staff onboarding, SUPERADMIN only. Roles are immutable afterwards.
    pub async fn add_user(&self, caller: &Caller, user: User) -> Result<(), WorkflowError> {
        if caller.role != Role::SuperAdmin {
            return Err(WorkflowError::RoleMismatch(format!(
                "add_user requires role SUPERADMIN, caller has {}",
                caller.role.as_str()
            )));
        }
        self.store.insert_user(&user).await?;
        Ok(())
    }

    // ── Internals ──

    async fn apply(
        &self,
        caller: &Caller,
        app_id: i64,
        transition: Transition,
    ) -> Result<Application, WorkflowError> {
        self.apply_at(caller, app_id, transition, Utc::now()).await
    }

    /// Load → pure validate → CAS persist. The snapshot status taken at load
    /// time is the CAS guard, so a concurrent transition that committed in
    /// between turns this write into a `Conflict`.
    async fn apply_at(
        &self,
        caller: &Caller,
        app_id: i64,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<Application, WorkflowError> {
        let mut app = self.store.fetch_application(app_id).await?;
        let expected = app.status;
        transition.apply(&mut app, caller, now)?;
        self.store
            .update_application_guarded(&app, expected)
            .await?;
        info!(
            app_id,
            op = transition.op(),
            from = expected.as_str(),
            to = app.status.as_str(),
            "transition applied"
        );
        Ok(app)
    }

    async fn record_settlement(
        &self,
        app_id: i64,
        price: f64,
        method: PayMethod,
        now: DateTime<Utc>,
    ) -> Result<Payment, WorkflowError> {
        let payment = Payment {
            application_id: app_id,
            price,
            method,
            pay_time: now,
        };
        self.store.insert_payment(&payment).await?;
        info!(app_id, price, method = method.as_str(), "settlement recorded");
        Ok(payment)
    }
}
