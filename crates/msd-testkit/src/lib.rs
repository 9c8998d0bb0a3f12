//! msd-testkit
//!
//! Seeded fixtures for scenario tests: a workshop with one client, one car
//! and a full staff roster, behind a `WorkflowEngine<MemStore>`. The
//! cross-crate scenario tests live under this crate's `tests/` directory.

use msd_schemas::{Client, NewCar, PayMethod, Priority, Role, User};
use msd_workflow::{mem::MemStore, Caller, DiagVerdict, NewApplicationRequest, WorkflowEngine};

/// Well-known fixture identities, used by every scenario test.
pub const CLIENT_ID: i64 = 1;
pub const SUPERADMIN_ID: i64 = 10;
pub const ADMIN_ID: i64 = 100;
pub const DIAG_ID: i64 = 501;
pub const DIAG2_ID: i64 = 502;
pub const MECHANIC_ID: i64 = 900;

/// A seeded workshop: client + car + staff roster over an in-memory store.
pub struct WorkshopFixture {
    pub engine: WorkflowEngine<MemStore>,
    pub car_id: i64,
}

impl WorkshopFixture {
    pub fn client(&self) -> Caller {
        Caller::new(CLIENT_ID, Role::Client)
    }
    pub fn superadmin(&self) -> Caller {
        Caller::new(SUPERADMIN_ID, Role::SuperAdmin)
    }
    pub fn admin(&self) -> Caller {
        Caller::new(ADMIN_ID, Role::Admin)
    }
    pub fn diag(&self) -> Caller {
        Caller::new(DIAG_ID, Role::Diagnostic)
    }
    pub fn diag2(&self) -> Caller {
        Caller::new(DIAG2_ID, Role::Diagnostic)
    }
    pub fn mechanic(&self) -> Caller {
        Caller::new(MECHANIC_ID, Role::Mechanic)
    }

    /// Client submits a fresh work order against the fixture car.
    pub async fn submit(&self, problem: &str) -> anyhow::Result<i64> {
        Ok(self
            .engine
            .create_application(
                &self.client(),
                NewApplicationRequest {
                    car_id: self.car_id,
                    problem: Some(problem.to_string()),
                    conn: 1,
                },
            )
            .await?)
    }

    /// Drive an application from WAITING to DIAGNOSTIC (scheduled to the
    /// fixture diagnostician, car checked in).
    pub async fn advance_to_diagnostic(&self, app_id: i64) -> anyhow::Result<()> {
        self.engine
            .schedule(&self.admin(), app_id, None, Priority::Medium, DIAG_ID)
            .await?;
        self.engine.begin_diagnostic(&self.diag(), app_id).await?;
        Ok(())
    }

    /// Drive an application from WAITING all the way to READY.
    pub async fn advance_to_ready(&self, app_id: i64) -> anyhow::Result<()> {
        self.advance_to_diagnostic(app_id).await?;
        self.engine
            .diagnose(&self.diag(), app_id, None, 40.0, DiagVerdict::Repair)
            .await?;
        self.engine
            .repair(&self.mechanic(), app_id, None, 150.0)
            .await?;
        Ok(())
    }

    /// Drive an application from WAITING to COMPLETED with a card settlement.
    pub async fn advance_to_completed(&self, app_id: i64, price: f64) -> anyhow::Result<()> {
        self.advance_to_ready(app_id).await?;
        self.engine
            .finish(&self.admin(), app_id, price, PayMethod::Card)
            .await?;
        Ok(())
    }
}

fn staff(user_id: i64, role: Role) -> User {
    User {
        user_id,
        role,
        user_name: None,
        hashed_password: "argon2id$test".into(),
        phone: format!("+7900{user_id:07}"),
    }
}

/// Seed the standard workshop fixture.
pub async fn seed_workshop() -> anyhow::Result<WorkshopFixture> {
    let engine = WorkflowEngine::new(MemStore::new());

    engine
        .register_client(Client {
            client_id: CLIENT_ID,
            user_name: Some("Ivan".into()),
            phone: "+70000000001".into(),
        })
        .await?;

    // The superadmin seeds itself through the store; every later staff
    // account goes through the gated onboarding path.
    use msd_workflow::WorkOrderStore;
    engine
        .store()
        .insert_user(&staff(SUPERADMIN_ID, Role::SuperAdmin))
        .await?;

    let superadmin = Caller::new(SUPERADMIN_ID, Role::SuperAdmin);
    for (id, role) in [
        (ADMIN_ID, Role::Admin),
        (DIAG_ID, Role::Diagnostic),
        (DIAG2_ID, Role::Diagnostic),
        (MECHANIC_ID, Role::Mechanic),
    ] {
        engine.add_user(&superadmin, staff(id, role)).await?;
    }

    let car_id = engine
        .add_car(NewCar {
            client_id: CLIENT_ID,
            brand: "Lada".into(),
            model: "Vesta".into(),
            number: "A123BC77".into(),
            year: 2019,
        })
        .await?;

    Ok(WorkshopFixture { engine, car_id })
}
