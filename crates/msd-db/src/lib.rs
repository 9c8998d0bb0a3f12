//! msd-db
//!
//! PostgreSQL backend for the workflow core: [`PgStore`] implements
//! `msd_workflow::WorkOrderStore` over sqlx.
//!
//! Concurrency contract (see the `WorkOrderStore` trait docs):
//! - the partial unique index `uq_car_active_application` makes the per-car
//!   conflict guard race-free at insert time;
//! - guarded application writes are `UPDATE ... WHERE id = $1 AND status = $2`,
//!   a CAS on the status column. Zero rows affected on an existing row
//!   means a concurrent transition won; the caller sees `Conflict`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use async_trait::async_trait;
use msd_schemas::{
    Application, Car, Client, NewApplication, NewCar, PayMethod, Payment, Priority, Role, Status,
    User,
};
use msd_workflow::{Entity, StoreError, WorkOrderStore};

pub const ENV_DB_URL: &str = "MSD_DATABASE_URL";

/// Connect to Postgres using MSD_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='application'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_application_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_application_table: bool,
}

/// Count applications in an active status. Used by CLI guardrails to prevent
/// accidental migration of a database with live work in flight.
pub async fn count_active_applications(pool: &PgPool) -> Result<i64> {
    // If schema doesn't exist yet, treat as 0 (safe) rather than failing.
    let st = status(pool).await?;
    if !st.has_application_table {
        return Ok(0);
    }

    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        select count(*)::bigint
        from application
        where status in ('WAITING','CARWAITING','DIAGNOSTIC','REPAIR','READY')
        "#,
    )
    .fetch_one(pool)
    .await
    .context("count_active_applications failed")?;

    Ok(n)
}

/// Convenience boolean.
pub async fn has_active_applications(pool: &PgPool) -> Result<bool> {
    Ok(count_active_applications(pool).await? > 0)
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Detect a Postgres unique constraint violation by name.
fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.constraint() == Some(constraint)
                // Postgres unique_violation is 23505. Not always present, but helps.
                || db_err.code().as_deref() == Some("23505")
                    && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

fn is_any_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn client_from_row(row: &PgRow) -> Result<Client> {
    Ok(Client {
        client_id: row.try_get("client_id")?,
        user_name: row.try_get("user_name")?,
        phone: row.try_get("phone")?,
    })
}

fn car_from_row(row: &PgRow) -> Result<Car> {
    Ok(Car {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        brand: row.try_get("brand")?,
        model: row.try_get("model")?,
        number: row.try_get("number")?,
        year: row.try_get("year")?,
        deleted: row.try_get("deleted")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        user_id: row.try_get("user_id")?,
        role: Role::parse(&row.try_get::<String, _>("role")?)?,
        user_name: row.try_get("user_name")?,
        hashed_password: row.try_get("hashed_password")?,
        phone: row.try_get("phone")?,
    })
}

fn application_from_row(row: &PgRow) -> Result<Application> {
    Ok(Application {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        car_id: row.try_get("car_id")?,
        problem: row.try_get("problem")?,
        conn: row.try_get("conn")?,
        admin_comment: row.try_get("admin_comment")?,
        diag_comment: row.try_get("diag_comment")?,
        mechanic_comment: row.try_get("mechanic_comment")?,
        status: Status::parse(&row.try_get::<String, _>("status")?)?,
        priority: Priority::parse(&row.try_get::<String, _>("priority")?)?,
        diag_id: row.try_get("diag_id")?,
        mechanic_id: row.try_get("mechanic_id")?,
        arrival_time: row.try_get("arrival_time")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        finished_at: row.try_get("finished_at")?,
        pay_at: row.try_get("pay_at")?,
        diag_price: row.try_get("diag_price")?,
        mechanic_price: row.try_get("mechanic_price")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment> {
    Ok(Payment {
        application_id: row.try_get("application_id")?,
        price: row.try_get("price")?,
        method: PayMethod::parse(&row.try_get::<String, _>("payment_method")?)?,
        pay_time: row.try_get("pay_time")?,
    })
}

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

/// Postgres-backed [`WorkOrderStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl WorkOrderStore for PgStore {
    async fn insert_client(&self, client: &Client) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            insert into client_account (client_id, user_name, phone)
            values ($1, $2, $3)
            "#,
        )
        .bind(client.client_id)
        .bind(&client.user_name)
        .bind(&client.phone)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) if is_any_unique_violation(&e) => Err(StoreError::DuplicateKey),
            Err(e) => Err(anyhow::Error::new(e).context("insert_client failed").into()),
        }
    }

    async fn fetch_client(&self, client_id: i64) -> Result<Client, StoreError> {
        let row = sqlx::query("select * from client_account where client_id = $1")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .context("fetch_client failed")?
            .ok_or(StoreError::NotFound(Entity::Client))?;
        Ok(client_from_row(&row)?)
    }

    async fn update_client_phone(&self, client_id: i64, phone: &str) -> Result<(), StoreError> {
        let res = sqlx::query("update client_account set phone = $2 where client_id = $1")
            .bind(client_id)
            .bind(phone)
            .execute(&self.pool)
            .await;

        match res {
            Ok(done) if done.rows_affected() == 0 => Err(StoreError::NotFound(Entity::Client)),
            Ok(_) => Ok(()),
            Err(e) if is_any_unique_violation(&e) => Err(StoreError::DuplicateKey),
            Err(e) => Err(anyhow::Error::new(e)
                .context("update_client_phone failed")
                .into()),
        }
    }

    async fn insert_car(&self, car: &NewCar) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            insert into car (client_id, brand, model, number, year)
            values ($1, $2, $3, $4, $5)
            returning id
            "#,
        )
        .bind(car.client_id)
        .bind(&car.brand)
        .bind(&car.model)
        .bind(&car.number)
        .bind(car.year)
        .fetch_one(&self.pool)
        .await
        .context("insert_car failed")?;
        Ok(row.try_get::<i64, _>("id").context("insert_car returning")?)
    }

    async fn fetch_car(&self, car_id: i64) -> Result<Car, StoreError> {
        let row = sqlx::query("select * from car where id = $1")
            .bind(car_id)
            .fetch_optional(&self.pool)
            .await
            .context("fetch_car failed")?
            .ok_or(StoreError::NotFound(Entity::Car))?;
        Ok(car_from_row(&row)?)
    }

    async fn cars_of_client(&self, client_id: i64) -> Result<Vec<Car>, StoreError> {
        let rows = sqlx::query(
            "select * from car where client_id = $1 and not deleted order by id",
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .context("cars_of_client failed")?;
        let mut cars = Vec::with_capacity(rows.len());
        for row in &rows {
            cars.push(car_from_row(row)?);
        }
        Ok(cars)
    }

    async fn soft_delete_car(&self, car_id: i64) -> Result<(), StoreError> {
        let done = sqlx::query("update car set deleted = true where id = $1")
            .bind(car_id)
            .execute(&self.pool)
            .await
            .context("soft_delete_car failed")?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(Entity::Car));
        }
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            insert into user_account (user_id, role, user_name, hashed_password, phone)
            values ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.user_id)
        .bind(user.role.as_str())
        .bind(&user.user_name)
        .bind(&user.hashed_password)
        .bind(&user.phone)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) if is_any_unique_violation(&e) => Err(StoreError::DuplicateKey),
            Err(e) => Err(anyhow::Error::new(e).context("insert_user failed").into()),
        }
    }

    async fn fetch_user(&self, user_id: i64) -> Result<User, StoreError> {
        let row = sqlx::query("select * from user_account where user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("fetch_user failed")?
            .ok_or(StoreError::NotFound(Entity::User))?;
        Ok(user_from_row(&row)?)
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query("select * from user_account where role = $1 order by user_id")
            .bind(role.as_str())
            .fetch_all(&self.pool)
            .await
            .context("list_users_by_role failed")?;
        let mut users = Vec::with_capacity(rows.len());
        for row in &rows {
            users.push(user_from_row(row)?);
        }
        Ok(users)
    }

    async fn insert_application(&self, app: &NewApplication) -> Result<i64, StoreError> {
        let res = sqlx::query(
            r#"
            insert into application (
              client_id, car_id, problem, conn, status, priority, created_at, updated_at
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $7
            )
            returning id
            "#,
        )
        .bind(app.client_id)
        .bind(app.car_id)
        .bind(&app.problem)
        .bind(app.conn)
        .bind(Status::Waiting.as_str())
        .bind(Priority::Low.as_str())
        .bind(app.created_at)
        .fetch_one(&self.pool)
        .await;

        match res {
            Ok(row) => Ok(row
                .try_get::<i64, _>("id")
                .context("insert_application returning")?),
            Err(e) if is_unique_constraint_violation(&e, "uq_car_active_application") => {
                Err(StoreError::ActiveApplicationExists)
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context("insert_application failed")
                .into()),
        }
    }

    async fn fetch_application(&self, app_id: i64) -> Result<Application, StoreError> {
        let row = sqlx::query("select * from application where id = $1")
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await
            .context("fetch_application failed")?
            .ok_or(StoreError::NotFound(Entity::Application))?;
        Ok(application_from_row(&row)?)
    }

    async fn update_application_guarded(
        &self,
        app: &Application,
        expected_status: Status,
    ) -> Result<(), StoreError> {
        // CAS on the status column: the WHERE clause only matches if no
        // concurrent transition has committed since our snapshot.
        let done = sqlx::query(
            r#"
            update application set
              problem = $3,
              admin_comment = $4,
              diag_comment = $5,
              mechanic_comment = $6,
              status = $7,
              priority = $8,
              diag_id = $9,
              mechanic_id = $10,
              arrival_time = $11,
              updated_at = $12,
              finished_at = $13,
              pay_at = $14,
              diag_price = $15,
              mechanic_price = $16
            where id = $1 and status = $2
            "#,
        )
        .bind(app.id)
        .bind(expected_status.as_str())
        .bind(&app.problem)
        .bind(&app.admin_comment)
        .bind(&app.diag_comment)
        .bind(&app.mechanic_comment)
        .bind(app.status.as_str())
        .bind(app.priority.as_str())
        .bind(app.diag_id)
        .bind(app.mechanic_id)
        .bind(app.arrival_time)
        .bind(app.updated_at)
        .bind(app.finished_at)
        .bind(app.pay_at)
        .bind(app.diag_price)
        .bind(app.mechanic_price)
        .execute(&self.pool)
        .await
        .context("update_application_guarded failed")?;

        if done.rows_affected() == 0 {
            // Distinguish a lost race from a missing row.
            let exists: (bool,) = sqlx::query_as::<_, (bool,)>(
                "select exists (select 1 from application where id = $1)",
            )
            .bind(app.id)
            .fetch_one(&self.pool)
            .await
            .context("update_application_guarded existence probe failed")?;
            return if exists.0 {
                Err(StoreError::Conflict)
            } else {
                Err(StoreError::NotFound(Entity::Application))
            };
        }
        Ok(())
    }

    async fn update_arrival_time(
        &self,
        app_id: i64,
        arrival: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let done = sqlx::query(
            "update application set arrival_time = $2, updated_at = $3 where id = $1",
        )
        .bind(app_id)
        .bind(arrival)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .context("update_arrival_time failed")?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(Entity::Application));
        }
        Ok(())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            insert into payment (application_id, price, payment_method, pay_time)
            values ($1, $2, $3, $4)
            "#,
        )
        .bind(payment.application_id)
        .bind(payment.price)
        .bind(payment.method.as_str())
        .bind(payment.pay_time)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_constraint_violation(&e, "payment_pkey") => {
                Err(StoreError::PaymentExists)
            }
            Err(e) => Err(anyhow::Error::new(e).context("insert_payment failed").into()),
        }
    }

    async fn fetch_payment(&self, application_id: i64) -> Result<Payment, StoreError> {
        let row = sqlx::query("select * from payment where application_id = $1")
            .bind(application_id)
            .fetch_optional(&self.pool)
            .await
            .context("fetch_payment failed")?
            .ok_or(StoreError::NotFound(Entity::Payment))?;
        Ok(payment_from_row(&row)?)
    }
}
