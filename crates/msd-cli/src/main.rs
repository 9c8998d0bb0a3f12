//! `msd` operator CLI.
//!
//! Thin shell over [`msd_workflow::WorkflowEngine`] backed by the Postgres
//! store. Staff identity is given with `--as <user_id>`; the role is read
//! from the user row, never trusted from the command line.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use msd_schemas::{Application, NewCar, PayMethod, Priority, Role};
use msd_workflow::{
    AssigneeResolution, Caller, DiagVerdict, NewApplicationRequest, RequeueTarget, WorkOrderStore,
    WorkflowEngine,
};

#[derive(Parser)]
#[command(name = "msd")]
#[command(about = "MotorShop Desk CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Work-order lifecycle commands
    App {
        #[command(subcommand)]
        cmd: AppCmd,
    },

    /// Staff and car registry commands
    Registry {
        #[command(subcommand)]
        cmd: RegistryCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations. Guardrail: refuses while any application is
    /// in an active status unless --yes is provided.
    Migrate {
        /// Acknowledge you are migrating a DB with work orders in flight.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum AppCmd {
    /// Submit a new work order on behalf of a client.
    Create {
        #[arg(long)]
        client: i64,

        #[arg(long)]
        car: i64,

        #[arg(long)]
        problem: Option<String>,

        /// Preferred contact-channel code.
        #[arg(long, default_value_t = 1)]
        conn: i32,
    },

    /// Accept a WAITING order: set priority, assign a diagnostician.
    Schedule {
        #[arg(long = "as")]
        as_user: i64,

        #[arg(long)]
        app: i64,

        #[arg(long)]
        comment: Option<String>,

        /// LOW | MEDIUM | HIGH
        #[arg(long, default_value = "LOW")]
        priority: String,

        /// Diagnostician user id. Omit to list candidates instead.
        #[arg(long)]
        diag: Option<i64>,
    },

    /// Turn an order down (any non-terminal status).
    Reject {
        #[arg(long = "as")]
        as_user: i64,

        #[arg(long)]
        app: i64,

        #[arg(long)]
        comment: Option<String>,
    },

    /// Send an order back to an earlier queue (WAITING | CARWAITING).
    Requeue {
        #[arg(long = "as")]
        as_user: i64,

        #[arg(long)]
        app: i64,

        #[arg(long)]
        to: String,
    },

    /// Check the car in (CARWAITING -> DIAGNOSTIC).
    Checkin {
        #[arg(long = "as")]
        as_user: i64,

        #[arg(long)]
        app: i64,
    },

    /// Record the diagnostic verdict (DIAGNOSTIC -> REPAIR | REJECTED).
    Diagnose {
        #[arg(long = "as")]
        as_user: i64,

        #[arg(long)]
        app: i64,

        #[arg(long)]
        comment: Option<String>,

        #[arg(long)]
        price: f64,

        /// Pass to reject instead of sending to repair.
        #[arg(long, default_value_t = false)]
        reject: bool,
    },

    /// Record the completed repair (REPAIR -> READY).
    Repair {
        #[arg(long = "as")]
        as_user: i64,

        #[arg(long)]
        app: i64,

        #[arg(long)]
        comment: Option<String>,

        #[arg(long)]
        price: f64,
    },

    /// Close out a READY order and record the settlement.
    Finish {
        #[arg(long = "as")]
        as_user: i64,

        #[arg(long)]
        app: i64,

        /// Settled amount. Not derived from the itemised estimates.
        #[arg(long)]
        price: f64,

        /// CARD | CASH
        #[arg(long, default_value = "CASH")]
        method: String,
    },

    /// Record or correct the car's arrival slot (RFC 3339).
    Arrival {
        #[arg(long = "as")]
        as_user: i64,

        #[arg(long)]
        app: i64,

        #[arg(long)]
        at: String,
    },

    /// Print the application row.
    Status {
        #[arg(long)]
        app: i64,
    },
}

#[derive(Subcommand)]
enum RegistryCmd {
    /// Onboard a staff account. SUPERADMIN only.
    AddUser {
        #[arg(long = "as")]
        as_user: i64,

        #[arg(long)]
        user: i64,

        /// ADMIN | DIAGNOSTIC | MECHANIC
        #[arg(long)]
        role: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        phone: String,

        /// Pre-hashed password material.
        #[arg(long)]
        hashed_password: String,
    },

    /// Register a car for an existing client.
    AddCar {
        #[arg(long)]
        client: i64,

        #[arg(long)]
        brand: String,

        #[arg(long)]
        model: String,

        #[arg(long)]
        number: String,

        #[arg(long)]
        year: i32,
    },

    /// List a client's cars (soft-deleted hidden).
    Cars {
        #[arg(long)]
        client: i64,
    },

    /// Soft-delete a car.
    DeleteCar {
        #[arg(long = "as")]
        as_user: i64,

        /// Interpret --as as a client id rather than a staff id.
        #[arg(long, default_value_t = false)]
        as_client: bool,

        #[arg(long)]
        car: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = msd_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = msd_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_application_table={}",
                        s.ok, s.has_application_table
                    );
                }
                DbCmd::Migrate { yes } => {
                    let n = msd_db::count_active_applications(&pool).await?;
                    if n > 0 && !yes {
                        anyhow::bail!(
                            "REFUSING MIGRATE: detected {} application(s) in an active status. Re-run with: `msd db migrate --yes`",
                            n
                        );
                    }

                    msd_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::App { cmd } => {
            let engine = engine_from_env().await?;
            match cmd {
                AppCmd::Create {
                    client,
                    car,
                    problem,
                    conn,
                } => {
                    let caller = Caller::new(client, Role::Client);
                    let id = engine
                        .create_application(
                            &caller,
                            NewApplicationRequest {
                                car_id: car,
                                problem,
                                conn,
                            },
                        )
                        .await?;
                    println!("created=true app_id={} status=WAITING", id);
                }

                AppCmd::Schedule {
                    as_user,
                    app,
                    comment,
                    priority,
                    diag,
                } => {
                    let caller = staff_caller(&engine, as_user).await?;
                    let priority = Priority::parse(&priority)?;
                    match diag {
                        Some(diag_id) => {
                            let a = engine
                                .schedule(&caller, app, comment, priority, diag_id)
                                .await?;
                            print_app(&a);
                        }
                        None => {
                            // No diagnostician given: print the candidate
                            // list instead of transitioning.
                            match engine.resolve_assignee(Role::Diagnostic, None).await? {
                                AssigneeResolution::Resolved(u) => {
                                    println!("candidate user_id={}", u.user_id)
                                }
                                AssigneeResolution::Candidates(us) => {
                                    for u in us {
                                        println!("candidate user_id={}", u.user_id);
                                    }
                                }
                            }
                        }
                    }
                }

                AppCmd::Reject {
                    as_user,
                    app,
                    comment,
                } => {
                    let caller = staff_caller(&engine, as_user).await?;
                    let a = engine.reject(&caller, app, comment).await?;
                    print_app(&a);
                }

                AppCmd::Requeue { as_user, app, to } => {
                    let caller = staff_caller(&engine, as_user).await?;
                    let to = match to.as_str() {
                        "WAITING" => RequeueTarget::Waiting,
                        "CARWAITING" => RequeueTarget::CarWaiting,
                        other => anyhow::bail!("unknown requeue target: {other}"),
                    };
                    let a = engine.requeue(&caller, app, to).await?;
                    print_app(&a);
                }

                AppCmd::Checkin { as_user, app } => {
                    let caller = staff_caller(&engine, as_user).await?;
                    let a = engine.begin_diagnostic(&caller, app).await?;
                    print_app(&a);
                }

                AppCmd::Diagnose {
                    as_user,
                    app,
                    comment,
                    price,
                    reject,
                } => {
                    let caller = staff_caller(&engine, as_user).await?;
                    let verdict = if reject {
                        DiagVerdict::Reject
                    } else {
                        DiagVerdict::Repair
                    };
                    let a = engine.diagnose(&caller, app, comment, price, verdict).await?;
                    print_app(&a);
                }

                AppCmd::Repair {
                    as_user,
                    app,
                    comment,
                    price,
                } => {
                    let caller = staff_caller(&engine, as_user).await?;
                    let a = engine.repair(&caller, app, comment, price).await?;
                    print_app(&a);
                }

                AppCmd::Finish {
                    as_user,
                    app,
                    price,
                    method,
                } => {
                    let caller = staff_caller(&engine, as_user).await?;
                    let method = PayMethod::parse(&method)?;
                    let a = engine.finish(&caller, app, price, method).await?;
                    print_app(&a);
                    println!("settled=true price={} method={}", price, method.as_str());
                }

                AppCmd::Arrival { as_user, app, at } => {
                    let caller = staff_caller(&engine, as_user).await?;
                    let at: DateTime<Utc> = at
                        .parse()
                        .context("--at must be an RFC 3339 timestamp")?;
                    engine.set_arrival_time(&caller, app, at).await?;
                    println!("arrival_set=true app_id={} at={}", app, at.to_rfc3339());
                }

                AppCmd::Status { app } => {
                    let a = engine.get_application(app).await?;
                    print_app(&a);
                }
            }
        }

        Commands::Registry { cmd } => {
            let engine = engine_from_env().await?;
            match cmd {
                RegistryCmd::AddUser {
                    as_user,
                    user,
                    role,
                    name,
                    phone,
                    hashed_password,
                } => {
                    let caller = staff_caller(&engine, as_user).await?;
                    let role = Role::parse(&role)?;
                    engine
                        .add_user(
                            &caller,
                            msd_schemas::User {
                                user_id: user,
                                role,
                                user_name: name,
                                hashed_password,
                                phone,
                            },
                        )
                        .await?;
                    println!("user_added=true user_id={} role={}", user, role.as_str());
                }

                RegistryCmd::AddCar {
                    client,
                    brand,
                    model,
                    number,
                    year,
                } => {
                    let id = engine
                        .add_car(NewCar {
                            client_id: client,
                            brand,
                            model,
                            number,
                            year,
                        })
                        .await?;
                    println!("car_added=true car_id={}", id);
                }

                RegistryCmd::Cars { client } => {
                    for car in engine.cars_of_client(client).await? {
                        println!(
                            "car_id={} brand={} model={} number={} year={}",
                            car.id, car.brand, car.model, car.number, car.year
                        );
                    }
                }

                RegistryCmd::DeleteCar {
                    as_user,
                    as_client,
                    car,
                } => {
                    let caller = if as_client {
                        Caller::new(as_user, Role::Client)
                    } else {
                        staff_caller(&engine, as_user).await?
                    };
                    engine.soft_delete_car(&caller, car).await?;
                    println!("car_deleted=true car_id={}", car);
                }
            }
        }
    }

    Ok(())
}

async fn engine_from_env() -> Result<WorkflowEngine<msd_db::PgStore>> {
    let pool = msd_db::connect_from_env().await?;
    Ok(WorkflowEngine::new(msd_db::PgStore::new(pool)))
}

/// Resolve a staff caller from the user table so the role comes from the
/// record, not the command line.
async fn staff_caller(
    engine: &WorkflowEngine<msd_db::PgStore>,
    user_id: i64,
) -> Result<Caller> {
    let user = engine
        .store()
        .fetch_user(user_id)
        .await
        .with_context(|| format!("unknown staff user {user_id}"))?;
    Ok(Caller::new(user.user_id, user.role))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn print_app(a: &Application) {
    println!("app_id={}", a.id);
    println!("client_id={}", a.client_id);
    println!("car_id={}", a.car_id);
    println!("status={}", a.status.as_str());
    println!("priority={}", a.priority.as_str());
    println!("diag_id={}", opt_i64(&a.diag_id));
    println!("mechanic_id={}", opt_i64(&a.mechanic_id));
    println!("arrival_time={}", opt_dt(&a.arrival_time));
    println!("created_at={}", a.created_at.to_rfc3339());
    println!("updated_at={}", a.updated_at.to_rfc3339());
    println!("finished_at={}", opt_dt(&a.finished_at));
    println!("pay_at={}", opt_dt(&a.pay_at));
}

fn opt_dt(dt: &Option<DateTime<Utc>>) -> String {
    dt.as_ref()
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|| "".to_string())
}

fn opt_i64(v: &Option<i64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_else(|| "".to_string())
}
