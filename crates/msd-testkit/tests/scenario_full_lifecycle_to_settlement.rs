//! GIVEN a seeded workshop
//! WHEN a work order walks the full happy path
//! THEN every station hands off in order and settlement lands exactly once.

use msd_schemas::{PayMethod, Priority, Status};
use msd_testkit::{seed_workshop, DIAG_ID, MECHANIC_ID};
use msd_workflow::{DiagVerdict, WorkOrderStore};

#[tokio::test]
async fn full_lifecycle_waiting_to_completed() -> anyhow::Result<()> {
    let fx = seed_workshop().await?;
    let app_id = fx.submit("engine knocks under load").await?;

    let app = fx.engine.get_application(app_id).await?;
    assert_eq!(app.status, Status::Waiting);
    assert!(app.diag_id.is_none());
    assert!(app.mechanic_id.is_none());

    // Admin triages: HIGH priority, assigned to the fixture diagnostician.
    let app = fx
        .engine
        .schedule(
            &fx.admin(),
            app_id,
            Some("bring in tomorrow".into()),
            Priority::High,
            DIAG_ID,
        )
        .await?;
    assert_eq!(app.status, Status::CarWaiting);
    assert_eq!(app.diag_id, Some(DIAG_ID));
    assert_eq!(app.priority, Priority::High);
    assert_eq!(app.admin_comment.as_deref(), Some("bring in tomorrow"));

    // Car checked in by the assigned diagnostician.
    let app = fx.engine.begin_diagnostic(&fx.diag(), app_id).await?;
    assert_eq!(app.status, Status::Diagnostic);

    // Assessment: repairable, 40.0 for the diagnostic work.
    let app = fx
        .engine
        .diagnose(
            &fx.diag(),
            app_id,
            Some("worn rod bearing".into()),
            40.0,
            DiagVerdict::Repair,
        )
        .await?;
    assert_eq!(app.status, Status::Repair);
    assert_eq!(app.diag_price, Some(40.0));

    // Any mechanic may pick up an unassigned repair; doing so binds them.
    let app = fx
        .engine
        .repair(&fx.mechanic(), app_id, Some("bearing replaced".into()), 150.0)
        .await?;
    assert_eq!(app.status, Status::Ready);
    assert_eq!(app.mechanic_id, Some(MECHANIC_ID));
    assert_eq!(app.mechanic_price, Some(150.0));

    // Settlement amount is supplied by the admin, not summed from estimates.
    let app = fx
        .engine
        .finish(&fx.admin(), app_id, 190.0, PayMethod::Card)
        .await?;
    assert_eq!(app.status, Status::Completed);
    assert!(app.finished_at.is_some());
    assert_eq!(app.finished_at, app.pay_at);

    let payment = fx.engine.store().fetch_payment(app_id).await?;
    assert_eq!(payment.price, 190.0);
    assert_eq!(payment.method, PayMethod::Card);

    // Timestamps are monotone across the run, and the payment clock is the
    // same instant the order closed.
    assert!(app.created_at <= app.updated_at);
    assert!(app.finished_at.unwrap() >= app.created_at);
    assert_eq!(Some(payment.pay_time), app.pay_at);
    Ok(())
}

#[tokio::test]
async fn bound_mechanic_excludes_others() -> anyhow::Result<()> {
    let fx = seed_workshop().await?;
    let app_id = fx.submit("gearbox whine").await?;
    fx.advance_to_ready(app_id).await?;

    // READY is past the repair station; even the bound mechanic cannot
    // re-run it, and nobody else ever could.
    let err = fx
        .engine
        .repair(&fx.mechanic(), app_id, None, 1.0)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        msd_workflow::WorkflowError::InvalidTransition { from: Status::Ready, .. }
    ));
    Ok(())
}
