//! GIVEN a completed and settled work order
//! WHEN anyone tries to settle or close it again
//! THEN the attempt is refused and the original payment is untouched.

use msd_schemas::{PayMethod, Status};
use msd_testkit::seed_workshop;
use msd_workflow::{WorkOrderStore, WorkflowError};

#[tokio::test]
async fn second_settlement_is_refused() -> anyhow::Result<()> {
    let fx = seed_workshop().await?;
    let app_id = fx.submit("brake squeal").await?;
    fx.advance_to_completed(app_id, 210.0).await?;

    let err = fx
        .engine
        .finalize_settlement(&fx.admin(), app_id, 999.0, PayMethod::Cash)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::AlreadySettled));

    // The first payment stands.
    let payment = fx.engine.store().fetch_payment(app_id).await?;
    assert_eq!(payment.price, 210.0);
    assert_eq!(payment.method, PayMethod::Card);
    Ok(())
}

#[tokio::test]
async fn finishing_twice_is_refused() -> anyhow::Result<()> {
    let fx = seed_workshop().await?;
    let app_id = fx.submit("brake squeal").await?;
    fx.advance_to_completed(app_id, 210.0).await?;

    let err = fx
        .engine
        .finish(&fx.admin(), app_id, 210.0, PayMethod::Card)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::InvalidTransition { from: Status::Completed, .. }
    ));
    Ok(())
}

#[tokio::test]
async fn settlement_requires_completed_status() -> anyhow::Result<()> {
    let fx = seed_workshop().await?;
    let app_id = fx.submit("brake squeal").await?;
    fx.advance_to_ready(app_id).await?;

    let err = fx
        .engine
        .finalize_settlement(&fx.admin(), app_id, 210.0, PayMethod::Card)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::InvalidTransition { from: Status::Ready, .. }
    ));
    Ok(())
}

#[tokio::test]
async fn settlement_is_admin_only() -> anyhow::Result<()> {
    let fx = seed_workshop().await?;
    let app_id = fx.submit("brake squeal").await?;
    fx.advance_to_completed(app_id, 210.0).await?;

    let err = fx
        .engine
        .finalize_settlement(&fx.mechanic(), app_id, 1.0, PayMethod::Cash)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::RoleMismatch(_)));
    Ok(())
}
