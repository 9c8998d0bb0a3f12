//! GIVEN an application sitting in DIAGNOSTIC
//! WHEN several verdict submissions race
//! THEN exactly one wins; the rest observe a conflict or a stale status.

use std::sync::Arc;

use msd_schemas::Status;
use msd_testkit::seed_workshop;
use msd_workflow::{DiagVerdict, WorkflowError};

#[tokio::test]
async fn racing_verdicts_admit_exactly_one() -> anyhow::Result<()> {
    let fx = Arc::new(seed_workshop().await?);
    let app_id = fx.submit("intermittent stall").await?;
    fx.advance_to_diagnostic(app_id).await?;

    let mut handles = Vec::new();
    for i in 0..8 {
        let fx = Arc::clone(&fx);
        handles.push(tokio::spawn(async move {
            fx.engine
                .diagnose(
                    &fx.diag(),
                    app_id,
                    Some(format!("attempt {i}")),
                    40.0 + i as f64,
                    DiagVerdict::Repair,
                )
                .await
        }));
    }

    let mut winners = 0;
    for h in handles {
        match h.await? {
            Ok(app) => {
                winners += 1;
                assert_eq!(app.status, Status::Repair);
            }
            Err(e) => assert!(matches!(
                e,
                WorkflowError::Conflict | WorkflowError::InvalidTransition { .. }
            )),
        }
    }
    assert_eq!(winners, 1);

    // The stored row carries exactly the winner's fields.
    let app = fx.engine.get_application(app_id).await?;
    assert_eq!(app.status, Status::Repair);
    assert!(app.diag_price.is_some());
    Ok(())
}

#[tokio::test]
async fn racing_repair_and_reject_settle_on_one_outcome() -> anyhow::Result<()> {
    let fx = Arc::new(seed_workshop().await?);
    let app_id = fx.submit("clutch slip").await?;
    fx.advance_to_diagnostic(app_id).await?;
    fx.engine
        .diagnose(&fx.diag(), app_id, None, 35.0, DiagVerdict::Repair)
        .await?;

    // Mechanic posting the repair races the admin killing the order.
    let repair = {
        let fx = Arc::clone(&fx);
        tokio::spawn(async move { fx.engine.repair(&fx.mechanic(), app_id, None, 120.0).await })
    };
    let reject = {
        let fx = Arc::clone(&fx);
        tokio::spawn(async move { fx.engine.reject(&fx.admin(), app_id, None).await })
    };

    let repair = repair.await?;
    let reject = reject.await?;

    let app = fx.engine.get_application(app_id).await?;
    match (&repair, &reject) {
        // Reject is legal from both REPAIR and READY, so if both calls land
        // cleanly the order ends up rejected.
        (Ok(_), Ok(_)) => assert_eq!(app.status, Status::Rejected),
        (Err(e), Ok(_)) => {
            assert!(matches!(
                e,
                WorkflowError::Conflict | WorkflowError::InvalidTransition { .. }
            ));
            assert_eq!(app.status, Status::Rejected);
        }
        (Ok(_), Err(e)) => {
            assert!(matches!(e, WorkflowError::Conflict));
            assert_eq!(app.status, Status::Ready);
        }
        (Err(_), Err(_)) => panic!("both racers failed"),
    }
    Ok(())
}
