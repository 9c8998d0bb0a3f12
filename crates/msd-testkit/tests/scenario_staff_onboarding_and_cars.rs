//! GIVEN the seeded workshop
//! WHEN clients, cars and staff accounts are managed
//! THEN ownership and onboarding gates hold.

use msd_schemas::{NewCar, Role, Status, User};
use msd_testkit::{seed_workshop, CLIENT_ID};
use msd_workflow::{Caller, WorkOrderStore, WorkflowError};

fn new_staff(user_id: i64, role: Role) -> User {
    User {
        user_id,
        role,
        user_name: Some("new hire".into()),
        hashed_password: "argon2id$test".into(),
        phone: format!("+7999{user_id:07}"),
    }
}

#[tokio::test]
async fn only_superadmin_onboards_staff() -> anyhow::Result<()> {
    let fx = seed_workshop().await?;

    let err = fx
        .engine
        .add_user(&fx.admin(), new_staff(903, Role::Mechanic))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::RoleMismatch(_)));

    fx.engine
        .add_user(&fx.superadmin(), new_staff(903, Role::Mechanic))
        .await?;
    let hired = fx.engine.store().fetch_user(903).await?;
    assert_eq!(hired.role, Role::Mechanic);
    Ok(())
}

#[tokio::test]
async fn duplicate_user_id_is_a_conflict() -> anyhow::Result<()> {
    let fx = seed_workshop().await?;
    fx.engine
        .add_user(&fx.superadmin(), new_staff(903, Role::Mechanic))
        .await?;

    let err = fx
        .engine
        .add_user(&fx.superadmin(), new_staff(903, Role::Diagnostic))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Conflict));

    // The original role stands; onboarding never overwrites.
    let hired = fx.engine.store().fetch_user(903).await?;
    assert_eq!(hired.role, Role::Mechanic);
    Ok(())
}

#[tokio::test]
async fn client_phone_can_be_replaced() -> anyhow::Result<()> {
    let fx = seed_workshop().await?;
    fx.engine
        .replace_client_phone(CLIENT_ID, "+70000000099")
        .await?;
    let client = fx.engine.store().fetch_client(CLIENT_ID).await?;
    assert_eq!(client.phone, "+70000000099");
    Ok(())
}

#[tokio::test]
async fn cars_list_hides_soft_deleted() -> anyhow::Result<()> {
    let fx = seed_workshop().await?;
    let second = fx
        .engine
        .add_car(NewCar {
            client_id: CLIENT_ID,
            brand: "Kia".into(),
            model: "Rio".into(),
            number: "B456DE77".into(),
            year: 2021,
        })
        .await?;
    assert_eq!(fx.engine.cars_of_client(CLIENT_ID).await?.len(), 2);

    fx.engine.soft_delete_car(&fx.client(), second).await?;
    let cars = fx.engine.cars_of_client(CLIENT_ID).await?;
    assert_eq!(cars.len(), 1);
    assert_eq!(cars[0].id, fx.car_id);
    Ok(())
}

#[tokio::test]
async fn soft_delete_is_owner_or_admin_only() -> anyhow::Result<()> {
    let fx = seed_workshop().await?;

    // A different client cannot touch the fixture car.
    let stranger = Caller::new(77, Role::Client);
    let err = fx
        .engine
        .soft_delete_car(&stranger, fx.car_id)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::RoleMismatch(_)));

    // Staff below admin cannot either.
    let err = fx
        .engine
        .soft_delete_car(&fx.mechanic(), fx.car_id)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::RoleMismatch(_)));

    // The admin can.
    fx.engine.soft_delete_car(&fx.admin(), fx.car_id).await?;
    assert!(fx.engine.cars_of_client(CLIENT_ID).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn deleted_car_takes_no_new_work() -> anyhow::Result<()> {
    let fx = seed_workshop().await?;
    fx.engine.soft_delete_car(&fx.client(), fx.car_id).await?;

    let err = fx.submit("wipers dead").await.unwrap_err();
    assert!(matches!(
        err.downcast::<WorkflowError>()?,
        WorkflowError::NotFound(msd_workflow::Entity::Car)
    ));
    Ok(())
}

#[tokio::test]
async fn foreign_car_is_refused_at_submission() -> anyhow::Result<()> {
    let fx = seed_workshop().await?;

    // A second client exists but the fixture car is not theirs.
    fx.engine
        .register_client(msd_schemas::Client {
            client_id: 2,
            user_name: None,
            phone: "+70000000002".into(),
        })
        .await?;
    let err = fx
        .engine
        .create_application(
            &Caller::new(2, Role::Client),
            msd_workflow::NewApplicationRequest {
                car_id: fx.car_id,
                problem: None,
                conn: 1,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::RoleMismatch(_)));
    Ok(())
}

#[tokio::test]
async fn in_flight_work_survives_car_soft_delete() -> anyhow::Result<()> {
    let fx = seed_workshop().await?;
    let app_id = fx.submit("oil leak").await?;
    fx.advance_to_diagnostic(app_id).await?;

    // Deleting the car blocks new submissions but never tears down the
    // order already in the shop.
    fx.engine.soft_delete_car(&fx.admin(), fx.car_id).await?;
    let app = fx.engine.get_application(app_id).await?;
    assert_eq!(app.status, Status::Diagnostic);
    let app = fx
        .engine
        .diagnose(&fx.diag(), app_id, None, 30.0, msd_workflow::DiagVerdict::Repair)
        .await?;
    assert_eq!(app.status, Status::Repair);
    Ok(())
}
