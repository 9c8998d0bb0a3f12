use msd_schemas::{Role, User};
use msd_workflow::{mem::MemStore, AssigneeResolution, WorkflowEngine, WorkflowError};

fn staff(user_id: i64, role: Role) -> User {
    User {
        user_id,
        role,
        user_name: None,
        hashed_password: "x".into(),
        phone: format!("+7900000{user_id}"),
    }
}

async fn engine_with_staff() -> WorkflowEngine<MemStore> {
    let store = MemStore::new();
    // Seed through the store directly; onboarding gates are covered elsewhere.
    use msd_workflow::WorkOrderStore;
    for u in [
        staff(501, Role::Diagnostic),
        staff(502, Role::Diagnostic),
        staff(900, Role::Mechanic),
        staff(100, Role::Admin),
    ] {
        store.insert_user(&u).await.unwrap();
    }
    WorkflowEngine::new(store)
}

#[tokio::test]
async fn explicit_id_resolves_when_role_matches() {
    let engine = engine_with_staff().await;
    match engine
        .resolve_assignee(Role::Diagnostic, Some(501))
        .await
        .unwrap()
    {
        AssigneeResolution::Resolved(user) => {
            assert_eq!(user.user_id, 501);
            assert_eq!(user.role, Role::Diagnostic);
        }
        other => panic!("expected Resolved, got {other:?}"),
    }
}

#[tokio::test]
async fn explicit_id_with_wrong_role_is_role_mismatch() {
    let engine = engine_with_staff().await;
    // 900 is a mechanic, not a diagnostician.
    let err = engine
        .resolve_assignee(Role::Diagnostic, Some(900))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::RoleMismatch(_)));
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let engine = engine_with_staff().await;
    let err = engine
        .resolve_assignee(Role::Mechanic, Some(999))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));
}

#[tokio::test]
async fn omitted_id_returns_candidate_list_for_caller_selection() {
    let engine = engine_with_staff().await;
    match engine.resolve_assignee(Role::Diagnostic, None).await.unwrap() {
        AssigneeResolution::Candidates(users) => {
            let ids: Vec<i64> = users.iter().map(|u| u.user_id).collect();
            assert_eq!(ids, vec![501, 502]);
        }
        other => panic!("expected Candidates, got {other:?}"),
    }
}

#[tokio::test]
async fn only_staff_roles_are_assignable() {
    let engine = engine_with_staff().await;
    let err = engine
        .resolve_assignee(Role::Admin, Some(100))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::RoleMismatch(_)));
}
