use std::sync::atomic::Ordering;

use opsboard_core::AppError;
use opsboard_domain::{GrantState, PermissionId, RoleId, UserId};

use crate::test_support::Fixture;
use crate::{CreateRoleInput, UpdateRoleInput};

use super::RoleAdminService;

fn service(fixture: &Fixture) -> RoleAdminService {
    RoleAdminService::new(
        fixture.resolver.clone(),
        fixture.directory.clone(),
        fixture.directory.clone(),
    )
}

#[tokio::test]
async fn toggled_grant_is_visible_to_role_holders_immediately() {
    let fixture = Fixture::seeded().await;
    let service = service(&fixture);
    let payables_edit = fixture.directory.permission_id("payables", "edit").await;

    let before = fixture
        .resolver
        .resolve_permissions(fixture.accountant)
        .await
        .unwrap_or_default();
    assert!(before.contains("payables", "view"));
    assert!(!before.contains("payables", "edit"));

    let state = service
        .toggle_grant(fixture.ceo, fixture.accountant_role, payables_edit)
        .await;
    assert!(matches!(state, Ok(GrantState::Granted)));

    let after = fixture
        .resolver
        .resolve_permissions(fixture.accountant)
        .await
        .unwrap_or_default();
    assert!(after.contains("payables", "edit"));

    let state = service
        .toggle_grant(fixture.admin, fixture.accountant_role, payables_edit)
        .await;
    assert!(matches!(state, Ok(GrantState::Revoked)));

    let reverted = fixture
        .resolver
        .resolve_permissions(fixture.accountant)
        .await
        .unwrap_or_default();
    assert!(!reverted.contains("payables", "edit"));
}

#[tokio::test]
async fn protected_roles_reject_grant_changes() {
    let fixture = Fixture::seeded().await;
    let service = service(&fixture);
    let orders_view = fixture.directory.permission_id("orders", "view").await;

    for role_id in [fixture.ceo_role, fixture.admin_role] {
        let result = service.toggle_grant(fixture.ceo, role_id, orders_view).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert_eq!(fixture.directory.grant_count(role_id).await, 0);
    }
}

#[tokio::test]
async fn protected_name_without_flag_is_still_immutable() {
    let fixture = Fixture::seeded().await;
    let service = service(&fixture);
    let impostor_role = fixture.directory.add_role("CEO", false).await;
    let orders_view = fixture.directory.permission_id("orders", "view").await;

    let result = service
        .toggle_grant(fixture.admin, impostor_role, orders_view)
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
    assert_eq!(fixture.directory.grant_count(impostor_role).await, 0);
}

#[tokio::test]
async fn non_privileged_actor_cannot_toggle() {
    let fixture = Fixture::seeded().await;
    let service = service(&fixture);
    let payables_edit = fixture.directory.permission_id("payables", "edit").await;

    let result = service
        .toggle_grant(fixture.accountant, fixture.accountant_role, payables_edit)
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
    assert_eq!(fixture.directory.grant_count(fixture.accountant_role).await, 2);
}

#[tokio::test]
async fn unknown_role_or_permission_is_not_found() {
    let fixture = Fixture::seeded().await;
    let service = service(&fixture);
    let orders_view = fixture.directory.permission_id("orders", "view").await;

    let unknown_role = service
        .toggle_grant(fixture.ceo, RoleId::new(), orders_view)
        .await;
    assert!(matches!(unknown_role, Err(AppError::NotFound(_))));

    let unknown_permission = service
        .toggle_grant(fixture.ceo, fixture.accountant_role, PermissionId::new())
        .await;
    assert!(matches!(unknown_permission, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn racing_insert_reports_granted() {
    let fixture = Fixture::seeded().await;
    let service = service(&fixture);
    let payables_view = fixture.directory.permission_id("payables", "view").await;
    fixture
        .directory
        .stale_grant_reads
        .store(true, Ordering::SeqCst);

    let state = service
        .toggle_grant(fixture.ceo, fixture.accountant_role, payables_view)
        .await;

    assert!(matches!(state, Ok(GrantState::Granted)));
    assert_eq!(fixture.directory.grant_count(fixture.accountant_role).await, 2);
}

#[tokio::test]
async fn list_role_grants_reports_full_catalog_for_privileged_roles() {
    let fixture = Fixture::seeded().await;
    let service = service(&fixture);

    let privileged = service
        .list_role_grants(fixture.ceo, fixture.admin_role)
        .await
        .unwrap_or_default();
    assert_eq!(privileged.len(), Fixture::catalog_size());

    let accountant = service
        .list_role_grants(fixture.ceo, fixture.accountant_role)
        .await
        .unwrap_or_default();
    assert_eq!(accountant.len(), 2);
}

#[tokio::test]
async fn permission_catalog_groups_by_resource() {
    let fixture = Fixture::seeded().await;
    let service = service(&fixture);

    let catalog = service
        .permission_catalog(fixture.admin)
        .await
        .unwrap_or_default();

    let resources: Vec<&str> = catalog.keys().map(String::as_str).collect();
    assert_eq!(resources, vec!["inventory", "orders", "payables", "tasks"]);
    assert!(catalog.values().all(|permissions| permissions.len() == 4));

    let denied = service.permission_catalog(fixture.accountant).await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn create_role_rejects_reserved_and_duplicate_names() {
    let fixture = Fixture::seeded().await;
    let service = service(&fixture);

    let reserved = service
        .create_role(
            fixture.ceo,
            CreateRoleInput {
                name: " Admin ".to_owned(),
                description: None,
            },
        )
        .await;
    assert!(matches!(reserved, Err(AppError::Conflict(_))));

    let duplicate = service
        .create_role(
            fixture.ceo,
            CreateRoleInput {
                name: "Accountant".to_owned(),
                description: None,
            },
        )
        .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    let blank = service
        .create_role(
            fixture.ceo,
            CreateRoleInput {
                name: "   ".to_owned(),
                description: None,
            },
        )
        .await;
    assert!(matches!(blank, Err(AppError::Validation(_))));

    let created = service
        .create_role(
            fixture.ceo,
            CreateRoleInput {
                name: "Warehouse".to_owned(),
                description: Some("  ".to_owned()),
            },
        )
        .await;
    let Ok(created) = created else {
        panic!("role should be created");
    };
    assert!(!created.is_privileged());
    assert!(created.description().is_none());
}

#[tokio::test]
async fn update_and_delete_reject_protected_roles() {
    let fixture = Fixture::seeded().await;
    let service = service(&fixture);

    let update = service
        .update_role(
            fixture.admin,
            fixture.ceo_role,
            UpdateRoleInput {
                name: "Chief".to_owned(),
                description: None,
            },
        )
        .await;
    assert!(matches!(update, Err(AppError::Forbidden(_))));

    let delete = service.delete_role(fixture.admin, fixture.admin_role).await;
    assert!(matches!(delete, Err(AppError::Forbidden(_))));

    let rename_to_protected = service
        .update_role(
            fixture.admin,
            fixture.accountant_role,
            UpdateRoleInput {
                name: "CEO".to_owned(),
                description: None,
            },
        )
        .await;
    assert!(matches!(rename_to_protected, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn deleting_a_role_strips_its_holders() {
    let fixture = Fixture::seeded().await;
    let service = service(&fixture);

    let before = fixture
        .resolver
        .resolve_permissions(fixture.accountant)
        .await
        .unwrap_or_default();
    assert_eq!(before.len(), 2);

    let deleted = service
        .delete_role(fixture.ceo, fixture.accountant_role)
        .await;
    assert!(deleted.is_ok());

    let after = fixture
        .resolver
        .resolve_permissions(fixture.accountant)
        .await
        .unwrap_or_default();
    assert!(after.is_empty());
}

#[tokio::test]
async fn assigning_a_role_refreshes_the_user_entry() {
    let fixture = Fixture::seeded().await;
    let service = service(&fixture);

    assert!(
        !fixture
            .resolver
            .is_privileged(fixture.unassigned)
            .await
            .unwrap_or(true)
    );

    let assigned = service
        .assign_user_role(fixture.ceo, fixture.unassigned, Some(fixture.admin_role))
        .await;
    assert!(assigned.is_ok());
    assert!(
        fixture
            .resolver
            .is_privileged(fixture.unassigned)
            .await
            .unwrap_or(false)
    );

    let unknown_role = service
        .assign_user_role(fixture.ceo, fixture.unassigned, Some(RoleId::new()))
        .await;
    assert!(matches!(unknown_role, Err(AppError::NotFound(_))));

    let unknown_user = service
        .assign_user_role(fixture.ceo, UserId::new(), None)
        .await;
    assert!(matches!(unknown_user, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn list_roles_is_sorted_and_requires_privilege() {
    let fixture = Fixture::seeded().await;
    let service = service(&fixture);

    let roles = service.list_roles(fixture.ceo).await.unwrap_or_default();
    let names: Vec<&str> = roles.iter().map(|role| role.name().as_str()).collect();
    assert_eq!(names, vec!["Accountant", "Admin", "CEO"]);

    let denied = service.list_roles(fixture.unassigned).await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));
}
