use opsboard_core::{AppError, AppResult};
use opsboard_domain::PROTECTED_ROLE_NAMES;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

const SEED_RESOURCES: [&str; 6] = ["orders", "inventory", "tasks", "payables", "team", "settings"];
const SEED_ACTIONS: [&str; 4] = ["view", "create", "edit", "delete"];

/// Seeds the permission catalog and the privileged roles. Safe to re-run.
pub async fn run(pool: &PgPool) -> AppResult<()> {
    let mut transaction = pool
        .begin()
        .await
        .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))?;

    let mut inserted_permissions = 0_u64;
    for resource in SEED_RESOURCES {
        for action in SEED_ACTIONS {
            let result = sqlx::query(
                r#"
                INSERT INTO permissions (id, name, description, resource, action)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (resource, action) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(permission_name(resource, action))
            .bind(format!("Allows {action} on {resource}"))
            .bind(resource)
            .bind(action)
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to seed permission {resource}:{action}: {error}"))
            })?;
            inserted_permissions += result.rows_affected();
        }
    }

    for role_name in PROTECTED_ROLE_NAMES {
        sqlx::query(
            r#"
            INSERT INTO roles (id, name, description, is_privileged)
            VALUES ($1, $2, $3, true)
            ON CONFLICT (name) DO UPDATE SET is_privileged = true, updated_at = now()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(role_name)
        .bind(format!("{role_name} (full access)"))
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to seed role {role_name}: {error}")))?;
    }

    transaction
        .commit()
        .await
        .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))?;

    info!(
        inserted_permissions,
        catalog_size = SEED_RESOURCES.len() * SEED_ACTIONS.len(),
        "seeded permission catalog and privileged roles"
    );
    Ok(())
}

fn permission_name(resource: &str, action: &str) -> String {
    let mut characters = action.chars();
    let action = characters
        .next()
        .map(|first| first.to_ascii_uppercase().to_string() + characters.as_str())
        .unwrap_or_default();
    format!("{action} {resource}")
}
