use async_trait::async_trait;
use sqlx::PgPool;

use opsboard_application::{AccessDirectory, GrantInsertOutcome};
use opsboard_core::{AppError, AppResult};
use opsboard_domain::{Permission, PermissionId, Role, RoleId, User, UserId};

use crate::postgres_rows::{PermissionRow, RoleRow, UserRow, is_foreign_key_violation};


/// PostgreSQL-backed directory of users, roles, the permission catalog, and grants.
#[derive(Clone)]
pub struct PostgresAccessDirectory {
    pool: PgPool,
}

impl PostgresAccessDirectory {
    /// Creates a directory with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessDirectory for PostgresAccessDirectory {
    async fn get_user_by_id(&self, user_id: UserId) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, full_name, role_id
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load user: {error}")))?;

        row.map(User::try_from).transpose()
    }

    async fn get_role_by_id(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name, description, is_privileged
            FROM roles
            WHERE id = $1
            "#,
        )
        .bind(role_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load role: {error}")))?;

        row.map(Role::try_from).transpose()
    }

    async fn list_permissions(&self) -> AppResult<Vec<Permission>> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT id, name, description, resource, action
            FROM permissions
            ORDER BY resource, action
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list permissions: {error}")))?;

        rows.into_iter().map(Permission::try_from).collect()
    }

    async fn list_grants_for_role(&self, role_id: RoleId) -> AppResult<Vec<PermissionId>> {
        let ids = sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            SELECT permission_id
            FROM role_permissions
            WHERE role_id = $1
            "#,
        )
        .bind(role_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list role grants: {error}")))?;

        Ok(ids.into_iter().map(PermissionId::from_uuid).collect())
    }

    async fn insert_grant(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> AppResult<GrantInsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id)
            VALUES ($1, $2)
            ON CONFLICT (role_id, permission_id) DO NOTHING
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(permission_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_foreign_key_violation(&error) {
                return AppError::NotFound(format!(
                    "role '{role_id}' or permission '{permission_id}' was not found"
                ));
            }
            AppError::Internal(format!("failed to insert role grant: {error}"))
        })?;

        Ok(if result.rows_affected() == 0 {
            GrantInsertOutcome::AlreadyPresent
        } else {
            GrantInsertOutcome::Inserted
        })
    }

    async fn delete_grant(&self, role_id: RoleId, permission_id: PermissionId) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM role_permissions
            WHERE role_id = $1 AND permission_id = $2
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(permission_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete role grant: {error}")))?;

        Ok(result.rows_affected() > 0)
    }
}
