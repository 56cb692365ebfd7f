use async_trait::async_trait;
use sqlx::PgPool;

use opsboard_application::RoleAdminRepository;
use opsboard_core::{AppError, AppResult, NonEmptyString};
use opsboard_domain::{Role, RoleId, UserId};

use crate::postgres_rows::{RoleRow, is_foreign_key_violation, map_role_write_error};

/// PostgreSQL-backed repository for role administration.
#[derive(Clone)]
pub struct PostgresRoleAdminRepository {
    pool: PgPool,
}

impl PostgresRoleAdminRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explains why a guarded write touched no row.
    async fn unwritable_role(&self, role_id: RoleId, verb: &str) -> AppError {
        let privileged = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT is_privileged
            FROM roles
            WHERE id = $1
            "#,
        )
        .bind(role_id.as_uuid())
        .fetch_optional(&self.pool)
        .await;

        match privileged {
            Ok(Some(true)) => {
                AppError::Forbidden(format!("role '{role_id}' is protected and cannot be {verb}"))
            }
            Ok(_) => AppError::NotFound(format!("role '{role_id}' was not found")),
            Err(error) => AppError::Internal(format!("failed to load role: {error}")),
        }
    }
}

#[async_trait]
impl RoleAdminRepository for PostgresRoleAdminRepository {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name, description, is_privileged
            FROM roles
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list roles: {error}")))?;

        rows.into_iter().map(Role::try_from).collect()
    }

    async fn create_role(
        &self,
        name: NonEmptyString,
        description: Option<String>,
    ) -> AppResult<Role> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            INSERT INTO roles (id, name, description, is_privileged)
            VALUES ($1, $2, $3, false)
            RETURNING id, name, description, is_privileged
            "#,
        )
        .bind(RoleId::new().as_uuid())
        .bind(name.as_str())
        .bind(description.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| map_role_write_error(error, name.as_str(), "create role"))?;

        Role::try_from(row)
    }

    async fn update_role(
        &self,
        role_id: RoleId,
        name: NonEmptyString,
        description: Option<String>,
    ) -> AppResult<Role> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            UPDATE roles
            SET name = $2, description = $3, updated_at = now()
            WHERE id = $1 AND is_privileged = false
            RETURNING id, name, description, is_privileged
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(name.as_str())
        .bind(description.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_role_write_error(error, name.as_str(), "update role"))?;

        match row {
            Some(row) => Role::try_from(row),
            None => Err(self.unwritable_role(role_id, "modified").await),
        }
    }

    async fn delete_role(&self, role_id: RoleId) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM roles
            WHERE id = $1 AND is_privileged = false
            "#,
        )
        .bind(role_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete role: {error}")))?;

        if result.rows_affected() == 0 {
            return Err(self.unwritable_role(role_id, "deleted").await);
        }

        Ok(())
    }

    async fn assign_user_role(&self, user_id: UserId, role_id: Option<RoleId>) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET role_id = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(role_id.map(|value| value.as_uuid()))
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_foreign_key_violation(&error) {
                return AppError::NotFound(format!(
                    "role '{}' was not found",
                    role_id.map(|value| value.to_string()).unwrap_or_default()
                ));
            }
            AppError::Internal(format!("failed to assign user role: {error}"))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("user '{user_id}' was not found")));
        }

        Ok(())
    }
}
