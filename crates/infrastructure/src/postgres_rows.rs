use opsboard_core::{AppError, AppResult, NonEmptyString};
use opsboard_domain::{
    EmailAddress, Permission, PermissionId, PermissionKey, Role, RoleId, User, UserId,
};
use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub(crate) struct UserRow {
    id: uuid::Uuid,
    email: String,
    full_name: Option<String>,
    role_id: Option<uuid::Uuid>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> AppResult<Self> {
        let email = EmailAddress::new(row.email.as_str()).map_err(|error| {
            AppError::Internal(format!(
                "failed to decode email '{}' for user '{}': {error}",
                row.email, row.id
            ))
        })?;

        Ok(User::new(
            UserId::from_uuid(row.id),
            email,
            row.full_name,
            row.role_id.map(RoleId::from_uuid),
        ))
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct RoleRow {
    id: uuid::Uuid,
    name: String,
    description: Option<String>,
    is_privileged: bool,
}

impl TryFrom<RoleRow> for Role {
    type Error = AppError;

    fn try_from(row: RoleRow) -> AppResult<Self> {
        let name = NonEmptyString::new(row.name).map_err(|error| {
            AppError::Internal(format!("failed to decode name for role '{}': {error}", row.id))
        })?;

        Ok(Role::new(
            RoleId::from_uuid(row.id),
            name,
            row.description,
            row.is_privileged,
        ))
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct PermissionRow {
    id: uuid::Uuid,
    name: String,
    description: Option<String>,
    resource: String,
    action: String,
}

impl TryFrom<PermissionRow> for Permission {
    type Error = AppError;

    fn try_from(row: PermissionRow) -> AppResult<Self> {
        let key = PermissionKey::new(row.resource.as_str(), row.action.as_str()).map_err(
            |error| {
                AppError::Internal(format!(
                    "failed to decode permission '{}:{}': {error}",
                    row.resource, row.action
                ))
            },
        )?;

        Ok(Permission::new(
            PermissionId::from_uuid(row.id),
            row.name,
            row.description,
            key,
        ))
    }
}

/// Maps unique violations to `Conflict` and everything else to `Internal`.
pub(crate) fn map_role_write_error(error: sqlx::Error, role_name: &str, action: &str) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!("role '{role_name}' already exists"));
    }

    AppError::Internal(format!("failed to {action}: {error}"))
}

pub(crate) fn is_foreign_key_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(database_error) if database_error.code().as_deref() == Some("23503")
    )
}
