use super::*;

use opsboard_core::NonEmptyString;
use opsboard_domain::is_protected_role_name;

use crate::{CreateRoleInput, UpdateRoleInput};

impl RoleAdminService {
    /// Lists roles ordered by name.
    pub async fn list_roles(&self, actor: UserId) -> AppResult<Vec<Role>> {
        self.require_privileged(actor).await?;

        let mut roles = self.repository.list_roles().await?;
        roles.sort_by(|left, right| left.name().cmp(right.name()));
        Ok(roles)
    }

    /// Creates a non-privileged role.
    pub async fn create_role(&self, actor: UserId, input: CreateRoleInput) -> AppResult<Role> {
        self.require_privileged(actor).await?;

        let name = role_name(input.name)?;
        let role = self
            .repository
            .create_role(name, normalize_description(input.description))
            .await?;

        info!(actor = %actor, role_id = %role.id(), role_name = %role.name(), "role created");
        Ok(role)
    }

    /// Renames or re-describes a role.
    pub async fn update_role(
        &self,
        actor: UserId,
        role_id: RoleId,
        input: UpdateRoleInput,
    ) -> AppResult<Role> {
        self.require_privileged(actor).await?;

        let existing = self.load_role(role_id).await?;
        ensure_mutable(&existing, "cannot be modified")?;

        let name = role_name(input.name)?;
        let role = self
            .repository
            .update_role(role_id, name, normalize_description(input.description))
            .await?;

        let invalidated = self.resolver.invalidate_role(role_id).await;
        info!(actor = %actor, role_id = %role_id, invalidated, "role updated");
        Ok(role)
    }

    /// Deletes a role; its holders become unassigned.
    pub async fn delete_role(&self, actor: UserId, role_id: RoleId) -> AppResult<()> {
        self.require_privileged(actor).await?;

        let existing = self.load_role(role_id).await?;
        ensure_mutable(&existing, "cannot be deleted")?;

        self.repository.delete_role(role_id).await?;

        let invalidated = self.resolver.invalidate_role(role_id).await;
        info!(actor = %actor, role_id = %role_id, invalidated, "role deleted");
        Ok(())
    }

    /// Sets or clears the role held by a user.
    pub async fn assign_user_role(
        &self,
        actor: UserId,
        user_id: UserId,
        role_id: Option<RoleId>,
    ) -> AppResult<()> {
        self.require_privileged(actor).await?;

        if let Some(role_id) = role_id {
            self.load_role(role_id).await?;
        }

        self.repository.assign_user_role(user_id, role_id).await?;
        self.resolver.invalidate(Some(user_id)).await;

        info!(
            actor = %actor,
            user_id = %user_id,
            role_id = role_id.map(|value| value.to_string()).unwrap_or_default(),
            "user role reassigned"
        );
        Ok(())
    }
}

fn role_name(value: String) -> AppResult<NonEmptyString> {
    let name = NonEmptyString::new(value)
        .map_err(|_| AppError::Validation("role name is required".to_owned()))?;

    if is_protected_role_name(name.as_str()) {
        return Err(AppError::Conflict(format!(
            "role name '{name}' is reserved"
        )));
    }

    Ok(name)
}

fn normalize_description(value: Option<String>) -> Option<String> {
    value
        .map(|description| description.trim().to_owned())
        .filter(|description| !description.is_empty())
}
