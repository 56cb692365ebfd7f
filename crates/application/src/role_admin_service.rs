//! Role and grant administration.
//!
//! Every write invalidates the resolver entries it can affect; the resolver
//! has no other trigger for grant or assignment changes.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use opsboard_core::{AppError, AppResult};
use opsboard_domain::{GrantState, Permission, PermissionId, Role, RoleId, UserId};
use tracing::{debug, info, warn};

use crate::{AccessDirectory, GrantInsertOutcome, PermissionResolver, RoleAdminRepository};

mod roles;

#[cfg(test)]
mod tests;

/// Application service for role, grant, and assignment administration.
#[derive(Clone)]
pub struct RoleAdminService {
    resolver: Arc<PermissionResolver>,
    directory: Arc<dyn AccessDirectory>,
    repository: Arc<dyn RoleAdminRepository>,
}

impl RoleAdminService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        resolver: Arc<PermissionResolver>,
        directory: Arc<dyn AccessDirectory>,
        repository: Arc<dyn RoleAdminRepository>,
    ) -> Self {
        Self {
            resolver,
            directory,
            repository,
        }
    }

    /// Adds the grant when absent, removes it when present.
    pub async fn toggle_grant(
        &self,
        actor: UserId,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> AppResult<GrantState> {
        self.require_privileged(actor).await?;

        let role = self.load_role(role_id).await?;
        ensure_mutable(&role, "its grants cannot be modified")?;

        let catalog = self.directory.list_permissions().await?;
        if !catalog
            .iter()
            .any(|permission| permission.id() == permission_id)
        {
            return Err(AppError::NotFound(format!(
                "permission '{permission_id}' was not found"
            )));
        }

        let granted = self.directory.list_grants_for_role(role_id).await?;
        let state = if granted.contains(&permission_id) {
            if !self.directory.delete_grant(role_id, permission_id).await? {
                debug!(
                    role_id = %role_id,
                    permission_id = %permission_id,
                    "grant was already removed by a concurrent toggle"
                );
            }
            GrantState::Revoked
        } else {
            match self.directory.insert_grant(role_id, permission_id).await? {
                GrantInsertOutcome::Inserted => {}
                GrantInsertOutcome::AlreadyPresent => debug!(
                    role_id = %role_id,
                    permission_id = %permission_id,
                    "grant was already inserted by a concurrent toggle"
                ),
            }
            GrantState::Granted
        };

        let invalidated = self.resolver.invalidate_role(role_id).await;
        info!(
            actor = %actor,
            role_id = %role_id,
            permission_id = %permission_id,
            state = state.as_str(),
            invalidated,
            "role grant toggled"
        );

        Ok(state)
    }

    /// Returns the permission ids a role carries.
    ///
    /// Privileged roles carry the whole catalog regardless of stored grants.
    pub async fn list_role_grants(
        &self,
        actor: UserId,
        role_id: RoleId,
    ) -> AppResult<Vec<PermissionId>> {
        self.require_privileged(actor).await?;

        let role = self.load_role(role_id).await?;
        if role.is_privileged() {
            return Ok(self
                .directory
                .list_permissions()
                .await?
                .iter()
                .map(Permission::id)
                .collect());
        }

        let mut seen = HashSet::new();
        Ok(self
            .directory
            .list_grants_for_role(role_id)
            .await?
            .into_iter()
            .filter(|permission_id| seen.insert(*permission_id))
            .collect())
    }

    /// Returns the permission catalog grouped by resource.
    pub async fn permission_catalog(
        &self,
        actor: UserId,
    ) -> AppResult<BTreeMap<String, Vec<Permission>>> {
        self.require_privileged(actor).await?;

        let mut grouped: BTreeMap<String, Vec<Permission>> = BTreeMap::new();
        for permission in self.directory.list_permissions().await? {
            grouped
                .entry(permission.resource().to_owned())
                .or_default()
                .push(permission);
        }

        for permissions in grouped.values_mut() {
            permissions.sort_by(|left, right| left.action().cmp(right.action()));
        }

        Ok(grouped)
    }

    async fn require_privileged(&self, actor: UserId) -> AppResult<()> {
        if self.resolver.is_privileged(actor).await? {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "user '{actor}' is not allowed to administer roles"
        )))
    }

    async fn load_role(&self, role_id: RoleId) -> AppResult<Role> {
        self.directory
            .get_role_by_id(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))
    }
}

fn ensure_mutable(role: &Role, consequence: &str) -> AppResult<()> {
    if !role.is_protected() {
        return Ok(());
    }

    if !role.is_privileged() {
        warn!(
            role_id = %role.id(),
            role_name = %role.name(),
            "role carries a protected name but is not flagged privileged"
        );
    }

    Err(AppError::Forbidden(format!(
        "role '{}' is protected and {consequence}",
        role.name()
    )))
}
