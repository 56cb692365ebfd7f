//! Permission resolution with per-user and per-role memoization.
//!
//! Resolution is fail-closed: a missing user, a missing role, or a failed
//! collaborator call yields the empty permission set, never an error. The
//! only errors returned are for nil identifiers, which indicate a caller bug.

use std::collections::HashSet;
use std::sync::Arc;

use opsboard_core::{AppError, AppResult};
use opsboard_domain::{PermissionId, PermissionSet, Role, RoleId, User, UserId};
use tracing::{debug, warn};

use crate::AccessDirectory;

mod cache;
mod invalidation;


pub use cache::{CachedAccess, PermissionCache};

/// Fully resolved access for a user, as shown to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccess {
    /// User profile.
    pub user: User,
    /// Assigned role, or `None` while unassigned.
    pub role: Option<Role>,
    /// Effective permission set.
    pub permissions: Arc<PermissionSet>,
    /// Whether the role bypasses explicit grants.
    pub is_privileged: bool,
}

/// Outcome of resolving a user for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessResolution {
    /// The user and role were found and permissions loaded.
    Resolved(ResolvedAccess),
    /// Resolution failed; the reason is safe to show to the user.
    Denied {
        /// Human-readable denial reason.
        reason: String,
    },
}

/// Resolves effective permissions for users and memoizes the results.
pub struct PermissionResolver {
    directory: Arc<dyn AccessDirectory>,
    cache: PermissionCache,
}

enum RoleLookup {
    Found(Role),
    Missing,
    Failed,
}

impl PermissionResolver {
    /// Creates a resolver with an empty cache.
    #[must_use]
    pub fn new(directory: Arc<dyn AccessDirectory>) -> Self {
        Self::with_cache(directory, PermissionCache::new())
    }

    /// Creates a resolver over an existing cache.
    #[must_use]
    pub fn with_cache(directory: Arc<dyn AccessDirectory>, cache: PermissionCache) -> Self {
        Self { directory, cache }
    }

    /// Returns the cache owned by this resolver.
    #[must_use]
    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    /// Returns the effective permission set for a user.
    pub async fn resolve_permissions(&self, user_id: UserId) -> AppResult<Arc<PermissionSet>> {
        Ok(self.resolve_entry(user_id).await?.permissions)
    }

    /// Returns whether the user's role is privileged.
    pub async fn is_privileged(&self, user_id: UserId) -> AppResult<bool> {
        Ok(self.resolve_entry(user_id).await?.is_privileged)
    }

    /// Returns a role by id, or `None` when it is absent or unreadable.
    pub async fn resolve_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        ensure_role_id(role_id)?;

        match self.lookup_role(role_id).await {
            RoleLookup::Found(role) => Ok(Some(role)),
            RoleLookup::Missing | RoleLookup::Failed => Ok(None),
        }
    }

    /// Resolves user, role, and permissions together for a session.
    pub async fn resolve_access(&self, user_id: UserId) -> AppResult<AccessResolution> {
        ensure_user_id(user_id)?;

        let epoch = self.cache.epoch();
        let user = match self.directory.get_user_by_id(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                return Ok(AccessResolution::Denied {
                    reason: format!("user profile '{user_id}' was not found"),
                });
            }
            Err(error) => {
                warn!(user_id = %user_id, error = %error, "failed to load user profile");
                return Ok(AccessResolution::Denied {
                    reason: "user profile could not be loaded".to_owned(),
                });
            }
        };

        let Some(role_id) = user.role_id() else {
            let entry = self.resolve_for_user(epoch, &user).await;
            return Ok(AccessResolution::Resolved(ResolvedAccess {
                user,
                role: None,
                permissions: entry.permissions,
                is_privileged: false,
            }));
        };

        let role = match self.lookup_role(role_id).await {
            RoleLookup::Found(role) => role,
            RoleLookup::Missing => {
                return Ok(AccessResolution::Denied {
                    reason: format!("assigned role '{role_id}' was not found"),
                });
            }
            RoleLookup::Failed => {
                return Ok(AccessResolution::Denied {
                    reason: "assigned role could not be loaded".to_owned(),
                });
            }
        };

        let entry = match self.cache.user(user_id).await {
            Some(entry) if entry.role_id == Some(role_id) => entry,
            _ => {
                let Some(entry) = self.entry_for_role(&role).await else {
                    return Ok(AccessResolution::Denied {
                        reason: format!("permissions for role '{}' could not be loaded", role.name()),
                    });
                };
                self.cache.store_user(epoch, user_id, entry.clone()).await;
                entry
            }
        };

        Ok(AccessResolution::Resolved(ResolvedAccess {
            user,
            role: Some(role),
            permissions: entry.permissions,
            is_privileged: entry.is_privileged,
        }))
    }

    async fn resolve_entry(&self, user_id: UserId) -> AppResult<CachedAccess> {
        ensure_user_id(user_id)?;

        if let Some(entry) = self.cache.user(user_id).await {
            debug!(user_id = %user_id, "permission cache hit");
            return Ok(entry);
        }

        let epoch = self.cache.epoch();
        match self.directory.get_user_by_id(user_id).await {
            Ok(Some(user)) => Ok(self.resolve_for_user(epoch, &user).await),
            Ok(None) => {
                debug!(user_id = %user_id, "user not found; resolving to no permissions");
                Ok(CachedAccess::denied())
            }
            Err(error) => {
                warn!(user_id = %user_id, error = %error, "failed to load user; resolving to no permissions");
                Ok(CachedAccess::denied())
            }
        }
    }

    async fn resolve_for_user(&self, epoch: u64, user: &User) -> CachedAccess {
        let Some(role_id) = user.role_id() else {
            let entry = CachedAccess::denied();
            self.cache.store_user(epoch, user.id(), entry.clone()).await;
            return entry;
        };

        let role = match self.lookup_role(role_id).await {
            RoleLookup::Found(role) => role,
            RoleLookup::Missing | RoleLookup::Failed => return CachedAccess::denied(),
        };

        match self.entry_for_role(&role).await {
            Some(entry) => {
                self.cache.store_user(epoch, user.id(), entry.clone()).await;
                entry
            }
            None => CachedAccess::denied(),
        }
    }

    async fn lookup_role(&self, role_id: RoleId) -> RoleLookup {
        if let Some(role) = self.cache.role(role_id).await {
            return RoleLookup::Found(role);
        }

        let epoch = self.cache.epoch();
        match self.directory.get_role_by_id(role_id).await {
            Ok(Some(role)) => {
                self.cache.store_role(epoch, role.clone()).await;
                RoleLookup::Found(role)
            }
            Ok(None) => {
                debug!(role_id = %role_id, "role not found");
                RoleLookup::Missing
            }
            Err(error) => {
                warn!(role_id = %role_id, error = %error, "failed to load role");
                RoleLookup::Failed
            }
        }
    }

    /// Loads the permission set for a role, or `None` when a collaborator call failed.
    async fn entry_for_role(&self, role: &Role) -> Option<CachedAccess> {
        if role.is_privileged() {
            let permissions = self.load_catalog(role.id(), None).await?;
            return Some(CachedAccess {
                role_id: Some(role.id()),
                permissions: Arc::new(permissions),
                is_privileged: true,
            });
        }

        if role.has_protected_name() {
            warn!(
                role_id = %role.id(),
                role_name = %role.name(),
                "role carries a protected name but is not flagged privileged; resolving from explicit grants"
            );
        }

        let granted = match self.directory.list_grants_for_role(role.id()).await {
            Ok(granted) => granted.into_iter().collect::<HashSet<PermissionId>>(),
            Err(error) => {
                warn!(role_id = %role.id(), error = %error, "failed to load role grants");
                return None;
            }
        };

        let permissions = if granted.is_empty() {
            PermissionSet::empty()
        } else {
            self.load_catalog(role.id(), Some(&granted)).await?
        };

        Some(CachedAccess {
            role_id: Some(role.id()),
            permissions: Arc::new(permissions),
            is_privileged: false,
        })
    }

    async fn load_catalog(
        &self,
        role_id: RoleId,
        only: Option<&HashSet<PermissionId>>,
    ) -> Option<PermissionSet> {
        let catalog = match self.directory.list_permissions().await {
            Ok(catalog) => catalog,
            Err(error) => {
                warn!(role_id = %role_id, error = %error, "failed to load permission catalog");
                return None;
            }
        };

        let selected = catalog
            .iter()
            .filter(|permission| only.is_none_or(|ids| ids.contains(&permission.id())));
        let (permissions, duplicates) = PermissionSet::from_permissions(selected);

        for key in duplicates {
            warn!(permission = %key, "permission catalog contains a duplicate resource/action pair");
        }

        Some(permissions)
    }
}

fn ensure_user_id(user_id: UserId) -> AppResult<()> {
    if user_id.is_nil() {
        return Err(AppError::Validation(
            "user id must not be the nil uuid".to_owned(),
        ));
    }

    Ok(())
}

fn ensure_role_id(role_id: RoleId) -> AppResult<()> {
    if role_id.is_nil() {
        return Err(AppError::Validation(
            "role id must not be the nil uuid".to_owned(),
        ));
    }

    Ok(())
}
