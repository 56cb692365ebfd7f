use super::*;

use crate::AccessChange;

impl PermissionResolver {
    /// Drops one user's cached permissions, or every cached entry when `None`.
    pub async fn invalidate(&self, user_id: Option<UserId>) -> usize {
        match user_id {
            Some(user_id) => {
                let removed = usize::from(self.cache.remove_user(user_id).await);
                debug!(user_id = %user_id, removed, "invalidated cached permissions for user");
                removed
            }
            None => {
                let removed = self.cache.clear().await;
                debug!(removed, "invalidated all cached permissions");
                removed
            }
        }
    }

    /// Drops a cached role and every user resolved against it.
    pub async fn invalidate_role(&self, role_id: RoleId) -> usize {
        let removed = self.cache.remove_role(role_id).await;
        debug!(role_id = %role_id, removed, "invalidated cached permissions for role holders");
        removed
    }

    /// Applies targeted invalidation for a change notification.
    ///
    /// Returns the number of user entries dropped.
    pub async fn apply_change(&self, change: &AccessChange) -> usize {
        match *change {
            AccessChange::UserChanged { user_id } => self.invalidate(Some(user_id)).await,
            AccessChange::RoleChanged { role_id } => self.invalidate_role(role_id).await,
            AccessChange::GrantChanged {
                role_id,
                permission_id,
            } => {
                let removed = self.cache.remove_users_with_role(role_id).await;
                debug!(
                    role_id = %role_id,
                    permission_id = %permission_id,
                    removed,
                    "invalidated cached permissions after grant change"
                );
                removed
            }
            AccessChange::CatalogChanged => {
                let removed = self.cache.clear_users().await;
                debug!(removed, "invalidated cached permissions after catalog change");
                removed
            }
            AccessChange::FeedReset => {
                let removed = self.cache.clear().await;
                warn!(removed, "access change feed reset; invalidated all cached permissions");
                removed
            }
        }
    }
}
