use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use opsboard_domain::{PermissionSet, Role, RoleId, UserId};
use tokio::sync::RwLock;

/// Cached resolution for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAccess {
    /// Role the entry was resolved against; `None` for unassigned users.
    pub role_id: Option<RoleId>,
    /// Effective permission set.
    pub permissions: Arc<PermissionSet>,
    /// Whether the role bypasses explicit grants.
    pub is_privileged: bool,
}

impl CachedAccess {
    /// Entry for a user with no role or a failed resolution.
    #[must_use]
    pub fn denied() -> Self {
        Self {
            role_id: None,
            permissions: Arc::new(PermissionSet::empty()),
            is_privileged: false,
        }
    }
}

/// Owned per-user and per-role memo tables for permission resolution.
///
/// Entries live until they are invalidated; there is no expiry. Every
/// invalidation advances an epoch, and a resolution that started before the
/// latest invalidation is not allowed to store its result.
#[derive(Debug, Default)]
pub struct PermissionCache {
    epoch: AtomicU64,
    users: RwLock<HashMap<UserId, CachedAccess>>,
    roles: RwLock<HashMap<RoleId, Role>>,
}

impl PermissionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the epoch a resolution must present when storing.
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Returns the cached entry for a user.
    pub async fn user(&self, user_id: UserId) -> Option<CachedAccess> {
        self.users.read().await.get(&user_id).cloned()
    }

    /// Returns the cached role definition.
    pub async fn role(&self, role_id: RoleId) -> Option<Role> {
        self.roles.read().await.get(&role_id).cloned()
    }

    /// Stores a user entry unless an invalidation happened since `epoch`.
    pub(crate) async fn store_user(&self, epoch: u64, user_id: UserId, entry: CachedAccess) -> bool {
        let mut users = self.users.write().await;
        if self.epoch() != epoch {
            return false;
        }

        users.insert(user_id, entry);
        true
    }

    /// Stores a role unless an invalidation happened since `epoch`.
    pub(crate) async fn store_role(&self, epoch: u64, role: Role) -> bool {
        let mut roles = self.roles.write().await;
        if self.epoch() != epoch {
            return false;
        }

        roles.insert(role.id(), role);
        true
    }

    /// Drops one user's entry.
    pub async fn remove_user(&self, user_id: UserId) -> bool {
        let mut users = self.users.write().await;
        self.advance_epoch();
        users.remove(&user_id).is_some()
    }

    /// Drops a role definition and every user entry resolved against it.
    ///
    /// Returns the number of user entries removed.
    pub async fn remove_role(&self, role_id: RoleId) -> usize {
        let mut roles = self.roles.write().await;
        let mut users = self.users.write().await;
        self.advance_epoch();

        roles.remove(&role_id);
        let before = users.len();
        users.retain(|_, entry| entry.role_id != Some(role_id));
        before - users.len()
    }

    /// Drops every user entry resolved against a role, keeping the role itself.
    pub async fn remove_users_with_role(&self, role_id: RoleId) -> usize {
        let mut users = self.users.write().await;
        self.advance_epoch();

        let before = users.len();
        users.retain(|_, entry| entry.role_id != Some(role_id));
        before - users.len()
    }

    /// Drops every user entry, keeping role definitions.
    pub async fn clear_users(&self) -> usize {
        let mut users = self.users.write().await;
        self.advance_epoch();

        let removed = users.len();
        users.clear();
        removed
    }

    /// Drops every entry.
    pub async fn clear(&self) -> usize {
        let mut roles = self.roles.write().await;
        let mut users = self.users.write().await;
        self.advance_epoch();

        let removed = users.len();
        users.clear();
        roles.clear();
        removed
    }

    /// Returns the number of cached user entries.
    pub async fn user_entry_count(&self) -> usize {
        self.users.read().await.len()
    }

    fn advance_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}
