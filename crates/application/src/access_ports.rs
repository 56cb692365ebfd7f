use async_trait::async_trait;

use opsboard_core::{AppResult, NonEmptyString};
use opsboard_domain::{Permission, PermissionId, Role, RoleId, User, UserId};

/// Result of inserting a role grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantInsertOutcome {
    /// A new grant row was written.
    Inserted,
    /// The row already existed, usually because a concurrent toggle won.
    AlreadyPresent,
}

/// Repository port for the reads and grant writes that resolution needs.
#[async_trait]
pub trait AccessDirectory: Send + Sync {
    /// Finds a user profile by id.
    async fn get_user_by_id(&self, user_id: UserId) -> AppResult<Option<User>>;

    /// Finds a role by id.
    async fn get_role_by_id(&self, role_id: RoleId) -> AppResult<Option<Role>>;

    /// Lists the full permission catalog.
    async fn list_permissions(&self) -> AppResult<Vec<Permission>>;

    /// Lists permission ids granted to a role.
    async fn list_grants_for_role(&self, role_id: RoleId) -> AppResult<Vec<PermissionId>>;

    /// Inserts a grant row, tolerating an existing row.
    async fn insert_grant(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> AppResult<GrantInsertOutcome>;

    /// Deletes a grant row, returning whether a row was removed.
    async fn delete_grant(&self, role_id: RoleId, permission_id: PermissionId) -> AppResult<bool>;
}

/// Input payload for creating roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleInput {
    /// Unique role name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
}

/// Input payload for editing roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRoleInput {
    /// New role name.
    pub name: String,
    /// New description.
    pub description: Option<String>,
}

/// Repository port for role administration and user role reassignment.
#[async_trait]
pub trait RoleAdminRepository: Send + Sync {
    /// Lists all roles ordered by name.
    async fn list_roles(&self) -> AppResult<Vec<Role>>;

    /// Creates a non-privileged role.
    async fn create_role(
        &self,
        name: NonEmptyString,
        description: Option<String>,
    ) -> AppResult<Role>;

    /// Updates a role's name and description.
    async fn update_role(
        &self,
        role_id: RoleId,
        name: NonEmptyString,
        description: Option<String>,
    ) -> AppResult<Role>;

    /// Deletes a role; holders become unassigned.
    async fn delete_role(&self, role_id: RoleId) -> AppResult<()>;

    /// Sets or clears a user's role.
    async fn assign_user_role(&self, user_id: UserId, role_id: Option<RoleId>) -> AppResult<()>;
}

/// Change notification used only to invalidate cached resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessChange {
    /// A user profile row changed, including its role assignment.
    UserChanged {
        /// Affected user.
        user_id: UserId,
    },
    /// A role row changed or was deleted.
    RoleChanged {
        /// Affected role.
        role_id: RoleId,
    },
    /// A grant row for a role was added or removed.
    GrantChanged {
        /// Role whose grants changed.
        role_id: RoleId,
        /// Permission that was granted or revoked.
        permission_id: PermissionId,
    },
    /// The permission catalog itself changed.
    CatalogChanged,
    /// The feed lost its connection; notifications may have been missed.
    FeedReset,
}

/// Stream of access changes from the persistence layer.
#[async_trait]
pub trait AccessChangeFeed: Send {
    /// Waits for the next change notification.
    async fn next_change(&mut self) -> AppResult<AccessChange>;
}
