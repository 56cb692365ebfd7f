use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use opsboard_core::{AppError, AppResult, NonEmptyString};
use opsboard_domain::{
    EmailAddress, Permission, PermissionId, PermissionKey, Role, RoleId, User, UserId,
};

use crate::{
    AccessDirectory, GrantInsertOutcome, PermissionResolver, RoleAdminRepository,
    SessionIdentity, SessionProvider,
};

pub const RESOURCES: [&str; 4] = ["orders", "inventory", "tasks", "payables"];
pub const ACTIONS: [&str; 4] = ["view", "create", "edit", "delete"];

#[derive(Default)]
struct DirectoryState {
    users: HashMap<UserId, User>,
    roles: HashMap<RoleId, Role>,
    permissions: Vec<Permission>,
    grants: BTreeSet<(RoleId, PermissionId)>,
}

#[derive(Default)]
pub struct FakeAccessDirectory {
    state: Mutex<DirectoryState>,
    pub user_reads: AtomicUsize,
    pub role_reads: AtomicUsize,
    pub catalog_reads: AtomicUsize,
    pub grant_reads: AtomicUsize,
    pub fail_users: AtomicBool,
    pub fail_roles: AtomicBool,
    pub fail_catalog: AtomicBool,
    pub fail_grants: AtomicBool,
    pub stale_grant_reads: AtomicBool,
    pub hold_user: Mutex<Option<UserId>>,
    pub user_entered: Notify,
    pub user_release: Notify,
}

impl FakeAccessDirectory {
    pub fn total_reads(&self) -> usize {
        self.user_reads.load(Ordering::SeqCst)
            + self.role_reads.load(Ordering::SeqCst)
            + self.catalog_reads.load(Ordering::SeqCst)
            + self.grant_reads.load(Ordering::SeqCst)
    }

    pub async fn add_permission(&self, resource: &str, action: &str) -> PermissionId {
        let Ok(key) = PermissionKey::new(resource, action) else {
            panic!("test permission key should be valid");
        };
        let permission = Permission::new(
            PermissionId::new(),
            format!("{action} {resource}"),
            None,
            key,
        );
        let id = permission.id();
        self.state.lock().await.permissions.push(permission);
        id
    }

    pub async fn add_role(&self, name: &str, is_privileged: bool) -> RoleId {
        let Ok(name) = NonEmptyString::new(name) else {
            panic!("test role name should be valid");
        };
        let role = Role::new(RoleId::new(), name, None, is_privileged);
        let id = role.id();
        self.state.lock().await.roles.insert(id, role);
        id
    }

    pub async fn add_user(&self, email: &str, role_id: Option<RoleId>) -> UserId {
        let Ok(email) = EmailAddress::new(email) else {
            panic!("test email should be valid");
        };
        let user = User::new(UserId::new(), email, None, role_id);
        let id = user.id();
        self.state.lock().await.users.insert(id, user);
        id
    }

    pub async fn grant(&self, role_id: RoleId, permission_id: PermissionId) {
        self.state
            .lock()
            .await
            .grants
            .insert((role_id, permission_id));
    }

    pub async fn revoke(&self, role_id: RoleId, permission_id: PermissionId) {
        self.state
            .lock()
            .await
            .grants
            .remove(&(role_id, permission_id));
    }

    pub async fn set_user_role(&self, user_id: UserId, role_id: Option<RoleId>) {
        let mut state = self.state.lock().await;
        if let Some(user) = state.users.remove(&user_id) {
            state.users.insert(user_id, user.with_role(role_id));
        }
    }

    pub async fn grant_count(&self, role_id: RoleId) -> usize {
        self.state
            .lock()
            .await
            .grants
            .iter()
            .filter(|(stored_role_id, _)| stored_role_id == &role_id)
            .count()
    }

    pub async fn permission_id(&self, resource: &str, action: &str) -> PermissionId {
        self.state
            .lock()
            .await
            .permissions
            .iter()
            .find(|permission| permission.resource() == resource && permission.action() == action)
            .map(Permission::id)
            .unwrap_or_default()
    }
}

fn transport_error(what: &str) -> AppError {
    AppError::Internal(format!("failed to load {what}: connection reset"))
}

#[async_trait]
impl AccessDirectory for FakeAccessDirectory {
    async fn get_user_by_id(&self, user_id: UserId) -> AppResult<Option<User>> {
        self.user_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_users.load(Ordering::SeqCst) {
            return Err(transport_error("user"));
        }
        let user = self.state.lock().await.users.get(&user_id).cloned();

        let held = {
            let mut hold = self.hold_user.lock().await;
            if *hold == Some(user_id) {
                hold.take()
            } else {
                None
            }
        };
        if held.is_some() {
            self.user_entered.notify_one();
            self.user_release.notified().await;
        }

        Ok(user)
    }

    async fn get_role_by_id(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        self.role_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_roles.load(Ordering::SeqCst) {
            return Err(transport_error("role"));
        }
        Ok(self.state.lock().await.roles.get(&role_id).cloned())
    }

    async fn list_permissions(&self) -> AppResult<Vec<Permission>> {
        self.catalog_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_catalog.load(Ordering::SeqCst) {
            return Err(transport_error("permissions"));
        }
        Ok(self.state.lock().await.permissions.clone())
    }

    async fn list_grants_for_role(&self, role_id: RoleId) -> AppResult<Vec<PermissionId>> {
        self.grant_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_grants.load(Ordering::SeqCst) {
            return Err(transport_error("grants"));
        }
        if self.stale_grant_reads.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(self
            .state
            .lock()
            .await
            .grants
            .iter()
            .filter(|(stored_role_id, _)| stored_role_id == &role_id)
            .map(|(_, permission_id)| *permission_id)
            .collect())
    }

    async fn insert_grant(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> AppResult<GrantInsertOutcome> {
        let inserted = self
            .state
            .lock()
            .await
            .grants
            .insert((role_id, permission_id));
        Ok(if inserted {
            GrantInsertOutcome::Inserted
        } else {
            GrantInsertOutcome::AlreadyPresent
        })
    }

    async fn delete_grant(&self, role_id: RoleId, permission_id: PermissionId) -> AppResult<bool> {
        Ok(self
            .state
            .lock()
            .await
            .grants
            .remove(&(role_id, permission_id)))
    }
}

#[async_trait]
impl RoleAdminRepository for FakeAccessDirectory {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let mut roles: Vec<Role> = self.state.lock().await.roles.values().cloned().collect();
        roles.sort_by(|left, right| left.name().cmp(right.name()));
        Ok(roles)
    }

    async fn create_role(
        &self,
        name: NonEmptyString,
        description: Option<String>,
    ) -> AppResult<Role> {
        let mut state = self.state.lock().await;
        if state.roles.values().any(|role| role.name() == &name) {
            return Err(AppError::Conflict(format!("role '{name}' already exists")));
        }
        let role = Role::new(RoleId::new(), name, description, false);
        state.roles.insert(role.id(), role.clone());
        Ok(role)
    }

    async fn update_role(
        &self,
        role_id: RoleId,
        name: NonEmptyString,
        description: Option<String>,
    ) -> AppResult<Role> {
        let mut state = self.state.lock().await;
        let Some(existing) = state.roles.get(&role_id) else {
            return Err(AppError::NotFound(format!("role '{role_id}' was not found")));
        };
        let role = Role::new(role_id, name, description, existing.is_privileged());
        state.roles.insert(role_id, role.clone());
        Ok(role)
    }

    async fn delete_role(&self, role_id: RoleId) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.roles.remove(&role_id).is_none() {
            return Err(AppError::NotFound(format!("role '{role_id}' was not found")));
        }
        state
            .grants
            .retain(|(stored_role_id, _)| stored_role_id != &role_id);
        let holders: Vec<UserId> = state
            .users
            .values()
            .filter(|user| user.role_id() == Some(role_id))
            .map(User::id)
            .collect();
        for user_id in holders {
            if let Some(user) = state.users.remove(&user_id) {
                state.users.insert(user_id, user.with_role(None));
            }
        }
        Ok(())
    }

    async fn assign_user_role(&self, user_id: UserId, role_id: Option<RoleId>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let Some(user) = state.users.remove(&user_id) else {
            return Err(AppError::NotFound(format!("user '{user_id}' was not found")));
        };
        state.users.insert(user_id, user.with_role(role_id));
        Ok(())
    }
}

/// Seeded dashboard data shared by resolver, admin, and session tests.
pub struct Fixture {
    pub directory: Arc<FakeAccessDirectory>,
    pub resolver: Arc<PermissionResolver>,
    pub ceo_role: RoleId,
    pub admin_role: RoleId,
    pub accountant_role: RoleId,
    pub ceo: UserId,
    pub admin: UserId,
    pub accountant: UserId,
    pub unassigned: UserId,
}

impl Fixture {
    pub async fn seeded() -> Self {
        let directory = Arc::new(FakeAccessDirectory::default());
        for resource in RESOURCES {
            for action in ACTIONS {
                directory.add_permission(resource, action).await;
            }
        }

        let ceo_role = directory.add_role("CEO", true).await;
        let admin_role = directory.add_role("Admin", true).await;
        let accountant_role = directory.add_role("Accountant", false).await;

        let payables_view = directory.permission_id("payables", "view").await;
        let payables_create = directory.permission_id("payables", "create").await;
        directory.grant(accountant_role, payables_view).await;
        directory.grant(accountant_role, payables_create).await;

        let ceo = directory.add_user("ceo@example.com", Some(ceo_role)).await;
        let admin = directory.add_user("admin@example.com", Some(admin_role)).await;
        let accountant = directory
            .add_user("u1@example.com", Some(accountant_role))
            .await;
        let unassigned = directory.add_user("new@example.com", None).await;

        let resolver = Arc::new(PermissionResolver::new(directory.clone()));

        Self {
            directory,
            resolver,
            ceo_role,
            admin_role,
            accountant_role,
            ceo,
            admin,
            accountant,
            unassigned,
        }
    }

    pub fn catalog_size() -> usize {
        RESOURCES.len() * ACTIONS.len()
    }
}

/// Session provider with a scripted current session.
#[derive(Default)]
pub struct FakeSessionProvider {
    pub current: Mutex<Option<SessionIdentity>>,
    pub accounts: Mutex<HashMap<String, (String, UserId)>>,
    pub fail_session: AtomicBool,
    pub sign_outs: AtomicUsize,
    pub hold_session: AtomicBool,
    pub session_entered: Notify,
    pub session_release: Notify,
}

impl FakeSessionProvider {
    pub async fn with_account(self, email: &str, password: &str, user_id: UserId) -> Self {
        self.accounts
            .lock()
            .await
            .insert(email.to_owned(), (password.to_owned(), user_id));
        self
    }
}

#[async_trait]
impl SessionProvider for FakeSessionProvider {
    async fn current_session(&self) -> AppResult<Option<SessionIdentity>> {
        if self.fail_session.load(Ordering::SeqCst) {
            return Err(AppError::Internal(
                "failed to read session: provider unavailable".to_owned(),
            ));
        }
        let identity = self.current.lock().await.clone();

        if self.hold_session.swap(false, Ordering::SeqCst) {
            self.session_entered.notify_one();
            self.session_release.notified().await;
        }

        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<SessionIdentity> {
        let accounts = self.accounts.lock().await;
        match accounts.get(email) {
            Some((stored_password, user_id)) if stored_password == password => {
                let identity = SessionIdentity {
                    user_id: *user_id,
                    email: Some(email.to_owned()),
                };
                *self.current.lock().await = Some(identity.clone());
                Ok(identity)
            }
            _ => Err(AppError::Unauthorized("invalid login credentials".to_owned())),
        }
    }

    async fn sign_out(&self) -> AppResult<()> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        *self.current.lock().await = None;
        Ok(())
    }
}
