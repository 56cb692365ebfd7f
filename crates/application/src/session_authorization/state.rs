use std::sync::Arc;

use opsboard_domain::{PermissionSet, Role, RoleId, User, UserId};

use crate::{AccessChange, ResolvedAccess};

/// Authorization context of a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedSession {
    user: User,
    role: Option<Role>,
    permissions: Arc<PermissionSet>,
    is_privileged: bool,
}

impl AuthorizedSession {
    /// Returns the signed-in user.
    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Returns the user's role, if assigned.
    #[must_use]
    pub fn role(&self) -> Option<&Role> {
        self.role.as_ref()
    }

    /// Returns the effective permission set.
    #[must_use]
    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    /// Returns whether the role bypasses explicit grants.
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        self.is_privileged
    }

    /// Returns whether the session may perform `action` on `resource`.
    #[must_use]
    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        self.is_privileged || self.permissions.contains(resource, action)
    }
}

impl From<ResolvedAccess> for AuthorizedSession {
    fn from(value: ResolvedAccess) -> Self {
        Self {
            user: value.user,
            role: value.role,
            permissions: value.permissions,
            is_privileged: value.is_privileged,
        }
    }
}

/// Session lifecycle as observed by UI code.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No signed-in user.
    #[default]
    Unauthenticated,
    /// A resolution for the user is in flight.
    Resolving {
        /// User being resolved.
        user_id: UserId,
    },
    /// Resolution completed.
    Authorized(Arc<AuthorizedSession>),
    /// Resolution failed; nothing is permitted.
    Denied {
        /// User the failure applies to, when known.
        user_id: Option<UserId>,
        /// Human-readable denial reason.
        reason: String,
    },
}

impl SessionState {
    /// Returns whether the state permits `action` on `resource`.
    #[must_use]
    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        match self {
            Self::Authorized(session) => session.has_permission(resource, action),
            _ => false,
        }
    }

    /// Returns whether the state carries a privileged role.
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Authorized(session) if session.is_privileged())
    }

    /// Returns the user the state is about.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Unauthenticated => None,
            Self::Resolving { user_id } => Some(*user_id),
            Self::Authorized(session) => Some(session.user().id()),
            Self::Denied { user_id, .. } => *user_id,
        }
    }

    /// Returns the resolved role.
    #[must_use]
    pub fn role(&self) -> Option<&Role> {
        match self {
            Self::Authorized(session) => session.role(),
            _ => None,
        }
    }

    /// Returns the resolved role id.
    #[must_use]
    pub fn role_id(&self) -> Option<RoleId> {
        self.role().map(Role::id)
    }

    /// Returns whether a resolution is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Resolving { .. })
    }

    pub(super) fn is_affected_by(&self, change: &AccessChange) -> bool {
        match self {
            Self::Unauthenticated | Self::Denied { user_id: None, .. } => false,
            Self::Resolving { .. } | Self::Denied { .. } => true,
            Self::Authorized(session) => match *change {
                AccessChange::UserChanged { user_id } => session.user().id() == user_id,
                AccessChange::RoleChanged { role_id }
                | AccessChange::GrantChanged { role_id, .. } => {
                    self.role_id() == Some(role_id)
                }
                AccessChange::CatalogChanged | AccessChange::FeedReset => true,
            },
        }
    }
}

/// Versioned session state published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub(super) generation: u64,
    pub(super) state: SessionState,
}

impl SessionSnapshot {
    /// Returns the resolution generation this state belongs to.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the session state.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }
}
