//! Session-scoped authorization facade.
//!
//! Holds the signed-in user's resolved access in a `watch` channel so that
//! permission checks are synchronous and UI code can subscribe to changes.
//! Every resolution carries a generation; a result is published only while
//! its generation is still the latest one started.

use std::sync::Arc;

use opsboard_core::AppResult;
use opsboard_domain::{Role, RoleDescriptor, UserId};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{AccessChange, AccessResolution, PermissionResolver, SessionProvider};

mod state;


pub use state::{AuthorizedSession, SessionSnapshot, SessionState};

/// Authorization context for the current session.
pub struct SessionAuthorization {
    resolver: Arc<PermissionResolver>,
    provider: Arc<dyn SessionProvider>,
    state: watch::Sender<SessionSnapshot>,
}

impl SessionAuthorization {
    /// Creates an unauthenticated facade.
    #[must_use]
    pub fn new(resolver: Arc<PermissionResolver>, provider: Arc<dyn SessionProvider>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            resolver,
            provider,
            state,
        }
    }

    /// Returns whether the session may perform `action` on `resource`.
    #[must_use]
    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        self.state.borrow().state.has_permission(resource, action)
    }

    /// Returns whether the session holds a privileged role.
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        self.state.borrow().state.is_privileged()
    }

    /// Returns the resolved role for display.
    #[must_use]
    pub fn current_role(&self) -> Option<RoleDescriptor> {
        self.state
            .borrow()
            .state
            .role()
            .map(Role::descriptor)
    }

    /// Returns the user the session is about, if any.
    #[must_use]
    pub fn current_user_id(&self) -> Option<UserId> {
        self.state.borrow().state.user_id()
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().state.clone()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Signs in through the session provider and resolves the user.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<()> {
        let generation = self.claim();
        match self.provider.sign_in(email, password).await {
            Ok(identity) => self.resolve(generation, identity.user_id).await,
            Err(error) => {
                warn!(error = %error, "sign-in failed");
                self.publish(generation, SessionState::Unauthenticated);
                Err(error)
            }
        }
    }

    /// Signs out and drops the user's cached access.
    ///
    /// Local state is cleared even when the provider fails to sign out.
    pub async fn logout(&self) -> AppResult<()> {
        let user_id = self.current_user_id();
        self.transition(SessionState::Unauthenticated);

        if let Some(user_id) = user_id {
            self.resolver.invalidate(Some(user_id)).await;
        }

        self.provider.sign_out().await.inspect_err(|error| {
            warn!(error = %error, "provider sign-out failed");
        })
    }

    /// Resolves whatever session the provider currently holds.
    pub async fn restore_session(&self) -> AppResult<()> {
        let generation = self.claim();
        match self.provider.current_session().await {
            Ok(Some(identity)) => self.resolve(generation, identity.user_id).await,
            Ok(None) => {
                self.publish(generation, SessionState::Unauthenticated);
                Ok(())
            }
            Err(error) => {
                warn!(error = %error, "failed to restore session");
                self.publish(
                    generation,
                    SessionState::Denied {
                        user_id: None,
                        reason: "session could not be restored".to_owned(),
                    },
                );
                Err(error)
            }
        }
    }

    /// Reacts to the provider reporting a new identity.
    pub async fn identity_changed(&self, user_id: Option<UserId>) -> AppResult<()> {
        match user_id {
            Some(user_id) => {
                let generation = self.claim();
                self.resolve(generation, user_id).await
            }
            None => {
                self.transition(SessionState::Unauthenticated);
                Ok(())
            }
        }
    }

    /// Re-resolves the current user from fresh data.
    pub async fn refresh(&self) -> AppResult<()> {
        let (generation, Some(user_id)) = self.observe() else {
            return Ok(());
        };

        self.resolver.invalidate(Some(user_id)).await;
        self.resolve(generation, user_id).await
    }

    /// Flushes cached access and re-resolves when the current user was hit.
    pub async fn invalidate(&self, user_id: Option<UserId>) -> AppResult<()> {
        let (generation, current) = self.observe();
        self.resolver.invalidate(user_id).await;

        match (user_id, current) {
            (None, Some(current)) => self.resolve(generation, current).await,
            (Some(target), Some(current)) if target == current => {
                self.resolve(generation, current).await
            }
            _ => Ok(()),
        }
    }

    /// Applies a change notification and re-resolves when it concerns this session.
    pub async fn handle_access_change(&self, change: AccessChange) -> AppResult<()> {
        let (generation, current) = self.observe();
        let affected = self.state.borrow().state.is_affected_by(&change);
        self.resolver.apply_change(&change).await;

        match current {
            Some(user_id) if affected => {
                debug!(user_id = %user_id, change = ?change, "re-resolving session after access change");
                self.resolve(generation, user_id).await
            }
            _ => Ok(()),
        }
    }

    async fn resolve(&self, generation: u64, user_id: UserId) -> AppResult<()> {
        let Some(generation) = self.begin_resolving(generation, user_id) else {
            debug!(user_id = %user_id, generation, "session changed before resolution started");
            return Ok(());
        };

        let next = match self.resolver.resolve_access(user_id).await {
            Ok(AccessResolution::Resolved(access)) => {
                info!(
                    user_id = %user_id,
                    role = access.role.as_ref().map(|role| role.name().as_str()).unwrap_or(""),
                    permissions = access.permissions.len(),
                    is_privileged = access.is_privileged,
                    "session authorized"
                );
                SessionState::Authorized(Arc::new(AuthorizedSession::from(access)))
            }
            Ok(AccessResolution::Denied { reason }) => {
                warn!(user_id = %user_id, reason = %reason, "session denied");
                SessionState::Denied {
                    user_id: Some(user_id),
                    reason,
                }
            }
            Err(error) => {
                self.publish(
                    generation,
                    SessionState::Denied {
                        user_id: Some(user_id),
                        reason: error.to_string(),
                    },
                );
                return Err(error);
            }
        };

        if !self.publish(generation, next) {
            debug!(user_id = %user_id, generation, "discarded superseded resolution");
        }

        Ok(())
    }

    /// Supersedes any in-flight work without publishing a new state.
    fn claim(&self) -> u64 {
        let mut generation = 0;
        self.state.send_if_modified(|snapshot| {
            snapshot.generation = snapshot.generation.wrapping_add(1);
            generation = snapshot.generation;
            false
        });
        generation
    }

    fn observe(&self) -> (u64, Option<UserId>) {
        let snapshot = self.state.borrow();
        (snapshot.generation, snapshot.state.user_id())
    }

    /// Moves to `Resolving` only if nothing happened since `generation` was taken.
    fn begin_resolving(&self, generation: u64, user_id: UserId) -> Option<u64> {
        let mut started = None;
        self.state.send_if_modified(|snapshot| {
            if snapshot.generation != generation {
                return false;
            }
            snapshot.generation = generation.wrapping_add(1);
            snapshot.state = SessionState::Resolving { user_id };
            started = Some(snapshot.generation);
            true
        });
        started
    }

    fn publish(&self, generation: u64, state: SessionState) -> bool {
        self.state.send_if_modified(|snapshot| {
            if snapshot.generation != generation {
                return false;
            }
            snapshot.state = state;
            true
        })
    }

    fn transition(&self, state: SessionState) {
        self.state.send_modify(|snapshot| {
            snapshot.generation = snapshot.generation.wrapping_add(1);
            snapshot.state = state;
        });
    }
}
