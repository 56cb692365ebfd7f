use async_trait::async_trait;

use opsboard_core::AppResult;
use opsboard_domain::UserId;

/// Identity established by the external authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Authenticated user id.
    pub user_id: UserId,
    /// Email reported by the provider, if any.
    pub email: Option<String>,
}

/// Port to the authentication/session mechanism.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Returns the active session, if one exists.
    async fn current_session(&self) -> AppResult<Option<SessionIdentity>>;

    /// Authenticates with credentials and returns the new identity.
    async fn sign_in(&self, email: &str, password: &str) -> AppResult<SessionIdentity>;

    /// Ends the active session.
    async fn sign_out(&self) -> AppResult<()>;
}
