use async_trait::async_trait;
use tokio::sync::Mutex;

use opsboard_application::{SessionIdentity, SessionProvider};
use opsboard_core::{AppError, AppResult};

/// Session provider pinned to one operator identity.
///
/// Credentials are not checked; `sign_in` only accepts the configured email,
/// or any email when none is configured.
pub struct FixedSessionProvider {
    identity: SessionIdentity,
    signed_in: Mutex<bool>,
}

impl FixedSessionProvider {
    /// Creates a provider that starts signed in as `identity`.
    #[must_use]
    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            identity,
            signed_in: Mutex::new(true),
        }
    }
}

#[async_trait]
impl SessionProvider for FixedSessionProvider {
    async fn current_session(&self) -> AppResult<Option<SessionIdentity>> {
        Ok(self
            .signed_in
            .lock()
            .await
            .then(|| self.identity.clone()))
    }

    async fn sign_in(&self, email: &str, _password: &str) -> AppResult<SessionIdentity> {
        if let Some(expected) = self.identity.email.as_deref()
            && !expected.eq_ignore_ascii_case(email.trim())
        {
            return Err(AppError::Unauthorized(
                "invalid login credentials".to_owned(),
            ));
        }

        *self.signed_in.lock().await = true;
        Ok(self.identity.clone())
    }

    async fn sign_out(&self) -> AppResult<()> {
        *self.signed_in.lock().await = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use opsboard_application::{SessionIdentity, SessionProvider};
    use opsboard_core::AppError;
    use opsboard_domain::UserId;

    use super::FixedSessionProvider;

    #[tokio::test]
    async fn sign_out_clears_and_sign_in_restores_session() {
        let identity = SessionIdentity {
            user_id: UserId::new(),
            email: Some("ops@example.com".to_owned()),
        };
        let provider = FixedSessionProvider::new(identity.clone());

        assert!(matches!(provider.current_session().await, Ok(Some(ref current)) if current == &identity));
        assert!(provider.sign_out().await.is_ok());
        assert!(matches!(provider.current_session().await, Ok(None)));

        let wrong = provider.sign_in("someone@example.com", "").await;
        assert!(matches!(wrong, Err(AppError::Unauthorized(_))));

        let signed_in = provider.sign_in("OPS@example.com", "").await;
        assert!(matches!(signed_in, Ok(ref current) if current == &identity));
        assert!(matches!(provider.current_session().await, Ok(Some(_))));
    }
}
