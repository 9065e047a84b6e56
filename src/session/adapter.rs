//! Session state shared with the rest of the application.

use crate::error::Result;
use crate::session::provider::IdentityProvider;
use crate::session::types::{Credentials, Session};
use std::sync::Arc;
use tokio::sync::watch;

/// Proxies sign-in calls to an [`IdentityProvider`] and publishes the
/// resulting [`Session`] to observers.
///
/// Holds no state of its own beyond the last published session.
pub struct SessionAdapter {
    provider: Arc<dyn IdentityProvider>,
    state: watch::Sender<Session>,
}

impl SessionAdapter {
    /// Creates an adapter with an anonymous session.
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (state, _) = watch::channel(Session::anonymous());
        Self { provider, state }
    }

    /// Registers an account and publishes the resulting session.
    ///
    /// The session stays anonymous when the provider requires confirmation.
    pub async fn sign_up(&self, credentials: &Credentials) -> Result<Session> {
        let session = match self.provider.sign_up(credentials).await? {
            Some(identity) => Session::authenticated(identity),
            None => {
                tracing::info!(email = %credentials.email, "sign-up pending confirmation");
                Session::anonymous()
            }
        };
        self.publish(session.clone());
        Ok(session)
    }

    /// Signs in and publishes the resulting session.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        let identity = self.provider.sign_in(credentials).await?;
        tracing::info!(user_id = %identity.user_id, "signed in");
        let session = Session::authenticated(identity);
        self.publish(session.clone());
        Ok(session)
    }

    /// Rebuilds a session from a previously issued access token.
    pub async fn restore(&self, access_token: &str) -> Result<Session> {
        let identity = self.provider.current_user(access_token).await?;
        let session = Session::authenticated(identity);
        self.publish(session.clone());
        Ok(session)
    }

    /// Signs out. The local session is cleared even if the provider call fails.
    pub async fn sign_out(&self) {
        let current = self.current();
        if let Some(identity) = current.identity() {
            if let Err(e) = self.provider.sign_out(identity).await {
                tracing::warn!(user_id = %identity.user_id, "provider sign-out failed: {e}");
            }
            tracing::info!(user_id = %identity.user_id, "signed out");
        }
        self.publish(Session::anonymous());
    }

    /// Returns the current session.
    pub fn current(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Subscribes to session changes.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    fn publish(&self, session: Session) {
        self.state.send_replace(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PromptPixError;
    use crate::session::types::{Identity, UserId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeProvider {
        sign_outs: AtomicUsize,
        confirm_sign_up: bool,
        fail_sign_out: bool,
    }

    fn identity_for(email: &str) -> Identity {
        Identity {
            user_id: UserId::new(format!("id-{email}")),
            email: Some(email.to_string()),
            access_token: "token".into(),
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        async fn sign_up(&self, credentials: &Credentials) -> Result<Option<Identity>> {
            if self.confirm_sign_up {
                Ok(None)
            } else {
                Ok(Some(identity_for(&credentials.email)))
            }
        }

        async fn sign_in(&self, credentials: &Credentials) -> Result<Identity> {
            if credentials.password == "correct" {
                Ok(identity_for(&credentials.email))
            } else {
                Err(PromptPixError::Auth("Invalid login credentials".into()))
            }
        }

        async fn sign_out(&self, _identity: &Identity) -> Result<()> {
            self.sign_outs.fetch_add(1, Ordering::SeqCst);
            if self.fail_sign_out {
                Err(PromptPixError::Auth("token expired".into()))
            } else {
                Ok(())
            }
        }

        async fn current_user(&self, access_token: &str) -> Result<Identity> {
            if access_token == "token" {
                Ok(identity_for("restored@example.com"))
            } else {
                Err(PromptPixError::Auth("invalid token".into()))
            }
        }
    }

    #[tokio::test]
    async fn test_sign_in_publishes_session() {
        let adapter = SessionAdapter::new(Arc::new(FakeProvider::default()));
        let mut rx = adapter.subscribe();
        assert!(!adapter.current().is_authenticated());

        let session = adapter
            .sign_in(&Credentials::new("a@example.com", "correct"))
            .await
            .unwrap();
        assert_eq!(
            session.user_id(),
            Some(&UserId::new("id-a@example.com"))
        );
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_authenticated());
    }

    #[tokio::test]
    async fn test_failed_sign_in_keeps_session_anonymous() {
        let adapter = SessionAdapter::new(Arc::new(FakeProvider::default()));
        let err = adapter
            .sign_in(&Credentials::new("a@example.com", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, PromptPixError::Auth(_)));
        assert!(!adapter.current().is_authenticated());
    }

    #[tokio::test]
    async fn test_sign_up_pending_confirmation_stays_anonymous() {
        let provider = FakeProvider {
            confirm_sign_up: true,
            ..Default::default()
        };
        let adapter = SessionAdapter::new(Arc::new(provider));
        let session = adapter
            .sign_up(&Credentials::new("new@example.com", "pw"))
            .await
            .unwrap();
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_sign_out_clears_even_when_provider_fails() {
        let provider = Arc::new(FakeProvider {
            fail_sign_out: true,
            ..Default::default()
        });
        let adapter = SessionAdapter::new(provider.clone());
        adapter
            .sign_in(&Credentials::new("a@example.com", "correct"))
            .await
            .unwrap();

        adapter.sign_out().await;
        assert!(!adapter.current().is_authenticated());
        assert_eq!(provider.sign_outs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sign_out_when_anonymous_skips_provider() {
        let provider = Arc::new(FakeProvider::default());
        let adapter = SessionAdapter::new(provider.clone());
        adapter.sign_out().await;
        assert_eq!(provider.sign_outs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_restore_from_token() {
        let adapter = SessionAdapter::new(Arc::new(FakeProvider::default()));
        let session = adapter.restore("token").await.unwrap();
        assert_eq!(
            session.identity().and_then(|i| i.email.as_deref()),
            Some("restored@example.com")
        );
        assert!(adapter.restore("bogus").await.is_err());
    }
}
