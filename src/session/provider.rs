//! Identity provider trait.

use crate::error::Result;
use crate::session::types::{Credentials, Identity};
use async_trait::async_trait;

/// External service that owns accounts and issues access tokens.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Registers an account.
    ///
    /// Returns `None` when the provider requires confirmation before the
    /// account can sign in.
    async fn sign_up(&self, credentials: &Credentials) -> Result<Option<Identity>>;

    /// Exchanges credentials for an identity.
    async fn sign_in(&self, credentials: &Credentials) -> Result<Identity>;

    /// Revokes the identity's access token.
    async fn sign_out(&self, identity: &Identity) -> Result<()>;

    /// Resolves the identity behind an access token.
    async fn current_user(&self, access_token: &str) -> Result<Identity>;
}
