//! GoTrue-compatible hosted auth provider (email/password).

use crate::error::{sanitize_error_message, PromptPixError, Result};
use crate::session::provider::IdentityProvider;
use crate::session::types::{Credentials, Identity, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Environment variable holding the auth service URL.
pub const AUTH_URL_ENV: &str = "PROMPTPIX_AUTH_URL";
/// Environment variable holding the public (anon) API key of the auth service.
pub const AUTH_KEY_ENV: &str = "PROMPTPIX_AUTH_KEY";

/// Builder for GoTrueProvider.
#[derive(Debug, Clone, Default)]
pub struct GoTrueProviderBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
}

impl GoTrueProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the project URL. Falls back to `PROMPTPIX_AUTH_URL` env var.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the public API key. Falls back to `PROMPTPIX_AUTH_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Builds the provider.
    pub fn build(self) -> Result<GoTrueProvider> {
        let base_url = self
            .base_url
            .or_else(|| std::env::var(AUTH_URL_ENV).ok())
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                PromptPixError::Configuration(format!("{AUTH_URL_ENV} not set and no URL provided"))
            })?;
        let api_key = self
            .api_key
            .or_else(|| std::env::var(AUTH_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                PromptPixError::Configuration(format!(
                    "{AUTH_KEY_ENV} not set and no API key provided"
                ))
            })?;

        Ok(GoTrueProvider {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

/// Email/password identity provider speaking the GoTrue REST API.
pub struct GoTrueProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoTrueProvider {
    /// Creates a new `GoTrueProviderBuilder`.
    pub fn builder() -> GoTrueProviderBuilder {
        GoTrueProviderBuilder::new()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    async fn error_from_response(response: reqwest::Response) -> PromptPixError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<AuthErrorBody>(&text)
            .ok()
            .and_then(AuthErrorBody::message)
            .unwrap_or(text);
        let message = sanitize_error_message(&message);
        if status >= 500 {
            PromptPixError::Auth(format!("identity provider unavailable ({status}): {message}"))
        } else {
            PromptPixError::Auth(message)
        }
    }
}

#[async_trait]
impl IdentityProvider for GoTrueProvider {
    async fn sign_up(&self, credentials: &Credentials) -> Result<Option<Identity>> {
        let response = self
            .client
            .post(self.url("signup"))
            .header("apikey", &self.api_key)
            .json(&PasswordRequest::from(credentials))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        // With email confirmation enabled only the user object comes back.
        let body: SignUpResponse = response.json().await.map_err(body_error)?;
        Ok(body.into_identity())
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Identity> {
        let response = self
            .client
            .post(self.url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.api_key)
            .json(&PasswordRequest::from(credentials))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body: TokenResponse = response.json().await.map_err(body_error)?;
        Ok(Identity {
            user_id: UserId(body.user.id),
            email: body.user.email,
            access_token: body.access_token,
        })
    }

    async fn sign_out(&self, identity: &Identity) -> Result<()> {
        let response = self
            .client
            .post(self.url("logout"))
            .header("apikey", &self.api_key)
            .bearer_auth(&identity.access_token)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<Identity> {
        let response = self
            .client
            .get(self.url("user"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let user: AuthUser = response.json().await.map_err(body_error)?;
        Ok(Identity {
            user_id: UserId(user.id),
            email: user.email,
            access_token: access_token.to_string(),
        })
    }
}

fn transport_error(err: reqwest::Error) -> PromptPixError {
    PromptPixError::Auth(format!(
        "identity provider unreachable: {}",
        sanitize_error_message(&err.to_string())
    ))
}

fn body_error(err: reqwest::Error) -> PromptPixError {
    PromptPixError::Auth(format!(
        "unexpected identity provider response: {}",
        sanitize_error_message(&err.to_string())
    ))
}

#[derive(Debug, Serialize)]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
}

impl<'a> From<&'a Credentials> for PasswordRequest<'a> {
    fn from(credentials: &'a Credentials) -> Self {
        Self {
            email: &credentials.email,
            password: &credentials.password,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct SignUpResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<AuthUser>,
}

impl SignUpResponse {
    fn into_identity(self) -> Option<Identity> {
        match (self.access_token, self.user) {
            (Some(access_token), Some(user)) => Some(Identity {
                user_id: UserId(user.id),
                email: user.email,
                access_token,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl AuthErrorBody {
    fn message(self) -> Option<String> {
        self.error_description.or(self.msg).or(self.message)
    }
}
