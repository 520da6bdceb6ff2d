//! OAuth 2.0 against Google's identity platform.
//!
//! Refresh is a plain token-endpoint exchange. Interactive authorization opens
//! the user's browser on the consent page and receives the authorization code
//! on a loopback HTTP listener (see `redirect`).

use std::path::Path;
use std::time::Duration;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, RefreshToken, Scope,
    TokenResponse, TokenUrl,
};
use serde::Deserialize;
use super::credential::Credential;
use super::errors::AuthError;
use super::manager::IdentityProvider;
use super::redirect::RedirectListener;

/// Scope needed to insert videos.
pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// How long the loopback listener waits for the user to finish consenting.
const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// OAuth client registration, as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let file: ClientSecretsFile = serde_json::from_str(json)?;
        file.installed
            .or(file.web)
            .ok_or_else(|| AuthError::InvalidClient("no 'installed' or 'web' section".to_string()))
    }

    pub async fn load(path: &Path) -> Result<Self, AuthError> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }
}

fn credential_from_token(token: &BasicTokenResponse) -> Credential {
    let lifetime = token
        .expires_in()
        .and_then(|d| TimeDelta::from_std(d).ok())
        .unwrap_or_else(|| TimeDelta::hours(1));

    Credential::new(
        token.access_token().secret().clone(),
        Utc::now() + lifetime,
        token.refresh_token().map(|t| t.secret().clone()),
    )
}

#[derive(Debug, Clone)]
pub struct GoogleOAuth {
    secrets: ClientSecrets,
    scopes: Vec<String>,
    timeout: Duration,
}

impl GoogleOAuth {
    pub fn new(secrets: ClientSecrets, timeout: Duration) -> Self {
        Self {
            secrets,
            scopes: vec![UPLOAD_SCOPE.to_string()],
            timeout,
        }
    }

    fn http_client(&self) -> Result<oauth2::reqwest::Client, AuthError> {
        oauth2::reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .timeout(self.timeout)
            .build()
            .map_err(|err| AuthError::InvalidClient(err.to_string()))
    }

    fn token_url(&self) -> Result<TokenUrl, AuthError> {
        TokenUrl::new(self.secrets.token_uri.clone())
            .map_err(|err| AuthError::InvalidClient(format!("token uri: {err}")))
    }

    async fn consent_flow(&self) -> anyhow::Result<Credential> {
        let listener = RedirectListener::bind().await?;

        let auth_url = AuthUrl::new(self.secrets.auth_uri.clone()).context("auth uri")?;
        let client = BasicClient::new(ClientId::new(self.secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.secrets.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(self.token_url()?)
            .set_redirect_uri(listener.url().clone());

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (consent_url, csrf) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            // a refresh token is only issued for offline access
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        tracing::info!(url = %consent_url, "asking user to follow OAuth flow");
        if let Err(err) = webbrowser::open(consent_url.as_ref()) {
            tracing::warn!(error = %err, "could not open browser, open the URL manually");
        }

        let code = listener.receive_code(&csrf, CONSENT_TIMEOUT).await?;

        let token = client
            .exchange_code(code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http_client()?)
            .await
            .context("exchange authorization code for access token")?;

        Ok(credential_from_token(&token))
    }
}

#[async_trait]
impl IdentityProvider for GoogleOAuth {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential, AuthError> {
        let client = BasicClient::new(ClientId::new(self.secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.secrets.client_secret.clone()))
            .set_token_uri(self.token_url()?);

        let refresh_token = RefreshToken::new(refresh_token.to_string());
        let token = client
            .exchange_refresh_token(&refresh_token)
            .request_async(&self.http_client()?)
            .await
            .map_err(|err| AuthError::RefreshRejected(err.to_string()))?;

        Ok(credential_from_token(&token))
    }

    async fn authorize(&self) -> Result<Credential, AuthError> {
        self.consent_flow()
            .await
            .map_err(|err| AuthError::AuthorizationFailed(format!("{err:#}")))
    }
}
