use async_trait::async_trait;
use super::credential::{Credential, CredentialStore};
use super::errors::AuthError;

/// The party that issues credentials: refresh exchange and interactive consent.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange a refresh token for a new credential.
    async fn refresh(&self, refresh_token: &str) -> Result<Credential, AuthError>;

    /// Run the interactive authorization flow from scratch.
    async fn authorize(&self) -> Result<Credential, AuthError>;
}

/// Where uploads get their credential from.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// A valid, unexpired credential.
    async fn obtain(&self) -> Result<Credential, AuthError>;

    /// Replace a credential the service has rejected.
    async fn refresh(&self, stale: &Credential) -> Result<Credential, AuthError>;
}

/// Loads, refreshes and persists the credential for one process.
pub struct CredentialManager<P> {
    provider: P,
    store: CredentialStore,
}

impl<P: IdentityProvider> CredentialManager<P> {
    pub fn new(provider: P, store: CredentialStore) -> Self {
        Self { provider, store }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    async fn load_stored(&self) -> Option<Credential> {
        match self.store.load().await {
            Ok(credential) => credential,
            Err(err) => {
                tracing::warn!(
                    path = %self.store.path().display(),
                    error = %err,
                    "ignoring unreadable stored credential"
                );
                None
            }
        }
    }

    async fn persist(&self, credential: &Credential) {
        // the previous file is left intact when saving fails
        if let Err(err) = self.store.save(credential).await {
            tracing::error!(
                path = %self.store.path().display(),
                error = %err,
                "failed to persist credential"
            );
        }
    }

    async fn refresh_with(&self, refresh_token: String) -> Result<Credential, AuthError> {
        tracing::debug!("refreshing access token");
        let fresh = self
            .provider
            .refresh(&refresh_token)
            .await?
            .with_fallback_refresh_token(Some(refresh_token));
        self.persist(&fresh).await;
        tracing::info!(expiry = %fresh.expiry, "access token refreshed");
        Ok(fresh)
    }
}

#[async_trait]
impl<P: IdentityProvider> CredentialSource for CredentialManager<P> {
    async fn obtain(&self) -> Result<Credential, AuthError> {
        if let Some(stored) = self.load_stored().await {
            if !stored.is_expired() {
                tracing::debug!(expiry = %stored.expiry, "using stored credential");
                return Ok(stored);
            }

            match stored.refresh_token {
                Some(refresh_token) => return self.refresh_with(refresh_token).await,
                None => tracing::info!("stored credential expired and cannot be refreshed"),
            }
        }

        tracing::info!("starting interactive authorization");
        let fresh = self.provider.authorize().await?;
        self.persist(&fresh).await;
        Ok(fresh)
    }

    async fn refresh(&self, stale: &Credential) -> Result<Credential, AuthError> {
        match stale.refresh_token.clone() {
            Some(refresh_token) => self.refresh_with(refresh_token).await,
            None => Err(AuthError::RefreshRejected(
                "credential has no refresh token".to_string(),
            )),
        }
    }
}
