use crate::api::{Connectivity, IdentityProvider, Rejection, TokenGrant};
use crate::error::{AuthError, SyncError};
use crate::store::CredentialVault;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Produces usable access tokens: interactively on first connect, silently when the remote
/// service rejects the current one.
pub struct TokenManager {
    identity: Arc<dyn IdentityProvider>,
    vault: Arc<CredentialVault>,
    connectivity: Arc<dyn Connectivity>,
}

impl TokenManager {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        vault: Arc<CredentialVault>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            identity,
            vault,
            connectivity,
        }
    }

    /// Runs the provider's consent flow. Nothing is persisted here; the caller decides what to
    /// store alongside the tokens.
    pub async fn authenticate_interactive(&self) -> Result<TokenGrant, AuthError> {
        if !self.connectivity.is_online().await {
            return Err(AuthError::Offline);
        }
        self.identity.consent().await
    }

    /// Obtains a new access token without user interaction and stores it in the vault, keeping the
    /// existing refresh token unless the provider issued a new one. On failure the vault is left
    /// untouched.
    pub async fn refresh_silently(&self) -> Result<String, AuthError> {
        let credential = self
            .vault
            .get()?
            .ok_or_else(|| AuthError::refresh_failed("not connected"))?;

        let grant = self
            .identity
            .refresh(credential.refresh_token.as_deref())
            .await?;

        let access_token = grant.access_token.clone();
        let stored = self.vault.update(move |c| {
            c.access_token = grant.access_token;
            if let Some(refresh_token) = grant.refresh_token {
                c.refresh_token = Some(refresh_token);
            }
        })?;
        if stored.is_none() {
            return Err(AuthError::refresh_failed("disconnected during refresh"));
        }
        info!("Access token refreshed");
        Ok(access_token)
    }

    /// Runs `request` with the stored access token. If the token is rejected, refreshes it once
    /// and runs `request` once more. A second rejection, or a failed refresh, ends with
    /// `ReauthenticationRequired`. Any other failure is returned as `SyncFailed` without retrying.
    pub async fn authorized<T, F, Fut>(&self, mut request: F) -> Result<T, SyncError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, Rejection>>,
    {
        let token = self
            .vault
            .get()?
            .map(|c| c.access_token)
            .ok_or(SyncError::NotConfigured)?;

        match request(token).await {
            Ok(value) => return Ok(value),
            Err(Rejection::Failed(detail)) => return Err(SyncError::SyncFailed(detail)),
            Err(Rejection::Unauthorized(detail)) => {
                debug!("Access token rejected ({detail}), refreshing");
            }
        }

        let token = match self.refresh_silently().await {
            Ok(token) => token,
            Err(e) => {
                warn!("{e}");
                return Err(SyncError::ReauthenticationRequired);
            }
        };

        match request(token).await {
            Ok(value) => Ok(value),
            Err(Rejection::Failed(detail)) => Err(SyncError::SyncFailed(detail)),
            Err(Rejection::Unauthorized(detail)) => {
                warn!("Refreshed access token was rejected too: {detail}");
                Err(SyncError::ReauthenticationRequired)
            }
        }
    }
}
