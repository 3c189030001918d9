//! OAuth 2.0 against Google for the Sheets API.
//!
//! This module handles:
//! - Loading OAuth client credentials from client_secret.json
//! - Running the consent flow with a one-shot callback server on the loopback interface
//! - Renewing the access token with the refresh token, without user interaction

use crate::api::files::SecretFile;
use crate::api::{IdentityProvider, TokenGrant, OAUTH_SCOPES};
use crate::error::AuthError;
use crate::Result;
use anyhow::Context;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use oauth2::basic::{BasicClient, BasicErrorResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse,
    TokenUrl,
};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info};
use url::Url;

/// How long the user has to complete the consent screen.
const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

const CONSENT_DONE: &str = "fintrack is now connected to Google. You can close this window.";
const CONSENT_WAITING: &str = "Waiting for the Google authorization redirect.";

type GoogleClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// An `IdentityProvider` backed by Google's OAuth endpoints and a downloaded `client_secret.json`.
pub struct GoogleIdentity {
    secret_path: PathBuf,
    http: reqwest::Client,
}

impl GoogleIdentity {
    pub fn new(secret_path: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        // The token endpoint must not be followed through redirects.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .context("Unable to create the OAuth HTTP client")?;
        Ok(Self {
            secret_path: secret_path.into(),
            http,
        })
    }

    /// Loads the client secret and builds the OAuth client. Failure here means the provider
    /// cannot be used at all.
    async fn client(&self) -> std::result::Result<GoogleClient, AuthError> {
        let secret = SecretFile::load(&self.secret_path)
            .await
            .map_err(|e| AuthError::unavailable(format!("{e:#}")))?;
        let auth_url = AuthUrl::new(secret.auth_uri().to_string())
            .map_err(|e| AuthError::unavailable(format!("Invalid auth_uri: {e}")))?;
        let token_url = TokenUrl::new(secret.token_uri().to_string())
            .map_err(|e| AuthError::unavailable(format!("Invalid token_uri: {e}")))?;
        Ok(BasicClient::new(ClientId::new(secret.client_id().to_string()))
            .set_client_secret(ClientSecret::new(secret.client_secret().to_string()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url))
    }
}

#[async_trait::async_trait]
impl IdentityProvider for GoogleIdentity {
    async fn consent(&self) -> std::result::Result<TokenGrant, AuthError> {
        info!("Starting OAuth consent flow");
        let client = self.client().await?;

        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| AuthError::unavailable(format!("Unable to start callback server: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::unavailable(format!("Unable to start callback server: {e}")))?
            .port();
        let redirect = RedirectUrl::new(format!("http://127.0.0.1:{port}"))
            .map_err(|e| AuthError::unavailable(e.to_string()))?;
        let client = client.set_redirect_uri(redirect);

        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let mut request = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(challenge)
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent");
        for scope in OAUTH_SCOPES {
            request = request.add_scope(Scope::new(scope.to_string()));
        }
        let (auth_url, csrf) = request.url();

        info!("Open this URL in your browser to authorize fintrack:\n\n{auth_url}\n");
        info!("Local callback server listening on http://127.0.0.1:{port}");

        let redirect = tokio::time::timeout(CONSENT_TIMEOUT, await_redirect(listener))
            .await
            .map_err(|_| AuthError::denied("timed out waiting for the consent screen"))??;
        let code = authorization_code(&redirect, csrf.secret())?;

        let token = client
            .exchange_code(code)
            .set_pkce_verifier(verifier)
            .request_async(&self.http)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(_) => AuthError::denied(describe(&e)),
                _ => AuthError::unavailable(describe(&e)),
            })?;

        info!("Authorization successful!");
        Ok(TokenGrant {
            access_token: token.access_token().secret().clone(),
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
        })
    }

    async fn refresh(
        &self,
        refresh_token: Option<&str>,
    ) -> std::result::Result<TokenGrant, AuthError> {
        let Some(refresh_token) = refresh_token else {
            return Err(AuthError::refresh_failed("no refresh token is stored"));
        };
        let client = self
            .client()
            .await
            .map_err(|e| AuthError::refresh_failed(e.to_string()))?;
        debug!("Refreshing the access token");
        let token = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::refresh_failed(describe(&e)))?;
        Ok(TokenGrant {
            access_token: token.access_token().secret().clone(),
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
        })
    }
}

/// Serves connections on `listener` until one of them is the OAuth redirect (it carries either
/// `code` or `error`), and returns that redirect URL.
async fn await_redirect(listener: TcpListener) -> std::result::Result<Url, AuthError> {
    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| AuthError::unavailable(format!("Callback server failed: {e}")))?;

        let (tx, rx) = oneshot::channel::<Url>();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let service = service_fn(move |req: Request<Incoming>| {
            let tx = Arc::clone(&tx);
            async move {
                let url = Url::parse(&format!("http://127.0.0.1{}", req.uri())).ok();
                let body = match url {
                    Some(url) if is_redirect(&url) => {
                        if let Some(tx) = tx.lock().ok().and_then(|mut slot| slot.take()) {
                            let _ = tx.send(url);
                        }
                        CONSENT_DONE
                    }
                    _ => CONSENT_WAITING,
                };
                Ok::<_, Infallible>(Response::new(body.to_string()))
            }
        });

        if let Err(e) = http1::Builder::new()
            .keep_alive(false)
            .serve_connection(TokioIo::new(stream), service)
            .await
        {
            debug!("Callback connection error: {e}");
        }

        if let Ok(url) = rx.await {
            return Ok(url);
        }
    }
}

fn is_redirect(url: &Url) -> bool {
    url.query_pairs().any(|(k, _)| k == "code" || k == "error")
}

/// Pulls the authorization code out of the redirect, checking the CSRF state.
fn authorization_code(
    redirect: &Url,
    expected_state: &str,
) -> std::result::Result<AuthorizationCode, AuthError> {
    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut error_description = None;
    for (key, value) in redirect.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(AuthError::denied(match error_description {
            Some(description) => format!("{error}: {description}"),
            None => error,
        }));
    }
    if state.as_deref() != Some(expected_state) {
        return Err(AuthError::denied("the redirect state did not match the request"));
    }
    code.map(AuthorizationCode::new)
        .ok_or_else(|| AuthError::denied("the redirect did not include an authorization code"))
}

fn describe<RE>(e: &RequestTokenError<RE, BasicErrorResponse>) -> String
where
    RE: std::error::Error + 'static,
{
    match e {
        RequestTokenError::ServerResponse(response) => {
            let error: &str = response.error().as_ref();
            match response.error_description() {
                Some(description) => format!("{error}: {description}"),
                None => error.to_string(),
            }
        }
        other => other.to_string(),
    }
}
