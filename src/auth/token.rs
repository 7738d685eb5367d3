//! Access-token lifecycle
//!
//! Decides when the access token must be renewed and performs the OAuth2
//! refresh-token grant. A renewed credential is persisted before it is used.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::credential::{Credential, CredentialStore};
use crate::error::DriveError;
use crate::transport::{HttpRequest, HttpTransport};

/// Microsoft identity platform endpoints
pub const AUTHORIZE_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
pub const TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";

/// Default safety margin before expiry at which the token is renewed
pub const DEFAULT_RENEW_MARGIN_SECS: i64 = 60;

/// OAuth2 application registration
#[derive(Debug, Clone)]
pub struct OAuthApp {
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub redirect_url: String,
    pub authorize_url: String,
    pub token_url: String,
}

impl OAuthApp {
    fn scope(&self) -> String {
        self.scopes.join(" ")
    }

    /// URL the user opens in a browser to grant access
    pub fn login_url(&self) -> Result<String, DriveError> {
        let mut url = url::Url::parse(&self.authorize_url)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("scope", &self.scope());
        Ok(url.into())
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

/// Returns true when `now` is at or past `expiry - margin`
pub fn should_renew(credential: &Credential, now: DateTime<Utc>, margin: Duration) -> bool {
    now >= credential.expiry - margin
}

/// Pull the authorization code out of a pasted redirect URL, or accept a bare code
pub fn extract_code(input: &str) -> Result<String, DriveError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DriveError::validation_error_with_field("no authorization code given", "code"));
    }
    if !input.contains("://") {
        return Ok(input.to_string());
    }

    let url = url::Url::parse(input)?;
    if let Some((_, description)) = url.query_pairs().find(|(k, _)| k == "error_description" || k == "error") {
        return Err(DriveError::auth_error_with_source("authorization was denied", description.into_owned()));
    }
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| DriveError::validation_error_with_field("redirect URL carries no code parameter", "code"))
}

/// Keeps one credential valid for the lifetime of a command invocation
pub struct TokenManager {
    app: OAuthApp,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn CredentialStore>,
    credential: Mutex<Credential>,
    margin: Duration,
    renewals: AtomicUsize,
}

impl TokenManager {
    /// Load the persisted credential and build a manager around it
    pub async fn load(
        app: OAuthApp,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
        margin: Duration,
    ) -> Result<Self, DriveError> {
        let credential = store.load().await?;
        Ok(Self::new(app, transport, store, credential, margin))
    }

    pub fn new(
        app: OAuthApp,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
        credential: Credential,
        margin: Duration,
    ) -> Self {
        Self {
            app,
            transport,
            store,
            credential: Mutex::new(credential),
            margin,
            renewals: AtomicUsize::new(0),
        }
    }

    pub fn app(&self) -> &OAuthApp {
        &self.app
    }

    /// Number of successful renewals performed by this manager
    pub fn renewal_count(&self) -> usize {
        self.renewals.load(Ordering::SeqCst)
    }

    /// Snapshot of the current credential
    pub async fn credential(&self) -> Credential {
        self.credential.lock().await.clone()
    }

    /// Whether the held credential is due for renewal right now
    pub async fn needs_renewal(&self) -> bool {
        should_renew(&*self.credential.lock().await, Utc::now(), self.margin)
    }

    /// Exchange the refresh token for a new credential.
    ///
    /// Every failure is an `AuthError`; a revoked grant does not succeed on
    /// retry, so none is attempted. The caller persists the result.
    pub async fn renew(&self, credential: &Credential) -> Result<Credential, DriveError> {
        if !credential.can_renew() {
            return Err(DriveError::auth_error(
                "no refresh token available; run `login` first",
            ));
        }

        info!("Renewing access token");
        let scope = self.app.scope();
        let request = HttpRequest::post(&self.app.token_url).form(&[
            ("client_id", self.app.client_id.as_str()),
            ("client_secret", self.app.client_secret.as_str()),
            ("redirect_uri", self.app.redirect_url.as_str()),
            ("scope", scope.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", credential.refresh_token.as_str()),
        ]);

        let mut renewed = self.credential_from(self.request_token(request).await?)?;
        // the provider may or may not rotate the refresh token
        if renewed.refresh_token.is_empty() {
            renewed.refresh_token = credential.refresh_token.clone();
        }
        Ok(renewed)
    }

    /// Return a usable access token, renewing and persisting first if due.
    pub async fn ensure_valid(&self) -> Result<String, DriveError> {
        let mut credential = self.credential.lock().await;
        if should_renew(&credential, Utc::now(), self.margin) {
            debug!("Access token expires at {}, renewing", credential.expiry);
            let renewed = self.renew(&credential).await?;
            self.store.save(&renewed).await.map_err(|e| {
                warn!("Renewed token could not be persisted: {}", e);
                e
            })?;
            *credential = renewed;
            self.renewals.fetch_add(1, Ordering::SeqCst);
            info!("Access token renewed, valid until {}", credential.expiry);
        }
        Ok(credential.access_token.clone())
    }

    /// Complete the authorization-code flow and persist the resulting credential
    pub async fn exchange_code(&self, code: &str) -> Result<Credential, DriveError> {
        let scope = self.app.scope();
        let request = HttpRequest::post(&self.app.token_url).form(&[
            ("client_id", self.app.client_id.as_str()),
            ("client_secret", self.app.client_secret.as_str()),
            ("redirect_uri", self.app.redirect_url.as_str()),
            ("scope", scope.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
        ]);

        let fresh = self.request_token(request).await?;
        let credential = self.credential_from(fresh)?;
        self.store.save(&credential).await?;
        *self.credential.lock().await = credential.clone();
        info!("Login complete, token valid until {}", credential.expiry);
        Ok(credential)
    }

    async fn request_token(&self, request: HttpRequest) -> Result<TokenResponse, DriveError> {
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| DriveError::auth_error_with_source("token endpoint unreachable", e.to_string()))?;

        if !response.is_success() {
            return Err(DriveError::auth_error_with_source(
                format!("token endpoint returned HTTP {}", response.status),
                response.text(),
            ));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| DriveError::auth_error_with_source("malformed token response", e.to_string()))?;
        if token.access_token.is_empty() {
            return Err(DriveError::auth_error("token response carries an empty access_token"));
        }
        Ok(token)
    }

    /// `expires_in` must be positive and land on a representable instant
    fn credential_from(&self, token: TokenResponse) -> Result<Credential, DriveError> {
        let expiry = Duration::try_seconds(token.expires_in)
            .filter(|lifetime| *lifetime > Duration::zero())
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                DriveError::auth_error(format!(
                    "malformed token response: expires_in {} out of range",
                    token.expires_in
                ))
            })?;
        Ok(Credential {
            access_token: token.access_token,
            refresh_token: token.refresh_token.unwrap_or_default(),
            expiry,
        })
    }
}
