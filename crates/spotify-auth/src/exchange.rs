//! Token endpoint exchanges
//!
//! Handles the two grant types the broker speaks:
//! 1. Authorization code exchange (completing the user-approval flow)
//! 2. Refresh token exchange (minting a new access token)
//!
//! Both POST a form-encoded body to the accounts token endpoint,
//! authenticated with HTTP Basic auth built from the client id and secret.
//! The exchanger is pure transport: it never touches the token store.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, warn};

use common::SecretString;

use crate::constants::TOKEN_PATH;
use crate::error::{AuthError, Result};
use crate::token::{CredentialRecord, TokenResponse, now_millis};

/// Client for the accounts token endpoint.
///
/// Holds the long-lived HTTP client (timeouts configured at construction
/// by the caller) and the client credentials. The accounts base URL is a
/// parameter so tests can point at a local server.
pub struct TokenExchanger {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
}

impl TokenExchanger {
    pub fn new(
        client: reqwest::Client,
        accounts_url: &str,
        client_id: String,
        client_secret: SecretString,
        redirect_uri: String,
    ) -> Self {
        Self {
            client,
            token_url: format!("{}{TOKEN_PATH}", accounts_url.trim_end_matches('/')),
            client_id,
            client_secret,
            redirect_uri,
        }
    }

    /// Exchange an authorization code for the initial credential.
    ///
    /// The code arrives on the redirect callback after the user approves
    /// access. A response without a refresh token is rejected; this grant
    /// must produce both tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<CredentialRecord> {
        let response = self
            .post_grant(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.redirect_uri),
            ])
            .await?;

        debug!(grant = "authorization_code", "token exchange succeeded");
        CredentialRecord::from_response(response, None, now_millis())
    }

    /// Mint a new access token from a refresh token.
    ///
    /// The endpoint may omit `refresh_token` in the response, in which case
    /// the input token stays valid and is carried into the new record. An
    /// `invalid_grant` rejection means the refresh token is revoked: the
    /// credential is dead and the user must authorize again.
    pub async fn exchange_refresh(&self, refresh_token: &str) -> Result<CredentialRecord> {
        let response = self
            .post_grant(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await
            .map_err(|err| match err {
                AuthError::RemoteRejected { status, body }
                    if status == 401 || status == 403 || body.contains("invalid_grant") =>
                {
                    warn!(status, "refresh token rejected by token endpoint");
                    AuthError::RefreshRevoked(body)
                }
                other => other,
            })?;

        debug!(grant = "refresh_token", "token refresh succeeded");
        CredentialRecord::from_response(response, Some(refresh_token), now_millis())
    }

    /// POST a grant body and parse the token response.
    async fn post_grant(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let credentials = format!("{}:{}", self.client_id, self.client_secret.expose());
        let basic = format!("Basic {}", STANDARD.encode(credentials));

        let response = self
            .client
            .post(&self.token_url)
            .header(reqwest::header::AUTHORIZATION, basic)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::NetworkTimeout(format!("token endpoint: {e}"))
                } else {
                    AuthError::Transport(format!("token endpoint: {e}"))
                }
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AuthError::NetworkTimeout(format!("token endpoint body: {e}"))
            } else {
                AuthError::Transport(format!("token endpoint body: {e}"))
            }
        })?;

        if !(200..300).contains(&status) {
            return Err(AuthError::RemoteRejected { status, body });
        }

        // A 2xx body without access_token is as unusable as a rejection
        serde_json::from_str(&body).map_err(|_| AuthError::RemoteRejected { status, body })
    }
}
