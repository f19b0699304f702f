//! Token lifecycle orchestration
//!
//! [`SessionManager`] is the only component that decides whether the stored
//! token is usable and the only one allowed to trigger a refresh. Refresh
//! execution is serialized process-wide through a single gate: concurrent
//! callers that find the token stale queue on the gate and re-check the
//! store once they hold it, so one exchange serves them all. Duplicate
//! refresh calls would spend the same refresh token twice and risk
//! rejection by the accounts service.

use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use spotify_auth::{AuthError, CredentialRecord, Result, TokenExchanger, now_millis};

use crate::store::TokenStore;

/// Safety margin subtracted from the token expiry; a token inside this
/// window is treated as stale and refreshed before use.
pub const DEFAULT_REFRESH_SKEW: Duration = Duration::from_secs(30);

/// Owns the token store and drives the credential through its lifecycle:
/// acquired on callback, read by every resource call, refreshed near
/// expiry, discarded on revocation or sign-out.
pub struct SessionManager {
    store: TokenStore,
    exchanger: TokenExchanger,
    refresh_gate: Mutex<()>,
    skew: Duration,
}

impl SessionManager {
    pub fn new(exchanger: TokenExchanger) -> Self {
        Self::with_skew(exchanger, DEFAULT_REFRESH_SKEW)
    }

    pub fn with_skew(exchanger: TokenExchanger, skew: Duration) -> Self {
        Self {
            store: TokenStore::new(),
            exchanger,
            refresh_gate: Mutex::new(()),
            skew,
        }
    }

    /// The underlying store (read-only uses: health reporting, tests).
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Complete the authorization flow: exchange the callback code and
    /// install the resulting credential. Exchange errors propagate
    /// unchanged.
    pub async fn complete_authorization(&self, code: &str) -> Result<()> {
        let record = self.exchanger.exchange_code(code).await?;
        info!(scopes = ?record.scope, "authorization complete, credential installed");
        self.store.set(record).await;
        Ok(())
    }

    /// A currently valid access token, refreshing first if the stored one
    /// is inside the skew window.
    ///
    /// Callers racing on a stale token wait for the single in-flight
    /// refresh instead of issuing their own; each re-checks the store after
    /// acquiring the gate and skips the exchange when another caller
    /// already replaced the record.
    pub async fn access_token(&self) -> Result<String> {
        let record = match self.store.get().await {
            Some(record) => record,
            None => return Err(self.missing_credential().await),
        };
        if record.is_fresh(now_millis(), self.skew) {
            return Ok(record.access_token);
        }

        let _gate = self.refresh_gate.lock().await;
        // Re-check under the gate: the record may have been refreshed,
        // revoked, or cleared while this caller waited.
        let current = match self.store.get().await {
            Some(record) => record,
            None => return Err(self.missing_credential().await),
        };
        if current.is_fresh(now_millis(), self.skew) {
            return Ok(current.access_token);
        }

        self.run_refresh(&current).await
    }

    /// Forced refresh after a resource endpoint rejected `rejected_token`
    /// with an auth error; a 401 can mean an expiry the skew margin
    /// missed. Single-flight like `access_token`; if another caller already
    /// replaced the rejected token, its result is returned without a new
    /// exchange.
    pub async fn refresh_after_rejection(&self, rejected_token: &str) -> Result<String> {
        let _gate = self.refresh_gate.lock().await;
        let current = match self.store.get().await {
            Some(record) => record,
            None => return Err(self.missing_credential().await),
        };
        if current.access_token != rejected_token {
            return Ok(current.access_token);
        }

        self.run_refresh(&current).await
    }

    /// Administrative clear (sign-out). Idempotent, never errors.
    pub async fn invalidate(&self) {
        self.store.clear().await;
        info!("credential invalidated");
    }

    /// Whether a credential is currently held.
    pub async fn is_authorized(&self) -> bool {
        self.store.get().await.is_some()
    }

    /// Perform the refresh exchange for `stale`. Caller holds the gate.
    async fn run_refresh(&self, stale: &CredentialRecord) -> Result<String> {
        match self.exchanger.exchange_refresh(&stale.refresh_token).await {
            Ok(record) => {
                let token = record.access_token.clone();
                self.store.set(record).await;
                metrics::counter!("token_refreshes_total", "outcome" => "success").increment(1);
                info!("access token refreshed");
                Ok(token)
            }
            Err(AuthError::RefreshRevoked(reason)) => {
                warn!(reason = %reason, "refresh token revoked, credential discarded");
                self.store.revoke().await;
                metrics::counter!("token_refreshes_total", "outcome" => "revoked").increment(1);
                Err(AuthError::ReauthorizationRequired)
            }
            Err(err) => {
                // Store untouched: the stale record stays for the next try
                warn!(error = %err, "token refresh failed");
                metrics::counter!("token_refreshes_total", "outcome" => "failed").increment(1);
                Err(err)
            }
        }
    }

    /// Error for an empty store: revocation demands re-authorization,
    /// anything else is simply not-yet-authenticated.
    async fn missing_credential(&self) -> AuthError {
        if self.store.is_revoked().await {
            AuthError::ReauthorizationRequired
        } else {
            AuthError::Unauthenticated
        }
    }
}
