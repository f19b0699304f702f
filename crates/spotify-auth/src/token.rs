//! Credential record and token endpoint response types
//!
//! `TokenResponse` is the wire view of the token endpoint JSON, shared by
//! both grant exchanges. `CredentialRecord` is the immutable in-process
//! credential built from it: once constructed it is never mutated; a
//! refresh produces a whole new record that replaces the old one atomically
//! in the token store.

use serde::Deserialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{AuthError, Result};

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from the response time; it is
/// converted to an absolute unix-millisecond expiry when the record is
/// built. `refresh_token` is absent when the endpoint chooses not to
/// rotate it on refresh.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
    /// Space-separated granted scopes
    #[serde(default)]
    pub scope: Option<String>,
}

/// The current OAuth credential: access token, refresh token, absolute
/// expiry, and granted scopes.
///
/// `expires_at` is a unix timestamp in milliseconds, computed at
/// construction from `TokenResponse::expires_in` plus the issuance time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    /// Bearer token for resource calls
    pub access_token: String,
    /// Used to mint the next access token
    pub refresh_token: String,
    /// Expiry as unix timestamp in milliseconds
    pub expires_at: u64,
    /// Granted permission strings (informational)
    pub scope: Vec<String>,
}

impl CredentialRecord {
    /// Build a record from a token endpoint response issued at `now_millis`.
    ///
    /// On refresh the endpoint may omit `refresh_token`; a rotated value is
    /// authoritative when present, otherwise `prior_refresh` (the token that
    /// was just spent) is retained. A response carrying neither is rejected
    /// as malformed.
    pub fn from_response(
        response: TokenResponse,
        prior_refresh: Option<&str>,
        now_millis: u64,
    ) -> Result<Self> {
        let refresh_token = match response.refresh_token {
            Some(rotated) => rotated,
            None => prior_refresh
                .map(str::to_owned)
                .ok_or(AuthError::RemoteRejected {
                    status: 200,
                    body: "token response missing refresh_token".into(),
                })?,
        };

        Ok(Self {
            access_token: response.access_token,
            refresh_token,
            expires_at: now_millis + response.expires_in * 1000,
            scope: response
                .scope
                .as_deref()
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_owned)
                .collect(),
        })
    }

    /// Whether the access token is still usable at `now_millis`, with
    /// `skew` subtracted from the hard expiry so a refresh happens before
    /// the token actually dies mid-request.
    pub fn is_fresh(&self, now_millis: u64, skew: Duration) -> bool {
        now_millis + (skew.as_millis() as u64) < self.expires_at
    }
}

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
