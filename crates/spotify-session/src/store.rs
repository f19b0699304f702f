//! Process-wide credential holder
//!
//! Holds zero-or-one [`CredentialRecord`] behind a `tokio::sync::RwLock`.
//! Reads return a cloned snapshot so no caller can observe a record with
//! fields from two different exchanges; writes replace the whole record.
//!
//! The store tracks why it is empty: a credential that was revoked by the
//! token endpoint is remembered as `Revoked` (callers must re-authorize),
//! distinct from `Empty` (never authorized, or signed out).

use spotify_auth::CredentialRecord;
use tokio::sync::RwLock;

#[derive(Debug)]
enum StoreState {
    /// No credential has been acquired, or it was cleared on sign-out
    Empty,
    /// A credential is held
    Active(CredentialRecord),
    /// The refresh token was rejected; only a new authorization recovers
    Revoked,
}

/// Concurrency-safe holder of the current credential record.
#[derive(Debug)]
pub struct TokenStore {
    state: RwLock<StoreState>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::Empty),
        }
    }

    /// Snapshot of the current record, if any. Never returns a partially
    /// updated record.
    pub async fn get(&self) -> Option<CredentialRecord> {
        match &*self.state.read().await {
            StoreState::Active(record) => Some(record.clone()),
            _ => None,
        }
    }

    /// Replace the current record atomically. Also leaves any prior
    /// revocation behind: a fresh credential supersedes it.
    pub async fn set(&self, record: CredentialRecord) {
        *self.state.write().await = StoreState::Active(record);
    }

    /// Remove the current record (administrative invalidation). Idempotent:
    /// clearing an empty store is a no-op.
    pub async fn clear(&self) {
        *self.state.write().await = StoreState::Empty;
    }

    /// Discard the record after the token endpoint rejected its refresh
    /// token. Subsequent lookups report the revocation until a new
    /// authorization or an explicit `clear`.
    pub async fn revoke(&self) {
        *self.state.write().await = StoreState::Revoked;
    }

    /// Whether the store is empty because the credential was revoked.
    pub async fn is_revoked(&self) -> bool {
        matches!(&*self.state.read().await, StoreState::Revoked)
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}
