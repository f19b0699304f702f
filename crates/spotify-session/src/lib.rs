//! Token lifecycle and authenticated resource access
//!
//! The stateful heart of the bridge: holds the single OAuth credential,
//! refreshes it under a process-wide single-flight gate, and issues
//! bearer-authenticated Web API calls through it.
//!
//! Credential lifecycle:
//! 1. [`SessionManager::complete_authorization`] installs the record from
//!    the callback code exchange
//! 2. Every resource call asks [`SessionManager::access_token`] for a valid
//!    token; a stale one triggers exactly one coordinated refresh
//! 3. [`ResourceGateway::call`] attaches the token and classifies the
//!    response, retrying once after a forced refresh on a 401
//! 4. A revoked refresh token empties the store until the user authorizes
//!    again; [`SessionManager::invalidate`] clears it on sign-out

pub mod gateway;
pub mod session;
pub mod store;

pub use gateway::{RemoteResult, ResourceGateway};
pub use session::{DEFAULT_REFRESH_SKEW, SessionManager};
pub use store::TokenStore;
