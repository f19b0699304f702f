//! Spotify OAuth credential library
//!
//! Speaks the authorization-code and refresh-token grants against the
//! accounts token endpoint and defines the credential record the rest of
//! the workspace shares. Standalone: no dependency on the session crate or
//! the service binary, so it can be tested against a local mock endpoint.
//!
//! Credential flow:
//! 1. The service redirects the user to the accounts authorize endpoint
//! 2. The callback hands the authorization code to
//!    [`TokenExchanger::exchange_code`]
//! 3. The resulting [`CredentialRecord`] is held by the session crate
//! 4. Near expiry, [`TokenExchanger::exchange_refresh`] mints a replacement

pub mod constants;
pub mod error;
pub mod exchange;
pub mod token;

pub use constants::{ACCOUNTS_URL, API_URL, AUTHORIZE_PATH, SCOPES, TOKEN_PATH};
pub use error::{AuthError, Result};
pub use exchange::TokenExchanger;
pub use token::{CredentialRecord, TokenResponse, now_millis};
