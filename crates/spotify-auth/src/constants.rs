//! Spotify OAuth endpoint constants
//!
//! Public endpoint locations for the accounts service and the Web API.
//! These identify where the service talks, not secrets; the client id and
//! secret come from configuration. The bases are overridable in config so
//! tests can point them at local mock servers.

/// Accounts service base (authorization and token endpoints live here)
pub const ACCOUNTS_URL: &str = "https://accounts.spotify.com";

/// Web API base (all resource endpoints live here)
pub const API_URL: &str = "https://api.spotify.com";

/// Token endpoint path under the accounts base, for both the
/// authorization-code and refresh-token grants
pub const TOKEN_PATH: &str = "/api/token";

/// Authorization endpoint path under the accounts base (redirect target
/// for the user-approval step)
pub const AUTHORIZE_PATH: &str = "/authorize";

/// Scopes requested at authorization time: reading top tracks and the
/// current player state, and controlling playback.
pub const SCOPES: &str = "user-top-read user-read-currently-playing user-modify-playback-state";
