//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is loaded from the SPOTIFY_CLIENT_SECRET env var or
//! from client_secret_file, never stored in the TOML directly to avoid
//! leaking secrets.

use common::SecretString;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub spotify: SpotifyConfig,
    pub server: ServerConfig,
}

/// Spotify application settings
#[derive(Debug, Deserialize)]
pub struct SpotifyConfig {
    /// OAuth client id of the registered application
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<SecretString>,
    /// Path to a file containing the client secret (alternative to the
    /// SPOTIFY_CLIENT_SECRET env var)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    /// Redirect URI registered with the application; the accounts service
    /// sends the authorization code here
    pub redirect_uri: String,
    /// Accounts service base (overridable for tests)
    #[serde(default = "default_accounts_url")]
    pub accounts_url: String,
    /// Web API base (overridable for tests)
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

/// HTTP server settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_accounts_url() -> String {
    spotify_auth::ACCOUNTS_URL.to_owned()
}

fn default_api_url() -> String {
    spotify_auth::API_URL.to_owned()
}

fn default_timeout() -> u64 {
    10
}

fn default_max_connections() -> usize {
    1000
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment
    /// variables.
    ///
    /// Client secret resolution order:
    /// 1. SPOTIFY_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.spotify.client_id.trim().is_empty() {
            return Err(common::Error::Config("client_id must not be empty".into()));
        }

        if !config.spotify.redirect_uri.starts_with("http://")
            && !config.spotify.redirect_uri.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "redirect_uri must start with http:// or https://, got: {}",
                config.spotify.redirect_uri
            )));
        }

        if config.server.request_timeout_secs == 0 {
            return Err(common::Error::Config(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        // Resolve client secret: env var takes precedence over file
        if let Ok(secret) = std::env::var("SPOTIFY_CLIENT_SECRET") {
            config.spotify.client_secret = Some(SecretString::new(secret));
        } else if let Some(ref secret_file) = config.spotify.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.spotify.client_secret = Some(SecretString::new(secret));
            }
        }

        if config.spotify.client_secret.is_none() {
            return Err(common::Error::Config(
                "client secret not provided — set SPOTIFY_CLIENT_SECRET or client_secret_file"
                    .into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("spotify-bridge.toml")
    }
}
