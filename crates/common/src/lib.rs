//! Common types for the Spotify bridge workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::SecretString;
