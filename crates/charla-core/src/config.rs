//! Client configuration resolved once at process start.

use std::env;

/// Default backend base URL when `CHARLA_API_URL` is not set.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Configuration for the assistant backend connection.
///
/// The endpoint base is resolved once at process start and treated as
/// fixed for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the assistant backend, without a trailing slash.
    pub api_url: String,
}

impl ClientConfig {
    /// Creates a configuration for the given base URL.
    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url = api_url.into();
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Loads configuration from the environment.
    ///
    /// Reads `CHARLA_API_URL` and falls back to `http://localhost:8000`
    /// when the variable is not set.
    pub fn from_env() -> Self {
        let api_url = env::var("CHARLA_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::new(api_url)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}
