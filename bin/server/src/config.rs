//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables. Nested
//! sections use `__` as the separator, e.g. `SESSION__SECURE_COOKIES=false`.

use scholar_index_session::{AuthEndpoints, ClientConfig, GuardPaths, SessionConfig};
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the backend API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Backend authentication endpoints.
    #[serde(default)]
    pub endpoints: AuthEndpoints,

    /// Cookie configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Redirect targets for the route guards.
    #[serde(default)]
    pub routes: GuardPaths,
}

fn default_api_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is present but invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Returns the configuration for the backend client.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new(self.api_base_url.clone());
        client.endpoints = self.endpoints.clone();
        client.routes = self.routes.clone();
        client
    }

    /// Returns the client configuration as JSON for embedding in the page.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails.
    pub fn browser_config_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.client_config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config: ServerConfig = config::Config::builder()
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize");

        assert_eq!(config.api_base_url, "http://localhost:8000/api");
        assert_eq!(config.session.access_cookie, "access_token");
        assert!(config.session.secure_cookies);
        assert_eq!(config.routes.unauthorized, "/unauthorized");
    }

    #[test]
    fn nested_overrides_are_read() {
        let config: ServerConfig = config::Config::builder()
            .set_override("api_base_url", "https://api.scholar-index.org/v1")
            .expect("override")
            .set_override("session.secure_cookies", false)
            .expect("override")
            .set_override("endpoints.refresh", "/auth/token/refresh")
            .expect("override")
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize");

        assert!(!config.session.secure_cookies);
        let client = config.client_config();
        assert_eq!(client.url("/papers"), "https://api.scholar-index.org/v1/papers");
        assert_eq!(client.endpoints.refresh, "/auth/token/refresh");
        assert!(client.endpoints.is_exempt("/auth/token/refresh"));
    }

    #[test]
    fn browser_config_carries_endpoints_and_routes() {
        let config: ServerConfig = config::Config::builder()
            .set_override("api_base_url", "https://api.scholar-index.org/v1")
            .expect("override")
            .set_override("endpoints.login", "/auth/token")
            .expect("override")
            .set_override("routes.login", "/sign-in")
            .expect("override")
            .set_override("routes.unauthorized", "/forbidden")
            .expect("override")
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize");

        let json = config.browser_config_json().expect("serialise");
        let browser: ClientConfig = serde_json::from_str(&json).expect("parse");

        assert_eq!(browser.api_base_url, "https://api.scholar-index.org/v1");
        assert_eq!(browser.endpoints.login, "/auth/token");
        assert!(browser.endpoints.is_exempt("/auth/token"));
        assert_eq!(browser.routes, config.routes);
        assert_eq!(browser.routes.login, "/sign-in");
        assert_eq!(browser.routes.unauthorized, "/forbidden");
    }
}
