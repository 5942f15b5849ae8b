//! Session client configuration.
//!
//! These types are embedded in the server's environment-driven configuration.
//! The browser has no environment; the server serialises its `ClientConfig`
//! into the page and the browser reads it back.

use serde::{Deserialize, Serialize};

/// Configuration for the browser-side HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the backend API, without a trailing slash.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Authentication endpoint paths.
    #[serde(default)]
    pub endpoints: AuthEndpoints,
    /// Redirect targets for the route guards.
    #[serde(default)]
    pub routes: GuardPaths,
}

impl ClientConfig {
    /// Creates a configuration for the given API base URL with default paths.
    #[must_use]
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            endpoints: AuthEndpoints::default(),
            routes: GuardPaths::default(),
        }
    }

    /// Joins an API path onto the base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.api_base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(default_api_base_url())
    }
}

fn default_api_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

/// Backend authentication endpoints, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEndpoints {
    #[serde(default = "default_login")]
    pub login: String,
    #[serde(default = "default_register")]
    pub register: String,
    #[serde(default = "default_refresh")]
    pub refresh: String,
    #[serde(default = "default_logout")]
    pub logout: String,
}

impl AuthEndpoints {
    /// Returns true if a 401 from this path must not trigger a refresh.
    ///
    /// Credentials being wrong on login or register is not an expired
    /// session, and a 401 from the refresh call itself is terminal.
    #[must_use]
    pub fn is_exempt(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or(path);
        [&self.login, &self.register, &self.refresh, &self.logout]
            .iter()
            .any(|endpoint| path == endpoint.as_str() || path.ends_with(endpoint.as_str()))
    }
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            login: default_login(),
            register: default_register(),
            refresh: default_refresh(),
            logout: default_logout(),
        }
    }
}

fn default_login() -> String {
    "/auth/login".to_string()
}

fn default_register() -> String {
    "/auth/register".to_string()
}

fn default_refresh() -> String {
    "/auth/refresh".to_string()
}

fn default_logout() -> String {
    "/auth/logout".to_string()
}

/// Page paths the guards redirect to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardPaths {
    /// Sign-in page.
    #[serde(default = "default_login_page")]
    pub login: String,
    /// Page shown when the role does not match.
    #[serde(default = "default_unauthorized_page")]
    pub unauthorized: String,
    /// Pages a signed-in account is bounced away from.
    #[serde(default = "default_auth_pages")]
    pub auth_pages: Vec<String>,
}

impl Default for GuardPaths {
    fn default() -> Self {
        Self {
            login: default_login_page(),
            unauthorized: default_unauthorized_page(),
            auth_pages: default_auth_pages(),
        }
    }
}

fn default_login_page() -> String {
    "/login".to_string()
}

fn default_unauthorized_page() -> String {
    "/unauthorized".to_string()
}

fn default_auth_pages() -> Vec<String> {
    vec!["/login".to_string(), "/signup".to_string()]
}

/// Cookie settings for the server-rendered path.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Name of the access-token cookie.
    #[serde(default = "default_access_cookie")]
    pub access_cookie: String,
    /// Name of the refresh-token cookie.
    #[serde(default = "default_refresh_cookie")]
    pub refresh_cookie: String,
    /// Whether re-issued cookies carry the `Secure` attribute.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
    /// Max age of a re-issued access-token cookie, in seconds.
    #[serde(default = "default_access_max_age")]
    pub access_max_age_secs: i64,
    /// Max age of a re-issued refresh-token cookie, in seconds.
    #[serde(default = "default_refresh_max_age")]
    pub refresh_max_age_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            access_cookie: default_access_cookie(),
            refresh_cookie: default_refresh_cookie(),
            secure_cookies: default_secure_cookies(),
            access_max_age_secs: default_access_max_age(),
            refresh_max_age_secs: default_refresh_max_age(),
        }
    }
}

fn default_access_cookie() -> String {
    "access_token".to_string()
}

fn default_refresh_cookie() -> String {
    "refresh_token".to_string()
}

fn default_secure_cookies() -> bool {
    true
}

fn default_access_max_age() -> i64 {
    15 * 60
}

fn default_refresh_max_age() -> i64 {
    7 * 24 * 60 * 60
}
