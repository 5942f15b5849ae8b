//! Backend request/response types and the network transport.
//!
//! `ApiTransport` is the seam between the session logic and the network.
//! The client and the server-side fetcher decide what a status code means;
//! the transport only moves bytes and reports network failures.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fmt;
use tracing::{debug, instrument};

use scholar_index_core::ConditionalSync;

use crate::config::ClientConfig;
use crate::error::{RequestError, extract_error_message};
use crate::identity::TokenGrant;

/// HTTP method of an API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Returns the method name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Patch => Self::PATCH,
            Method::Delete => Self::DELETE,
        }
    }
}

/// One backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the API base URL.
    pub path: String,
    /// JSON body.
    pub body: Option<Value>,
    /// Set once the request has been replayed after a refresh.
    pub retried: bool,
}

impl ApiRequest {
    /// Creates a request without a body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            retried: false,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    #[must_use]
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns the request marked as a post-refresh replay.
    #[must_use]
    pub fn into_retry(mut self) -> Self {
        self.retried = true;
        self
    }
}

/// A backend response of any status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: String,
}

impl ApiResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true for 401.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Returns the error message carried by the body.
    #[must_use]
    pub fn error_message(&self) -> String {
        extract_error_message(self.status, &self.body)
    }

    /// Converts a non-success response into a `RequestError::Status`.
    pub fn into_result(self) -> Result<Self, RequestError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(RequestError::Status {
                status: self.status,
                message: self.error_message(),
            })
        }
    }

    /// Decodes the body as JSON.
    ///
    /// An empty body decodes as JSON `null`, so `()` and `Option<T>` work for
    /// `204 No Content`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RequestError> {
        let body = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(body).map_err(|e| RequestError::Decode {
            message: e.to_string(),
        })
    }
}

/// Moves API requests over the network.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ApiTransport: ConditionalSync {
    /// Sends a request, attaching the bearer token if given.
    ///
    /// Returns responses of every status; only network failures are errors.
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, RequestError>;

    /// Exchanges a refresh token for a new grant.
    ///
    /// With `None` the refresh token is expected to travel in a cookie.
    async fn refresh(&self, refresh_token: Option<&str>) -> Result<TokenGrant, RequestError>;
}

/// `ApiTransport` over `reqwest`.
///
/// In the browser `reqwest` uses `fetch`, and requests include credentials
/// so the httpOnly refresh cookie is sent.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    config: ClientConfig,
}

impl ReqwestTransport {
    /// Creates a transport for the configured backend.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Creates a transport around an existing `reqwest` client.
    #[must_use]
    pub fn with_client(http: reqwest::Client, config: ClientConfig) -> Self {
        Self { http, config }
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn builder(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method.into(), self.config.url(path));
        #[cfg(target_arch = "wasm32")]
        let builder = builder.fetch_credentials_include();
        builder
    }
}

fn network_error(e: &reqwest::Error) -> RequestError {
    RequestError::Network {
        message: e.to_string(),
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ApiTransport for ReqwestTransport {
    #[instrument(skip(self, request, bearer), fields(method = %request.method, path = %request.path, retried = request.retried))]
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, RequestError> {
        let mut builder = self.builder(request.method, &request.path);
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| network_error(&e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| network_error(&e))?;
        debug!(status, "backend responded");
        Ok(ApiResponse { status, body })
    }

    #[instrument(skip_all, fields(cookie_held = refresh_token.is_none()))]
    async fn refresh(&self, refresh_token: Option<&str>) -> Result<TokenGrant, RequestError> {
        let mut builder = self.builder(Method::Post, &self.config.endpoints.refresh);
        if let Some(token) = refresh_token {
            builder = builder.json(&json!({ "refresh_token": token }));
        }

        let response = builder.send().await.map_err(|e| network_error(&e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| network_error(&e))?;
        let response = ApiResponse { status, body }.into_result()?;
        debug!(status, "token refreshed");
        response.json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn transport(server: &MockServer) -> ReqwestTransport {
        ReqwestTransport::new(ClientConfig::new(server.base_url()))
    }

    #[tokio::test]
    async fn send_attaches_bearer_and_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/author/papers")
                .header("authorization", "Bearer access-1")
                .json_body(json!({ "title": "On Indexing" }));
            then.status(201).json_body(json!({ "id": 9 }));
        });

        let request = ApiRequest::post("/author/papers", json!({ "title": "On Indexing" }));
        let response = transport(&server)
            .send(&request, Some("access-1"))
            .await
            .expect("send");

        mock.assert();
        assert_eq!(response.status, 201);
        let body: Value = response.json().expect("json");
        assert_eq!(body["id"], 9);
    }

    #[tokio::test]
    async fn send_returns_error_statuses_as_responses() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/admin/users");
            then.status(403).json_body(json!({ "detail": "Not allowed" }));
        });

        let response = transport(&server)
            .send(&ApiRequest::get("/admin/users"), None)
            .await
            .expect("send");
        assert_eq!(response.status, 403);
        assert_eq!(
            response.into_result(),
            Err(RequestError::Status {
                status: 403,
                message: "Not allowed".to_string()
            })
        );
    }

    #[tokio::test]
    async fn refresh_sends_known_token_in_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/auth/refresh")
                .json_body(json!({ "refresh_token": "refresh-1" }));
            then.status(200)
                .json_body(json!({ "access_token": "access-2", "refresh_token": "refresh-2" }));
        });

        let grant = transport(&server)
            .refresh(Some("refresh-1"))
            .await
            .expect("refresh");
        mock.assert();
        assert_eq!(grant.access_token, "access-2");
        assert_eq!(grant.refresh_token.as_deref(), Some("refresh-2"));
    }

    #[tokio::test]
    async fn cookie_held_refresh_sends_no_body_token() {
        let server = MockServer::start();
        let with_body = server.mock(|when, then| {
            when.method(POST).path("/auth/refresh").body_contains("refresh_token");
            then.status(500);
        });
        let without_body = server.mock(|when, then| {
            when.method(POST).path("/auth/refresh");
            then.status(200).json_body(json!({ "access_token": "access-2" }));
        });

        let grant = transport(&server).refresh(None).await.expect("refresh");
        assert_eq!(grant.access_token, "access-2");
        with_body.assert_hits(0);
        without_body.assert_hits(1);
    }

    #[tokio::test]
    async fn rejected_refresh_is_status_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/auth/refresh");
            then.status(401).json_body(json!({ "message": "refresh token revoked" }));
        });

        let err = transport(&server)
            .refresh(Some("refresh-1"))
            .await
            .expect_err("refresh should fail");
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.user_message(), "refresh token revoked");
    }

    #[tokio::test]
    async fn unreachable_backend_is_network_error() {
        let transport = ReqwestTransport::new(ClientConfig::new("http://127.0.0.1:1"));
        let err = transport
            .send(&ApiRequest::get("/papers"), None)
            .await
            .expect_err("connection refused");
        assert!(matches!(err, RequestError::Network { .. }));
    }

    #[test]
    fn empty_body_decodes_as_null() {
        let response = ApiResponse::new(204, "");
        let decoded: Option<Value> = response.json().expect("json");
        assert_eq!(decoded, None);
    }
}
