//! Backend fetches made while rendering on the server.
//!
//! There is no session store on the server: credentials come from the
//! incoming request's cookies. Each fetch is isolated. A 401 triggers at
//! most one refresh and one retry; anything further sends the visitor to
//! sign in.

use scholar_index_core::Result;
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::{debug, instrument, warn};

use crate::error::RequestError;
use crate::identity::TokenGrant;
use crate::transport::{ApiRequest, ApiResponse, ApiTransport};

/// Credentials read from the incoming request's cookies.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RequestCookies {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl RequestCookies {
    /// Creates cookies from optional values, ignoring empty ones.
    #[must_use]
    pub fn new(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            access_token: non_empty(access_token),
            refresh_token: non_empty(refresh_token),
        }
    }
}

impl fmt::Debug for RequestCookies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCookies")
            .field("access_token", &self.access_token.is_some())
            .field("refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// Errors from a server-side fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The visitor has no usable session and must sign in.
    RedirectToLogin,
    /// The backend answered with an error status.
    Request { status: u16, message: String },
    /// The backend could not be reached or its response was unreadable.
    Network { message: String },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RedirectToLogin => write!(f, "session is not valid, sign-in required"),
            Self::Request { status, message } => write!(f, "backend returned {status}: {message}"),
            Self::Network { message } => write!(f, "backend unreachable: {message}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<RequestError> for FetchError {
    fn from(e: RequestError) -> Self {
        match e {
            RequestError::Status { status, message } => Self::Request { status, message },
            RequestError::SessionExpired { .. } => Self::RedirectToLogin,
            other => Self::Network {
                message: other.to_string(),
            },
        }
    }
}

/// A successful server-side fetch.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// The backend response.
    pub response: ApiResponse,
    /// Tokens issued by a refresh during this fetch, to be re-set as cookies.
    pub rotated: Option<TokenGrant>,
}

impl Fetched {
    /// Decodes the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        Ok(self.response.json().map_err(FetchError::from)?)
    }
}

/// Stateless fetcher for server rendering.
#[derive(Debug, Clone)]
pub struct ServerFetcher<T> {
    transport: T,
}

impl<T: ApiTransport> ServerFetcher<T> {
    /// Creates a fetcher over the given transport.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Returns the transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetches with the request's cookies, refreshing once on 401.
    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    pub async fn fetch(
        &self,
        cookies: &RequestCookies,
        request: ApiRequest,
    ) -> Result<Fetched, FetchError> {
        let response = self
            .transport
            .send(&request, cookies.access_token.as_deref())
            .await
            .map_err(FetchError::from)?;

        if !response.is_unauthorized() {
            return Ok(Fetched {
                response: response.into_result().map_err(FetchError::from)?,
                rotated: None,
            });
        }

        let Some(refresh_token) = cookies.refresh_token.as_deref() else {
            debug!("unauthorized without refresh cookie");
            return Err(FetchError::RedirectToLogin.into());
        };

        let grant = match self.transport.refresh(Some(refresh_token)).await {
            Ok(grant) => grant,
            Err(e) => {
                warn!(error = %e, "server-side refresh failed");
                return Err(FetchError::RedirectToLogin.into());
            }
        };

        let retry = request.into_retry();
        let response = self
            .transport
            .send(&retry, Some(&grant.access_token))
            .await
            .map_err(FetchError::from)?;

        if response.is_unauthorized() {
            debug!("retry after refresh still unauthorized");
            return Err(FetchError::RedirectToLogin.into());
        }

        Ok(Fetched {
            response: response.into_result().map_err(FetchError::from)?,
            rotated: Some(grant),
        })
    }

    /// Fetches and decodes a JSON response.
    pub async fn fetch_json<R: DeserializeOwned>(
        &self,
        cookies: &RequestCookies,
        request: ApiRequest,
    ) -> Result<(R, Option<TokenGrant>), FetchError> {
        let fetched = self.fetch(cookies, request).await?;
        let value = fetched.json()?;
        Ok((value, fetched.rotated))
    }
}
