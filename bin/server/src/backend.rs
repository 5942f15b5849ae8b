//! Backend access for server functions.
//!
//! Server functions fetch on behalf of the visitor with the credentials in
//! the request cookies. When the fetcher had to refresh, the new tokens are
//! sent back to the browser as cookies on the same response; when the
//! session cannot be recovered the response redirects to sign-in.

use axum::Extension;
use axum::http::{HeaderValue, header::SET_COOKIE};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use leptos::prelude::*;
use leptos_axum::ResponseOptions;
use scholar_index_session::{
    ApiRequest, FetchError, GuardPaths, ReqwestTransport, RequestCookies, ServerFetcher,
    SessionConfig, TokenGrant,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use time::Duration as TimeDuration;

use crate::config::ServerConfig;
use crate::error::BackendError;

/// Shared state for server-side backend calls.
#[derive(Debug)]
pub struct BackendState {
    fetcher: ServerFetcher<ReqwestTransport>,
    session: SessionConfig,
    routes: GuardPaths,
}

impl BackendState {
    /// Creates the state from server configuration.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            fetcher: ServerFetcher::new(ReqwestTransport::new(config.client_config())),
            session: config.session.clone(),
            routes: config.routes.clone(),
        }
    }

    /// Reads the session cookies from the jar.
    #[must_use]
    pub fn request_cookies(&self, jar: &CookieJar) -> RequestCookies {
        let value = |name: &str| jar.get(name).map(|c| c.value().to_string());
        RequestCookies::new(
            value(&self.session.access_cookie),
            value(&self.session.refresh_cookie),
        )
    }

    /// Builds the cookies that carry refreshed tokens back to the browser.
    #[must_use]
    pub fn rotated_cookies(&self, grant: &TokenGrant) -> Vec<Cookie<'static>> {
        let build = |name: &str, value: &str, max_age: i64| {
            Cookie::build((name.to_string(), value.to_string()))
                .path("/")
                .http_only(true)
                .secure(self.session.secure_cookies)
                .same_site(SameSite::Lax)
                .max_age(TimeDuration::seconds(max_age))
                .build()
        };

        let mut cookies = vec![build(
            &self.session.access_cookie,
            &grant.access_token,
            self.session.access_max_age_secs,
        )];
        if let Some(refresh) = &grant.refresh_token {
            cookies.push(build(
                &self.session.refresh_cookie,
                refresh,
                self.session.refresh_max_age_secs,
            ));
        }
        cookies
    }
}

/// Fetches JSON from the backend for the current visitor.
///
/// On an unrecoverable session the response is turned into a redirect to
/// the login page and `Session expired` is returned.
pub async fn fetch_json<T: DeserializeOwned>(request: ApiRequest) -> Result<T, ServerFnError> {
    let Extension(state): Extension<Arc<BackendState>> = leptos_axum::extract()
        .await
        .map_err(|e| context_error(format!("backend state: {e}")))?;
    let jar: CookieJar = leptos_axum::extract()
        .await
        .map_err(|e| context_error(format!("cookie jar: {e}")))?;

    let cookies = state.request_cookies(&jar);
    let path = request.path.clone();

    match state.fetcher.fetch_json(&cookies, request).await {
        Ok((value, rotated)) => {
            if let Some(grant) = rotated {
                forward_cookies(&state.rotated_cookies(&grant));
            }
            Ok(value)
        }
        Err(report) => {
            let error = report.current_context().clone();
            if error == FetchError::RedirectToLogin {
                tracing::debug!(path = %path, "session unrecoverable, redirecting");
                leptos_axum::redirect(&state.routes.login);
            } else {
                tracing::warn!(path = %path, error = %report, "backend fetch failed");
            }
            Err(BackendError::from(error).into_server_error())
        }
    }
}

fn context_error(details: String) -> ServerFnError {
    tracing::error!(details = %details, "server function context missing");
    BackendError::Context { details }.into_server_error()
}

fn forward_cookies(cookies: &[Cookie<'static>]) {
    let Some(response) = use_context::<ResponseOptions>() else {
        tracing::warn!("no response options, rotated tokens not forwarded");
        return;
    };
    for cookie in cookies {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => response.append_header(SET_COOKIE, value),
            Err(e) => tracing::warn!(error = %e, "rotated cookie is not a valid header"),
        }
    }
}
