//! Edge route guard middleware.
//!
//! Runs before any page renders. Visitors without a matching role claim are
//! redirected before the panel shell is ever sent.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use scholar_index_session::{EdgeDecision, EdgeGuard};
use std::sync::Arc;

/// State for the edge middleware.
#[derive(Debug, Clone)]
pub struct EdgeState {
    guard: Arc<EdgeGuard>,
    access_cookie: String,
}

impl EdgeState {
    /// Creates the middleware state.
    #[must_use]
    pub fn new(guard: EdgeGuard, access_cookie: impl Into<String>) -> Self {
        Self {
            guard: Arc::new(guard),
            access_cookie: access_cookie.into(),
        }
    }
}

/// Axum middleware applying the edge guard to every request.
///
/// Use with `axum::middleware::from_fn_with_state`.
pub async fn edge_guard(
    State(state): State<EdgeState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    let token = jar.get(&state.access_cookie).map(|c| c.value());

    match state.guard.decide(&path, token) {
        EdgeDecision::Allow => next.run(request).await,
        EdgeDecision::Redirect(target) => {
            tracing::debug!(path = %path, target = %target, "edge guard redirect");
            Redirect::temporary(&target).into_response()
        }
    }
}
