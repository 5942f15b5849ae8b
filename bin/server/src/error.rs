//! Domain error types for server operations.
//!
//! Server functions log the detailed error and hand the browser a
//! user-safe `ServerFnError`.

use leptos::server_fn::error::ServerFnError;
use std::fmt;

/// Errors from server functions that talk to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The visitor must sign in again.
    SessionExpired,
    /// The backend rejected the request.
    Rejected { status: u16, message: String },
    /// The backend could not be reached or answered with garbage.
    Unavailable { details: String },
    /// Request context (cookies, state) was missing.
    Context { details: String },
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionExpired => write!(f, "session expired"),
            Self::Rejected { status, message } => {
                write!(f, "backend rejected request with {status}: {message}")
            }
            Self::Unavailable { details } => write!(f, "backend unavailable: {details}"),
            Self::Context { details } => write!(f, "request context missing: {details}"),
        }
    }
}

impl std::error::Error for BackendError {}

#[cfg(feature = "ssr")]
impl From<scholar_index_session::FetchError> for BackendError {
    fn from(e: scholar_index_session::FetchError) -> Self {
        use scholar_index_session::FetchError;
        match e {
            FetchError::RedirectToLogin => Self::SessionExpired,
            FetchError::Request { status, message } => Self::Rejected { status, message },
            FetchError::Network { message } => Self::Unavailable { details: message },
        }
    }
}

impl BackendError {
    /// Convert to a user-safe ServerFnError.
    ///
    /// Backend rejections keep their message, which the backend already
    /// words for end users.
    pub fn into_server_error(self) -> ServerFnError {
        match self {
            Self::SessionExpired => ServerFnError::new("Session expired"),
            Self::Rejected { status: 403, .. } => ServerFnError::new("Access denied"),
            Self::Rejected { message, .. } => ServerFnError::new(message),
            Self::Unavailable { .. } => ServerFnError::new("Service temporarily unavailable"),
            Self::Context { .. } => ServerFnError::new("Internal server error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_details_are_not_exposed() {
        let err = BackendError::Unavailable {
            details: "connect error: 10.0.0.4:8000".to_string(),
        };
        assert!(!err.into_server_error().to_string().contains("10.0.0.4"));

        let err = BackendError::Context {
            details: "missing cookie jar".to_string(),
        };
        assert!(!err.into_server_error().to_string().contains("cookie"));
    }

    #[test]
    fn backend_messages_pass_through() {
        let err = BackendError::Rejected {
            status: 422,
            message: "Title is required".to_string(),
        };
        assert!(err.into_server_error().to_string().contains("Title is required"));

        let forbidden = BackendError::Rejected {
            status: 403,
            message: "role mismatch for institution 12".to_string(),
        };
        assert!(forbidden.into_server_error().to_string().contains("Access denied"));
    }
}
