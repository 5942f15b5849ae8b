//! Error types for the session crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `RequestError`: outcome of a browser-side API call, cloneable so one
//!   refresh failure can be handed to every request parked behind it
//! - `PersistenceError`: durable storage of the session identity
//! - `BroadcastError`: the cross-tab channel

use serde_json::Value;
use std::fmt;

/// Errors returned by the shared HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The request never produced a response.
    Network { message: String },
    /// The backend answered with a non-success status.
    Status { status: u16, message: String },
    /// The refresh token was rejected; the session has been terminated.
    SessionExpired { message: String },
    /// The refresh this request was waiting on was abandoned.
    RefreshAborted,
    /// A success response body could not be decoded.
    Decode { message: String },
}

impl RequestError {
    /// Returns the HTTP status code, if the backend produced one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the error ended the session.
    #[must_use]
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired { .. })
    }

    /// Returns the message suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> &str {
        match self {
            Self::Network { message }
            | Self::Status { message, .. }
            | Self::SessionExpired { message }
            | Self::Decode { message } => message,
            Self::RefreshAborted => "request was interrupted, please try again",
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network { message } => write!(f, "network error: {message}"),
            Self::Status { status, message } => write!(f, "HTTP {status}: {message}"),
            Self::SessionExpired { message } => write!(f, "session expired: {message}"),
            Self::RefreshAborted => write!(f, "token refresh was aborted"),
            Self::Decode { message } => write!(f, "failed to decode response: {message}"),
        }
    }
}

impl std::error::Error for RequestError {}

/// Errors from the durable session storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// Storage is not available in this environment.
    Unavailable { reason: String },
    /// Reading or writing storage failed.
    Storage { reason: String },
    /// The stored record is not valid JSON for the expected shape.
    Corrupt { reason: String },
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "session storage unavailable: {reason}"),
            Self::Storage { reason } => write!(f, "session storage failed: {reason}"),
            Self::Corrupt { reason } => write!(f, "stored session is corrupt: {reason}"),
        }
    }
}

impl std::error::Error for PersistenceError {}

/// Errors from the cross-tab broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    /// The channel could not be opened.
    Unavailable { reason: String },
    /// Posting a message failed.
    PostFailed { reason: String },
}

impl fmt::Display for BroadcastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "broadcast channel unavailable: {reason}"),
            Self::PostFailed { reason } => write!(f, "broadcast post failed: {reason}"),
        }
    }
}

impl std::error::Error for BroadcastError {}

/// Extracts a human-readable message from an error response body.
///
/// Checks the shapes backends commonly use, in order: `message`, `error`
/// (string or object with `message`), `detail`, `msg`, and
/// `errors[0].message` or `errors[0]`. Falls back to a generic message that
/// names the status code.
#[must_use]
pub fn extract_error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| message_from_value(&value))
        .unwrap_or_else(|| format!("request failed with status {status}"))
}

fn message_from_value(value: &Value) -> Option<String> {
    let non_empty = |v: &Value| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(message) = value.get("message").and_then(non_empty) {
        return Some(message);
    }
    if let Some(error) = value.get("error") {
        if let Some(message) = non_empty(error) {
            return Some(message);
        }
        if let Some(message) = error.get("message").and_then(non_empty) {
            return Some(message);
        }
    }
    for key in ["detail", "msg"] {
        if let Some(message) = value.get(key).and_then(non_empty) {
            return Some(message);
        }
    }
    let first = value.get("errors")?.as_array()?.first()?;
    non_empty(first).or_else(|| first.get("message").and_then(non_empty))
}
