//! Unverified access-token decoding.
//!
//! The edge guard reads the role claim out of the JWT payload to route the
//! request before render. The signature is not checked: the backend verifies
//! every protected call, and a forged claim only changes which page renders.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use std::fmt;

use crate::role::Role;

/// Claims read from an access token payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccessClaims {
    /// Subject (user ID).
    #[serde(default, deserialize_with = "string_or_number")]
    pub sub: Option<String>,
    /// Account email.
    #[serde(default)]
    pub email: Option<String>,
    /// Raw role claim.
    #[serde(default)]
    pub role: Option<String>,
    /// Expiry, seconds since the Unix epoch.
    #[serde(default)]
    pub exp: Option<u64>,
}

impl AccessClaims {
    /// Returns the role claim if it names a known role.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.role.as_deref().and_then(|r| r.parse().ok())
    }
}

/// Errors from decoding a token payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenDecodeError {
    /// The token does not have three dot-separated segments.
    Malformed,
    /// The payload segment is not valid base64url.
    Encoding { reason: String },
    /// The payload is not a JSON claims object.
    Claims { reason: String },
}

impl fmt::Display for TokenDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "token is not a JWT"),
            Self::Encoding { reason } => write!(f, "token payload is not base64url: {reason}"),
            Self::Claims { reason } => write!(f, "token payload is not a claims object: {reason}"),
        }
    }
}

impl std::error::Error for TokenDecodeError {}

/// Decodes the payload of a JWT without verifying its signature.
pub fn decode_unverified(token: &str) -> Result<AccessClaims, TokenDecodeError> {
    let mut segments = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(TokenDecodeError::Malformed);
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| TokenDecodeError::Encoding {
            reason: e.to_string(),
        })?;

    serde_json::from_slice(&bytes).map_err(|e| TokenDecodeError::Claims {
        reason: e.to_string(),
    })
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(u64),
    }

    Ok(Option::<Repr>::deserialize(deserializer)?.map(|repr| match repr {
        Repr::Text(text) => text,
        Repr::Number(number) => number.to_string(),
    }))
}

/// Builds an unsigned token around the given claims JSON.
#[cfg(test)]
pub(crate) fn encode_for_test(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}
