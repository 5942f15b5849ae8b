//! Role types for panel access control.
//!
//! Every authenticated account on the platform has exactly one role. The
//! role decides which management panel the account may enter and where it
//! lands after signing in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Panel role carried in the access token's `role` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Platform administrator.
    Admin,
    /// Researcher publishing and managing their own work.
    Author,
    /// Institution managing its affiliated authors and journals.
    Institution,
}

impl Role {
    /// All roles, in policy-table order.
    pub const ALL: [Role; 3] = [Role::Admin, Role::Institution, Role::Author];

    /// Returns the claim value for this role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Author => "author",
            Self::Institution => "institution",
        }
    }

    /// Returns the page an account with this role lands on after sign-in.
    #[must_use]
    pub const fn landing_path(&self) -> &'static str {
        match self {
            Self::Admin => "/admin/dashboard",
            Self::Author => "/author/dashboard",
            Self::Institution => "/institution/dashboard",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role claim does not name a known role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "author" => Ok(Self::Author),
            "institution" => Ok(Self::Institution),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}
