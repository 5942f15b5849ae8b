//! Route policy and the edge guard decision.
//!
//! The edge guard runs before a page renders. It reads the role claim from
//! the access-token cookie without verifying the signature and decides
//! whether to render, send the visitor to sign in, or send them away. The
//! backend still authorises every protected call.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::fmt;

use crate::config::GuardPaths;
use crate::role::Role;
use crate::token::decode_unverified;

/// Characters escaped in the `redirect` query value. `/` stays literal so the
/// target reads as a path.
const REDIRECT_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const ASSET_PREFIXES: &[&str] = &["/pkg", "/assets", "/favicon.ico", "/robots.txt"];

// Types the app only ever serves as static files. Document-like types
// (txt, xml, json) can be routes and stay guarded.
const ASSET_EXTENSIONS: &[&str] = &[
    "css", "gif", "ico", "jpeg", "jpg", "js", "map", "png", "svg", "wasm", "webp", "woff",
    "woff2", "ttf",
];

/// Errors from building a route policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// A pattern could not be parsed.
    InvalidPattern { pattern: String, reason: String },
    /// Two patterns can match the same path.
    Overlap { first: String, second: String },
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "invalid route pattern '{pattern}': {reason}")
            }
            Self::Overlap { first, second } => {
                write!(f, "route patterns '{first}' and '{second}' overlap")
            }
        }
    }
}

impl std::error::Error for PolicyError {}

/// A path pattern: either an exact path or a subtree (`/admin/**`).
///
/// Matching is by whole segments, so `/admin/**` matches `/admin` and
/// `/admin/users` but not `/administrator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    segments: Vec<String>,
    subtree: bool,
}

impl RoutePattern {
    /// Creates a pattern matching `/{root}` and everything below it.
    #[must_use]
    pub fn subtree(root: &str) -> Self {
        Self {
            segments: split(root).map(str::to_string).collect(),
            subtree: true,
        }
    }

    /// Parses `/exact/path` or `/prefix/**`.
    pub fn parse(pattern: &str) -> Result<Self, PolicyError> {
        let invalid = |reason: &str| PolicyError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let mut segments: Vec<String> = split(pattern).map(str::to_string).collect();
        let subtree = segments.last().is_some_and(|s| s == "**");
        if subtree {
            segments.pop();
        }
        if segments.iter().any(|s| s.contains('*')) {
            return Err(invalid("'**' is only allowed as the last segment"));
        }

        Ok(Self { segments, subtree })
    }

    /// Returns true if the path falls under this pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let path: Vec<&str> = split(strip_query(path)).collect();
        if self.subtree {
            path.len() >= self.segments.len()
                && self.segments.iter().zip(&path).all(|(a, b)| a == b)
        } else {
            path.len() == self.segments.len()
                && self.segments.iter().zip(&path).all(|(a, b)| a == b)
        }
    }

    fn overlaps(&self, other: &Self) -> bool {
        let (shorter, longer) = if self.segments.len() <= other.segments.len() {
            (self, other)
        } else {
            (other, self)
        };
        let prefix_shared = shorter
            .segments
            .iter()
            .zip(&longer.segments)
            .all(|(a, b)| a == b);

        if !prefix_shared {
            return false;
        }
        if shorter.subtree {
            return true;
        }
        // The shorter one is exact: it only collides with a pattern of the
        // same length (or a subtree rooted exactly at it).
        shorter.segments.len() == longer.segments.len()
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        if self.subtree {
            write!(f, "/**")?;
        } else if self.segments.is_empty() {
            write!(f, "/")?;
        }
        Ok(())
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

/// Maps protected path patterns to the role required to enter them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    rules: Vec<(RoutePattern, Role)>,
}

impl RoutePolicy {
    /// Builds a policy, rejecting patterns that can match the same path.
    pub fn new<I, S>(rules: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = (S, Role)>,
        S: AsRef<str>,
    {
        let mut parsed: Vec<(RoutePattern, Role)> = Vec::new();
        for (pattern, role) in rules {
            let pattern = RoutePattern::parse(pattern.as_ref())?;
            if let Some((existing, _)) = parsed.iter().find(|(p, _)| p.overlaps(&pattern)) {
                return Err(PolicyError::Overlap {
                    first: existing.to_string(),
                    second: pattern.to_string(),
                });
            }
            parsed.push((pattern, role));
        }
        Ok(Self { rules: parsed })
    }

    /// Returns the role required for the path, or `None` if it is public.
    #[must_use]
    pub fn required_role(&self, path: &str) -> Option<Role> {
        self.rules
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|(_, role)| *role)
    }

    /// Returns the rules in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[(RoutePattern, Role)] {
        &self.rules
    }
}

impl Default for RoutePolicy {
    /// Each panel lives under its role's prefix.
    fn default() -> Self {
        Self {
            rules: Role::ALL
                .iter()
                .map(|role| (RoutePattern::subtree(role.as_str()), *role))
                .collect(),
        }
    }
}

/// Outcome of the edge check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeDecision {
    /// Render the requested page.
    Allow,
    /// Send the visitor to another path.
    Redirect(String),
}

/// Decides access to a page before it renders.
#[derive(Debug, Clone, Default)]
pub struct EdgeGuard {
    policy: RoutePolicy,
    paths: GuardPaths,
}

impl EdgeGuard {
    /// Creates a guard.
    #[must_use]
    pub fn new(policy: RoutePolicy, paths: GuardPaths) -> Self {
        Self { policy, paths }
    }

    /// Returns the policy.
    #[must_use]
    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    /// Returns true for static assets the guard never inspects.
    #[must_use]
    pub fn is_allowlisted(&self, path: &str) -> bool {
        let path = strip_query(path);
        if ASSET_PREFIXES
            .iter()
            .any(|prefix| path == *prefix || path.starts_with(&format!("{prefix}/")))
        {
            return true;
        }
        path.rsplit('/')
            .next()
            .and_then(|file| file.rsplit_once('.'))
            .is_some_and(|(_, ext)| ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    }

    /// Decides what to do with a navigation to `path` carrying the given
    /// access-token cookie value.
    #[must_use]
    pub fn decide(&self, path: &str, token: Option<&str>) -> EdgeDecision {
        let path = strip_query(path);
        if self.is_allowlisted(path) {
            return EdgeDecision::Allow;
        }

        let token = token.map(str::trim).filter(|t| !t.is_empty());
        let role = token
            .and_then(|t| decode_unverified(t).ok())
            .and_then(|claims| claims.role());

        if self.is_auth_page(path) {
            return match role {
                Some(role) => EdgeDecision::Redirect(role.landing_path().to_string()),
                None => EdgeDecision::Allow,
            };
        }

        let Some(required) = self.policy.required_role(path) else {
            return EdgeDecision::Allow;
        };

        if token.is_none() {
            return EdgeDecision::Redirect(self.login_redirect(path));
        }
        match role {
            None => EdgeDecision::Redirect(self.paths.login.clone()),
            Some(role) if role != required => {
                EdgeDecision::Redirect(self.paths.unauthorized.clone())
            }
            Some(_) => EdgeDecision::Allow,
        }
    }

    fn is_auth_page(&self, path: &str) -> bool {
        let path = path.trim_end_matches('/');
        self.paths.auth_pages.iter().any(|page| page == path)
    }

    /// Returns the login URL that brings the visitor back to `path`.
    #[must_use]
    pub fn login_redirect(&self, path: &str) -> String {
        format!(
            "{}?redirect={}",
            self.paths.login,
            utf8_percent_encode(path, REDIRECT_VALUE)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::encode_for_test;
    use serde_json::json;

    fn token_for(role: &str) -> String {
        encode_for_test(&json!({ "sub": "1", "role": role }))
    }

    #[test]
    fn protected_page_without_cookie_goes_to_login_with_return_path() {
        let guard = EdgeGuard::default();
        assert_eq!(
            guard.decide("/admin/dashboard", None),
            EdgeDecision::Redirect("/login?redirect=/admin/dashboard".to_string())
        );
        assert_eq!(
            guard.decide("/author/papers/new?draft=1", None),
            EdgeDecision::Redirect("/login?redirect=/author/papers/new".to_string())
        );
    }

    #[test]
    fn wrong_role_goes_to_unauthorized() {
        let guard = EdgeGuard::default();
        let token = token_for("author");
        assert_eq!(
            guard.decide("/admin/dashboard", Some(&token)),
            EdgeDecision::Redirect("/unauthorized".to_string())
        );
        assert_eq!(guard.decide("/author/dashboard", Some(&token)), EdgeDecision::Allow);
    }

    #[test]
    fn signed_in_visitor_is_bounced_from_auth_pages() {
        let guard = EdgeGuard::default();
        let token = token_for("institution");
        assert_eq!(
            guard.decide("/login", Some(&token)),
            EdgeDecision::Redirect("/institution/dashboard".to_string())
        );
        assert_eq!(
            guard.decide("/signup", Some(&token_for("admin"))),
            EdgeDecision::Redirect("/admin/dashboard".to_string())
        );
        assert_eq!(guard.decide("/login", None), EdgeDecision::Allow);
        assert_eq!(guard.decide("/login", Some("garbage")), EdgeDecision::Allow);
    }

    #[test]
    fn public_pages_are_allowed() {
        let guard = EdgeGuard::default();
        assert_eq!(guard.decide("/about", None), EdgeDecision::Allow);
        assert_eq!(guard.decide("/", None), EdgeDecision::Allow);
        assert_eq!(guard.decide("/journals/42", Some("garbage")), EdgeDecision::Allow);
        assert_eq!(guard.decide("/administrator", None), EdgeDecision::Allow);
    }

    #[test]
    fn undecodable_or_roleless_token_goes_to_plain_login() {
        let guard = EdgeGuard::default();
        assert_eq!(
            guard.decide("/admin/dashboard", Some("not-a-jwt")),
            EdgeDecision::Redirect("/login".to_string())
        );
        let roleless = encode_for_test(&json!({ "sub": "1" }));
        assert_eq!(
            guard.decide("/institution/dashboard", Some(&roleless)),
            EdgeDecision::Redirect("/login".to_string())
        );
    }

    #[test]
    fn assets_are_allowlisted() {
        let guard = EdgeGuard::default();
        assert!(guard.is_allowlisted("/pkg/scholar-index.wasm"));
        assert!(guard.is_allowlisted("/favicon.ico"));
        assert!(guard.is_allowlisted("/admin/logo.png"));
        assert!(!guard.is_allowlisted("/admin/dashboard"));
        assert!(!guard.is_allowlisted("/pkgs"));
        assert_eq!(guard.decide("/admin/logo.png", None), EdgeDecision::Allow);
    }

    #[test]
    fn document_extensions_under_protected_paths_stay_guarded() {
        let guard = EdgeGuard::default();
        assert!(guard.is_allowlisted("/robots.txt"));
        for path in ["/admin/report.txt", "/admin/x.xml", "/institution/export.json"] {
            assert!(!guard.is_allowlisted(path), "{path}");
            assert_eq!(
                guard.decide(path, None),
                EdgeDecision::Redirect(format!("/login?redirect={path}"))
            );
        }
    }

    #[test]
    fn redirect_value_is_percent_encoded() {
        let guard = EdgeGuard::default();
        assert_eq!(
            guard.login_redirect("/author/papers/a b&c"),
            "/login?redirect=/author/papers/a%20b%26c"
        );
    }

    #[test]
    fn patterns_match_whole_segments() {
        let admin = RoutePattern::parse("/admin/**").expect("parse");
        assert!(admin.matches("/admin"));
        assert!(admin.matches("/admin/"));
        assert!(admin.matches("/admin/users/3"));
        assert!(!admin.matches("/administrator"));

        let exact = RoutePattern::parse("/reports").expect("parse");
        assert!(exact.matches("/reports"));
        assert!(!exact.matches("/reports/2024"));
        assert_eq!(exact.to_string(), "/reports");
        assert_eq!(admin.to_string(), "/admin/**");
    }

    #[test]
    fn overlapping_patterns_are_rejected() {
        let err = RoutePolicy::new([("/admin/**", Role::Admin), ("/admin/reports", Role::Author)])
            .unwrap_err();
        assert_eq!(
            err,
            PolicyError::Overlap {
                first: "/admin/**".to_string(),
                second: "/admin/reports".to_string(),
            }
        );

        assert!(RoutePolicy::new([("/a/**", Role::Admin), ("/a/**", Role::Author)]).is_err());
        assert!(
            RoutePolicy::new([("/admin/**", Role::Admin), ("/administrator/**", Role::Author)])
                .is_ok()
        );
        assert!(RoutePolicy::new([("/a/b", Role::Admin), ("/a/c", Role::Author)]).is_ok());
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        assert!(matches!(
            RoutePattern::parse("admin/**"),
            Err(PolicyError::InvalidPattern { .. })
        ));
        assert!(matches!(
            RoutePattern::parse("/admin/*/edit"),
            Err(PolicyError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn default_policy_maps_each_panel() {
        let policy = RoutePolicy::default();
        assert_eq!(policy.required_role("/admin/users"), Some(Role::Admin));
        assert_eq!(policy.required_role("/institution/authors"), Some(Role::Institution));
        assert_eq!(policy.required_role("/author/papers"), Some(Role::Author));
        assert_eq!(policy.required_role("/papers/1"), None);

        let explicit = RoutePolicy::new([
            ("/admin/**", Role::Admin),
            ("/institution/**", Role::Institution),
            ("/author/**", Role::Author),
        ])
        .expect("valid policy");
        assert_eq!(explicit, policy);
    }
}
