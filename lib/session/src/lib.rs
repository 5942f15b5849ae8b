//! Session and access gating for the scholar-index panel.
//!
//! This crate provides:
//! - The session store (`SessionStore`) holding the credential pair and
//!   signed-in identity, with persisted rehydration
//! - The shared HTTP client (`HttpClient`) and its single-flight refresh
//!   coordinator (`RefreshCoordinator`)
//! - A stateless server-side fetcher (`ServerFetcher`) reading credentials
//!   from request cookies
//! - Route gating before render (`EdgeGuard`) and after hydration
//!   (`ClientRouteGuard`)
//! - Cross-tab logout propagation (`LogoutBroadcast`)
//!
//! # Example
//!
//! ```
//! use scholar_index_session::{EdgeDecision, EdgeGuard};
//!
//! let guard = EdgeGuard::default();
//! assert_eq!(
//!     guard.decide("/admin/dashboard", None),
//!     EdgeDecision::Redirect("/login?redirect=/admin/dashboard".to_string())
//! );
//! assert_eq!(guard.decide("/about", None), EdgeDecision::Allow);
//! ```

pub mod broadcast;
pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod identity;
pub mod navigation;
pub mod persistence;
pub mod refresh;
pub mod role;
pub mod route;
pub mod server_fetch;
pub mod store;
pub mod token;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types at crate root
pub use broadcast::{
    BroadcastTransport, LogoutBroadcast, MemoryChannelHub, MessageHandler, QueryCache,
    SessionMessage, CHANNEL_NAME,
};
pub use client::HttpClient;
pub use config::{AuthEndpoints, ClientConfig, GuardPaths, SessionConfig};
pub use error::{BroadcastError, PersistenceError, RequestError, extract_error_message};
pub use guard::{ClientRouteGuard, GuardStatus};
pub use identity::{Credential, Identity, LoginRequest, TokenGrant};
pub use navigation::Navigator;
pub use persistence::{MemoryPersistence, PersistedSession, SessionPersistence};
pub use refresh::{RefreshCoordinator, RefreshStateKind};
pub use role::{Role, UnknownRole};
pub use route::{EdgeDecision, EdgeGuard, PolicyError, RoutePattern, RoutePolicy};
pub use server_fetch::{FetchError, Fetched, RequestCookies, ServerFetcher};
pub use store::{Hydration, SessionSnapshot, SessionStore};
pub use token::{AccessClaims, TokenDecodeError, decode_unverified};
pub use transport::{ApiRequest, ApiResponse, ApiTransport, Method, ReqwestTransport};
