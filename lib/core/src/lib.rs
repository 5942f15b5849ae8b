//! Core types and utilities shared across the scholar-index workspace.
//!
//! This crate provides the foundational pieces used by the session library
//! and the web server: the rootcause-based `Result` alias, identifier types,
//! and the conditional `Send`/`Sync` bounds that let the same async code
//! compile for native (SSR) and `wasm32` (browser) targets.

pub mod error;
pub mod id;
pub mod sync;

pub use error::Result;
pub use id::{ParseIdError, RequestId, TabId, UserId};
pub use sync::ConditionalSync;
