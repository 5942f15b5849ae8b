//! Cross-target bound compatibility trait.
//!
//! Session code runs in two places: natively inside the SSR server, where
//! values are shared across worker threads, and in the browser on
//! `wasm32-unknown-unknown`, where nothing is `Send`. `ConditionalSync` is
//! `Send + Sync` on native targets and empty on `wasm32`.

#[allow(missing_docs)]
#[cfg(not(target_arch = "wasm32"))]
pub trait ConditionalSync: Send + Sync {}

#[cfg(not(target_arch = "wasm32"))]
impl<S> ConditionalSync for S where S: Send + Sync {}

#[allow(missing_docs)]
#[cfg(target_arch = "wasm32")]
pub trait ConditionalSync {}

#[cfg(target_arch = "wasm32")]
impl<S> ConditionalSync for S {}
