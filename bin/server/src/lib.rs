//! scholar-index web server and panel UI.
//!
//! This crate provides the Leptos-based management panel of the
//! scholar-index research-indexing platform, together with the Axum edge
//! guard and the server-side backend access used while rendering.

#![allow(non_snake_case)]

pub mod app;
pub mod components;
pub mod error;
pub mod pages;
pub mod session;

#[cfg(feature = "ssr")]
pub mod backend;
#[cfg(feature = "ssr")]
pub mod config;
#[cfg(feature = "ssr")]
pub mod edge;

#[cfg(feature = "hydrate")]
pub mod browser;

#[cfg(feature = "hydrate")]
#[wasm_bindgen::prelude::wasm_bindgen]
pub fn hydrate() {
    use crate::app::App;
    console_error_panic_hook::set_once();
    leptos::mount::hydrate_body(App);
}
