//! Session context shared by the panel's components.
//!
//! The store and HTTP client only exist in the browser. During server
//! rendering the context carries the reactive identity alone, which stays
//! empty, so every protected view renders its loading state.

use leptos::prelude::*;
use scholar_index_session::{GuardPaths, HttpClient, Identity, LoginRequest, SessionStore};
use std::sync::Arc;

/// Reactive handle to the tab's session.
#[derive(Clone, Copy)]
pub struct SessionContext {
    identity: RwSignal<Option<Identity>>,
    paths: StoredValue<GuardPaths>,
    #[cfg(feature = "hydrate")]
    browser: StoredValue<crate::browser::BrowserSession, LocalStorage>,
}

impl SessionContext {
    /// Creates the context and provides it to descendants.
    pub fn provide() -> Self {
        let identity = RwSignal::new(None);
        #[cfg(feature = "hydrate")]
        let browser = crate::browser::connect(Arc::new(move || identity.set(None)));
        #[cfg(feature = "hydrate")]
        let paths = browser.routes.clone();
        // The server provides its configured paths when rendering.
        #[cfg(not(feature = "hydrate"))]
        let paths = use_context::<GuardPaths>().unwrap_or_default();

        let context = Self {
            identity,
            paths: StoredValue::new(paths),
            #[cfg(feature = "hydrate")]
            browser: StoredValue::new_local(browser),
        };
        provide_context(context);
        context
    }

    /// Returns the signed-in identity, tracking changes.
    pub fn identity(&self) -> Option<Identity> {
        self.identity.get()
    }

    /// Subscribes the current reactive scope to identity changes.
    pub fn track(&self) {
        self.identity.track();
    }

    /// Returns the guard redirect targets.
    pub fn paths(&self) -> GuardPaths {
        self.paths.get_value()
    }

    /// Returns the session store, if running in the browser.
    pub fn store(&self) -> Option<Arc<SessionStore>> {
        #[cfg(feature = "hydrate")]
        {
            Some(self.browser.with_value(|b| b.store.clone()))
        }
        #[cfg(not(feature = "hydrate"))]
        {
            None
        }
    }

    /// Returns the HTTP client, if running in the browser.
    pub fn client(&self) -> Option<Arc<HttpClient>> {
        #[cfg(feature = "hydrate")]
        {
            Some(self.browser.with_value(|b| b.client.clone()))
        }
        #[cfg(not(feature = "hydrate"))]
        {
            None
        }
    }

    /// Applies the persisted session and publishes the identity.
    pub fn rehydrate(&self) {
        let Some(store) = self.store() else {
            return;
        };
        store.rehydrate();
        let identity = store.identity().filter(|_| store.is_authenticated());
        self.identity.set(identity);
    }

    /// Signs in, returning a user-facing message on failure.
    pub async fn login(self, credentials: LoginRequest) -> Result<Identity, String> {
        let client = self
            .client()
            .ok_or_else(|| "Sign-in is not available yet, please retry".to_string())?;
        let identity = client
            .login(&credentials)
            .await
            .map_err(|e| e.user_message().to_string())?;
        self.identity.set(Some(identity.clone()));
        Ok(identity)
    }

    /// Signs out of this tab and every other open tab.
    pub async fn logout(self) {
        if let Some(client) = self.client() {
            client.logout().await;
        }
        self.identity.set(None);
    }
}

/// Returns the session context provided by `App`.
pub fn use_session() -> SessionContext {
    expect_context::<SessionContext>()
}
