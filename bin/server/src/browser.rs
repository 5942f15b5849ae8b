//! Browser adapters for the session crate.
//!
//! Wires the session store to `localStorage`, logout propagation to a
//! `BroadcastChannel`, and forced navigation to `window.location`.

use scholar_index_session::{
    BroadcastError, BroadcastTransport, CHANNEL_NAME, ClientConfig, GuardPaths, HttpClient,
    LogoutBroadcast, MessageHandler, Navigator, PersistedSession, PersistenceError, QueryCache,
    ReqwestTransport, SessionMessage, SessionPersistence, SessionStore,
};
use std::cell::RefCell;
use std::sync::Arc;
use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::JsValue;
use web_sys::{BroadcastChannel, MessageEvent, Storage};

/// `localStorage` key of the persisted session record.
pub const STORAGE_KEY: &str = "scholar-index-session";

/// Name of the `<meta>` tag carrying the client configuration as JSON.
pub const CONFIG_META: &str = "scholar-index-config";

/// Session persistence in `window.localStorage`.
#[derive(Debug, Default)]
pub struct LocalStoragePersistence;

impl LocalStoragePersistence {
    fn storage() -> Result<Storage, PersistenceError> {
        let unavailable = |reason: &str| PersistenceError::Unavailable {
            reason: reason.to_string(),
        };
        web_sys::window()
            .ok_or_else(|| unavailable("no window"))?
            .local_storage()
            .map_err(|e| unavailable(&format!("{e:?}")))?
            .ok_or_else(|| unavailable("local storage disabled"))
    }
}

fn storage_error(e: JsValue) -> PersistenceError {
    PersistenceError::Storage {
        reason: format!("{e:?}"),
    }
}

impl SessionPersistence for LocalStoragePersistence {
    fn load(&self) -> Result<Option<PersistedSession>, PersistenceError> {
        let raw = Self::storage()?.get_item(STORAGE_KEY).map_err(storage_error)?;
        raw.map(|json| {
            serde_json::from_str(&json).map_err(|e| PersistenceError::Corrupt {
                reason: e.to_string(),
            })
        })
        .transpose()
    }

    fn save(&self, session: &PersistedSession) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(session).map_err(|e| PersistenceError::Storage {
            reason: e.to_string(),
        })?;
        Self::storage()?
            .set_item(STORAGE_KEY, &json)
            .map_err(storage_error)
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        Self::storage()?
            .remove_item(STORAGE_KEY)
            .map_err(storage_error)
    }
}

/// Cross-tab channel over the browser `BroadcastChannel` API.
///
/// The browser never delivers a message to the channel object that posted
/// it, so a tab does not react to its own logout.
pub struct WebBroadcastChannel {
    channel: BroadcastChannel,
    listeners: RefCell<Vec<Closure<dyn FnMut(MessageEvent)>>>,
}

impl WebBroadcastChannel {
    /// Opens the shared session channel.
    pub fn open() -> Result<Self, BroadcastError> {
        let channel =
            BroadcastChannel::new(CHANNEL_NAME).map_err(|e| BroadcastError::Unavailable {
                reason: format!("{e:?}"),
            })?;
        Ok(Self {
            channel,
            listeners: RefCell::default(),
        })
    }
}

impl BroadcastTransport for WebBroadcastChannel {
    fn post(&self, message: SessionMessage) -> Result<(), BroadcastError> {
        self.channel
            .post_message(&JsValue::from_str(&message.to_json()))
            .map_err(|e| BroadcastError::PostFailed {
                reason: format!("{e:?}"),
            })
    }

    fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> Result<(), BroadcastError> {
        let listener = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            let Some(raw) = event.data().as_string() else {
                return;
            };
            match SessionMessage::parse(&raw) {
                Some(message) => handler.handle(message),
                None => tracing::debug!("ignoring unknown session message"),
            }
        });
        self.channel
            .add_event_listener_with_callback("message", listener.as_ref().unchecked_ref())
            .map_err(|e| BroadcastError::Unavailable {
                reason: format!("{e:?}"),
            })?;
        // The closure must outlive the listener registration.
        self.listeners.borrow_mut().push(listener);
        Ok(())
    }
}

impl Drop for WebBroadcastChannel {
    fn drop(&mut self) {
        self.channel.close();
    }
}

fn assign_location(path: &str) {
    let Some(window) = web_sys::window() else {
        return;
    };
    if let Err(e) = window.location().set_href(path) {
        tracing::warn!(error = ?e, "failed to navigate");
    }
}

fn config_meta() -> Option<String> {
    let document = web_sys::window()?.document()?;
    let meta = document
        .query_selector(&format!("meta[name=\"{CONFIG_META}\"]"))
        .ok()??;
    meta.get_attribute("content")
        .filter(|content| !content.trim().is_empty())
}

/// Reads the client configuration the server wrote into the page.
///
/// Falls back to the defaults when the page carries none or it does not parse.
pub fn client_config() -> ClientConfig {
    let Some(json) = config_meta() else {
        tracing::debug!("no client configuration in page, using defaults");
        return ClientConfig::default();
    };
    serde_json::from_str(&json).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "unreadable client configuration, using defaults");
        ClientConfig::default()
    })
}

/// The tab's session objects.
pub struct BrowserSession {
    pub store: Arc<SessionStore>,
    pub client: Arc<HttpClient>,
    /// Redirect targets the server configured.
    pub routes: GuardPaths,
}

/// Builds the tab's session store and HTTP client.
///
/// `cache` is cleared when another tab logs out.
pub fn connect(cache: Arc<dyn QueryCache>) -> BrowserSession {
    let config = client_config();
    let routes = config.routes.clone();
    let login = routes.login.clone();

    let store = Arc::new(SessionStore::new(Arc::new(LocalStoragePersistence)));
    let navigator: Arc<dyn Navigator> = Arc::new(assign_location);
    let transport = Arc::new(ReqwestTransport::new(config.clone()));
    let mut client = HttpClient::new(config, store.clone(), transport, navigator.clone());

    match WebBroadcastChannel::open() {
        Ok(channel) => {
            let broadcast = LogoutBroadcast::new(Arc::new(channel));
            let setup = broadcast.setup(store.clone(), cache, move || navigator.navigate(&login));
            if let Err(e) = setup {
                tracing::warn!(error = %e, "cross-tab logout not subscribed");
            }
            client = client.with_broadcast(broadcast);
        }
        Err(e) => tracing::warn!(error = %e, "cross-tab logout unavailable"),
    }

    BrowserSession {
        store,
        client: Arc::new(client),
        routes,
    }
}
