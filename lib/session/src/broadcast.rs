//! Cross-tab session broadcast.
//!
//! Logging out in one tab must log out every tab of the same origin. Tabs
//! share one named channel carrying a single message type. A tab never
//! receives its own post, and receiving a logout never re-broadcasts it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use scholar_index_core::{ConditionalSync, TabId};

use crate::error::BroadcastError;
use crate::store::SessionStore;

/// Name of the browser channel shared by all tabs.
pub const CHANNEL_NAME: &str = "scholar-index-session";

/// Message posted on the session channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionMessage {
    /// The session ended in another tab.
    Logout,
}

impl SessionMessage {
    /// Parses a raw channel payload, ignoring anything unrecognised.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    /// Returns the wire form of the message.
    #[must_use]
    pub fn to_json(&self) -> String {
        match self {
            Self::Logout => r#"{"type":"logout"}"#.to_string(),
        }
    }
}

/// Receives messages from other tabs.
pub trait MessageHandler: ConditionalSync {
    fn handle(&self, message: SessionMessage);
}

impl<F> MessageHandler for F
where
    F: Fn(SessionMessage) + ConditionalSync,
{
    fn handle(&self, message: SessionMessage) {
        self(message);
    }
}

/// Cached server data that must not outlive the session.
pub trait QueryCache: ConditionalSync {
    fn clear(&self);
}

impl<F> QueryCache for F
where
    F: Fn() + ConditionalSync,
{
    fn clear(&self) {
        self();
    }
}

/// One tab's endpoint on the shared channel.
pub trait BroadcastTransport: ConditionalSync {
    /// Posts a message to every other tab.
    fn post(&self, message: SessionMessage) -> Result<(), BroadcastError>;

    /// Registers a handler for messages posted by other tabs.
    fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> Result<(), BroadcastError>;
}

/// In-process channel connecting simulated tabs.
#[derive(Clone, Default)]
pub struct MemoryChannelHub {
    subscribers: Arc<Mutex<HashMap<TabId, Vec<Arc<dyn MessageHandler>>>>>,
}

impl MemoryChannelHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an endpoint for a new tab.
    #[must_use]
    pub fn endpoint(&self) -> MemoryChannel {
        let tab = TabId::new();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tab, Vec::new());
        MemoryChannel {
            hub: self.clone(),
            tab,
        }
    }
}

/// A tab's endpoint on a `MemoryChannelHub`.
#[derive(Clone)]
pub struct MemoryChannel {
    hub: MemoryChannelHub,
    tab: TabId,
}

impl MemoryChannel {
    /// Returns the tab this endpoint belongs to.
    #[must_use]
    pub fn tab(&self) -> TabId {
        self.tab
    }
}

impl BroadcastTransport for MemoryChannel {
    fn post(&self, message: SessionMessage) -> Result<(), BroadcastError> {
        let raw = message.to_json();
        let recipients: Vec<Arc<dyn MessageHandler>> = self
            .hub
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(tab, _)| **tab != self.tab)
            .flat_map(|(_, handlers)| handlers.iter().cloned())
            .collect();

        // Handlers run outside the lock; they may post themselves.
        for handler in recipients {
            if let Some(message) = SessionMessage::parse(&raw) {
                handler.handle(message);
            }
        }
        Ok(())
    }

    fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> Result<(), BroadcastError> {
        self.hub
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(self.tab)
            .or_default()
            .push(handler);
        Ok(())
    }
}

/// Posts and reacts to cross-tab logouts.
#[derive(Clone)]
pub struct LogoutBroadcast {
    transport: Arc<dyn BroadcastTransport>,
}

impl LogoutBroadcast {
    /// Creates a broadcaster over the given channel endpoint.
    #[must_use]
    pub fn new(transport: Arc<dyn BroadcastTransport>) -> Self {
        Self { transport }
    }

    /// Tells every other tab that the session ended.
    ///
    /// Failures are logged; the local logout proceeds regardless.
    pub fn broadcast_logout(&self) {
        match self.transport.post(SessionMessage::Logout) {
            Ok(()) => debug!("logout broadcast"),
            Err(e) => warn!(error = %e, "failed to broadcast logout"),
        }
    }

    /// Subscribes this tab to logouts from other tabs.
    ///
    /// On receipt the query cache is cleared, the store is cleared, and
    /// `on_logout` runs (typically navigating to the login page).
    pub fn setup<F>(
        &self,
        store: Arc<SessionStore>,
        cache: Arc<dyn QueryCache>,
        on_logout: F,
    ) -> Result<(), BroadcastError>
    where
        F: Fn() + ConditionalSync + 'static,
    {
        let handler = move |message: SessionMessage| match message {
            SessionMessage::Logout => {
                info!("session ended in another tab");
                cache.clear();
                store.clear_session();
                on_logout();
            }
        };
        self.transport.subscribe(Arc::new(handler))
    }
}

impl std::fmt::Debug for LogoutBroadcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogoutBroadcast").finish_non_exhaustive()
    }
}
