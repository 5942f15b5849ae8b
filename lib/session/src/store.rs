//! The single-writer session store.
//!
//! The store owns the credential pair and the signed-in identity. Writers
//! replace both under one lock so readers never observe a half-set session;
//! readers take cheap snapshots. The identity is persisted across reloads and
//! re-applied by `rehydrate`, whose progress is observable so the client
//! guard can wait for it.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::identity::{Credential, Identity, TokenGrant};
use crate::persistence::{MemoryPersistence, PersistedSession, SessionPersistence};

/// Rehydration progress of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hydration {
    /// Persisted state has not been applied yet.
    Pending,
    /// Persisted state has been applied (or there was none).
    Complete,
}

/// Immutable copy of the session at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Signed-in identity.
    pub identity: Option<Identity>,
    /// Credential pair, present only while the tab holds an access token.
    pub credential: Option<Credential>,
    /// Whether the tab considers itself signed in.
    pub is_authenticated: bool,
}

#[derive(Debug, Default)]
struct State {
    identity: Option<Identity>,
    credential: Option<Credential>,
    is_authenticated: bool,
    // Set by any write so rehydration never overwrites a newer session.
    written: bool,
    // Bumped whenever a session is set or cleared.
    epoch: u64,
}

/// Holds the current session for one tab.
pub struct SessionStore {
    state: RwLock<State>,
    persistence: Arc<dyn SessionPersistence>,
    hydration: watch::Sender<Hydration>,
}

impl SessionStore {
    /// Creates an empty store backed by the given persistence.
    #[must_use]
    pub fn new(persistence: Arc<dyn SessionPersistence>) -> Self {
        let (hydration, _) = watch::channel(Hydration::Pending);
        Self {
            state: RwLock::new(State::default()),
            persistence,
            hydration,
        }
    }

    /// Creates an empty store with in-memory persistence.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryPersistence::new()))
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the identity and credential together and marks the session
    /// authenticated.
    pub fn set_session(&self, identity: Identity, credential: Credential) {
        debug!(user_id = %identity.id(), role = %identity.role(), "session set");
        let record = PersistedSession {
            identity: Some(identity.clone()),
            is_authenticated: true,
        };
        {
            let mut state = self.write();
            state.identity = Some(identity);
            state.credential = Some(credential);
            state.is_authenticated = true;
            state.written = true;
            state.epoch += 1;
        }
        self.persist(&record);
    }

    /// Replaces the credential, and the identity if one is given.
    ///
    /// The session counts as authenticated only while an identity is held.
    pub fn update_credential(&self, credential: Credential, identity: Option<Identity>) {
        self.write_credential(self.write(), credential, identity);
    }

    /// Applies a refresh grant if the session has not been set or cleared
    /// since `epoch` was read.
    ///
    /// Returns `false`, leaving the store untouched, when the session changed
    /// while the refresh was in flight.
    pub fn apply_refresh(&self, epoch: u64, grant: &TokenGrant) -> bool {
        let state = self.write();
        if state.epoch != epoch {
            debug!("session changed during refresh, discarding grant");
            return false;
        }
        let credential = match &state.credential {
            Some(current) => current.rotate(grant),
            None => grant.credential(),
        };
        self.write_credential(state, credential, grant.user.clone());
        true
    }

    fn write_credential(
        &self,
        mut state: RwLockWriteGuard<'_, State>,
        credential: Credential,
        identity: Option<Identity>,
    ) {
        let identity_changed = identity.is_some();
        state.credential = Some(credential);
        state.written = true;
        if identity.is_some() {
            state.identity = identity;
        }
        state.is_authenticated = state.identity.is_some();
        let record = identity_changed.then(|| PersistedSession {
            identity: state.identity.clone(),
            is_authenticated: true,
        });
        drop(state);

        debug!("session credential updated");
        if let Some(record) = record {
            self.persist(&record);
        }
    }

    /// Clears the session.
    ///
    /// Returns `false` if there was nothing to clear, in which case storage
    /// is not touched.
    pub fn clear_session(&self) -> bool {
        {
            let mut state = self.write();
            state.written = true;
            if state.identity.is_none() && state.credential.is_none() && !state.is_authenticated {
                return false;
            }
            state.identity = None;
            state.credential = None;
            state.is_authenticated = false;
            state.epoch += 1;
        }
        debug!("session cleared");
        if let Err(e) = self.persistence.clear() {
            warn!(error = %e, "failed to clear persisted session");
        }
        true
    }

    fn persist(&self, record: &PersistedSession) {
        if let Err(e) = self.persistence.save(record) {
            warn!(error = %e, "failed to persist session");
        }
    }

    /// Returns the session generation, which changes whenever a session is
    /// set or cleared.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.read().epoch
    }

    /// Returns the current access token.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.read()
            .credential
            .as_ref()
            .map(|c| c.access_token().to_string())
    }

    /// Returns the refresh token if it is held in memory.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.read()
            .credential
            .as_ref()
            .and_then(|c| c.refresh_token().map(str::to_string))
    }

    /// Returns the current credential.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.read().credential.clone()
    }

    /// Returns the signed-in identity.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.read().identity.clone()
    }

    /// Returns true if the tab considers itself signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read().is_authenticated
    }

    /// Returns a copy of the whole session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.read();
        SessionSnapshot {
            identity: state.identity.clone(),
            credential: state.credential.clone(),
            is_authenticated: state.is_authenticated,
        }
    }

    /// Applies the persisted record and marks hydration complete.
    ///
    /// A session written in memory before this runs is kept. Calling this
    /// again after hydration is a no-op.
    pub fn rehydrate(&self) {
        if self.hydration() == Hydration::Complete {
            return;
        }

        match self.persistence.load() {
            Ok(Some(record)) => {
                let mut state = self.write();
                if state.written {
                    debug!("skipping rehydration, session already written");
                } else {
                    state.is_authenticated = record.is_authenticated && record.identity.is_some();
                    state.identity = record.identity;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to load persisted session"),
        }

        self.hydration.send_replace(Hydration::Complete);
        debug!("session rehydrated");
    }

    /// Returns the current hydration state.
    #[must_use]
    pub fn hydration(&self) -> Hydration {
        *self.hydration.borrow()
    }

    /// Returns a receiver that observes hydration changes.
    #[must_use]
    pub fn subscribe_hydration(&self) -> watch::Receiver<Hydration> {
        self.hydration.subscribe()
    }

    /// Waits until the store has been rehydrated.
    pub async fn wait_hydrated(&self) {
        let mut rx = self.hydration.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|h| *h == Hydration::Complete).await;
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("SessionStore")
            .field("identity", &state.identity)
            .field("is_authenticated", &state.is_authenticated)
            .field("hydration", &self.hydration())
            .finish_non_exhaustive()
    }
}
