//! Durable storage of the signed-in identity.
//!
//! Only the identity and the authenticated flag survive a reload. Tokens are
//! never written: the access token lives in memory and the refresh token in
//! an httpOnly cookie.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

use scholar_index_core::ConditionalSync;

use crate::error::PersistenceError;
use crate::identity::Identity;

/// The record written to durable storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    /// Signed-in identity, if any.
    #[serde(default)]
    pub identity: Option<Identity>,
    /// Whether the tab was authenticated when the record was written.
    #[serde(default)]
    pub is_authenticated: bool,
}

/// Backend for the persisted session record.
pub trait SessionPersistence: ConditionalSync {
    /// Loads the stored record, if one exists.
    fn load(&self) -> Result<Option<PersistedSession>, PersistenceError>;

    /// Replaces the stored record.
    fn save(&self, session: &PersistedSession) -> Result<(), PersistenceError>;

    /// Removes the stored record.
    fn clear(&self) -> Result<(), PersistenceError>;
}

/// In-memory persistence for SSR and tests.
///
/// Stores the serialized JSON so tests can assert on exactly what would be
/// written to browser storage.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    raw: Mutex<Option<String>>,
}

impl MemoryPersistence {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates storage pre-populated with a record.
    #[must_use]
    pub fn with_session(session: &PersistedSession) -> Self {
        Self {
            raw: Mutex::new(serde_json::to_string(session).ok()),
        }
    }

    /// Returns the raw stored JSON.
    #[must_use]
    pub fn raw(&self) -> Option<String> {
        self.raw
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionPersistence for MemoryPersistence {
    fn load(&self) -> Result<Option<PersistedSession>, PersistenceError> {
        let raw = self.raw();
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
        *self.raw.lock().unwrap_or_else(PoisonError::into_inner) = Some(json);
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        *self.raw.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
