//! In-application route guard.
//!
//! After hydration the panel checks the session itself, since the edge guard
//! only saw a cookie. Protected content stays hidden until the persisted
//! session has been applied: a signed-in visitor must never be bounced to
//! the login page by a check that ran before rehydration.

use tracing::debug;

use crate::config::GuardPaths;
use crate::role::Role;
use crate::store::{Hydration, SessionSnapshot, SessionStore};

/// Result of a client-side route check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardStatus {
    /// The session has not been rehydrated yet.
    Checking,
    /// Render the protected content.
    Allowed,
    /// Leave for the given path.
    Redirect(String),
}

/// Gate for a protected subtree of the panel.
#[derive(Debug, Clone)]
pub struct ClientRouteGuard {
    allowed: Vec<Role>,
    paths: GuardPaths,
}

impl ClientRouteGuard {
    /// Creates a guard admitting the given roles. An empty list admits any
    /// signed-in account.
    #[must_use]
    pub fn new(allowed: impl IntoIterator<Item = Role>, paths: GuardPaths) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
            paths,
        }
    }

    /// Creates a guard admitting any signed-in account.
    #[must_use]
    pub fn any_role(paths: GuardPaths) -> Self {
        Self::new([], paths)
    }

    /// Returns the admitted roles.
    #[must_use]
    pub fn allowed(&self) -> &[Role] {
        &self.allowed
    }

    /// Evaluates a hydrated session.
    #[must_use]
    pub fn evaluate(&self, session: &SessionSnapshot) -> GuardStatus {
        let Some(identity) = session.identity.as_ref().filter(|_| session.is_authenticated) else {
            return GuardStatus::Redirect(self.paths.login.clone());
        };
        if !self.allowed.is_empty() && !self.allowed.contains(&identity.role()) {
            return GuardStatus::Redirect(self.paths.unauthorized.clone());
        }
        GuardStatus::Allowed
    }

    /// Returns the status for the store right now, without waiting.
    #[must_use]
    pub fn status(&self, store: &SessionStore) -> GuardStatus {
        match store.hydration() {
            Hydration::Pending => GuardStatus::Checking,
            Hydration::Complete => self.evaluate(&store.snapshot()),
        }
    }

    /// Waits for rehydration, then evaluates the session.
    pub async fn check(&self, store: &SessionStore) -> GuardStatus {
        store.wait_hydrated().await;
        let status = self.evaluate(&store.snapshot());
        debug!(?status, "route check complete");
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Credential, Identity};
    use crate::persistence::{MemoryPersistence, PersistedSession};
    use scholar_index_core::UserId;
    use std::sync::Arc;
    use std::time::Duration;

    fn identity(role: Role) -> Identity {
        Identity::new(UserId::new("9"), "kim@example.org", role)
    }

    fn signed_in(role: Role) -> SessionSnapshot {
        SessionSnapshot {
            identity: Some(identity(role)),
            credential: Some(Credential::new("access", None)),
            is_authenticated: true,
        }
    }

    #[test]
    fn unauthenticated_goes_to_login() {
        let guard = ClientRouteGuard::new([Role::Admin], GuardPaths::default());
        assert_eq!(
            guard.evaluate(&SessionSnapshot::default()),
            GuardStatus::Redirect("/login".to_string())
        );
    }

    #[test]
    fn role_outside_allowed_set_goes_to_unauthorized() {
        let guard = ClientRouteGuard::new([Role::Admin, Role::Institution], GuardPaths::default());
        assert_eq!(
            guard.evaluate(&signed_in(Role::Author)),
            GuardStatus::Redirect("/unauthorized".to_string())
        );
        assert_eq!(guard.evaluate(&signed_in(Role::Institution)), GuardStatus::Allowed);
    }

    #[test]
    fn empty_allowed_set_admits_any_role() {
        let guard = ClientRouteGuard::any_role(GuardPaths::default());
        for role in Role::ALL {
            assert_eq!(guard.evaluate(&signed_in(role)), GuardStatus::Allowed);
        }
    }

    #[test]
    fn status_is_checking_until_hydrated() {
        let store = SessionStore::in_memory();
        let guard = ClientRouteGuard::any_role(GuardPaths::default());
        assert_eq!(guard.status(&store), GuardStatus::Checking);

        store.rehydrate();
        assert_eq!(guard.status(&store), GuardStatus::Redirect("/login".to_string()));
    }

    #[tokio::test]
    async fn check_waits_for_rehydration_before_deciding() {
        let storage = Arc::new(MemoryPersistence::with_session(&PersistedSession {
            identity: Some(identity(Role::Author)),
            is_authenticated: true,
        }));
        let store = Arc::new(SessionStore::new(storage));
        let guard = ClientRouteGuard::new([Role::Author], GuardPaths::default());

        let check = {
            let store = store.clone();
            let guard = guard.clone();
            tokio::spawn(async move { guard.check(&store).await })
        };

        // Slow storage: a check that did not wait would redirect to login.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!check.is_finished());
        store.rehydrate();

        let status = tokio::time::timeout(Duration::from_secs(1), check)
            .await
            .expect("check completes")
            .expect("task");
        assert_eq!(status, GuardStatus::Allowed);
    }
}
