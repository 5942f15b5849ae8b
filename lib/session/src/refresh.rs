//! Single-flight token refresh.
//!
//! When a request comes back 401 the coordinator either starts the one
//! refresh allowed per tab (the leader) or parks the request until that
//! refresh settles (a follower). On success every parked request is handed
//! its replay and the new token, in arrival order; on failure every parked
//! request is rejected and the session ends.
//!
//! The state lock is a `std` mutex and is never held across an await.

use futures::channel::oneshot;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

use scholar_index_core::RequestId;

use crate::broadcast::LogoutBroadcast;
use crate::error::RequestError;
use crate::navigation::Navigator;
use crate::store::SessionStore;
use crate::transport::{ApiRequest, ApiTransport};

const SESSION_EXPIRED: &str = "your session has expired, please sign in again";

fn session_expired() -> RequestError {
    RequestError::SessionExpired {
        message: SESSION_EXPIRED.to_string(),
    }
}

/// A request to replay and the token to replay it with.
pub type Replay = (ApiRequest, String);

/// A request parked behind an in-flight refresh.
struct PendingRequest {
    id: RequestId,
    request: ApiRequest,
    responder: oneshot::Sender<Result<Replay, RequestError>>,
}

/// Requests waiting for the in-flight refresh, in arrival order.
#[derive(Default)]
struct PendingRequestQueue {
    entries: VecDeque<PendingRequest>,
}

impl PendingRequestQueue {
    fn push(&mut self, entry: PendingRequest) {
        self.entries.push_back(entry);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn resolve(self, token: &str) {
        for entry in self.entries {
            debug!(request_id = %entry.id, "replaying queued request");
            // A dropped receiver means the caller gave up; nothing to do.
            let _ = entry
                .responder
                .send(Ok((entry.request.into_retry(), token.to_string())));
        }
    }

    fn reject(self, error: &RequestError) {
        for entry in self.entries {
            debug!(request_id = %entry.id, "rejecting queued request");
            let _ = entry.responder.send(Err(error.clone()));
        }
    }
}

enum RefreshState {
    /// No refresh has run in this tab yet.
    Unstarted,
    /// The last refresh settled.
    Idle,
    /// A refresh call is outstanding.
    InFlight(PendingRequestQueue),
}

/// Observable summary of the coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStateKind {
    Unstarted,
    Idle,
    InFlight { queued: usize },
}

enum Turn {
    /// Runs the refresh; carries the session epoch it started from.
    Leader(ApiRequest, u64),
    Follower(oneshot::Receiver<Result<Replay, RequestError>>),
}

/// Coordinates token refresh for one tab.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    store: Arc<SessionStore>,
    transport: Arc<dyn ApiTransport>,
    navigator: Arc<dyn Navigator>,
    broadcast: Option<LogoutBroadcast>,
    login_path: String,
}

impl RefreshCoordinator {
    /// Creates a coordinator.
    ///
    /// `login_path` is where the tab is sent once the session ends.
    #[must_use]
    pub fn new(
        store: Arc<SessionStore>,
        transport: Arc<dyn ApiTransport>,
        navigator: Arc<dyn Navigator>,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            state: Mutex::new(RefreshState::Unstarted),
            store,
            transport,
            navigator,
            broadcast: None,
            login_path: login_path.into(),
        }
    }

    /// Announces session loss to other tabs through the given broadcaster.
    #[must_use]
    pub fn with_broadcast(mut self, broadcast: LogoutBroadcast) -> Self {
        self.broadcast = Some(broadcast);
        self
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current state.
    #[must_use]
    pub fn state_kind(&self) -> RefreshStateKind {
        match &*self.lock() {
            RefreshState::Unstarted => RefreshStateKind::Unstarted,
            RefreshState::Idle => RefreshStateKind::Idle,
            RefreshState::InFlight(queue) => RefreshStateKind::InFlight {
                queued: queue.len(),
            },
        }
    }

    /// Recovers a request that came back 401.
    ///
    /// `sent_with` is the access token the request carried. Returns the
    /// request marked as retried together with the token to send it with,
    /// or `SessionExpired` once the session has been ended.
    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    pub async fn recover(
        &self,
        request: ApiRequest,
        sent_with: Option<&str>,
    ) -> Result<Replay, RequestError> {
        let turn = {
            let mut state = self.lock();

            match self.store.access_token() {
                // A refresh finished while this request was on the wire.
                Some(current) if sent_with != Some(current.as_str()) => {
                    debug!("token already refreshed, replaying");
                    return Ok((request.into_retry(), current));
                }
                // The token it carried has since been cleared: the session is over.
                None if sent_with.is_some() => {
                    debug!("session already ended, not refreshing");
                    return Err(session_expired());
                }
                _ => {}
            }

            match &mut *state {
                RefreshState::InFlight(queue) => {
                    let (responder, receiver) = oneshot::channel();
                    let id = RequestId::new();
                    debug!(request_id = %id, ahead = queue.len(), "waiting for in-flight refresh");
                    queue.push(PendingRequest {
                        id,
                        request,
                        responder,
                    });
                    Turn::Follower(receiver)
                }
                RefreshState::Unstarted | RefreshState::Idle => {
                    *state = RefreshState::InFlight(PendingRequestQueue::default());
                    Turn::Leader(request, self.store.epoch())
                }
            }
        };

        match turn {
            Turn::Follower(receiver) => receiver
                .await
                .unwrap_or(Err(RequestError::RefreshAborted)),
            Turn::Leader(request, epoch) => self.lead(request, epoch).await,
        }
    }

    async fn lead(&self, request: ApiRequest, epoch: u64) -> Result<Replay, RequestError> {
        let guard = InFlightGuard {
            coordinator: self,
            armed: true,
        };

        let refresh_token = self.store.refresh_token();
        debug!(cookie_held = refresh_token.is_none(), "refreshing access token");
        let outcome = self.transport.refresh(refresh_token.as_deref()).await;

        match outcome {
            Ok(grant) if self.store.apply_refresh(epoch, &grant) => {
                let token = grant.access_token;
                let queue = guard.settle();
                info!(replaying = queue.len() + 1, "access token refreshed");
                queue.resolve(&token);
                Ok((request.into_retry(), token))
            }
            Ok(_) => {
                // Signed out or signed in again while the refresh was out.
                let queue = guard.settle();
                match self.store.access_token() {
                    Some(current) => {
                        queue.resolve(&current);
                        Ok((request.into_retry(), current))
                    }
                    None => {
                        info!("session ended during refresh, discarding new tokens");
                        let expired = session_expired();
                        queue.reject(&expired);
                        Err(expired)
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, ending session");
                let expired = session_expired();
                guard.settle().reject(&expired);
                self.end_session();
                Err(expired)
            }
        }
    }

    /// Ends the session in this tab and every other tab.
    ///
    /// Clears the store, broadcasts the logout, and navigates to the login
    /// page.
    pub fn end_session(&self) {
        self.store.clear_session();
        if let Some(broadcast) = &self.broadcast {
            broadcast.broadcast_logout();
        }
        self.navigator.navigate(&self.login_path);
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("state", &self.state_kind())
            .field("login_path", &self.login_path)
            .finish_non_exhaustive()
    }
}

/// Resets the coordinator if the leading future is dropped mid-refresh.
struct InFlightGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl InFlightGuard<'_> {
    /// Marks the refresh settled and takes the parked requests.
    fn settle(mut self) -> PendingRequestQueue {
        self.armed = false;
        take_queue(&mut self.coordinator.lock())
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("token refresh abandoned");
            take_queue(&mut self.coordinator.lock()).reject(&RequestError::RefreshAborted);
        }
    }
}

fn take_queue(state: &mut RefreshState) -> PendingRequestQueue {
    match std::mem::replace(state, RefreshState::Idle) {
        RefreshState::InFlight(queue) => queue,
        RefreshState::Unstarted | RefreshState::Idle => PendingRequestQueue::default(),
    }
}
