//! The shared HTTP client.
//!
//! Every backend call from the panel goes through one `HttpClient`. It
//! attaches the current access token, hands 401s to the refresh coordinator,
//! and replays the request once with the refreshed token. Callers never see
//! a transient 401.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::broadcast::LogoutBroadcast;
use crate::config::ClientConfig;
use crate::error::RequestError;
use crate::identity::{Identity, LoginRequest, TokenGrant};
use crate::navigation::Navigator;
use crate::refresh::{RefreshCoordinator, RefreshStateKind};
use crate::store::SessionStore;
use crate::transport::{ApiRequest, ApiResponse, ApiTransport, Method};

/// Backend client bound to one tab's session.
pub struct HttpClient {
    config: ClientConfig,
    store: Arc<SessionStore>,
    transport: Arc<dyn ApiTransport>,
    coordinator: RefreshCoordinator,
}

impl HttpClient {
    /// Creates a client.
    ///
    /// `navigator` is used to leave the page once the session ends.
    #[must_use]
    pub fn new(
        config: ClientConfig,
        store: Arc<SessionStore>,
        transport: Arc<dyn ApiTransport>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let coordinator = RefreshCoordinator::new(
            store.clone(),
            transport.clone(),
            navigator,
            config.routes.login.clone(),
        );
        Self {
            config,
            store,
            transport,
            coordinator,
        }
    }

    /// Announces session loss to other tabs through the given broadcaster.
    #[must_use]
    pub fn with_broadcast(mut self, broadcast: LogoutBroadcast) -> Self {
        self.coordinator = self.coordinator.with_broadcast(broadcast);
        self
    }

    /// Returns the session store this client reads tokens from.
    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Returns the refresh coordinator state.
    #[must_use]
    pub fn refresh_state(&self) -> RefreshStateKind {
        self.coordinator.state_kind()
    }

    /// Sends a request, refreshing the session once if it comes back 401.
    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, RequestError> {
        let token = self.store.access_token();
        let response = self.transport.send(&request, token.as_deref()).await?;

        if !response.is_unauthorized() || self.config.endpoints.is_exempt(&request.path) {
            return response.into_result();
        }
        if request.retried {
            // A replayed request that is still rejected is not retried again.
            return response.into_result();
        }

        let (replay, token) = self.coordinator.recover(request, token.as_deref()).await?;
        self.transport
            .send(&replay, Some(&token))
            .await?
            .into_result()
    }

    /// GETs a path and decodes the JSON response.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    /// POSTs a JSON body and decodes the JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, RequestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::post(path, to_value(body)?))
            .await?
            .json()
    }

    /// PUTs a JSON body and decodes the JSON response.
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, RequestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::put(path, to_value(body)?))
            .await?
            .json()
    }

    /// DELETEs a path.
    pub async fn delete(&self, path: &str) -> Result<(), RequestError> {
        self.send(ApiRequest::delete(path)).await.map(|_| ())
    }

    /// Signs in and stores the returned session.
    #[instrument(skip_all, fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &LoginRequest) -> Result<Identity, RequestError> {
        let request = ApiRequest::post(&self.config.endpoints.login, to_value(credentials)?);
        let grant: TokenGrant = self
            .transport
            .send(&request, None)
            .await?
            .into_result()?
            .json()?;

        let identity = grant.user.clone().ok_or_else(|| RequestError::Decode {
            message: "login response did not include the user".to_string(),
        })?;
        self.store.set_session(identity.clone(), grant.credential());
        info!(user_id = %identity.id(), role = %identity.role(), "signed in");
        Ok(identity)
    }

    /// Signs out in this tab and every other tab.
    ///
    /// The backend call is best effort; the local session ends regardless.
    #[instrument(skip_all)]
    pub async fn logout(&self) {
        let token = self.store.access_token();
        let request = ApiRequest::new(Method::Post, &self.config.endpoints.logout);
        match self.transport.send(&request, token.as_deref()).await {
            Ok(response) if !response.is_success() => {
                warn!(status = response.status, "backend logout rejected");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "backend logout failed"),
        }
        self.coordinator.end_session();
        info!("signed out");
    }
}

fn to_value<B: Serialize + ?Sized>(body: &B) -> Result<Value, RequestError> {
    serde_json::to_value(body).map_err(|e| RequestError::Decode {
        message: e.to_string(),
    })
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("api_base_url", &self.config.api_base_url)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::MemoryChannelHub;
    use crate::identity::Credential;
    use crate::role::Role;
    use crate::testing::{RecordingNavigator, ScriptedTransport};
    use crate::transport::ReqwestTransport;
    use futures::future::join_all;
    use httpmock::prelude::*;
    use scholar_index_core::UserId;
    use serde_json::json;
    use tokio::sync::Notify;

    fn author() -> Identity {
        Identity::new(UserId::new("17"), "ada@example.org", Role::Author)
    }

    fn scripted_client(
        transport: Arc<ScriptedTransport>,
    ) -> (HttpClient, Arc<SessionStore>, Arc<RecordingNavigator>) {
        let store = Arc::new(SessionStore::in_memory());
        store.set_session(
            author(),
            Credential::new("access-1", Some("refresh-1".to_string())),
        );
        let navigator = Arc::new(RecordingNavigator::default());
        let client = HttpClient::new(
            ClientConfig::default(),
            store.clone(),
            transport,
            navigator.clone(),
        );
        (client, store, navigator)
    }

    #[tokio::test]
    async fn attaches_current_token() {
        let transport = Arc::new(ScriptedTransport::new("access-1"));
        let (client, _, _) = scripted_client(transport.clone());

        let body: Value = client.get_json("/author/papers").await.expect("get");
        assert_eq!(body["path"], "/author/papers");
        assert_eq!(
            transport.sent()[0].1.as_deref(),
            Some("access-1")
        );
    }

    #[tokio::test]
    async fn sends_unauthenticated_without_session() {
        let transport = Arc::new(ScriptedTransport::new("access-1"));
        let (client, store, _) = scripted_client(transport.clone());
        store.clear_session();

        let err = client
            .send(ApiRequest::get("/auth/register"))
            .await
            .expect_err("401 passes through");
        assert_eq!(err.status(), Some(401));
        assert_eq!(transport.sent()[0].1, None);
        assert_eq!(transport.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_401s_refresh_once_and_all_succeed() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(ScriptedTransport::new("access-2").with_gate(gate.clone()));
        transport.push_refresh(Ok(TokenGrant::new("access-2")));
        let (client, _, _) = scripted_client(transport.clone());

        let paths: Vec<String> = (0..4).map(|i| format!("/author/papers/{i}")).collect();
        let requests = paths.iter().map(|path| client.get_json::<Value>(path));
        let release = async {
            while client.refresh_state() != (RefreshStateKind::InFlight { queued: 3 }) {
                tokio::task::yield_now().await;
            }
            gate.notify_one();
        };
        let (results, ()) = tokio::join!(join_all(requests), release);

        assert_eq!(transport.refresh_calls(), 1);
        for (i, result) in results.into_iter().enumerate() {
            let body = result.expect("request succeeds after refresh");
            assert_eq!(body["path"], format!("/author/papers/{i}"));
            assert_eq!(body["retried"], true);
        }
    }

    #[tokio::test]
    async fn next_request_carries_rotated_token() {
        let transport = Arc::new(ScriptedTransport::new("access-2"));
        transport.push_refresh(Ok(TokenGrant::new("access-2").with_refresh_token("refresh-2")));
        let (client, store, _) = scripted_client(transport.clone());

        client.get_json::<Value>("/author/papers").await.expect("first");
        client.get_json::<Value>("/author/profile").await.expect("second");

        let sent = transport.sent();
        assert_eq!(sent.last().and_then(|(_, b)| b.as_deref()), Some("access-2"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh-2"));
        assert_eq!(transport.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn retried_401_is_not_queued_again() {
        let transport = Arc::new(ScriptedTransport::new("access-2"));
        transport.push_refresh(Ok(TokenGrant::new("access-2")));
        transport.reject_all();
        let (client, store, navigator) = scripted_client(transport.clone());

        let err = client
            .get_json::<Value>("/admin/users")
            .await
            .expect_err("still unauthorized");

        assert_eq!(err.status(), Some(401));
        assert_eq!(transport.refresh_calls(), 1);
        assert_eq!(transport.sent().len(), 2);
        // A rejected replay is an ordinary error, not a session end.
        assert!(store.is_authenticated());
        assert!(navigator.visits().is_empty());
    }

    #[tokio::test]
    async fn refresh_failure_ends_session_and_broadcasts() {
        let hub = MemoryChannelHub::new();
        let other_store = Arc::new(SessionStore::in_memory());
        other_store.set_session(author(), Credential::new("other", None));
        LogoutBroadcast::new(Arc::new(hub.endpoint()))
            .setup(other_store.clone(), Arc::new(|| {}), || {})
            .expect("setup");

        let transport = Arc::new(ScriptedTransport::new("access-2"));
        let (client, store, navigator) = scripted_client(transport.clone());
        let client = client.with_broadcast(LogoutBroadcast::new(Arc::new(hub.endpoint())));

        let err = client
            .get_json::<Value>("/author/papers")
            .await
            .expect_err("session expired");

        assert!(err.is_session_expired());
        assert!(!store.is_authenticated());
        assert!(!other_store.is_authenticated());
        assert_eq!(navigator.visits(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn login_stores_session() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/auth/login")
                .json_body(json!({ "email": "ada@example.org", "password": "correct horse" }));
            then.status(200).json_body(json!({
                "access_token": "access-1",
                "refresh_token": "refresh-1",
                "user": { "id": 17, "email": "ada@example.org", "role": "author", "name": "Ada" }
            }));
        });

        let config = ClientConfig::new(server.base_url());
        let store = Arc::new(SessionStore::in_memory());
        let client = HttpClient::new(
            config.clone(),
            store.clone(),
            Arc::new(ReqwestTransport::new(config)),
            Arc::new(RecordingNavigator::default()),
        );

        let identity = client
            .login(&LoginRequest::new("ada@example.org", "correct horse"))
            .await
            .expect("login");

        mock.assert();
        assert_eq!(identity.role(), Role::Author);
        assert_eq!(identity.display_name(), "Ada");
        assert_eq!(store.access_token().as_deref(), Some("access-1"));
        assert!(store.is_authenticated());
    }

    #[tokio::test]
    async fn bad_credentials_do_not_trigger_refresh() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/auth/login");
            then.status(401).json_body(json!({ "error": "Invalid credentials" }));
        });
        let refresh = server.mock(|when, then| {
            when.method(POST).path("/auth/refresh");
            then.status(200).json_body(json!({ "access_token": "nope" }));
        });

        let config = ClientConfig::new(server.base_url());
        let store = Arc::new(SessionStore::in_memory());
        let client = HttpClient::new(
            config.clone(),
            store.clone(),
            Arc::new(ReqwestTransport::new(config)),
            Arc::new(RecordingNavigator::default()),
        );

        let err = client
            .login(&LoginRequest::new("ada@example.org", "wrong"))
            .await
            .expect_err("rejected");

        assert_eq!(
            err,
            RequestError::Status {
                status: 401,
                message: "Invalid credentials".to_string()
            }
        );
        refresh.assert_hits(0);
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn logout_clears_even_when_backend_fails() {
        let server = MockServer::start();
        let logout = server.mock(|when, then| {
            when.method(POST)
                .path("/auth/logout")
                .header("authorization", "Bearer access-1");
            then.status(500);
        });

        let config = ClientConfig::new(server.base_url());
        let store = Arc::new(SessionStore::in_memory());
        store.set_session(author(), Credential::new("access-1", None));
        let navigator = Arc::new(RecordingNavigator::default());
        let client = HttpClient::new(
            config.clone(),
            store.clone(),
            Arc::new(ReqwestTransport::new(config)),
            navigator.clone(),
        );

        client.logout().await;

        logout.assert();
        assert!(!store.is_authenticated());
        assert_eq!(navigator.visits(), vec!["/login".to_string()]);
    }
}
