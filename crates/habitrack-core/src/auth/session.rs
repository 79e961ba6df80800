use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{CredentialStore, SessionEvent};
use crate::api::auth::{
    login_request, logout_request, profile_request, signup_request, Registration, SignupResponse,
    TokenPair,
};
use crate::api::{ApiError, RequestPipeline, Transport};
use crate::models::UserProfile;

/// Shown when renewal fails underneath an unrelated call
const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please log in again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Loading,
    Unauthenticated,
    Authenticated,
}

/// What a protected view should do for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Wait,
    Allow,
    RedirectToLogin,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Session {
    pub user: Option<UserProfile>,
    pub status: SessionStatus,
    pub error: Option<String>,
}

impl Session {
    fn loading() -> Self {
        Self::default()
    }

    fn unauthenticated(error: Option<String>) -> Self {
        Self {
            user: None,
            status: SessionStatus::Unauthenticated,
            error,
        }
    }

    fn authenticated(user: UserProfile) -> Self {
        Self {
            user: Some(user),
            status: SessionStatus::Authenticated,
            error: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    pub fn route_access(&self) -> RouteAccess {
        match self.status {
            SessionStatus::Loading => RouteAccess::Wait,
            SessionStatus::Authenticated => RouteAccess::Allow,
            SessionStatus::Unauthenticated => RouteAccess::RedirectToLogin,
        }
    }
}

/// Owner of the "who is logged in" state.
///
/// State is published through a `watch` channel; [`SessionController::subscribe`]
/// hands out receivers for route guards and views. An expiry raised by the
/// renewal logic resets the state through an event hook, before the call that
/// hit it returns.
pub struct SessionController<T> {
    pipeline: Arc<RequestPipeline<T>>,
    state: Arc<watch::Sender<Session>>,
}

impl<T: Transport> SessionController<T> {
    pub fn new(pipeline: Arc<RequestPipeline<T>>) -> Self {
        let (tx, _) = watch::channel(Session::loading());
        let state = Arc::new(tx);

        // Weak, so a dropped controller's state does not outlive it.
        let on_expiry = Arc::downgrade(&state);
        pipeline.events().on_event(move |event| {
            if event != SessionEvent::Expired {
                return;
            }
            if let Some(state) = on_expiry.upgrade() {
                info!("Session expired, resetting session state");
                let expired = Session::unauthenticated(Some(SESSION_EXPIRED_MESSAGE.to_string()));
                state.send_replace(expired);
            }
        });

        Self { pipeline, state }
    }

    pub fn pipeline(&self) -> &Arc<RequestPipeline<T>> {
        &self.pipeline
    }

    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.borrow().user.clone()
    }

    /// Restore the session from stored credentials. Run once at startup.
    pub async fn bootstrap(&self) -> Session {
        if self.store().access_token().is_none() {
            debug!("No stored access token");
            self.publish(Session::unauthenticated(None));
            return self.session();
        }

        self.publish(Session::loading());
        match self.fetch_profile().await {
            Ok(user) => {
                info!(username = user.username().unwrap_or_default(), "Session restored");
                self.publish(Session::authenticated(user));
            }
            Err(e) => {
                warn!(error = %e, "Stored session is no longer valid");
                self.store().clear();
                self.publish(Session::unauthenticated(None));
            }
        }
        self.session()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, ApiError> {
        self.publish(Session::loading());

        let tokens: TokenPair = match self.pipeline.fetch(login_request(username, password)).await {
            Ok(tokens) => tokens,
            Err(e) => return Err(self.fail(e, "Login failed")),
        };
        if tokens.access.is_empty() || tokens.refresh.is_empty() {
            let err = ApiError::InvalidResponse("Login response is missing tokens".to_string());
            return Err(self.fail(err, "Login failed"));
        }
        self.store().set(&tokens.access, &tokens.refresh);

        match self.fetch_profile().await {
            Ok(user) => {
                info!(username, "Logged in");
                self.publish(Session::authenticated(user.clone()));
                self.pipeline.events().emit(SessionEvent::LoggedIn);
                Ok(user)
            }
            Err(e) => {
                self.store().clear();
                Err(self.fail(e, "Failed to load profile"))
            }
        }
    }

    pub async fn register(&self, registration: &Registration) -> Result<UserProfile, ApiError> {
        self.publish(Session::loading());

        let response: SignupResponse = match self.pipeline.fetch(signup_request(registration)).await {
            Ok(response) => response,
            Err(e) => return Err(self.fail(e, "Registration failed")),
        };
        if response.access.is_empty() || response.refresh.is_empty() {
            let err = ApiError::InvalidResponse("Signup response is missing tokens".to_string());
            return Err(self.fail(err, "Registration failed"));
        }

        self.store().set(&response.access, &response.refresh);
        info!(username = %registration.username, "Registered");
        self.publish(Session::authenticated(response.user.clone()));
        self.pipeline.events().emit(SessionEvent::LoggedIn);
        Ok(response.user)
    }

    /// End the session. The server-side invalidation is best effort; local
    /// credentials and state are cleared whatever it returns.
    pub async fn logout(&self) {
        if let Some(refresh) = self.store().refresh_token() {
            if let Err(e) = self.pipeline.send(logout_request(&refresh)).await {
                warn!(error = %e, "Server-side logout failed");
            }
        }
        self.store().clear();
        self.publish(Session::unauthenticated(None));
        self.pipeline.events().emit(SessionEvent::LoggedOut);
        info!("Logged out");
    }

    async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        self.pipeline.fetch(profile_request()).await
    }

    fn fail(&self, err: ApiError, fallback: &str) -> ApiError {
        warn!(error = %err, "{}", fallback);
        self.publish(Session::unauthenticated(Some(err.user_message(fallback))));
        err
    }

    fn publish(&self, session: Session) {
        self.state.send_replace(session);
    }

    fn store(&self) -> &CredentialStore {
        self.pipeline.store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiRequest, TransportError};
    use crate::testing::{bearer, pipeline_with, respond, MockTransport};
    use serde_json::json;
    use std::time::Duration;

    /// Server knowing alice/secret, issuing A1/R1, renewing R1 into A2.
    fn server() -> MockTransport {
        MockTransport::new(|request| {
            let authorized = matches!(bearer(request), Some("Bearer A1") | Some("Bearer A2"));
            match request.path() {
                "/auth/login/" => match request.body() {
                    Some(body) if body["username"] == "alice" && body["password"] == "secret" => {
                        respond(200, json!({"access": "A1", "refresh": "R1"}))
                    }
                    _ => respond(401, json!({"detail": "No active account found with the given credentials"})),
                },
                "/auth/signup/" => match request.body() {
                    Some(body) if body["username"] == "taken" => {
                        respond(400, json!({"username": ["A user with that username already exists."]}))
                    }
                    Some(body) => respond(
                        201,
                        json!({"access": "A1", "refresh": "R1", "user": {"id": 2, "username": body["username"], "email": body["email"]}}),
                    ),
                    None => respond(400, json!({})),
                },
                "/auth/profile/" if authorized => respond(200, json!({"id": 1, "username": "alice"})),
                "/auth/logout/" if authorized => respond(205, json!({"message": "Successfully logged out"})),
                "/auth/refresh/" => match request.body() {
                    Some(body) if body["refresh"] == "R1" => respond(200, json!({"access": "A2"})),
                    _ => respond(401, json!({"detail": "Token is invalid or expired"})),
                },
                _ => respond(401, json!({"detail": "Given token not valid for any token type"})),
            }
        })
    }

    fn controller(
        transport: &MockTransport,
        tokens: Option<(&str, &str)>,
    ) -> SessionController<MockTransport> {
        SessionController::new(pipeline_with(transport.clone(), tokens))
    }

    fn tokens(controller: &SessionController<MockTransport>) -> (Option<String>, Option<String>) {
        let credentials = controller.pipeline().store().get();
        (credentials.access_token, credentials.refresh_token)
    }

    #[tokio::test]
    async fn test_login_stores_tokens_and_fetches_profile() {
        let transport = server();
        let controller = controller(&transport, None);

        let user = controller.login("alice", "secret").await.unwrap();
        assert_eq!(user.as_value(), &json!({"id": 1, "username": "alice"}));
        assert_eq!(tokens(&controller), (Some("A1".to_string()), Some("R1".to_string())));

        let session = controller.session();
        assert_eq!(session.status, SessionStatus::Authenticated);
        assert_eq!(session.user, Some(user));
        assert_eq!(session.error, None);

        let paths: Vec<String> = transport.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/auth/login/", "/auth/profile/"]);
    }

    #[tokio::test]
    async fn test_login_failure_sets_error_and_writes_nothing() {
        let transport = server();
        let controller = controller(&transport, None);

        let err = controller.login("alice", "wrong").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));

        let session = controller.session();
        assert_eq!(session.status, SessionStatus::Unauthenticated);
        assert_eq!(
            session.error.as_deref(),
            Some("No active account found with the given credentials")
        );
        assert_eq!(tokens(&controller), (None, None));
        assert_eq!(transport.count("/auth/refresh/"), 0);
    }

    #[tokio::test]
    async fn test_login_network_failure_uses_fallback_message() {
        let transport = MockTransport::new(|_| Err(TransportError("connection refused".to_string())));
        let controller = controller(&transport, None);

        controller.login("alice", "secret").await.unwrap_err();
        assert_eq!(controller.session().error.as_deref(), Some("Login failed"));
    }

    #[tokio::test]
    async fn test_login_profile_failure_clears_tokens() {
        let transport = MockTransport::new(|request| match request.path() {
            "/auth/login/" => respond(200, json!({"access": "A1", "refresh": "R1"})),
            _ => respond(500, json!({"detail": "database unavailable"})),
        });
        let controller = controller(&transport, None);

        let err = controller.login("alice", "secret").await.unwrap_err();
        assert_eq!(err, ApiError::ServerError("database unavailable".to_string()));
        assert_eq!(tokens(&controller), (None, None));
        assert_eq!(controller.session().status, SessionStatus::Unauthenticated);
        assert_eq!(controller.session().error.as_deref(), Some("Failed to load profile"));
    }

    #[tokio::test]
    async fn test_register_adopts_embedded_user() {
        let transport = server();
        let controller = controller(&transport, None);

        let registration = Registration {
            username: "bob".to_string(),
            email: "bob@example.com".to_string(),
            password: "hunter22".to_string(),
            password_confirmation: "hunter22".to_string(),
        };
        let user = controller.register(&registration).await.unwrap();
        assert_eq!(user.username(), Some("bob"));
        assert_eq!(user.email(), Some("bob@example.com"));
        assert!(controller.is_authenticated());
        assert_eq!(tokens(&controller), (Some("A1".to_string()), Some("R1".to_string())));
        // no separate profile fetch
        assert_eq!(transport.count("/auth/profile/"), 0);
    }

    #[tokio::test]
    async fn test_register_duplicate_username() {
        let transport = server();
        let controller = controller(&transport, None);

        let registration = Registration {
            username: "taken".to_string(),
            email: "t@example.com".to_string(),
            password: "pw".to_string(),
            password_confirmation: "pw".to_string(),
        };
        let err = controller.register(&registration).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation { status: 400, .. }));
        assert_eq!(
            controller.session().error.as_deref(),
            Some("username: A user with that username already exists.")
        );
        assert_eq!(controller.session().status, SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn test_logout_invalidates_and_clears() {
        let transport = server();
        let controller = controller(&transport, Some(("A1", "R1")));
        controller.bootstrap().await;
        let mut events = controller.pipeline().events().subscribe();

        controller.logout().await;

        let logout = transport
            .requests()
            .into_iter()
            .find(|r| r.path == "/auth/logout/")
            .unwrap();
        assert_eq!(logout.body, Some(json!({"refresh": "R1"})));
        assert_eq!(logout.authorization.as_deref(), Some("Bearer A1"));
        assert_eq!(tokens(&controller), (None, None));
        assert_eq!(controller.session(), Session::unauthenticated(None));
        assert_eq!(events.try_recv().unwrap(), SessionEvent::LoggedOut);
    }

    #[tokio::test]
    async fn test_logout_server_failure_is_swallowed() {
        let transport = MockTransport::new(|_| Err(TransportError("connection reset".to_string())));
        let controller = controller(&transport, Some(("A1", "R1")));

        controller.logout().await;
        assert_eq!(tokens(&controller), (None, None));
        assert_eq!(controller.session().status, SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn test_logout_without_tokens_skips_server() {
        let transport = server();
        let controller = controller(&transport, None);

        controller.logout().await;
        assert!(transport.requests().is_empty());
        assert_eq!(controller.session().status, SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn test_bootstrap_without_token() {
        let transport = server();
        let controller = controller(&transport, None);
        assert_eq!(controller.session().route_access(), RouteAccess::Wait);

        let session = controller.bootstrap().await;
        assert_eq!(session.status, SessionStatus::Unauthenticated);
        assert_eq!(session.route_access(), RouteAccess::RedirectToLogin);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_with_valid_token() {
        let transport = server();
        let controller = controller(&transport, Some(("A1", "R1")));

        let session = controller.bootstrap().await;
        assert_eq!(session.status, SessionStatus::Authenticated);
        assert_eq!(session.route_access(), RouteAccess::Allow);
        assert_eq!(controller.user().unwrap().id(), Some(1));
    }

    #[tokio::test]
    async fn test_bootstrap_with_expired_tokens_clears() {
        let transport = server();
        let controller = controller(&transport, Some(("A0", "R0")));

        let session = controller.bootstrap().await;
        assert_eq!(session.status, SessionStatus::Unauthenticated);
        assert_eq!(tokens(&controller), (None, None));
    }

    #[tokio::test]
    async fn test_expiry_during_unrelated_call_resets_session() {
        let transport = server();
        let controller = controller(&transport, Some(("A1", "R1")));
        controller.bootstrap().await;
        assert!(controller.is_authenticated());

        // refresh token revoked server-side: renewal of the stale access token fails
        controller.pipeline().store().set("A-stale", "R-revoked");
        let err = controller
            .pipeline()
            .send(ApiRequest::get("/habits/"))
            .await
            .unwrap_err();

        assert_eq!(err, ApiError::SessionExpired);
        assert_eq!(tokens(&controller), (None, None));
        let session = controller.session();
        assert_eq!(session.status, SessionStatus::Unauthenticated);
        assert_eq!(session.user, None);
        assert_eq!(session.error.as_deref(), Some(SESSION_EXPIRED_MESSAGE));
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let transport = server();
        let controller = controller(&transport, None);
        let mut rx = controller.subscribe();

        controller.login("alice", "secret").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_authenticated());

        controller.logout().await;
        assert_eq!(rx.borrow_and_update().status, SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn test_logout_during_renewal_sticks() {
        let transport = MockTransport::new(|request| match (request.path(), bearer(request)) {
            ("/auth/refresh/", _) => respond(200, json!({"access": "A2"})),
            ("/auth/logout/", _) => respond(205, json!({})),
            ("/habits/", Some("Bearer A2")) => respond(200, json!([])),
            _ => respond(401, json!({"detail": "Token is invalid or expired"})),
        })
        .delay("/auth/refresh/", Duration::from_millis(50));
        let controller = controller(&transport, Some(("A1", "R1")));

        let (result, _) = tokio::join!(controller.pipeline().send(ApiRequest::get("/habits/")), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            controller.logout().await;
        });

        assert_eq!(result.unwrap_err(), ApiError::SessionExpired);
        assert_eq!(transport.count("/auth/refresh/"), 1);
        assert_eq!(tokens(&controller), (None, None));
        let session = controller.session();
        assert_eq!(session.status, SessionStatus::Unauthenticated);
        assert_eq!(session.error, None);
    }

    #[tokio::test]
    async fn test_dropped_controller_releases_its_state() {
        let transport = server();
        let controller = controller(&transport, Some(("A1", "R1")));
        let pipeline = Arc::clone(controller.pipeline());
        let rx = controller.subscribe();

        drop(controller);
        assert!(rx.has_changed().is_err());

        // the hook left on the shared events is inert
        pipeline.events().emit(SessionEvent::Expired);
        assert!(rx.has_changed().is_err());
    }
}
