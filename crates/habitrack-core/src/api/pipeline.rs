use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::debug;

use super::interceptor::authorize;
use super::refresh::{Outcome, RefreshCoordinator};
use super::{ApiError, ApiRequest, ApiResponse, Attempt, Transport};
use crate::auth::{CredentialStore, SessionEvents};

/// The single entry point for calls to the resource server.
///
/// Every dispatch reads the token at send time, so a retry after renewal
/// carries the new token. Callers see one result per call: the retry after
/// a 401 happens inside [`RequestPipeline::send`].
pub struct RequestPipeline<T> {
    transport: Arc<T>,
    store: Arc<CredentialStore>,
    events: SessionEvents,
    refresh: RefreshCoordinator<T>,
}

impl<T: Transport> RequestPipeline<T> {
    pub fn new(transport: T, store: Arc<CredentialStore>, events: SessionEvents) -> Self {
        let transport = Arc::new(transport);
        let refresh =
            RefreshCoordinator::new(Arc::clone(&transport), Arc::clone(&store), events.clone());
        Self {
            transport,
            store,
            events,
            refresh,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        request.validate()?;
        let mut attempt = Attempt::first(request);
        loop {
            let credentials = self.store.get();
            let outbound = authorize(attempt.request(), &credentials);
            debug!(
                method = %outbound.method(),
                path = outbound.path(),
                retried = attempt.is_retry(),
                "Sending request"
            );

            let response = self.transport.send(outbound).await?;
            let outcome = self
                .refresh
                .handle_response(&attempt, credentials.access_token.as_deref(), response)
                .await;

            match outcome {
                Outcome::Deliver(response) => return response.error_for_status(),
                Outcome::Retry(next) => attempt = next,
                Outcome::SessionExpired => return Err(ApiError::SessionExpired),
            }
        }
    }

    /// Send and decode a JSON body.
    pub async fn fetch<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R, ApiError> {
        self.send(request).await?.json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TransportError;
    use crate::testing::{bearer, pipeline_with, respond, MockTransport};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    /// Server where A2 is the only valid access token and R1 the only valid refresh token.
    fn renewing_server() -> MockTransport {
        MockTransport::new(|request| match request.path() {
            "/auth/refresh/" => match request.body() {
                Some(body) if body["refresh"] == "R1" => respond(200, json!({"access": "A2"})),
                _ => respond(401, json!({"detail": "Token is invalid or expired"})),
            },
            "/habits/" if bearer(request) == Some("Bearer A2") => respond(200, json!([{"id": 1}])),
            _ => respond(401, json!({"detail": "Given token not valid for any token type"})),
        })
    }

    #[tokio::test]
    async fn test_expired_token_renewed_and_retried() {
        let transport = renewing_server();
        let pipeline = pipeline_with(transport.clone(), Some(("A1", "R1")));

        let habits: Value = pipeline.fetch(ApiRequest::get("/habits/")).await.unwrap();
        assert_eq!(habits, json!([{"id": 1}]));

        let requests = transport.requests();
        let summary: Vec<(&str, Option<&str>)> = requests
            .iter()
            .map(|r| (r.path.as_str(), r.authorization.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("/habits/", Some("Bearer A1")),
                ("/auth/refresh/", None),
                ("/habits/", Some("Bearer A2")),
            ]
        );
        assert_eq!(pipeline.store().access_token().as_deref(), Some("A2"));
        assert_eq!(pipeline.store().refresh_token().as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_refresh_rejected_ends_in_session_expired() {
        let transport = renewing_server();
        let pipeline = pipeline_with(transport.clone(), Some(("A1", "R-revoked")));
        let mut events = pipeline.events().subscribe();

        let err = pipeline.send(ApiRequest::get("/habits/")).await.unwrap_err();
        assert_eq!(err, ApiError::SessionExpired);
        assert!(pipeline.store().get().is_empty());
        assert_eq!(events.try_recv().unwrap(), crate::auth::SessionEvent::Expired);
        assert_eq!(transport.count("/habits/"), 1);
    }

    #[tokio::test]
    async fn test_retry_rejected_again_is_terminal() {
        // refresh succeeds but the new token is refused too
        let transport = MockTransport::new(|request| match request.path() {
            "/auth/refresh/" => respond(200, json!({"access": "A2"})),
            _ => respond(401, json!({"detail": "User is inactive"})),
        });
        let pipeline = pipeline_with(transport.clone(), Some(("A1", "R1")));

        let err = pipeline.send(ApiRequest::get("/habits/")).await.unwrap_err();
        assert_eq!(err, ApiError::Unauthorized("User is inactive".to_string()));
        assert_eq!(transport.count("/auth/refresh/"), 1);
        assert_eq!(transport.count("/habits/"), 2);
    }

    #[tokio::test]
    async fn test_anonymous_401_is_not_renewed() {
        let transport = MockTransport::new(|_| {
            respond(401, json!({"detail": "No active account found with the given credentials"}))
        });
        let pipeline = pipeline_with(transport.clone(), Some(("A1", "R1")));

        let err = pipeline
            .send(crate::api::auth::login_request("alice", "wrong"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::Unauthorized("No active account found with the given credentials".to_string())
        );
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(pipeline.store().access_token().as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn test_concurrent_rejections_renew_once() {
        let transport = renewing_server();
        let pipeline = pipeline_with(transport.clone(), Some(("A1", "R1")));

        let (a, b, c) = tokio::join!(
            pipeline.send(ApiRequest::get("/habits/")),
            pipeline.send(ApiRequest::get("/habits/")),
            pipeline.send(ApiRequest::get("/habits/")),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(transport.count("/auth/refresh/"), 1);
        assert_eq!(transport.count("/habits/"), 6);
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces_as_network_error() {
        let transport = MockTransport::new(|_| Err(TransportError("connection refused".to_string())));
        let pipeline = pipeline_with(transport, Some(("A1", "R1")));

        let err = pipeline.send(ApiRequest::get("/habits/")).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        // a network failure is not an authentication problem
        assert_eq!(pipeline.store().access_token().as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn test_server_and_validation_errors_pass_through() {
        let transport = MockTransport::new(|request| match request.path() {
            "/habits/" => respond(400, json!({"name": ["This field is required."]})),
            _ => respond(503, json!({"detail": "maintenance"})),
        });
        let pipeline = pipeline_with(transport, Some(("A1", "R1")));

        let err = pipeline.send(ApiRequest::post("/habits/")).await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Validation { status: 400, message: "name: This field is required.".to_string() }
        );
        let err = pipeline.send(ApiRequest::get("/habits/analytics/overview/")).await.unwrap_err();
        assert_eq!(err, ApiError::ServerError("maintenance".to_string()));
    }

    #[tokio::test]
    async fn test_unserializable_body_is_refused_before_dispatch() {
        let transport = renewing_server();
        let pipeline = pipeline_with(transport.clone(), Some(("A2", "R1")));
        let mut body = HashMap::new();
        body.insert((1, 2), 3);

        let err = pipeline.send(ApiRequest::post("/habits/").json(&body)).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
        assert!(transport.requests().is_empty());
    }
}
