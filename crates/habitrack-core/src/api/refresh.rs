//! Access-token renewal after a 401.
//!
//! At most one renewal call is in flight at a time. The first rejected
//! request starts it; requests rejected while it runs await the same shared
//! future and then retry once with whatever token it installed.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::auth::{refresh_request, RefreshResponse};
use super::{ApiResponse, Attempt, Transport};
use crate::auth::{CredentialStore, SessionEvent, SessionEvents};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenewalError {
    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Renewal request failed: {0}")]
    Network(String),

    #[error("Renewal rejected with status {0}")]
    Rejected(u16),

    #[error("Invalid renewal response: {0}")]
    InvalidResponse(String),

    #[error("Session changed while the token was being renewed")]
    Superseded,
}

/// What the pipeline should do with a response.
#[derive(Debug)]
pub enum Outcome {
    /// Hand the response to the caller as-is.
    Deliver(ApiResponse),
    /// Dispatch this attempt again with the current token.
    Retry(Attempt),
    /// Renewal failed or was impossible; credentials are gone.
    SessionExpired,
}

type SharedRenewal = Shared<BoxFuture<'static, Result<String, RenewalError>>>;

enum Renewal {
    Ready(String),
    Pending(u64, SharedRenewal),
}

#[derive(Default)]
struct InFlight {
    generation: u64,
    current: Option<(u64, SharedRenewal)>,
}

struct Inner<T> {
    transport: Arc<T>,
    store: Arc<CredentialStore>,
    events: SessionEvents,
    in_flight: Mutex<InFlight>,
}

pub struct RefreshCoordinator<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> RefreshCoordinator<T> {
    pub fn new(transport: Arc<T>, store: Arc<CredentialStore>, events: SessionEvents) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                events,
                in_flight: Mutex::new(InFlight::default()),
            }),
        }
    }

    /// Decide what to do with `response` to `attempt`, renewing the access
    /// token when the server rejected it. `sent_with` is the access token the
    /// attempt was dispatched with.
    pub async fn handle_response(
        &self,
        attempt: &Attempt,
        sent_with: Option<&str>,
        response: ApiResponse,
    ) -> Outcome {
        if !response.is_unauthorized() || !attempt.request().requires_auth() {
            return Outcome::Deliver(response);
        }

        let Some(retry) = attempt.retry() else {
            warn!(path = attempt.request().path(), "Request rejected after renewal, giving up");
            return Outcome::Deliver(response);
        };

        match self.renew(sent_with).await {
            Ok(_) => Outcome::Retry(retry),
            Err(e) => {
                debug!(path = attempt.request().path(), error = %e, "Renewal unavailable");
                Outcome::SessionExpired
            }
        }
    }

    /// Obtain an access token to replace `rejected`, joining a renewal already
    /// in flight. If the stored token has changed since `rejected` was read,
    /// it is returned as-is and nothing goes over the network.
    pub async fn renew(&self, rejected: Option<&str>) -> Result<String, RenewalError> {
        let (generation, renewal) = match self.join_or_start(rejected)? {
            Renewal::Ready(access) => return Ok(access),
            Renewal::Pending(generation, renewal) => (generation, renewal),
        };
        let result = renewal.await;
        self.inner.finish(generation);
        result
    }

    fn join_or_start(&self, rejected: Option<&str>) -> Result<Renewal, RenewalError> {
        let mut in_flight = self.inner.lock_in_flight();
        if let Some((generation, renewal)) = &in_flight.current {
            debug!(generation, "Joining in-flight token renewal");
            return Ok(Renewal::Pending(*generation, renewal.clone()));
        }

        let credentials = self.inner.store.get();
        if let Some(access) = credentials.access_token.as_deref() {
            if Some(access) != rejected {
                debug!("Access token already renewed");
                return Ok(Renewal::Ready(access.to_string()));
            }
        }

        let Some(refresh) = credentials.refresh_token.clone() else {
            drop(in_flight);
            if credentials.is_empty() {
                debug!("No credentials stored, session already ended");
            } else {
                warn!("No refresh token stored, ending session");
                self.inner.expire();
            }
            return Err(RenewalError::MissingRefreshToken);
        };

        in_flight.generation += 1;
        let generation = in_flight.generation;
        let inner = Arc::clone(&self.inner);
        let renewal = async move { inner.perform_renewal(refresh).await }
            .boxed()
            .shared();
        in_flight.current = Some((generation, renewal.clone()));
        Ok(Renewal::Pending(generation, renewal))
    }
}

impl<T: Transport> Inner<T> {
    /// Results only land in the store while `refresh` is still the stored
    /// refresh token; a logout or new login during the call wins.
    async fn perform_renewal(&self, refresh: String) -> Result<String, RenewalError> {
        info!("Renewing access token");
        let result = match self.transport.send(refresh_request(&refresh)).await {
            Err(e) => Err(RenewalError::Network(e.to_string())),
            Ok(response) if !response.status().is_success() => {
                Err(RenewalError::Rejected(response.status().as_u16()))
            }
            Ok(response) => response
                .json::<RefreshResponse>()
                .map(|body| body.access)
                .map_err(|e| RenewalError::InvalidResponse(e.to_string())),
        };

        match result {
            Ok(access) if self.store.set_access_if(&refresh, &access) => {
                info!("Access token renewed");
                Ok(access)
            }
            Ok(_) => {
                info!("Session changed during renewal, discarding renewed token");
                Err(RenewalError::Superseded)
            }
            Err(e) if self.store.clear_if(&refresh) => {
                warn!(error = %e, "Token renewal failed, ending session");
                self.events.emit(SessionEvent::Expired);
                Err(e)
            }
            Err(e) => {
                debug!(error = %e, "Token renewal failed after session changed");
                Err(e)
            }
        }
    }

    fn expire(&self) {
        self.store.clear();
        self.events.emit(SessionEvent::Expired);
    }

    fn finish(&self, generation: u64) {
        let mut in_flight = self.lock_in_flight();
        if matches!(&in_flight.current, Some((current, _)) if *current == generation) {
            in_flight.current = None;
        }
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, InFlight> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
