use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::{HabitsApi, ReqwestTransport, RequestPipeline, Transport};
use crate::auth::{CredentialStore, SessionController, SessionEvents};
use crate::config::Config;

/// Everything a front-end needs: the session and the habit endpoints, both
/// sharing one pipeline and one credential store.
pub struct Client<T = ReqwestTransport> {
    pub session: SessionController<T>,
    pub habits: HabitsApi<T>,
}

impl Client<ReqwestTransport> {
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = ReqwestTransport::new(&config.api_url(), config.request_timeout())
            .context("Failed to build HTTP client")?;
        let store = config.credential_store()?;
        Ok(Self::with_transport(transport, store))
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(transport: T, store: CredentialStore) -> Self {
        let pipeline = Arc::new(RequestPipeline::new(
            transport,
            Arc::new(store),
            SessionEvents::new(),
        ));
        Self {
            session: SessionController::new(Arc::clone(&pipeline)),
            habits: HabitsApi::new(pipeline),
        }
    }

    pub fn events(&self) -> &SessionEvents {
        self.session.pipeline().events()
    }
}
