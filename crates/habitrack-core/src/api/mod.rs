//! HTTP client layer for the habit tracker API.
//!
//! Every call goes through [`RequestPipeline`], which attaches the bearer
//! token, dispatches over a [`Transport`], and on a 401 renews the access
//! token once (shared between concurrent callers) before retrying.
//!
//! The server issues JWT access/refresh pairs; see [`auth`] for the
//! authentication endpoints and [`habits`] for the resource endpoints.

pub mod auth;
pub mod error;
pub mod habits;
pub mod interceptor;
pub mod pipeline;
pub mod refresh;
pub mod request;
pub mod transport;

pub use error::{ApiError, TransportError};
pub use habits::{AnalyticsView, HabitsApi};
pub use pipeline::RequestPipeline;
pub use refresh::{Outcome, RefreshCoordinator, RenewalError};
pub use request::{ApiRequest, ApiResponse, Attempt, AuthMode};
pub use transport::{ReqwestTransport, Transport};
