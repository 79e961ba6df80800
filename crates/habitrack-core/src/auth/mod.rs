//! Authentication state for the client.
//!
//! This module provides:
//! - `CredentialStore`: the access/refresh token pair, persisted through a
//!   pluggable `TokenBackend` (file, OS keychain, or memory)
//! - `SessionController`: login/register/logout and the observable session
//! - `SessionEvents`: lifecycle notifications, including session expiry

pub mod credentials;
pub mod events;
pub mod session;
pub mod storage;

pub use credentials::{Credentials, CredentialStore};
pub use events::{SessionEvent, SessionEvents};
pub use session::{RouteAccess, Session, SessionController, SessionStatus};
pub use storage::{FileBackend, KeyringBackend, MemoryBackend, TokenBackend};
