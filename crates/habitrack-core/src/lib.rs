//! Core library for habitrack, a client for the habit tracker API.
//!
//! The interesting part is the authenticated HTTP layer: a
//! [`api::RequestPipeline`] that attaches bearer tokens, renews them on a
//! 401 (one renewal shared by all concurrent callers) and retries once, and
//! an [`auth::SessionController`] that tracks who is logged in.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use habitrack_core::{Client, Config};
//!
//! let client = Client::from_config(&Config::load()?)?;
//! client.session.bootstrap().await;
//! if !client.session.is_authenticated() {
//!     client.session.login("alice", "secret").await?;
//! }
//! let page = client.habits.list(1).await?;
//! println!("{} habits", page.count);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod models;

#[cfg(test)]
pub(crate) mod testing;

pub use client::Client;
pub use config::Config;
