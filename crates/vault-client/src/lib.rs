//! Authenticated API client for the Vault console backend.
//!
//! The console talks to a REST backend with short-lived access tokens. This
//! crate keeps the session in client-local storage, attaches the bearer header
//! to every request, and recovers from token expiry with a single refresh call
//! shared by every request that was rejected while it was outstanding.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use vault_client::{ClientConfig, VaultClient};
//! use vault_storage::MemoryBackend;
//!
//! # async fn example() -> Result<(), vault_client::ClientError> {
//! let client = VaultClient::new(ClientConfig::from_env(), Arc::new(MemoryBackend::new()))?;
//! client.login("a@b.com", "x").await?;
//! let documents: serde_json::Value = client.get("/documents").await?;
//! # let _ = documents;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod config;
mod error;
pub mod redirect;
pub mod refresh;
pub mod session;
mod types;

pub use client::{ApiRequest, VaultClient};
pub use config::{AuthEndpoints, ClientConfig};
pub use error::{ClientError, RefreshFailure};
pub use redirect::{LoginRedirect, TracingRedirect};
pub use refresh::{HttpRefresher, RefreshCoordinator, RefreshedTokens, TokenRefresher};
pub use reqwest::Method;
pub use session::{Rotation, Session, SessionStore};
