//! Resilient networking client for the StoresGo mobile backend
//!
//! Wraps a JSON/HTTP API with the resilience layers a mobile client needs:
//!
//! - **Two-tier response cache**: in-memory plus injected persistent storage,
//!   with per-request TTLs and substring invalidation ([`cache`])
//! - **Retry with exponential backoff**: network-level failures only; HTTP
//!   error statuses surface immediately ([`retry`])
//! - **Single-flight token refresh**: concurrent 401s collapse into one
//!   refresh call whose outcome every waiter shares ([`auth`])
//! - **Offline request queue**: explicitly queued requests dispatch in FIFO
//!   order when connectivity returns ([`queue`])
//!
//! [`ApiClient`] ties the layers together behind `get`/`post`/`put`/`delete`.
//!
//! ```no_run
//! use std::sync::Arc;
//! use storesgo_client::{ApiClient, GetOptions};
//! # use storesgo_client::testing::MemoryStore;
//!
//! # async fn demo() -> Result<(), storesgo_client::ClientError> {
//! let client = ApiClient::builder().store(Arc::new(MemoryStore::new())).build()?;
//! let products: serde_json::Value =
//!     client.get("/products", GetOptions::default().cached()).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod http;
pub mod queue;
pub mod retry;
pub mod store;
pub mod testing;
pub mod time;

pub use auth::TokenPair;
pub use client::{ApiClient, ApiClientBuilder, GetOptions};
pub use config::{CacheTtlConfig, ClientConfig, RetryConfig};
pub use error::{ClientError, ErrorCategory};
pub use http::RequestDescriptor;
pub use queue::PendingRequest;
pub use store::{KeyValueStore, StoreError};
