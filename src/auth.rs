//! Credential storage and single-flight token refresh
//!
//! The token pair is persisted as one JSON record under a single store key,
//! so access and refresh tokens are always replaced together and can never be
//! observed half-updated.
//!
//! [`RefreshCoordinator`] guarantees at most one in-flight refresh: the
//! guarded optional handle behind a `Mutex` makes "check if a refresh is
//! in-flight" and "start a refresh" atomic with respect to each other, and
//! every concurrent caller awaits the same settled outcome.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::store::{keys, KeyValueStore, StoreError};

/// Persisted credential pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Credential persistence over the injected key-value store
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    /// Create a token store over the injected backend
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Read the persisted token pair
    ///
    /// Store failures degrade to "not authenticated" so a flaky store cannot
    /// wedge the request pipeline; the warning is left for diagnostics.
    pub async fn tokens(&self) -> Option<TokenPair> {
        let raw = match self.store.get(keys::AUTH_TOKENS).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "failed to read persisted tokens");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(pair) => Some(pair),
            Err(err) => {
                warn!(error = %err, "discarding unreadable token record");
                None
            }
        }
    }

    /// Read just the access token, for request headers
    pub async fn access_token(&self) -> Option<String> {
        self.tokens().await.map(|pair| pair.access_token)
    }

    /// Whether a credential pair is currently persisted
    pub async fn has_tokens(&self) -> bool {
        self.tokens().await.is_some()
    }

    /// Persist a new token pair, replacing both tokens atomically
    pub async fn set_tokens(&self, pair: &TokenPair) -> Result<(), StoreError> {
        let raw = serde_json::to_string(pair)
            .map_err(|err| StoreError::Backend(format!("token record serialization: {err}")))?;
        self.store.set(keys::AUTH_TOKENS, &raw).await
    }

    /// Remove all persisted credentials, including the cached user record
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store
            .remove_many(&[keys::AUTH_TOKENS.to_string(), keys::USER_DATA.to_string()])
            .await
    }
}

/// Remote refresh operation, injected so tests can run without a network
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange a refresh token for a new token pair
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ClientError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

/// Refresher calling `POST {base_url}/auth/refresh`
///
/// Uses its own bare HTTP client: the refresh call must not run through the
/// request pipeline, or a 401 on refresh would recurse into another refresh.
pub struct HttpTokenRefresher {
    http: reqwest::Client,
    refresh_url: String,
}

impl HttpTokenRefresher {
    /// Build a refresher from client configuration
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| ClientError::Config(format!("failed to build refresh client: {err}")))?;

        let refresh_url = format!("{}/auth/refresh", config.base_url.trim_end_matches('/'));
        Ok(Self { http, refresh_url })
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ClientError> {
        let response = self
            .http
            .post(&self.refresh_url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|err| ClientError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Server { status: status.as_u16(), body });
        }

        let parsed: RefreshResponse = response
            .json()
            .await
            .map_err(|err| ClientError::Serialization(err.to_string()))?;

        Ok(TokenPair { access_token: parsed.token, refresh_token: parsed.refresh_token })
    }
}

type RefreshOutcome = Result<String, ClientError>;

/// Single-flight coordinator for credential refresh
///
/// State machine: `Idle -> Refreshing -> Idle`. The `Option` inside the mutex
/// is the shared in-flight handle; it exists exactly while a refresh is
/// running and is destroyed when the refresh settles.
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    tokens: TokenStore,
    refresher: Arc<dyn TokenRefresher>,
    in_flight: Mutex<Option<broadcast::Sender<RefreshOutcome>>>,
}

impl RefreshCoordinator {
    /// Create a coordinator over the token store and refresher
    pub fn new(tokens: TokenStore, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self { inner: Arc::new(CoordinatorInner { tokens, refresher, in_flight: Mutex::new(None) }) }
    }

    /// Refresh the credentials, deduplicating concurrent callers
    ///
    /// If a refresh is already in progress, awaits that refresh's outcome
    /// instead of starting another one. On success every waiter receives the
    /// new access token; on failure persisted credentials are cleared and
    /// every waiter receives an [`ClientError::Auth`].
    ///
    /// The refresh itself runs on its own task: it settles, persists its
    /// result, and destroys the in-flight handle even if every caller
    /// awaiting it is cancelled mid-flight.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> RefreshOutcome {
        let mut waiter = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.as_ref() {
                Some(handle) => {
                    debug!("refresh already in progress; awaiting shared outcome");
                    handle.subscribe()
                }
                None => {
                    let (handle, waiter) = broadcast::channel(1);
                    *in_flight = Some(handle);

                    let inner = self.inner.clone();
                    tokio::spawn(async move {
                        let outcome = inner.run_refresh().await;
                        let mut in_flight = inner.in_flight.lock().await;
                        if let Some(handle) = in_flight.take() {
                            // No receivers is fine - it just means every
                            // caller went away before the refresh settled.
                            let _ = handle.send(outcome);
                        }
                    });
                    waiter
                }
            }
        };

        waiter
            .recv()
            .await
            .unwrap_or_else(|_| Err(ClientError::Auth("token refresh aborted".into())))
    }
}

impl CoordinatorInner {
    async fn run_refresh(&self) -> RefreshOutcome {
        let refresh_token = match self.tokens.tokens().await {
            Some(pair) => pair.refresh_token,
            None => {
                self.clear_credentials().await;
                return Err(ClientError::Auth("no refresh token available".into()));
            }
        };

        match self.refresher.refresh(&refresh_token).await {
            Ok(pair) => {
                let access_token = pair.access_token.clone();
                self.tokens
                    .set_tokens(&pair)
                    .await
                    .map_err(|err| ClientError::Storage(err.to_string()))?;
                info!("access token refreshed");
                Ok(access_token)
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed; clearing credentials");
                self.clear_credentials().await;
                Err(ClientError::Auth(format!("token refresh failed: {err}")))
            }
        }
    }

    async fn clear_credentials(&self) {
        if let Err(err) = self.tokens.clear().await {
            warn!(error = %err, "failed to clear credentials");
        }
    }
}
