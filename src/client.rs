//! Client orchestrator
//!
//! The public façade wiring cache, retry, token refresh, offline queue, and
//! connectivity into one request pipeline:
//!
//! cache lookup -> offline fast path -> dispatch -> on 401, single-flight
//! refresh and one re-dispatch -> on network failure, exponential backoff ->
//! on success, cache store.
//!
//! There is no global singleton: construct an [`ApiClient`] with its injected
//! store (and, in tests, clock and refresher) via [`ApiClient::builder`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::auth::{HttpTokenRefresher, RefreshCoordinator, TokenPair, TokenRefresher, TokenStore};
use crate::cache::{cache_key, CacheManager};
use crate::config::ClientConfig;
use crate::connectivity::{ConnectivityMonitor, Transition};
use crate::error::ClientError;
use crate::http::{DispatchError, HttpTransport, RequestDescriptor};
use crate::queue::{PendingRequest, QueueDispatcher, RequestQueue};
use crate::retry::RetryPolicy;
use crate::store::KeyValueStore;
use crate::time::{Clock, SystemClock};

/// Options recognized by cached GET requests
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Query parameters
    pub params: Vec<(String, String)>,
    /// Enable the cache path (off by default)
    pub cache: bool,
    /// TTL for the cached response; defaults to the products-class TTL
    pub cache_ttl: Option<Duration>,
    /// Bypass the cache read; a successful response is still written back
    pub force_refresh: bool,
}

impl GetOptions {
    /// Set query parameters
    pub fn params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    /// Enable caching with the default TTL
    pub fn cached(mut self) -> Self {
        self.cache = true;
        self
    }

    /// Enable caching with an explicit TTL
    pub fn cached_for(mut self, ttl: Duration) -> Self {
        self.cache = true;
        self.cache_ttl = Some(ttl);
        self
    }

    /// Skip the cache read while keeping the cache write
    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }
}

/// Resilient API client for the StoresGo backend
///
/// Cheap to clone; clones share the same cache, queue, credentials, and
/// connectivity state.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<HttpTransport>,
    cache: Arc<CacheManager>,
    tokens: TokenStore,
    refresh: Arc<RefreshCoordinator>,
    queue: Arc<RequestQueue>,
    connectivity: Arc<ConnectivityMonitor>,
    retry: RetryPolicy,
    config: Arc<ClientConfig>,
}

impl ApiClient {
    /// Start building a client
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Execute a GET request
    ///
    /// With caching enabled, a fresh cached response short-circuits the
    /// network entirely. While offline, any cached value (stale included) is
    /// served; with nothing cached the call fails as a network error without
    /// dispatching.
    #[instrument(skip(self, options), fields(path = %path))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: GetOptions,
    ) -> Result<T, ClientError> {
        let key = cache_key(&Method::GET, path, &options.params);

        if options.cache && !options.force_refresh {
            if let Some(value) = self.cache.get(&key).await {
                debug!("cache hit");
                return deserialize(value);
            }
        }

        if !self.connectivity.is_reachable() {
            if let Some(value) = self.cache.get_any(&key).await {
                info!("offline; serving cached response");
                return deserialize(value);
            }
            return Err(ClientError::Network("offline with no cached response".into()));
        }

        let descriptor = RequestDescriptor::get(path).with_params(options.params.clone());
        let value = self.execute(&descriptor).await?;

        if options.cache {
            let ttl = options.cache_ttl.unwrap_or(self.config.cache_ttl.products);
            self.cache.set(&key, value.clone(), ttl).await;
        }

        deserialize(value)
    }

    /// Execute a POST request; fails fast as a network error while offline
    #[instrument(skip(self, body), fields(path = %path))]
    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let body = to_value(body)?;
        self.mutate(RequestDescriptor::post(path, body)).await
    }

    /// Execute a PUT request; fails fast as a network error while offline
    #[instrument(skip(self, body), fields(path = %path))]
    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let body = to_value(body)?;
        self.mutate(RequestDescriptor::put(path, body)).await
    }

    /// Execute a DELETE request; fails fast as a network error while offline
    #[instrument(skip(self), fields(path = %path))]
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.mutate(RequestDescriptor::delete(path)).await
    }

    async fn mutate<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<T, ClientError> {
        if !self.connectivity.is_reachable() {
            return Err(ClientError::Network("offline".into()));
        }
        let value = self.execute(&descriptor).await?;
        deserialize(value)
    }

    /// Dispatch with the full resilience pipeline
    ///
    /// One refresh-and-retry per request on 401; exponential backoff on
    /// network-level failures until the retry policy is exhausted; any other
    /// HTTP error status surfaces immediately.
    async fn execute(&self, descriptor: &RequestDescriptor) -> Result<Value, ClientError> {
        let mut retried_for_auth = false;
        let mut attempt: u32 = 0;

        loop {
            let token = self.tokens.access_token().await;
            match self.transport.dispatch(descriptor, token.as_deref()).await {
                Ok(value) => return Ok(value),
                Err(DispatchError::Status { status: 401, .. }) if !retried_for_auth => {
                    retried_for_auth = true;
                    info!(path = %descriptor.path, "received 401; refreshing access token");
                    // A failed refresh has already cleared credentials.
                    self.refresh.refresh().await?;
                }
                Err(DispatchError::Status { status, body }) => {
                    return Err(ClientError::Server { status, body });
                }
                Err(DispatchError::Decode(message)) => {
                    return Err(ClientError::Serialization(message));
                }
                Err(DispatchError::Transport(message)) => {
                    if !self.retry.should_retry(attempt) {
                        warn!(
                            path = %descriptor.path,
                            attempts = attempt + 1,
                            "network retries exhausted"
                        );
                        return Err(ClientError::Network(message));
                    }
                    let delay = self.retry.delay_for(attempt);
                    debug!(
                        path = %descriptor.path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "network failure; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Queue a request for dispatch on the next reconnect
    ///
    /// Mutating helpers fail fast while offline; callers that want offline
    /// queuing opt in per request through this surface.
    pub async fn enqueue(&self, descriptor: RequestDescriptor) -> PendingRequest {
        self.queue.enqueue(descriptor).await
    }

    /// Number of requests waiting for reconnect
    pub async fn queue_len(&self) -> usize {
        self.queue.len().await
    }

    /// Discard queued requests, rejecting their handles with `Cancelled`
    pub async fn clear_queue(&self) {
        self.queue.clear().await;
    }

    /// Feed a connectivity observer event into the client
    ///
    /// An unreachable-to-reachable transition starts a queue drain on a
    /// background task; every other event only updates state. The drain never
    /// holds up the observer path, so a later unreachable event takes effect
    /// immediately even while queued entries are still being retried.
    pub async fn handle_connectivity(&self, reachable: bool) {
        match self.connectivity.update(reachable) {
            Transition::CameOnline => {
                info!("connectivity restored; draining request queue");
                let client = self.clone();
                tokio::spawn(async move { client.queue.drain(&client).await });
            }
            Transition::WentOffline => info!("connectivity lost"),
            Transition::None => {}
        }
    }

    /// Consume a connectivity event stream on a background task
    pub fn watch_connectivity(
        &self,
        mut events: mpsc::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            while let Some(reachable) = events.recv().await {
                client.handle_connectivity(reachable).await;
            }
        })
    }

    /// Current reachability as last reported by the observer
    pub fn is_connected(&self) -> bool {
        self.connectivity.is_reachable()
    }

    /// Remove every cached response whose key contains the given substring
    pub async fn invalidate_cache(&self, pattern: &str) {
        self.cache.invalidate(pattern).await;
    }

    /// Drop the in-process cache tier
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Persist a credential pair (after login or registration)
    pub async fn set_tokens(&self, pair: &TokenPair) -> Result<(), ClientError> {
        self.tokens.set_tokens(pair).await.map_err(|err| ClientError::Storage(err.to_string()))
    }

    /// Remove persisted credentials (logout)
    pub async fn clear_tokens(&self) -> Result<(), ClientError> {
        self.tokens.clear().await.map_err(|err| ClientError::Storage(err.to_string()))
    }

    /// Whether a credential pair is persisted
    pub async fn has_tokens(&self) -> bool {
        self.tokens.has_tokens().await
    }
}

#[async_trait]
impl QueueDispatcher for ApiClient {
    async fn dispatch_queued(&self, descriptor: &RequestDescriptor) -> Result<Value, ClientError> {
        self.execute(descriptor).await
    }
}

fn deserialize<T: DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(|err| ClientError::Serialization(err.to_string()))
}

fn to_value<B: Serialize>(body: &B) -> Result<Value, ClientError> {
    serde_json::to_value(body).map_err(|err| ClientError::Serialization(err.to_string()))
}

/// Builder for [`ApiClient`]
#[derive(Default)]
pub struct ApiClientBuilder {
    config: Option<ClientConfig>,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl ApiClientBuilder {
    /// Set the client configuration
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the persistent key-value store (required)
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the clock (tests inject a mock)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Override the token refresher (tests inject a static one)
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the store is missing or the HTTP
    /// transport cannot be constructed.
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let config = self.config.unwrap_or_default();
        let store =
            self.store.ok_or_else(|| ClientError::Config("persistent store not set".into()))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let transport = Arc::new(HttpTransport::new(&config, clock.clone())?);
        let cache = Arc::new(CacheManager::new(store.clone(), clock));
        let tokens = TokenStore::new(store);
        let refresher = match self.refresher {
            Some(refresher) => refresher,
            None => Arc::new(HttpTokenRefresher::new(&config)?),
        };
        let refresh = Arc::new(RefreshCoordinator::new(tokens.clone(), refresher));
        let retry = RetryPolicy::new(&config.retry);

        Ok(ApiClient {
            transport,
            cache,
            tokens,
            refresh,
            queue: Arc::new(RequestQueue::new()),
            connectivity: Arc::new(ConnectivityMonitor::new()),
            retry,
            config: Arc::new(config),
        })
    }
}
