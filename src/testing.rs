//! Test doubles shared by unit and integration tests
//!
//! These are part of the public API so host applications can drive the client
//! in their own test suites without a device storage backend or real time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;

use crate::auth::{TokenPair, TokenRefresher};
use crate::error::ClientError;
use crate::store::{KeyValueStore, StoreError};
use crate::time::Clock;

/// In-memory [`KeyValueStore`] with switchable failure injection
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read operation fail from now on
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write operation fail from now on
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected read failure".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_read()?;
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_write()?;
        self.entries.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check_write()?;
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn remove_many(&self, keys: &[String]) -> Result<(), StoreError> {
        self.check_write()?;
        let mut entries = self.entries.lock().unwrap();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        self.check_read()?;
        Ok(self.entries.lock().unwrap().keys().cloned().collect())
    }
}

/// Manually advanced [`Clock`] for deterministic expiry tests
pub struct MockClock {
    base_instant: Instant,
    base_system: SystemTime,
    offset_ms: AtomicU64,
}

impl Default for MockClock {
    fn default() -> Self {
        Self {
            base_instant: Instant::now(),
            base_system: SystemTime::now(),
            offset_ms: AtomicU64::new(0),
        }
    }
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward
    pub fn advance(&self, duration: Duration) {
        self.offset_ms.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn offset(&self) -> Duration {
        Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.base_instant + self.offset()
    }

    fn system_time(&self) -> SystemTime {
        self.base_system + self.offset()
    }
}

/// [`TokenRefresher`] returning a canned outcome, counting invocations
pub struct StaticRefresher {
    outcome: Result<TokenPair, ClientError>,
    delay: Option<Duration>,
    /// Number of times `refresh` has been called
    pub calls: AtomicUsize,
}

impl StaticRefresher {
    /// A refresher that always yields the given pair
    pub fn succeeding(pair: TokenPair) -> Self {
        Self { outcome: Ok(pair), delay: None, calls: AtomicUsize::new(0) }
    }

    /// A refresher that always fails with the given error
    pub fn failing(error: ClientError) -> Self {
        Self { outcome: Err(error), delay: None, calls: AtomicUsize::new(0) }
    }

    /// Delay each call, keeping the refresh in flight long enough for
    /// concurrency tests to pile up waiters
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl TokenRefresher for StaticRefresher {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone()
    }
}
