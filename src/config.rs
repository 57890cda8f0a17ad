//! Client configuration
//!
//! Plain configuration structs with sensible defaults. Everything is
//! overridable at construction time; there is no ambient global lookup.

use std::time::Duration;

/// Configuration for the StoresGo client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL for the API (e.g., "https://storesgo.com/api")
    pub base_url: String,
    /// Timeout applied to every network call; a timeout is classified as a
    /// network-level failure and feeds the retry policy.
    pub timeout: Duration,
    /// Value for the `X-Client` identifier header
    pub client_name: String,
    /// Value for the `X-Client-Version` header
    pub client_version: String,
    /// Retry policy parameters for network-level failures
    pub retry: RetryConfig,
    /// Per-resource-class cache TTL defaults
    pub cache_ttl: CacheTtlConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://storesgo.com/api".to_string(),
            timeout: Duration::from_secs(15),
            client_name: "mobile-app".to_string(),
            client_version: "1.0.0".to_string(),
            retry: RetryConfig::default(),
            cache_ttl: CacheTtlConfig::default(),
        }
    }
}

/// Retry policy parameters
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3, base_delay: Duration::from_secs(1) }
    }
}

/// Cache TTL defaults by resource class
///
/// Individual requests may override these via
/// [`GetOptions::cache_ttl`](crate::client::GetOptions).
#[derive(Debug, Clone)]
pub struct CacheTtlConfig {
    /// Read-mostly catalog data
    pub products: Duration,
    /// Rarely-changing taxonomy data
    pub categories: Duration,
    /// User profile data
    pub user_profile: Duration,
    /// Cart contents
    pub cart: Duration,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            products: Duration::from_secs(5 * 60),
            categories: Duration::from_secs(30 * 60),
            user_profile: Duration::from_secs(10 * 60),
            cart: Duration::from_secs(60),
        }
    }
}
