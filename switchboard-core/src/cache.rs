//! Time-bounded result cache for provider calls
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       ResultCache                        │
//! │                                                          │
//! │  get(key) -> Option<Value>      (miss when stale)        │
//! │  put(key, value)                (successful data only)   │
//! │                                                          │
//! │  Internal: RwLock<HashMap<CacheKey, CacheEntry>>         │
//! │  Key: (provider, tool, sha256(canonical_json(payload)))  │
//! │  Staleness judged against an injectable Clock            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Stale entries are never evicted, they are only treated as absent. Two
//! concurrent writers of the same key race harmlessly: each stores a complete
//! value and the last one wins.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::payload::canonical_json;

/// Source of "now" for staleness checks
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Start at the given instant
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        let step = chrono::Duration::milliseconds(by.as_millis() as i64);
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += step;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cache configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Global on/off switch
    pub enabled: bool,
    /// How long a stored result stays fresh
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    /// A configuration that never hits and never stores
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Cache key: provider, tool and a digest of the canonical payload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    provider: String,
    tool: String,
    digest: String,
}

impl CacheKey {
    /// Build the key for a call
    pub fn new(provider: &str, tool: &str, payload: &Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical_json(payload).as_bytes());
        Self {
            provider: provider.to_string(),
            tool: tool.to_string(),
            digest: format!("{:x}", hasher.finalize()),
        }
    }

    /// Provider id
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Tool name
    pub fn tool(&self) -> &str {
        &self.tool
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stored_at: DateTime<Utc>,
}

/// Shared memoization table for successful call results
#[derive(Debug)]
pub struct ResultCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl ResultCache {
    /// Create a cache driven by the wall clock
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit clock
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A cache that is switched off
    pub fn disabled() -> Self {
        Self::new(CacheConfig::disabled())
    }

    /// Whether caching is switched on
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Configured time-to-live
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Fresh value for `key`, if any
    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        if !self.config.enabled {
            return None;
        }

        let entries = self.entries.read().await;
        let entry = entries.get(key)?;

        if self.is_fresh(entry) {
            tracing::debug!(provider = %key.provider, tool = %key.tool, "result cache hit");
            Some(entry.value.clone())
        } else {
            tracing::trace!(provider = %key.provider, tool = %key.tool, "result cache entry stale");
            None
        }
    }

    /// Store a successful result
    pub async fn put(&self, key: CacheKey, value: Value) {
        if !self.config.enabled {
            return;
        }

        let entry = CacheEntry {
            value,
            stored_at: self.clock.now(),
        };
        tracing::trace!(provider = %key.provider, tool = %key.tool, "result cache store");
        self.entries.write().await.insert(key, entry);
    }

    /// Number of stored entries, stale ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if nothing has been stored
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        match (self.clock.now() - entry.stored_at).to_std() {
            Ok(age) => age < self.config.ttl,
            // Stored "in the future" (clock moved backwards)
            Err(_) => true,
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
