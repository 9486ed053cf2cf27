//! Caching decorator for the app key registry.
//!
//! Every inbound and outbound call needs the app record and its key pairs.
//! [`AppKeyCache`] wraps any [`AppKeyStore`] with a TTL cache so the registry
//! is consulted at most once per app per TTL window.
//!
//! ```text
//! request → AppKeyCache (moka, TTL)
//!             └ miss → inner AppKeyStore → cache if registered
//! ```
//!
//! Unknown apps are never cached, so a freshly registered app is visible on
//! its first request. Rotations propagate within one TTL, or immediately
//! after [`AppKeyCache::invalidate`].

use std::{sync::Arc, time::Duration};

use academy_common_storage::{
    StorageResult,
    apps::{AppKeyStore, AppKeys},
};
use async_trait::async_trait;
use fail::fail_point;
use moka::future::Cache;

use crate::config::{AuthConfig, DEFAULT_KEY_CACHE_CAPACITY, DEFAULT_KEY_CACHE_TTL, MAX_KEY_CACHE_TTL};

/// TTL cache in front of an [`AppKeyStore`].
///
/// # Examples
///
/// ```
/// use std::{sync::Arc, time::Duration};
/// use academy_common_authn::key_cache::AppKeyCache;
/// use academy_common_storage::apps::{AppKeyStore, MemoryAppKeyStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = Arc::new(MemoryAppKeyStore::new());
/// let cache = AppKeyCache::new(registry, Duration::from_secs(300));
///
/// assert!(cache.get_app_keys("unknown").await?.is_none());
/// # Ok(())
/// # }
/// ```
pub struct AppKeyCache {
    cache: Cache<String, AppKeys>,
    inner: Arc<dyn AppKeyStore>,
}

impl AppKeyCache {
    /// Creates a cache with the default TTL and capacity.
    #[must_use]
    pub fn with_defaults(inner: Arc<dyn AppKeyStore>) -> Self {
        Self::new(inner, DEFAULT_KEY_CACHE_TTL)
    }

    /// Creates a cache sized by [`AuthConfig::key_cache_ttl`] and
    /// [`AuthConfig::key_cache_capacity`].
    #[must_use]
    pub fn from_config(config: &AuthConfig, inner: Arc<dyn AppKeyStore>) -> Self {
        Self::with_capacity(inner, config.key_cache_ttl(), config.key_cache_capacity())
    }

    /// Creates a cache with the default capacity.
    #[must_use]
    pub fn new(inner: Arc<dyn AppKeyStore>, ttl: Duration) -> Self {
        Self::with_capacity(inner, ttl, DEFAULT_KEY_CACHE_CAPACITY)
    }

    /// Creates a cache holding at most `max_capacity` apps. `ttl` is capped at
    /// [`MAX_KEY_CACHE_TTL`].
    #[must_use]
    pub fn with_capacity(inner: Arc<dyn AppKeyStore>, ttl: Duration, max_capacity: u64) -> Self {
        Self {
            cache: Cache::builder()
                .time_to_live(ttl.min(MAX_KEY_CACHE_TTL))
                .max_capacity(max_capacity)
                .build(),
            inner,
        }
    }

    /// Drops the cached entry for `slug`.
    ///
    /// An audit event is emitted at INFO level.
    #[tracing::instrument(skip(self))]
    pub async fn invalidate(&self, slug: &str) {
        self.cache.invalidate(slug).await;

        tracing::info!(
            audit.action = "invalidate_app_keys",
            audit.resource = %format_args!("app:{slug}"),
            audit.result = "success",
            "audit_event"
        );
    }

    /// Drops every cached entry.
    ///
    /// An audit event is emitted at INFO level.
    #[tracing::instrument(skip(self))]
    pub async fn clear_all(&self) {
        let evicted = self.cache.entry_count();
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;

        tracing::info!(
            audit.action = "clear_app_keys",
            audit.resource = "all_apps",
            audit.result = "success",
            audit.evicted = evicted,
            "audit_event"
        );
    }

    /// Number of cached apps (approximate until pending tasks run).
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Applies pending inserts and evictions, making counts exact.
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl std::fmt::Debug for AppKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppKeyCache").field("entries", &self.cache.entry_count()).finish_non_exhaustive()
    }
}

#[async_trait]
impl AppKeyStore for AppKeyCache {
    #[tracing::instrument(skip(self))]
    async fn get_app_keys(&self, slug: &str) -> StorageResult<Option<AppKeys>> {
        if let Some(keys) = self.cache.get(slug).await {
            tracing::debug!(cache = "hit", "app keys served from cache");
            return Ok(Some(keys));
        }
        tracing::debug!(cache = "miss", "fetching app keys");

        fail_point!("app-key-cache-before-fetch", |_| {
            Err(academy_common_storage::StorageError::internal("injected failure before app key fetch"))
        });

        let fetched = self.inner.get_app_keys(slug).await?;
        if let Some(keys) = &fetched {
            self.cache.insert(slug.to_owned(), keys.clone()).await;
        }
        Ok(fetched)
    }
}
