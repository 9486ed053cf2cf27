//! Replay detection for request signatures.
//!
//! A signature stays valid for as long as its `Date` is inside the tolerance
//! window on either side of the server clock, so the same signed request can be
//! presented again until then. An attached [`ReplayDetector`] closes that gap:
//! the verifier marks `"<app>:<nonce>"` after the HMAC and timestamp checks pass,
//! for twice the tolerance, and a second mark of the same key fails.
//!
//! Nothing is tracked unless a detector is attached to the
//! [`SignatureVerifier`](crate::signature::SignatureVerifier) (or through
//! [`Authenticator::with_replay_detector`](crate::middleware::Authenticator::with_replay_detector)).
//!
//! ```no_run
//! use std::sync::Arc;
//! use academy_common_authn::{AuthConfig, replay::InMemoryReplayDetector};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::builder().app_slug("academy").issuer("https://api").build()?;
//! let detector = Arc::new(InMemoryReplayDetector::from_config(&config));
//! # let _ = detector;
//! # Ok(())
//! # }
//! ```

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::{future::Cache, policy::EvictionPolicy};

use crate::{config::AuthConfig, error::AuthError};

/// Longest time a single key is remembered.
pub const MAX_NONCE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Records signature keys and refuses the second presentation of one.
#[async_trait]
pub trait ReplayDetector: Send + Sync {
    /// Marks `key` as seen for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ReplayedRequest`] if `key` is already marked.
    async fn check_and_mark(&self, key: &str, ttl: Duration) -> Result<(), AuthError>;
}

/// Each entry lives until the instant stored as its value.
struct UntilInstant;

impl moka::Expiry<String, Instant> for UntilInstant {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Instant,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(value.saturating_duration_since(created_at))
    }
}

/// [`ReplayDetector`] over a bounded [`moka::future::Cache`].
///
/// When full, the least recently used key is dropped first. A dropped key can
/// be replayed, so size the capacity for the peak number of signed requests
/// per `2 × tolerance`.
pub struct InMemoryReplayDetector {
    seen: Cache<String, Instant>,
}

impl InMemoryReplayDetector {
    /// Creates a detector tracking at most `max_capacity` keys.
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        let seen = Cache::builder()
            .max_capacity(max_capacity)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(UntilInstant)
            .build();
        Self { seen }
    }

    /// Creates a detector sized by [`AuthConfig::replay_capacity`].
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.replay_capacity())
    }

    /// Number of tracked keys. Approximate until pending maintenance runs.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.seen.entry_count()
    }
}

impl std::fmt::Debug for InMemoryReplayDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryReplayDetector").field("entries", &self.seen.entry_count()).finish()
    }
}

#[async_trait]
impl ReplayDetector for InMemoryReplayDetector {
    async fn check_and_mark(&self, key: &str, ttl: Duration) -> Result<(), AuthError> {
        let expires_at = Instant::now() + ttl.min(MAX_NONCE_TTL);
        // `or_insert` resolves concurrent marks of one key to a single fresh entry.
        let entry = self.seen.entry(key.to_owned()).or_insert(expires_at).await;

        if !entry.is_fresh() {
            tracing::warn!(key, "signature presented twice");
            return Err(AuthError::ReplayedRequest);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::DEFAULT_SIGNATURE_TOLERANCE;

    const NONCE: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    fn window() -> Duration {
        DEFAULT_SIGNATURE_TOLERANCE * 2
    }

    #[tokio::test]
    async fn test_signature_marked_once() {
        let detector = InMemoryReplayDetector::new(16);
        let key = format!("payments:{NONCE}");

        detector.check_and_mark(&key, window()).await.unwrap();
        assert!(matches!(
            detector.check_and_mark(&key, window()).await,
            Err(AuthError::ReplayedRequest)
        ));
    }

    #[tokio::test]
    async fn test_nonce_scoped_by_app() {
        // Two callers sharing a secret can produce the same digest.
        let detector = InMemoryReplayDetector::new(16);
        detector.check_and_mark(&format!("payments:{NONCE}"), window()).await.unwrap();
        assert!(detector.check_and_mark(&format!("crm:{NONCE}"), window()).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_presentations_admit_one() {
        let detector = Arc::new(InMemoryReplayDetector::new(16));
        let key = format!("payments:{NONCE}");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let detector = Arc::clone(&detector);
                let key = key.clone();
                tokio::spawn(async move { detector.check_and_mark(&key, window()).await.is_ok() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn test_key_forgotten_after_window() {
        let detector = InMemoryReplayDetector::new(16);
        detector.check_and_mark("payments:short", Duration::from_millis(40)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        detector.seen.run_pending_tasks().await;

        assert!(detector.check_and_mark("payments:short", window()).await.is_ok());
    }

    #[tokio::test]
    async fn test_oversized_ttl_capped() {
        let detector = InMemoryReplayDetector::new(16);
        detector.check_and_mark("payments:forever", Duration::MAX).await.unwrap();
        assert!(detector.check_and_mark("payments:forever", Duration::MAX).await.is_err());
    }

    #[tokio::test]
    async fn test_capacity_from_config() {
        let config = AuthConfig::builder()
            .app_slug("academy")
            .issuer("https://api")
            .replay_capacity(2)
            .build()
            .unwrap();
        let detector = InMemoryReplayDetector::from_config(&config);

        for n in 0..5 {
            detector.check_and_mark(&format!("payments:{n:02x}"), window()).await.unwrap();
        }
        detector.seen.run_pending_tasks().await;
        assert!(detector.entry_count() <= 2);
    }
}
