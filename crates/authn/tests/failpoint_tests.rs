#![allow(clippy::expect_used, clippy::panic)]
//! Integration tests for fail-point injection in the authn crate.
//!
//! These tests require both `failpoints` and `testutil` features:
//! ```bash
//! cargo test -p academy-common-authn --features failpoints,testutil --test failpoint_tests
//! ```

use std::{sync::Arc, time::Duration};

use academy_common_authn::{AppKeyCache, AuthError, testutil::{Registry, signature_app}};
use academy_common_storage::{
    StorageError,
    apps::{AppKeyStore, KeyPair, SigningAlgorithm},
};

fn setup_cache() -> (Arc<AppKeyCache>, Registry) {
    let registry = Registry::new();
    registry.register(signature_app("payments", SigningAlgorithm::Hs256), KeyPair::shared_secret("s"));
    let cache = AppKeyCache::new(Arc::new(registry.apps.clone()), Duration::from_secs(300));
    (Arc::new(cache), registry)
}

#[tokio::test]
async fn cache_fetch_failpoint_returns_error() {
    let scenario = fail::FailScenario::setup();
    let (cache, _) = setup_cache();

    fail::cfg("app-key-cache-before-fetch", "return").expect("failed to configure fail point");

    let result = cache.get_app_keys("payments").await;
    assert!(matches!(result, Err(StorageError::Internal { .. })));

    // Surfaces as a 503 at the middleware boundary.
    let err = AuthError::from(result.expect_err("fetch should fail"));
    assert_eq!(err.status_code().as_u16(), 503);

    scenario.teardown();
}

#[tokio::test]
async fn cache_hit_bypasses_failpoint() {
    let scenario = fail::FailScenario::setup();
    let (cache, _) = setup_cache();

    cache.get_app_keys("payments").await.expect("warm cache");
    fail::cfg("app-key-cache-before-fetch", "return").expect("failed to configure fail point");

    let result = cache.get_app_keys("payments").await;
    assert!(result.is_ok_and(|keys| keys.is_some()), "cached entry should be served");

    scenario.teardown();
}

#[tokio::test]
async fn cache_fetch_without_failpoint_succeeds() {
    let scenario = fail::FailScenario::setup();
    let (cache, _) = setup_cache();

    let result = cache.get_app_keys("payments").await;
    assert!(result.is_ok(), "fetch should succeed without fail point");

    scenario.teardown();
}
