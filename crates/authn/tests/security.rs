//! Security-focused authentication tests.
//!
//! These tests verify the verifiers' resistance to common attack vectors:
//! `alg: none` tokens, algorithm substitution, tokens minted for another
//! audience or presented by another app, expiry edges, tampered signatures
//! and malformed credentials.
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::time::Duration;

use academy_common_authn::{
    AuthError, BearerVerifier, assert_auth_error,
    header::LinkCredentials,
    jwt::{TokenClaims, issue_token},
    scope::ScopeSet,
    testutil::{Registry, generate_ed25519_keypair, link_app, signature_app},
};
use academy_common_storage::apps::{KeyPair, SigningAlgorithm};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;

const NOW: u64 = 1_760_781_600;
const SECRET: &str = "token-secret";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create a raw JWT string from header and payload JSON (with an empty signature).
fn craft_raw_jwt(header_json: &serde_json::Value, payload_json: &serde_json::Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

fn claims() -> TokenClaims {
    TokenClaims::new(None, "https://api.academy.test", "payments", "academy", NOW, Duration::from_secs(120))
}

fn verifier(registry: &Registry) -> BearerVerifier {
    BearerVerifier::new(Arc::new(registry.apps.clone()), Arc::new(registry.scopes.clone()), "academy")
}

fn hs256_registry() -> Registry {
    let registry = Registry::new();
    registry.register(link_app("payments", SigningAlgorithm::Hs256), KeyPair::shared_secret(SECRET));
    registry
}

fn link(token: String) -> LinkCredentials {
    LinkCredentials { app: "payments".into(), token }
}

// ---------------------------------------------------------------------------
// Algorithm attacks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_algorithm_none_rejected() {
    let registry = hs256_registry();
    let token = craft_raw_jwt(&json!({"alg": "none", "typ": "JWT"}), &serde_json::to_value(claims()).unwrap());

    let result = verifier(&registry).verify_at(&ScopeSet::new(), &link(token), NOW).await;
    assert_auth_error!(result, "invalid-token");
}

#[tokio::test]
async fn test_algorithm_substitution_rejected() {
    // App registered for HS256; a token signed HS512 with the same secret.
    let registry = hs256_registry();
    let token = issue_token(&claims(), SigningAlgorithm::Hs512, &KeyPair::shared_secret(SECRET)).unwrap();

    let result = verifier(&registry).verify_at(&ScopeSet::new(), &link(token), NOW).await;
    assert_auth_error!(result, "invalid-token");
}

#[tokio::test]
async fn test_algorithm_confusion_public_key_as_hmac_secret() {
    // An EdDSA app's public key is not secret; using it as an HS256 secret must fail.
    let keys = generate_ed25519_keypair();
    let public_key = keys.public_key.clone().unwrap();
    let registry = Registry::new();
    registry.register(link_app("payments", SigningAlgorithm::EdDsa), keys);

    let mut header = Header::new(Algorithm::HS256);
    header.typ = Some("JWT".into());
    let token =
        jsonwebtoken::encode(&header, &claims(), &EncodingKey::from_secret(public_key.as_bytes())).unwrap();

    let result = verifier(&registry).verify_at(&ScopeSet::new(), &link(token), NOW).await;
    assert_auth_error!(result, "invalid-token");
}

// ---------------------------------------------------------------------------
// Claim binding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_token_for_other_audience_rejected() {
    let registry = hs256_registry();
    let claims = TokenClaims { aud: "billing".into(), ..claims() };
    let token = issue_token(&claims, SigningAlgorithm::Hs256, &KeyPair::shared_secret(SECRET)).unwrap();

    let result = verifier(&registry).verify_at(&ScopeSet::new(), &link(token), NOW).await;
    assert_auth_error!(result, "invalid-token");
}

#[tokio::test]
async fn test_token_presented_by_other_app_rejected() {
    // "crm" shares the secret but the token names "payments".
    let registry = hs256_registry();
    registry.register(link_app("crm", SigningAlgorithm::Hs256), KeyPair::shared_secret(SECRET));
    let token = issue_token(&claims(), SigningAlgorithm::Hs256, &KeyPair::shared_secret(SECRET)).unwrap();

    let credentials = LinkCredentials { app: "crm".into(), token };
    let result = verifier(&registry).verify_at(&ScopeSet::new(), &credentials, NOW).await;
    assert_auth_error!(result, "invalid-token");
}

#[tokio::test]
async fn test_token_without_exp_rejected() {
    let registry = hs256_registry();
    let claims = TokenClaims { exp: None, ..claims() };
    let token = issue_token(&claims, SigningAlgorithm::Hs256, &KeyPair::shared_secret(SECRET)).unwrap();

    let result = verifier(&registry).verify_at(&ScopeSet::new(), &link(token), NOW).await;
    assert_auth_error!(result, "expired");
}

#[rstest]
#[case(NOW + 119, true)]
#[case(NOW + 120, false)]
#[case(NOW + 121, false)]
#[tokio::test]
async fn test_expiry_edge(#[case] now: u64, #[case] accepted: bool) {
    let registry = hs256_registry();
    let token = issue_token(&claims(), SigningAlgorithm::Hs256, &KeyPair::shared_secret(SECRET)).unwrap();

    let result = verifier(&registry).verify_at(&ScopeSet::new(), &link(token), now).await;
    if accepted {
        assert!(result.is_ok());
    } else {
        assert_auth_error!(result, "expired");
    }
}

// ---------------------------------------------------------------------------
// Key rotation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rotation_grace_then_retirement() {
    let registry = hs256_registry();
    let token = issue_token(&claims(), SigningAlgorithm::Hs256, &KeyPair::shared_secret(SECRET)).unwrap();

    registry.apps.rotate("payments", KeyPair::shared_secret("next-secret")).unwrap();
    let ctx = verifier(&registry).verify_at(&ScopeSet::new(), &link(token.clone()), NOW).await.unwrap();
    assert!(ctx.used_legacy_key());

    registry.apps.retire_legacy("payments").unwrap();
    let result = verifier(&registry).verify_at(&ScopeSet::new(), &link(token), NOW).await;
    assert_auth_error!(result, "invalid-token");
}

// ---------------------------------------------------------------------------
// Scheme confusion and malformed tokens
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_signature_app_cannot_use_tokens() {
    let registry = Registry::new();
    registry.register(signature_app("payments", SigningAlgorithm::Hs256), KeyPair::shared_secret(SECRET));
    let token = issue_token(&claims(), SigningAlgorithm::Hs256, &KeyPair::shared_secret(SECRET)).unwrap();

    let result = verifier(&registry).verify_at(&ScopeSet::new(), &link(token), NOW).await;
    assert_auth_error!(result, "wrong-scheme");
}

#[rstest]
#[case("only-one-part")]
#[case("two.parts")]
#[case("a.b.c.d")]
#[case("!!!.@@@.###")]
#[case("eyJhbGciOiJIUzI1NiJ9.bm90LWpzb24.")]
#[tokio::test]
async fn test_malformed_tokens_rejected(#[case] token: &str) {
    let registry = hs256_registry();
    let result = verifier(&registry).verify_at(&ScopeSet::new(), &link(token.to_owned()), NOW).await;
    assert_auth_error!(result, "invalid-token");
}

#[tokio::test]
async fn test_unknown_app_rejected_before_verification() {
    let registry = hs256_registry();
    let credentials = LinkCredentials { app: "ghost".into(), token: "x.y.z".into() };
    let result = verifier(&registry).verify_at(&ScopeSet::new(), &credentials, NOW).await;
    assert!(matches!(result, Err(AuthError::AppNotFound { .. })));
}
