//! Shared test utilities for authentication testing.
//!
//! This module provides helpers for generating Ed25519 key pairs, building
//! registered apps, wiring an in-memory registry to an [`Authenticator`] and
//! [`RequestSigner`], and asserting on error responses. It is feature-gated
//! behind `testutil` to prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! academy-common-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use academy_common_authn::testutil::{Registry, generate_ed25519_keypair};
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;

use academy_common_storage::{
    Zeroizing,
    apps::{
        App, AuthSchema, KeyPair, MemoryAppKeyStore, MemoryScopeResolver, ResolvedScopes,
        SigningAlgorithm, Strategy,
    },
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use bytes::Bytes;
use ed25519_dalek::SigningKey;
use http::{Request, Response};
use rand_core::OsRng;

use crate::{
    client::RequestSigner, config::AuthConfig, context::AuthContext, error::ErrorResponse,
    middleware::Authenticator,
};

/// Generates a fresh Ed25519 key pair in registry format.
///
/// - `public_key`: raw 32-byte key, base64url without padding
/// - `private_key`: PKCS#8 DER document, base64url without padding
pub fn generate_ed25519_keypair() -> KeyPair {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());

    let private_bytes: Zeroizing<[u8; 32]> = Zeroizing::new(signing_key.to_bytes());
    let mut pkcs8_der = Zeroizing::new(vec![
        0x30, 0x2e, // SEQUENCE, 46 bytes
        0x02, 0x01, 0x00, // INTEGER version 0
        0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
        0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
        0x04, 0x22, // OCTET STRING, 34 bytes
        0x04, 0x20, // OCTET STRING, 32 bytes (the actual key)
    ]);
    pkcs8_der.extend_from_slice(&*private_bytes);

    KeyPair::asymmetric(Some(public_key), Some(URL_SAFE_NO_PAD.encode(&*pkcs8_der)))
}

/// An app registered under the `SIGNATURE` schema and strategy.
pub fn signature_app(slug: &str, algorithm: SigningAlgorithm) -> App {
    App::builder()
        .slug(slug)
        .algorithm(algorithm)
        .strategy(Strategy::Signature)
        .schema(AuthSchema::Signature)
        .build()
}

/// An app registered under the `LINK` schema with the `JWT` strategy.
pub fn link_app(slug: &str, algorithm: SigningAlgorithm) -> App {
    App::builder().slug(slug).algorithm(algorithm).strategy(Strategy::Jwt).schema(AuthSchema::Link).build()
}

/// Test config for the local app `slug`.
pub fn config(slug: &str) -> AuthConfig {
    AuthConfig::builder().app_slug(slug).issuer("https://api.academy.test").build().expect("valid test config")
}

/// In-memory registry and scope tables shared by both sides of a call.
///
/// Inter-service calls need each app registered on both sides with the same
/// key; tests use one registry for both.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    /// App key registry.
    pub apps: MemoryAppKeyStore,
    /// Scope tables.
    pub scopes: MemoryScopeResolver,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `app` with `keys` and its declared scopes.
    pub fn register(&self, app: App, keys: KeyPair) -> &Self {
        self.scopes.set_app_scopes(
            &app.slug,
            ResolvedScopes { required: app.required_scopes.clone(), optional: app.optional_scopes.clone() },
        );
        self.apps.register(app, keys).expect("app registered once");
        self
    }

    /// An authenticator for the local app `slug`.
    pub fn authenticator(&self, slug: &str) -> Arc<Authenticator> {
        Arc::new(Authenticator::new(&config(slug), Arc::new(self.apps.clone()), Arc::new(self.scopes.clone())))
    }

    /// A request signer for the local app `slug`.
    pub fn signer(&self, slug: &str) -> RequestSigner {
        RequestSigner::new(config(slug), Arc::new(self.apps.clone()))
    }
}

/// A handler that answers 200 with the calling app's slug as body.
pub async fn echo_app(context: AuthContext, _request: Request<Bytes>) -> Response<Bytes> {
    Response::new(Bytes::from(context.app.slug.clone()))
}

/// Decodes the uniform error body of `response`.
pub fn error_body(response: &Response<Bytes>) -> ErrorResponse {
    serde_json::from_slice(response.body()).expect("uniform error body")
}

/// Asserts that a `Result<_, AuthError>` failed with the given slug.
///
/// ```no_run
/// use academy_common_authn::{AuthError, assert_auth_error};
///
/// let result: Result<(), AuthError> = Err(AuthError::expired_token());
/// assert_auth_error!(result, "expired");
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $slug:expr) => {
        match $result {
            Ok(_) => panic!("expected error '{}', got Ok", $slug),
            Err(err) => assert_eq!(err.slug(), $slug, "unexpected error: {err}"),
        }
    };
}
