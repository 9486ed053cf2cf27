//! # Academy Common Authentication
//!
//! Inter-service authentication for academy services.
//!
//! This crate provides:
//! - **Request signatures**: HMAC over a canonical request (`Signature` scheme)
//! - **Bearer tokens**: short-lived JWTs addressed to one app (`Link` scheme)
//! - **Scope enforcement**: per-endpoint scope requirements checked against the caller's resolved
//!   scopes
//! - **Outbound signing**: a client that produces either credential for a target app
//!
//! ## Features
//!
//! - Keys come from an injected [`AppKeyStore`](academy_common_storage::apps::AppKeyStore), with an
//!   optional TTL cache in front
//! - Key rotation: a legacy key keeps verifying until retired, and every use of it is logged
//! - Opt-in replay detection for signatures
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use academy_common_authn::{
//!     AuthConfig,
//!     key_cache::AppKeyCache,
//!     middleware::{Authenticator, enforce},
//! };
//! use academy_common_storage::apps::{MemoryAppKeyStore, MemoryScopeResolver};
//! use bytes::Bytes;
//! use http::{Request, Response};
//!
//! # async fn example(request: Request<Bytes>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::builder().app_slug("academy").issuer("https://api").build()?;
//! let registry = Arc::new(AppKeyCache::from_config(&config, Arc::new(MemoryAppKeyStore::new())));
//! let authenticator =
//!     Arc::new(Authenticator::new(&config, registry, Arc::new(MemoryScopeResolver::new())));
//!
//! let endpoint = enforce(["read:member"]).wrap(
//!     authenticator,
//!     |ctx: academy_common_authn::AuthContext, _req: Request<Bytes>| async move {
//!         Response::new(Bytes::from(format!("hello {}", ctx.app.slug)))
//!     },
//! );
//! let response = endpoint.call(request).await;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Canonical request payload and HMAC digests.
pub mod canonical;
/// Outbound request signing.
pub mod client;
/// Configuration.
pub mod config;
/// The authenticated caller.
pub mod context;
/// Authentication error types.
pub mod error;
/// `Authorization` header grammar.
pub mod header;
/// Bearer tokens.
pub mod jwt;
/// Caching decorator for the app key registry.
pub mod key_cache;
/// Scheme dispatch and scope enforcement.
pub mod middleware;
/// Signature replay detection.
pub mod replay;
/// Endpoint scope requirements.
pub mod scope;
/// Signature verification.
pub mod signature;
/// Shared test utilities (requires the `testutil` feature).
#[cfg(feature = "testutil")]
pub mod testutil;
/// Pre-verification checks.
pub mod validation;

// Re-export key types for convenience
pub use client::{RequestSigner, Service, ServiceOptions};
pub use config::{AuthConfig, ConfigError};
pub use context::{AuthContext, KeySlot};
pub use error::{AuthError, ErrorResponse, Result};
pub use header::{AuthorizationHeader, Scheme};
pub use jwt::{BearerVerifier, TokenClaims};
pub use key_cache::AppKeyCache;
pub use middleware::{Authenticator, Guarded, Handler, Mode, ScopeGuard, enforce};
pub use replay::{InMemoryReplayDetector, ReplayDetector};
pub use scope::ScopeSet;
pub use signature::SignatureVerifier;
