//! Inbound scheme dispatch and scope enforcement.
//!
//! An endpoint declares its requirement with [`enforce`], optionally pins a
//! [`Mode`], and wraps its handler:
//!
//! ```
//! use std::sync::Arc;
//! use academy_common_authn::{
//!     AuthConfig,
//!     middleware::{Authenticator, Mode, enforce},
//! };
//! use academy_common_storage::apps::{MemoryAppKeyStore, MemoryScopeResolver};
//! use bytes::Bytes;
//! use http::{Request, Response};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::builder().app_slug("academy").issuer("https://api").build()?;
//! let authenticator = Arc::new(Authenticator::new(
//!     &config,
//!     Arc::new(MemoryAppKeyStore::new()),
//!     Arc::new(MemoryScopeResolver::new()),
//! ));
//!
//! let members = enforce(["read:member"]).mode(Mode::Signature).wrap(
//!     authenticator,
//!     |ctx: academy_common_authn::AuthContext, _req: Request<Bytes>| async move {
//!         Response::new(Bytes::from(ctx.app.slug.clone()))
//!     },
//! );
//! # let _ = members;
//! # Ok(())
//! # }
//! ```
//!
//! Each request moves through `Unauthenticated → SchemeSelected →
//! Authorized | Rejected`. The `Authorization` header is parsed once into an
//! [`AuthorizationHeader`] and handed to exactly one verifier; a rejected
//! request never reaches the handler and is answered with the uniform error
//! body.

use std::{future::Future, sync::Arc};

use academy_common_storage::apps::{AppKeyStore, ScopeResolver};
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response, header::AUTHORIZATION};

use crate::{
    config::AuthConfig,
    context::AuthContext,
    error::AuthError,
    header::{AuthorizationHeader, Scheme},
    jwt::BearerVerifier,
    replay::ReplayDetector,
    scope::{ScopeSet, scope_set},
    signature::SignatureVerifier,
};

/// Pins an endpoint, or an outbound service, to one scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Only `Link` bearer tokens.
    Jwt,
    /// Only `Signature` credentials; apps with the `JWT` strategy may sign.
    Signature,
}

/// Dispatches requests to the bearer or signature verifier.
#[derive(Debug)]
pub struct Authenticator {
    bearer: BearerVerifier,
    signature: SignatureVerifier,
}

impl Authenticator {
    /// Creates an authenticator for the local app described by `config`.
    #[must_use]
    pub fn new(
        config: &AuthConfig,
        key_store: Arc<dyn AppKeyStore>,
        scope_resolver: Arc<dyn ScopeResolver>,
    ) -> Self {
        Self {
            bearer: BearerVerifier::new(
                Arc::clone(&key_store),
                Arc::clone(&scope_resolver),
                config.app_slug(),
            ),
            signature: SignatureVerifier::new(key_store, scope_resolver)
                .with_tolerance(config.signature_tolerance()),
        }
    }

    /// Enables replay detection for request signatures.
    #[must_use]
    pub fn with_replay_detector(mut self, detector: Arc<dyn ReplayDetector>) -> Self {
        self.signature = self.signature.with_replay_detector(detector);
        self
    }

    /// The bearer verifier.
    #[must_use]
    pub fn bearer(&self) -> &BearerVerifier {
        &self.bearer
    }

    /// The signature verifier.
    #[must_use]
    pub fn signature(&self) -> &SignatureVerifier {
        &self.signature
    }

    /// Authenticates `request` against `required_scopes`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NoAuthorizationHeader`] if the header is missing
    /// - [`AuthError::UnknownOrForbiddenScheme`] if the scheme is unknown or
    ///   excluded by `mode`
    /// - any error of the selected verifier
    pub async fn authenticate(
        &self,
        request: &Request<Bytes>,
        required_scopes: &ScopeSet,
        mode: Option<Mode>,
    ) -> Result<AuthContext, AuthError> {
        let value = request
            .headers()
            .get(AUTHORIZATION)
            .ok_or(AuthError::NoAuthorizationHeader)?
            .to_str()
            .map_err(|_| AuthError::malformed_credentials("Authorization header is not ASCII"))?;

        // The mode pin is decided on the prefix alone, before the credentials are parsed.
        match Scheme::from_header(value) {
            Some(scheme) if admits(mode, scheme) => {},
            _ => return Err(AuthError::UnknownOrForbiddenScheme),
        }

        match AuthorizationHeader::parse(value)? {
            AuthorizationHeader::Link(creds) => self.bearer.verify(required_scopes, &creds).await,
            AuthorizationHeader::Signature(creds) => {
                let allow_jwt_strategy = mode == Some(Mode::Signature);
                self.signature.verify(request, required_scopes, &creds, allow_jwt_strategy).await
            },
        }
    }
}

fn admits(mode: Option<Mode>, scheme: Scheme) -> bool {
    matches!(
        (mode, scheme),
        (None, _) | (Some(Mode::Jwt), Scheme::Link) | (Some(Mode::Signature), Scheme::Signature)
    )
}

/// A request handler running behind a [`ScopeGuard`].
///
/// Implemented for any `Fn(AuthContext, Request<Bytes>) -> impl Future`.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handles an authenticated request.
    async fn call(&self, context: AuthContext, request: Request<Bytes>) -> Response<Bytes>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(AuthContext, Request<Bytes>) -> Fut + Send + Sync,
    Fut: Future<Output = Response<Bytes>> + Send + 'static,
{
    async fn call(&self, context: AuthContext, request: Request<Bytes>) -> Response<Bytes> {
        (self)(context, request).await
    }
}

/// Declares the scopes an endpoint requires.
pub fn enforce<I, S>(scopes: I) -> ScopeGuard
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ScopeGuard { scopes: scope_set(scopes), mode: None }
}

/// Scope requirement of one endpoint. See [`enforce`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeGuard {
    scopes: ScopeSet,
    mode: Option<Mode>,
}

impl ScopeGuard {
    /// Pins the endpoint to one scheme.
    #[must_use]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Required scopes.
    #[must_use]
    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    /// Pinned mode, if any.
    #[must_use]
    pub fn pinned_mode(&self) -> Option<Mode> {
        self.mode
    }

    /// Authenticates `request` against this requirement.
    ///
    /// # Errors
    ///
    /// See [`Authenticator::authenticate`].
    pub async fn check(
        &self,
        authenticator: &Authenticator,
        request: &Request<Bytes>,
    ) -> Result<AuthContext, AuthError> {
        authenticator.authenticate(request, &self.scopes, self.mode).await
    }

    /// Composes this requirement with `handler`.
    #[must_use]
    pub fn wrap<H: Handler>(self, authenticator: Arc<Authenticator>, handler: H) -> Guarded<H> {
        Guarded { guard: self, authenticator, handler }
    }
}

/// A handler behind a [`ScopeGuard`].
pub struct Guarded<H> {
    guard: ScopeGuard,
    authenticator: Arc<Authenticator>,
    handler: H,
}

impl<H: Handler> Guarded<H> {
    /// Authenticates `request`, then runs the handler; rejected requests get
    /// the uniform error response.
    #[tracing::instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
    pub async fn call(&self, request: Request<Bytes>) -> Response<Bytes> {
        match self.guard.check(&self.authenticator, &request).await {
            Ok(context) => self.handler.call(context, request).await,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    detail = err.slug(),
                    transient = err.is_transient(),
                    "request rejected"
                );
                err.into_response()
            },
        }
    }

    /// The requirement in front of the handler.
    #[must_use]
    pub fn guard(&self) -> &ScopeGuard {
        &self.guard
    }
}

impl<H> std::fmt::Debug for Guarded<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guarded").field("guard", &self.guard).finish_non_exhaustive()
    }
}
