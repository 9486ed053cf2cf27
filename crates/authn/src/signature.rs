//! Verification of `Signature` credentials.
//!
//! ```text
//! credentials → app lookup → schema/strategy → algorithm
//!             → canonical payload → HMAC (current, then legacy)
//!             → timestamp window → [replay] → scopes
//! ```

use std::{sync::Arc, time::Duration};

use academy_common_storage::{
    StorageError,
    apps::{AppKeyStore, KeyPair, ResolvedScopes, ScopeResolver, SigningAlgorithm},
};
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use http::Request;

use crate::{
    canonical::CanonicalRequest,
    config::{DEFAULT_SIGNATURE_TOLERANCE, MAX_SIGNATURE_TOLERANCE},
    context::{AuthContext, KeySlot},
    error::AuthError,
    header::{Scheme, SignatureCredentials},
    replay::ReplayDetector,
    scope::{ScopeSet, ensure_scopes},
    validation::{validate_signature_admission, validate_signature_algorithm},
};

/// Parses a signature `Date`.
///
/// RFC 3339 is expected; an ISO-8601 timestamp without an offset is read as
/// UTC.
///
/// # Errors
///
/// Returns [`AuthError::BadTimestamp`] if the value parses as neither.
pub fn parse_timestamp(date: &str) -> Result<DateTime<Utc>, AuthError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(date) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| AuthError::bad_timestamp(format!("unparsable Date '{date}': {e}")))
}

/// Verifies HMAC request signatures.
pub struct SignatureVerifier {
    key_store: Arc<dyn AppKeyStore>,
    scope_resolver: Arc<dyn ScopeResolver>,
    tolerance: Duration,
    replay_detector: Option<Arc<dyn ReplayDetector>>,
}

impl SignatureVerifier {
    /// Creates a verifier with the default ±2 minute tolerance and no replay
    /// detection.
    #[must_use]
    pub fn new(key_store: Arc<dyn AppKeyStore>, scope_resolver: Arc<dyn ScopeResolver>) -> Self {
        Self { key_store, scope_resolver, tolerance: DEFAULT_SIGNATURE_TOLERANCE, replay_detector: None }
    }

    /// Sets the accepted clock skew, capped at [`MAX_SIGNATURE_TOLERANCE`].
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance.min(MAX_SIGNATURE_TOLERANCE);
        self
    }

    /// Rejects a second presentation of the same `(app, nonce)` within twice
    /// the tolerance window.
    #[must_use]
    pub fn with_replay_detector(mut self, detector: Arc<dyn ReplayDetector>) -> Self {
        self.replay_detector = Some(detector);
        self
    }

    /// Accepted clock skew.
    #[must_use]
    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Verifies `credentials` for `request` and checks `required_scopes`.
    ///
    /// `allow_jwt_strategy` admits apps whose strategy is `JWT`; it is set
    /// when the endpoint is pinned to signature mode.
    ///
    /// # Errors
    ///
    /// - [`AuthError::AppNotFound`] if the app is not registered
    /// - [`AuthError::WrongScheme`] if the app may not sign requests
    /// - [`AuthError::UnsupportedAlgorithm`] for non-HMAC apps
    /// - [`AuthError::InvalidSignature`] if neither key reproduces the nonce
    /// - [`AuthError::BadTimestamp`] if `Date` is unparsable or outside the
    ///   tolerance
    /// - [`AuthError::ReplayedRequest`] if replay detection is on and the
    ///   nonce was seen
    /// - [`AuthError::ForbiddenScope`] if the app lacks a required scope
    pub async fn verify(
        &self,
        request: &Request<Bytes>,
        required_scopes: &ScopeSet,
        credentials: &SignatureCredentials,
        allow_jwt_strategy: bool,
    ) -> Result<AuthContext, AuthError> {
        self.verify_at(request, required_scopes, credentials, allow_jwt_strategy, Utc::now()).await
    }

    /// [`verify`](Self::verify) against an explicit clock.
    #[tracing::instrument(
        skip(self, request, credentials),
        fields(app = %credentials.app, method = %request.method(), path = %request.uri().path())
    )]
    pub async fn verify_at(
        &self,
        request: &Request<Bytes>,
        required_scopes: &ScopeSet,
        credentials: &SignatureCredentials,
        allow_jwt_strategy: bool,
        now: DateTime<Utc>,
    ) -> Result<AuthContext, AuthError> {
        let keys = self
            .key_store
            .get_app_keys(&credentials.app)
            .await?
            .ok_or_else(|| AuthError::app_not_found(&credentials.app))?;
        let app = keys.info;

        validate_signature_admission(&app, allow_jwt_strategy)?;
        validate_signature_algorithm(app.algorithm)?;

        let canonical = CanonicalRequest::from_request(
            &credentials.date,
            &credentials.app,
            request,
            &credentials.signed_headers,
        );

        let key_slot = if matches_key(&canonical, app.algorithm, &keys.current, &credentials.nonce)? {
            KeySlot::Current
        } else if let Some(legacy) = &keys.legacy
            && matches_key(&canonical, app.algorithm, legacy, &credentials.nonce)?
        {
            KeySlot::Legacy
        } else {
            return Err(AuthError::invalid_signature());
        };

        self.check_timestamp(&credentials.date, now)?;

        if let Some(detector) = &self.replay_detector {
            let key = format!("{}:{}", app.slug, credentials.nonce.to_ascii_lowercase());
            detector.check_and_mark(&key, self.tolerance.saturating_mul(2)).await?;
        }

        if app.require_an_agreement {
            let resolved = match self.scope_resolver.resolve_scopes(&app.slug, None).await {
                Ok(resolved) => resolved,
                Err(StorageError::NotFound { .. }) => ResolvedScopes::default(),
                Err(other) => return Err(other.into()),
            };
            ensure_scopes(required_scopes, &resolved)?;
        }

        if key_slot == KeySlot::Legacy {
            tracing::warn!(app = %app.slug, "signature verified with legacy key; rotation incomplete");
        }
        tracing::debug!(app = %app.slug, "signature verified");

        Ok(AuthContext { app: Arc::new(app), token: None, scheme: Scheme::Signature, key_slot })
    }

    fn check_timestamp(&self, date: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        let signed_at = parse_timestamp(date)?;
        let skew = (now - signed_at).abs();
        let tolerance = chrono::Duration::from_std(self.tolerance).unwrap_or(chrono::Duration::MAX);
        if skew > tolerance {
            return Err(AuthError::bad_timestamp(format!(
                "Date is {}s away from server time (tolerance {}s)",
                skew.num_seconds(),
                self.tolerance.as_secs()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("tolerance", &self.tolerance)
            .field("replay_detection", &self.replay_detector.is_some())
            .finish_non_exhaustive()
    }
}

/// A pair without key material never matches.
fn matches_key(
    canonical: &CanonicalRequest,
    algorithm: SigningAlgorithm,
    keys: &KeyPair,
    nonce: &str,
) -> Result<bool, AuthError> {
    match keys.verification_key() {
        Some(key) => canonical.verify(algorithm, key.as_bytes(), nonce),
        None => Ok(false),
    }
}
