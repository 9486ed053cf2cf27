//! Bearer tokens for the `Link` scheme.
//!
//! A token is a JWT signed with the key of the app registry entry it is
//! addressed to. The verifier pins the algorithm to the calling app's
//! registered algorithm and the audience to the local app slug, so a token
//! minted for one service cannot be replayed against another.
//!
//! ```json
//! {
//!   "sub": "42",
//!   "iss": "https://api.academy.example",
//!   "app": "payments",
//!   "aud": "academy",
//!   "exp": 1760781720,
//!   "iat": 1760781599,
//!   "typ": "JWT"
//! }
//! ```

use std::{sync::Arc, time::Duration};

use academy_common_storage::{
    StorageError, Zeroizing,
    apps::{AppKeyStore, KeyPair, ScopeResolver, SigningAlgorithm},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use ed25519_dalek::{PUBLIC_KEY_LENGTH, VerifyingKey};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    context::{AuthContext, KeySlot},
    error::AuthError,
    header::{LinkCredentials, Scheme},
    scope::{ScopeSet, ensure_scopes},
    validation::{validate_link_admission, validate_token_algorithm},
};

/// Value of the `typ` claim.
pub const TOKEN_TYPE: &str = "JWT";

/// Bearer token claims.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User the call is made on behalf of; empty for app-to-app calls.
    #[serde(default)]
    pub sub: String,
    /// Issuer.
    pub iss: String,
    /// Calling app slug.
    pub app: String,
    /// Target app slug.
    pub aud: String,
    /// Expiration time (seconds since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    /// Issued at (seconds since epoch).
    pub iat: u64,
    /// Token type.
    #[serde(default)]
    pub typ: String,
}

impl TokenClaims {
    /// Claims for a token issued at `now` that lives for `lifetime`.
    ///
    /// `iat` is backdated by one second to absorb clock granularity between
    /// hosts.
    #[must_use]
    pub fn new(
        subject: Option<&str>,
        issuer: &str,
        app: &str,
        audience: &str,
        now: u64,
        lifetime: Duration,
    ) -> Self {
        Self {
            sub: subject.unwrap_or_default().to_owned(),
            iss: issuer.to_owned(),
            app: app.to_owned(),
            aud: audience.to_owned(),
            exp: Some(now.saturating_add(lifetime.as_secs())),
            iat: now.saturating_sub(1),
            typ: TOKEN_TYPE.to_owned(),
        }
    }

    /// Whether the token has expired at `now`. A token without `exp` is
    /// always expired.
    #[must_use]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.exp.is_none_or(|exp| exp <= now)
    }
}

/// Current Unix time in seconds.
pub(crate) fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

fn jwt_algorithm(algorithm: SigningAlgorithm) -> Algorithm {
    match algorithm {
        SigningAlgorithm::Hs256 => Algorithm::HS256,
        SigningAlgorithm::Hs512 => Algorithm::HS512,
        SigningAlgorithm::EdDsa => Algorithm::EdDSA,
    }
}

/// Builds the key that signs tokens from a registry key pair.
///
/// # Errors
///
/// Returns [`AuthError::InvalidKey`] if the pair holds no usable signing key.
pub fn encoding_key(algorithm: SigningAlgorithm, keys: &KeyPair) -> Result<EncodingKey, AuthError> {
    let key = keys.signing_key().ok_or_else(|| AuthError::invalid_key("no signing key"))?;
    match algorithm {
        SigningAlgorithm::Hs256 | SigningAlgorithm::Hs512 => Ok(EncodingKey::from_secret(key.as_bytes())),
        SigningAlgorithm::EdDsa => {
            let der: Zeroizing<Vec<u8>> = Zeroizing::new(
                URL_SAFE_NO_PAD
                    .decode(key.as_bytes())
                    .map_err(|e| AuthError::invalid_key(format!("base64 decode: {e}")))?,
            );
            Ok(EncodingKey::from_ed_der(&der))
        },
    }
}

/// Builds the key that verifies tokens from a registry key pair.
///
/// Ed25519 public keys are checked for length and curve validity before use.
///
/// # Errors
///
/// Returns [`AuthError::InvalidKey`] if the pair holds no usable verification
/// key.
pub fn decoding_key(algorithm: SigningAlgorithm, keys: &KeyPair) -> Result<DecodingKey, AuthError> {
    let key = keys.verification_key().ok_or_else(|| AuthError::invalid_key("no verification key"))?;
    match algorithm {
        SigningAlgorithm::Hs256 | SigningAlgorithm::Hs512 => Ok(DecodingKey::from_secret(key.as_bytes())),
        SigningAlgorithm::EdDsa => {
            let bytes = URL_SAFE_NO_PAD
                .decode(key.as_bytes())
                .map_err(|e| AuthError::invalid_key(format!("base64 decode: {e}")))?;
            let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
                AuthError::invalid_key(format!("expected {PUBLIC_KEY_LENGTH} bytes, got {}", bytes.len()))
            })?;
            VerifyingKey::from_bytes(&bytes)
                .map_err(|e| AuthError::invalid_key(format!("invalid Ed25519 key: {e}")))?;

            DecodingKey::from_ed_components(key).map_err(|e| AuthError::invalid_key(e.to_string()))
        },
    }
}

/// Signs `claims` with `keys` under `algorithm`.
///
/// # Errors
///
/// Returns [`AuthError::InvalidKey`] if the key material cannot sign.
pub fn issue_token(
    claims: &TokenClaims,
    algorithm: SigningAlgorithm,
    keys: &KeyPair,
) -> Result<String, AuthError> {
    let key = encoding_key(algorithm, keys)?;
    encode(&Header::new(jwt_algorithm(algorithm)), claims, &key)
        .map_err(|e| AuthError::invalid_key(format!("token signing failed: {e}")))
}

/// Verifies the signature and audience of `token`.
///
/// Expiry is not checked here; see [`TokenClaims::is_expired_at`].
///
/// # Errors
///
/// - [`AuthError::InvalidKey`] if `keys` cannot verify under `algorithm`
/// - [`AuthError::InvalidToken`] if the token does not verify
pub fn decode_token(
    token: &str,
    algorithm: SigningAlgorithm,
    keys: &KeyPair,
    audience: &str,
) -> Result<TokenClaims, AuthError> {
    let key = decoding_key(algorithm, keys)?;

    let mut validation = Validation::new(jwt_algorithm(algorithm));
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims.clear();
    validation.set_audience(&[audience]);

    decode::<TokenClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::invalid_token(e.to_string()))
}

/// Verifies `Link` credentials.
pub struct BearerVerifier {
    key_store: Arc<dyn AppKeyStore>,
    scope_resolver: Arc<dyn ScopeResolver>,
    audience: String,
}

impl BearerVerifier {
    /// Creates a verifier accepting tokens addressed to `audience` (the local
    /// app slug).
    #[must_use]
    pub fn new(
        key_store: Arc<dyn AppKeyStore>,
        scope_resolver: Arc<dyn ScopeResolver>,
        audience: impl Into<String>,
    ) -> Self {
        Self { key_store, scope_resolver, audience: audience.into() }
    }

    /// Verifies `credentials` and checks `required_scopes`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::AppNotFound`] if the app is not registered
    /// - [`AuthError::WrongScheme`] if the app may not use tokens
    /// - [`AuthError::InvalidToken`] if the token verifies under neither key,
    ///   or was minted for another app
    /// - [`AuthError::ExpiredToken`] if `exp` is absent or past
    /// - [`AuthError::AgreementNotAccepted`] / [`AuthError::ForbiddenScope`]
    ///   if the token's user lacks the required scopes
    pub async fn verify(
        &self,
        required_scopes: &ScopeSet,
        credentials: &LinkCredentials,
    ) -> Result<AuthContext, AuthError> {
        self.verify_at(required_scopes, credentials, unix_now()).await
    }

    /// [`verify`](Self::verify) against an explicit clock.
    #[tracing::instrument(skip(self, credentials), fields(app = %credentials.app))]
    pub async fn verify_at(
        &self,
        required_scopes: &ScopeSet,
        credentials: &LinkCredentials,
        now: u64,
    ) -> Result<AuthContext, AuthError> {
        let keys = self
            .key_store
            .get_app_keys(&credentials.app)
            .await?
            .ok_or_else(|| AuthError::app_not_found(&credentials.app))?;
        let app = keys.info;

        validate_link_admission(&app)?;
        validate_token_algorithm(app.algorithm)?;

        let (claims, key_slot) =
            match decode_token(&credentials.token, app.algorithm, &keys.current, &self.audience) {
                Ok(claims) => (claims, KeySlot::Current),
                Err(current_err) => match &keys.legacy {
                    Some(legacy) => {
                        match decode_token(&credentials.token, app.algorithm, legacy, &self.audience) {
                            Ok(claims) => (claims, KeySlot::Legacy),
                            Err(_) => return Err(current_err),
                        }
                    },
                    None => return Err(current_err),
                },
            };

        if claims.app != credentials.app {
            return Err(AuthError::invalid_token(format!(
                "token minted for app '{}' presented by '{}'",
                claims.app, credentials.app
            )));
        }
        if claims.is_expired_at(now) {
            return Err(AuthError::expired_token());
        }

        if app.require_an_agreement && !claims.sub.is_empty() {
            let resolved = self
                .scope_resolver
                .resolve_scopes(&app.slug, Some(&claims.sub))
                .await
                .map_err(|err| match err {
                    StorageError::NotFound { .. } => AuthError::agreement_not_accepted(&app.slug),
                    other => AuthError::from(other),
                })?;
            ensure_scopes(required_scopes, &resolved)?;
        }

        if key_slot == KeySlot::Legacy {
            tracing::warn!(app = %app.slug, "token verified with legacy key; rotation incomplete");
        }
        tracing::debug!(app = %app.slug, subject = %claims.sub, "token verified");

        Ok(AuthContext { app: Arc::new(app), token: Some(claims), scheme: Scheme::Link, key_slot })
    }
}

impl std::fmt::Debug for BearerVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerVerifier").field("audience", &self.audience).finish_non_exhaustive()
    }
}
