//! Authentication error types.
//!
//! Every failure is raised as an [`AuthError`] at the point of detection and
//! rendered as the uniform [`ErrorResponse`] only at the middleware boundary.

use academy_common_storage::StorageError;
use bytes::Bytes;
use http::{Response, StatusCode, header};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authentication and authorization errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The request carries no `Authorization` header.
    #[error("Missing Authorization header")]
    NoAuthorizationHeader,

    /// The header is present but violates the credential grammar.
    #[error("Malformed credentials: {message}")]
    MalformedCredentials {
        /// What was wrong with the credentials.
        message: String,
    },

    /// The app is not allowed to use the scheme it presented.
    #[error("Wrong scheme for app {app}: {message}")]
    WrongScheme {
        /// Calling app slug.
        app: String,
        /// Why the scheme was refused.
        message: String,
    },

    /// Neither a `Link` nor a `Signature` header, or the scheme is pinned off
    /// for this endpoint.
    #[error("Unknown or forbidden authorization scheme")]
    UnknownOrForbiddenScheme,

    /// No app is registered under the presented slug.
    #[error("App not found: {app}")]
    AppNotFound {
        /// Slug that was presented.
        app: String,
    },

    /// The app's algorithm is not implemented for this scheme.
    #[error("Unsupported algorithm: {message}")]
    UnsupportedAlgorithm {
        /// Description of the rejected algorithm.
        message: String,
    },

    /// The signature matched neither the current nor the legacy key.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token failed verification against both the current and the legacy
    /// key, or its claims do not belong to this call.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Why the token was rejected.
        message: String,
    },

    /// The signature timestamp is unparsable or outside the tolerance window.
    #[error("Bad timestamp: {message}")]
    BadTimestamp {
        /// Why the timestamp was rejected.
        message: String,
    },

    /// The bearer token has no expiry or has expired.
    #[error("Token expired")]
    ExpiredToken,

    /// A signature nonce was presented twice within the tolerance window.
    #[error("Request replayed")]
    ReplayedRequest,

    /// Cryptographically valid, but the required scopes are not held.
    #[error("Forbidden scope: {scope}")]
    ForbiddenScope {
        /// First required scope that is missing.
        scope: String,
    },

    /// The token's user has not accepted the app's agreement.
    #[error("Agreement not accepted for app {app}")]
    AgreementNotAccepted {
        /// App whose agreement is missing.
        app: String,
    },

    /// Client-side programming error: the target app has no strategy the
    /// signer can implement.
    #[error("Unsupported strategy for app {app}: {message}")]
    UnsupportedStrategy {
        /// Target app slug.
        app: String,
        /// Why no strategy could be resolved.
        message: String,
    },

    /// Registered key material cannot be used (bad encoding, wrong length).
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of the key problem.
        message: String,
    },

    /// A collaborator lookup failed.
    ///
    /// Wraps the original [`StorageError`] to preserve the full error source
    /// chain for debugging and structured logging.
    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),
}

impl AuthError {
    /// Creates a `MalformedCredentials` error.
    #[must_use]
    pub fn malformed_credentials(message: impl Into<String>) -> Self {
        Self::MalformedCredentials { message: message.into() }
    }

    /// Creates a `WrongScheme` error.
    #[must_use]
    pub fn wrong_scheme(app: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WrongScheme { app: app.into(), message: message.into() }
    }

    /// Creates an `AppNotFound` error.
    #[must_use]
    pub fn app_not_found(app: impl Into<String>) -> Self {
        Self::AppNotFound { app: app.into() }
    }

    /// Creates an `UnsupportedAlgorithm` error.
    #[must_use]
    pub fn unsupported_algorithm(message: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm { message: message.into() }
    }

    /// Creates an `InvalidSignature` error.
    #[must_use]
    pub fn invalid_signature() -> Self {
        Self::InvalidSignature
    }

    /// Creates an `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken { message: message.into() }
    }

    /// Creates a `BadTimestamp` error.
    #[must_use]
    pub fn bad_timestamp(message: impl Into<String>) -> Self {
        Self::BadTimestamp { message: message.into() }
    }

    /// Creates an `ExpiredToken` error.
    #[must_use]
    pub fn expired_token() -> Self {
        Self::ExpiredToken
    }

    /// Creates a `ForbiddenScope` error.
    #[must_use]
    pub fn forbidden_scope(scope: impl Into<String>) -> Self {
        Self::ForbiddenScope { scope: scope.into() }
    }

    /// Creates an `AgreementNotAccepted` error.
    #[must_use]
    pub fn agreement_not_accepted(app: impl Into<String>) -> Self {
        Self::AgreementNotAccepted { app: app.into() }
    }

    /// Creates an `UnsupportedStrategy` error.
    #[must_use]
    pub fn unsupported_strategy(app: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedStrategy { app: app.into(), message: message.into() }
    }

    /// Creates an `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey { message: message.into() }
    }

    /// Machine-readable slug used as `detail` in error responses.
    #[must_use]
    pub fn slug(&self) -> &'static str {
        match self {
            Self::NoAuthorizationHeader => "no-authorization-header",
            Self::MalformedCredentials { .. } => "malformed-credentials",
            Self::WrongScheme { .. } => "wrong-scheme",
            Self::UnknownOrForbiddenScheme => "unknown-or-forbidden-scheme",
            Self::AppNotFound { .. } => "app-not-found",
            Self::UnsupportedAlgorithm { .. } => "unsupported-algorithm",
            Self::InvalidSignature => "invalid-signature",
            Self::InvalidToken { .. } => "invalid-token",
            Self::BadTimestamp { .. } => "bad-timestamp",
            Self::ExpiredToken => "expired",
            Self::ReplayedRequest => "replayed-request",
            Self::ForbiddenScope { .. } => "forbidden-scope",
            Self::AgreementNotAccepted { .. } => "agreement-not-accepted",
            Self::UnsupportedStrategy { .. } => "unsupported-strategy",
            Self::InvalidKey { .. } => "invalid-key",
            Self::Storage(_) => "storage-error",
        }
    }

    /// HTTP status for this error: 401 for authentication failures, 403 for
    /// scope failures.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ForbiddenScope { .. } | Self::AgreementNotAccepted { .. } => {
                StatusCode::FORBIDDEN
            },
            Self::UnsupportedStrategy { .. } | Self::InvalidKey { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Returns `true` when a retry could succeed: the credentials were never
    /// judged because a collaborator was unreachable.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_transient())
    }

    /// The uniform error body for this error.
    #[must_use]
    pub fn to_response_body(&self) -> ErrorResponse {
        ErrorResponse { detail: self.slug().to_owned(), status_code: self.status_code().as_u16() }
    }

    /// Renders this error as a JSON HTTP response.
    #[must_use]
    pub fn into_response(self) -> Response<Bytes> {
        self.to_response_body().into_response()
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::Storage(err)
    }
}

/// Uniform error body: `{"detail": <slug>, "status_code": <int>}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error slug (see [`AuthError::slug`]).
    pub detail: String,
    /// HTTP status code.
    pub status_code: u16,
}

impl ErrorResponse {
    /// Renders the body as a JSON HTTP response with a matching status.
    #[must_use]
    pub fn into_response(self) -> Response<Bytes> {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        // Two plain fields; serialization cannot fail.
        let body = serde_json::to_vec(&self).unwrap_or_default();

        let mut response = Response::new(Bytes::from(body));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        response
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(AuthError::expired_token().to_string(), "Token expired");
        assert_eq!(
            AuthError::malformed_credentials("missing Nonce").to_string(),
            "Malformed credentials: missing Nonce"
        );
        assert_eq!(
            AuthError::forbidden_scope("crud:member").to_string(),
            "Forbidden scope: crud:member"
        );
    }

    #[rstest]
    #[case(AuthError::NoAuthorizationHeader, "no-authorization-header", 401)]
    #[case(AuthError::malformed_credentials("x"), "malformed-credentials", 401)]
    #[case(AuthError::wrong_scheme("a", "x"), "wrong-scheme", 401)]
    #[case(AuthError::UnknownOrForbiddenScheme, "unknown-or-forbidden-scheme", 401)]
    #[case(AuthError::app_not_found("a"), "app-not-found", 401)]
    #[case(AuthError::unsupported_algorithm("x"), "unsupported-algorithm", 401)]
    #[case(AuthError::invalid_signature(), "invalid-signature", 401)]
    #[case(AuthError::invalid_token("x"), "invalid-token", 401)]
    #[case(AuthError::bad_timestamp("x"), "bad-timestamp", 401)]
    #[case(AuthError::expired_token(), "expired", 401)]
    #[case(AuthError::ReplayedRequest, "replayed-request", 401)]
    #[case(AuthError::forbidden_scope("x"), "forbidden-scope", 403)]
    #[case(AuthError::agreement_not_accepted("a"), "agreement-not-accepted", 403)]
    #[case(AuthError::unsupported_strategy("a", "x"), "unsupported-strategy", 500)]
    #[case(AuthError::invalid_key("x"), "invalid-key", 500)]
    #[case(AuthError::Storage(StorageError::Timeout), "storage-error", 503)]
    fn test_slug_and_status(#[case] err: AuthError, #[case] slug: &str, #[case] status: u16) {
        assert_eq!(err.slug(), slug);
        assert_eq!(err.status_code().as_u16(), status);
    }

    #[test]
    fn test_response_shape() {
        let response = AuthError::forbidden_scope("crud:member").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body, serde_json::json!({"detail": "forbidden-scope", "status_code": 403}));
    }

    #[rstest]
    #[case(AuthError::Storage(StorageError::Timeout), true)]
    #[case(AuthError::Storage(StorageError::connection("reset")), true)]
    #[case(AuthError::Storage(StorageError::internal("corrupt record")), false)]
    #[case(AuthError::Storage(StorageError::not_found("payments")), false)]
    #[case(AuthError::invalid_signature(), false)]
    fn test_is_transient(#[case] err: AuthError, #[case] transient: bool) {
        assert_eq!(err.is_transient(), transient);
    }

    #[test]
    fn test_storage_error_preserves_source_chain() {
        use std::error::Error;

        let err: AuthError = StorageError::connection("registry down").into();
        let source = err.source().expect("source chain must be preserved");
        assert_eq!(source.to_string(), "Connection error: registry down");
    }
}
