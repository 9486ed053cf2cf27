//! Pre-verification checks: slug format, scheme/strategy admission and
//! algorithm support.
//!
//! These run before any cryptographic work so that a request for the wrong
//! scheme or an unimplemented algorithm is rejected with a precise error
//! instead of failing later as a bad signature.

use academy_common_storage::apps::{App, AuthSchema, SigningAlgorithm, Strategy};

use crate::error::AuthError;

/// Maximum length of an app slug.
pub const MAX_APP_SLUG_LENGTH: usize = 64;

/// Algorithms accepted by the signature scheme.
pub const SIGNATURE_ALGORITHMS: &[SigningAlgorithm] =
    &[SigningAlgorithm::Hs256, SigningAlgorithm::Hs512];

/// Algorithms accepted for bearer tokens.
pub const TOKEN_ALGORITHMS: &[SigningAlgorithm] =
    &[SigningAlgorithm::Hs256, SigningAlgorithm::Hs512, SigningAlgorithm::EdDsa];

/// Validate an app slug before it reaches any store lookup.
///
/// Slugs are 1–64 characters of `[A-Za-z0-9_-]`.
///
/// # Errors
///
/// Returns [`AuthError::MalformedCredentials`] if the slug is empty, too
/// long, or contains other characters.
///
/// # Examples
///
/// ```
/// use academy_common_authn::validation::validate_app_slug;
///
/// assert!(validate_app_slug("payments-v2").is_ok());
/// assert!(validate_app_slug("").is_err());
/// assert!(validate_app_slug("../etc").is_err());
/// ```
pub fn validate_app_slug(slug: &str) -> Result<(), AuthError> {
    if slug.is_empty() {
        return Err(AuthError::malformed_credentials("app slug must not be empty"));
    }
    if slug.len() > MAX_APP_SLUG_LENGTH {
        return Err(AuthError::malformed_credentials(format!(
            "app slug exceeds {MAX_APP_SLUG_LENGTH} characters"
        )));
    }
    if !slug.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
        return Err(AuthError::malformed_credentials(format!(
            "app slug '{slug}' contains invalid characters"
        )));
    }
    Ok(())
}

/// Check that `app` may authenticate with a request signature.
///
/// The app must be registered under the `SIGNATURE` schema. Its strategy must
/// be `SIGNATURE` as well, unless `allow_jwt_strategy` is set (the endpoint is
/// pinned to signature mode).
///
/// # Errors
///
/// Returns [`AuthError::WrongScheme`] otherwise.
pub fn validate_signature_admission(app: &App, allow_jwt_strategy: bool) -> Result<(), AuthError> {
    if app.schema != AuthSchema::Signature {
        return Err(AuthError::wrong_scheme(
            &app.slug,
            "signature presented but the app uses another schema",
        ));
    }
    if app.strategy != Strategy::Signature && !allow_jwt_strategy {
        return Err(AuthError::wrong_scheme(&app.slug, "signature strategy is forbidden for this app"));
    }
    Ok(())
}

/// Check that `app` may authenticate with a `Link` bearer token.
///
/// # Errors
///
/// Returns [`AuthError::WrongScheme`] unless the app is registered under the
/// `LINK` schema with the `JWT` strategy.
pub fn validate_link_admission(app: &App) -> Result<(), AuthError> {
    if app.schema != AuthSchema::Link {
        return Err(AuthError::wrong_scheme(&app.slug, "token presented but the app uses another schema"));
    }
    if app.strategy != Strategy::Jwt {
        return Err(AuthError::wrong_scheme(&app.slug, "token strategy is forbidden for this app"));
    }
    Ok(())
}

/// Validate the algorithm for the signature scheme.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] unless the algorithm is one of
/// [`SIGNATURE_ALGORITHMS`].
pub fn validate_signature_algorithm(algorithm: SigningAlgorithm) -> Result<(), AuthError> {
    if !SIGNATURE_ALGORITHMS.contains(&algorithm) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{algorithm}' cannot sign requests (only HS256 and HS512 are supported)"
        )));
    }
    Ok(())
}

/// Validate the algorithm for bearer tokens.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] unless the algorithm is one of
/// [`TOKEN_ALGORITHMS`].
pub fn validate_token_algorithm(algorithm: SigningAlgorithm) -> Result<(), AuthError> {
    if !TOKEN_ALGORITHMS.contains(&algorithm) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{algorithm}' is not in the accepted token algorithm list"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn app(schema: AuthSchema, strategy: Strategy) -> App {
        App::builder()
            .slug("academy")
            .algorithm(SigningAlgorithm::Hs256)
            .strategy(strategy)
            .schema(schema)
            .build()
    }

    #[rstest]
    #[case("academy")]
    #[case("payments_v2")]
    #[case("A-1")]
    fn test_valid_slugs(#[case] slug: &str) {
        assert!(validate_app_slug(slug).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("has space")]
    #[case("comma,separated")]
    #[case("key=value")]
    #[case("slash/")]
    #[case("nul\0byte")]
    fn test_invalid_slugs(#[case] slug: &str) {
        assert!(matches!(validate_app_slug(slug), Err(AuthError::MalformedCredentials { .. })));
    }

    #[test]
    fn test_slug_length_limit() {
        assert!(validate_app_slug(&"a".repeat(MAX_APP_SLUG_LENGTH)).is_ok());
        assert!(validate_app_slug(&"a".repeat(MAX_APP_SLUG_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_signature_admission() {
        assert!(validate_signature_admission(&app(AuthSchema::Signature, Strategy::Signature), false).is_ok());
        assert!(validate_signature_admission(&app(AuthSchema::Signature, Strategy::Jwt), true).is_ok());
        assert!(matches!(
            validate_signature_admission(&app(AuthSchema::Signature, Strategy::Jwt), false),
            Err(AuthError::WrongScheme { .. })
        ));
        assert!(matches!(
            validate_signature_admission(&app(AuthSchema::Link, Strategy::Signature), true),
            Err(AuthError::WrongScheme { .. })
        ));
    }

    #[test]
    fn test_link_admission() {
        assert!(validate_link_admission(&app(AuthSchema::Link, Strategy::Jwt)).is_ok());
        assert!(validate_link_admission(&app(AuthSchema::Link, Strategy::Signature)).is_err());
        assert!(validate_link_admission(&app(AuthSchema::Signature, Strategy::Jwt)).is_err());
    }

    #[test]
    fn test_signature_algorithms() {
        assert!(validate_signature_algorithm(SigningAlgorithm::Hs256).is_ok());
        assert!(validate_signature_algorithm(SigningAlgorithm::Hs512).is_ok());
        assert!(matches!(
            validate_signature_algorithm(SigningAlgorithm::EdDsa),
            Err(AuthError::UnsupportedAlgorithm { message }) if message.contains("EdDSA")
        ));
    }

    #[test]
    fn test_token_algorithms() {
        for alg in TOKEN_ALGORITHMS {
            assert!(validate_token_algorithm(*alg).is_ok());
        }
    }
}
