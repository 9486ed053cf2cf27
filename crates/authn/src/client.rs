//! Outbound request signing.
//!
//! [`RequestSigner`] resolves a target app once into a [`Service`], which then
//! produces `Authorization` headers for individual calls. The credentials name
//! the local app (`App=<self>`) and are made with the key of the target's
//! registry entry; the target verifies them against its own entry for the
//! caller, which holds the same shared key.
//!
//! ```no_run
//! use std::sync::Arc;
//! use academy_common_authn::{
//!     AuthConfig,
//!     client::{RequestSigner, ServiceOptions},
//! };
//! use academy_common_storage::apps::MemoryAppKeyStore;
//! use http::{HeaderMap, Method};
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::builder().app_slug("academy").issuer("https://api").build()?;
//! let signer = RequestSigner::new(config, Arc::new(MemoryAppKeyStore::new()));
//!
//! let payments = signer.service("payments", ServiceOptions::default()).await?;
//! let url = Url::parse("https://payments.internal/v1/charges")?;
//! let headers =
//!     payments.authorization_headers(&Method::POST, &url, &[], b"{}", &HeaderMap::new())?;
//! # let _ = headers;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use academy_common_storage::apps::{AppKeyStore, AppKeys, Strategy};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, header::AUTHORIZATION};
use url::Url;

use crate::{
    canonical::CanonicalRequest,
    config::AuthConfig,
    error::AuthError,
    header::{AuthorizationHeader, LinkCredentials, Scheme, SignatureCredentials},
    jwt::{TokenClaims, issue_token, unix_now},
    middleware::Mode,
    validation::SIGNATURE_ALGORITHMS,
};

/// Per-target options.
#[derive(Clone, Debug, Default, bon::Builder)]
pub struct ServiceOptions {
    /// User the calls are made on behalf of (bearer tokens only).
    #[builder(into)]
    pub subject: Option<String>,
    /// Scheme pin; defaults to the target app's strategy.
    pub mode: Option<Mode>,
    /// Headers covered by request signatures.
    #[builder(default)]
    pub signed_headers: Vec<HeaderName>,
}

/// Produces credentials for calls made by the local app.
#[derive(Clone)]
pub struct RequestSigner {
    config: Arc<AuthConfig>,
    key_store: Arc<dyn AppKeyStore>,
}

impl RequestSigner {
    /// Creates a signer for the local app described by `config`.
    #[must_use]
    pub fn new(config: AuthConfig, key_store: Arc<dyn AppKeyStore>) -> Self {
        Self { config: Arc::new(config), key_store }
    }

    /// Resolves `target` and its scheme.
    ///
    /// # Errors
    ///
    /// - [`AuthError::AppNotFound`] if `target` is not registered
    /// - [`AuthError::UnsupportedStrategy`] if no implementable scheme exists
    ///   for the target: signatures with a non-HMAC algorithm, or no key
    ///   material to sign with
    #[tracing::instrument(skip(self, options), fields(caller = %self.config.app_slug()))]
    pub async fn service(&self, target: &str, options: ServiceOptions) -> Result<Service, AuthError> {
        let keys = self
            .key_store
            .get_app_keys(target)
            .await?
            .ok_or_else(|| AuthError::app_not_found(target))?;

        let scheme = match options.mode {
            Some(Mode::Jwt) => Scheme::Link,
            Some(Mode::Signature) => Scheme::Signature,
            None => match keys.info.strategy {
                Strategy::Jwt => Scheme::Link,
                Strategy::Signature => Scheme::Signature,
            },
        };

        if let Err(err) = check_strategy(&keys, scheme) {
            tracing::error!(target_app = target, %scheme, error = %err, "no usable signing strategy");
            return Err(err);
        }

        Ok(Service { config: Arc::clone(&self.config), keys, scheme, options })
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner").field("app", &self.config.app_slug()).finish_non_exhaustive()
    }
}

fn check_strategy(keys: &AppKeys, scheme: Scheme) -> Result<(), AuthError> {
    let app = &keys.info;
    match scheme {
        Scheme::Signature => {
            if !SIGNATURE_ALGORITHMS.contains(&app.algorithm) {
                return Err(AuthError::unsupported_strategy(
                    &app.slug,
                    format!("cannot sign requests with {}", app.algorithm),
                ));
            }
            if keys.current.verification_key().is_none() {
                return Err(AuthError::unsupported_strategy(&app.slug, "no shared secret"));
            }
        },
        Scheme::Link => {
            if keys.current.signing_key().is_none() {
                return Err(AuthError::unsupported_strategy(&app.slug, "no token signing key"));
            }
        },
    }
    Ok(())
}

/// A resolved outbound target.
#[derive(Clone)]
pub struct Service {
    config: Arc<AuthConfig>,
    keys: AppKeys,
    scheme: Scheme,
    options: ServiceOptions,
}

impl Service {
    /// Scheme used for this target.
    #[must_use]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Slug of the target app.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.keys.info.slug
    }

    /// Signs a call made now. See [`sign_at`](Self::sign_at).
    ///
    /// # Errors
    ///
    /// See [`sign_at`](Self::sign_at).
    pub fn sign(
        &self,
        method: &Method,
        url: &Url,
        params: &[(&str, &str)],
        body: &[u8],
        headers: &HeaderMap,
    ) -> Result<HeaderMap, AuthError> {
        self.sign_at(method, url, params, body, headers, Utc::now())
    }

    /// Signs a call with an explicit timestamp.
    ///
    /// `params` are appended to the query of `url`; the caller must send them
    /// the same way. Returns `headers` plus a `Signature` authorization
    /// header covering the configured signed headers.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnsupportedStrategy`] if the target does not use
    /// signatures.
    pub fn sign_at(
        &self,
        method: &Method,
        url: &Url,
        params: &[(&str, &str)],
        body: &[u8],
        headers: &HeaderMap,
        timestamp: DateTime<Utc>,
    ) -> Result<HeaderMap, AuthError> {
        let mut url = url.clone();
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }

        let authorization = self.signature_header(method, url.query(), body, headers, timestamp)?;
        let mut signed = headers.clone();
        signed.insert(AUTHORIZATION, authorization);
        Ok(signed)
    }

    /// Issues a bearer token and returns the `Link` authorization header.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidKey`] if the target's key cannot sign.
    pub fn link_headers(&self) -> Result<HeaderMap, AuthError> {
        let token = self.issue_token()?;
        let header = AuthorizationHeader::Link(LinkCredentials {
            app: self.config.app_slug().to_owned(),
            token,
        });

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header_value(&header)?);
        Ok(headers)
    }

    /// Authorization headers for one call, in the resolved scheme.
    ///
    /// # Errors
    ///
    /// See [`sign`](Self::sign) and [`link_headers`](Self::link_headers).
    pub fn authorization_headers(
        &self,
        method: &Method,
        url: &Url,
        params: &[(&str, &str)],
        body: &[u8],
        headers: &HeaderMap,
    ) -> Result<HeaderMap, AuthError> {
        match self.scheme {
            Scheme::Signature => self.sign(method, url, params, body, headers),
            Scheme::Link => {
                let mut all = headers.clone();
                all.extend(self.link_headers()?);
                Ok(all)
            },
        }
    }

    /// Adds an `Authorization` header to a fully built request.
    ///
    /// # Errors
    ///
    /// See [`authorization_headers`](Self::authorization_headers).
    pub fn sign_request(&self, request: &mut Request<Bytes>) -> Result<(), AuthError> {
        let authorization = match self.scheme {
            Scheme::Signature => self.signature_header(
                request.method(),
                request.uri().query(),
                request.body(),
                request.headers(),
                Utc::now(),
            )?,
            Scheme::Link => {
                let token = self.issue_token()?;
                header_value(&AuthorizationHeader::Link(LinkCredentials {
                    app: self.config.app_slug().to_owned(),
                    token,
                }))?
            },
        };
        request.headers_mut().insert(AUTHORIZATION, authorization);
        Ok(())
    }

    fn issue_token(&self) -> Result<String, AuthError> {
        let claims = TokenClaims::new(
            self.options.subject.as_deref(),
            self.config.issuer(),
            self.config.app_slug(),
            &self.keys.info.slug,
            unix_now(),
            self.config.token_lifetime(),
        );
        issue_token(&claims, self.keys.info.algorithm, &self.keys.current)
    }

    fn signature_header(
        &self,
        method: &Method,
        query: Option<&str>,
        body: &[u8],
        headers: &HeaderMap,
        timestamp: DateTime<Utc>,
    ) -> Result<HeaderValue, AuthError> {
        if self.scheme != Scheme::Signature {
            return Err(AuthError::unsupported_strategy(
                self.target(),
                "target is not resolved to the signature scheme",
            ));
        }
        let key = self
            .keys
            .current
            .verification_key()
            .ok_or_else(|| AuthError::unsupported_strategy(self.target(), "no shared secret"))?;

        let date = timestamp.to_rfc3339_opts(SecondsFormat::Micros, false);
        let app = self.config.app_slug();
        let signed_headers = self.options.signed_headers.clone();

        let nonce = CanonicalRequest::from_parts(&date, app, method, query, body, headers, &signed_headers)
            .sign(self.keys.info.algorithm, key.as_bytes())?;

        tracing::debug!(target_app = self.target(), "request signed");

        header_value(&AuthorizationHeader::Signature(SignatureCredentials {
            app: app.to_owned(),
            nonce,
            signed_headers,
            date,
        }))
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("target", &self.keys.info.slug)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

fn header_value(header: &AuthorizationHeader) -> Result<HeaderValue, AuthError> {
    HeaderValue::from_str(&header.to_string())
        .map_err(|e| AuthError::malformed_credentials(format!("unencodable Authorization header: {e}")))
}
