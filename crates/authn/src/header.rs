//! `Authorization` header grammar.
//!
//! ```text
//! Link App=<app_slug>,Token=<token>
//! Signature App=<app_slug>,Nonce=<hex_digest>,SignedHeaders=<h1;h2;...>,Date=<ISO-8601>
//! ```
//!
//! The header is parsed once per request into [`AuthorizationHeader`]; the
//! verifiers never look at the raw string again.

use std::{collections::HashMap, fmt};

use http::HeaderName;

use crate::{error::AuthError, validation::validate_app_slug};

/// Prefix of the bearer scheme.
pub const LINK_PREFIX: &str = "Link ";

/// Prefix of the signature scheme.
pub const SIGNATURE_PREFIX: &str = "Signature ";

/// The two authentication schemes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Signed bearer token.
    Link,
    /// HMAC request signature.
    Signature,
}

impl Scheme {
    /// The scheme named by the prefix of a raw header value, without looking
    /// at the credentials.
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        if value.starts_with(LINK_PREFIX) {
            Some(Self::Link)
        } else if value.starts_with(SIGNATURE_PREFIX) {
            Some(Self::Signature)
        } else {
            None
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link => f.write_str("Link"),
            Self::Signature => f.write_str("Signature"),
        }
    }
}

/// Credentials of the `Link` scheme.
#[derive(Clone, PartialEq, Eq)]
pub struct LinkCredentials {
    /// Calling app slug.
    pub app: String,
    /// Encoded bearer token.
    pub token: String,
}

impl fmt::Debug for LinkCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkCredentials").field("app", &self.app).finish_non_exhaustive()
    }
}

/// Credentials of the `Signature` scheme.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureCredentials {
    /// Calling app slug.
    pub app: String,
    /// Hex HMAC digest of the canonical payload.
    pub nonce: String,
    /// Lowercase names of the headers covered by the signature.
    pub signed_headers: Vec<HeaderName>,
    /// Signing timestamp, verbatim.
    pub date: String,
}

/// A parsed `Authorization` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthorizationHeader {
    /// `Link App=..,Token=..`
    Link(LinkCredentials),
    /// `Signature App=..,Nonce=..,SignedHeaders=..,Date=..`
    Signature(SignatureCredentials),
}

impl AuthorizationHeader {
    /// Parses a raw header value.
    ///
    /// # Errors
    ///
    /// - [`AuthError::UnknownOrForbiddenScheme`] if the value starts with
    ///   neither prefix
    /// - [`AuthError::MalformedCredentials`] if the credentials after the
    ///   prefix violate the grammar
    ///
    /// # Examples
    ///
    /// ```
    /// use academy_common_authn::header::{AuthorizationHeader, Scheme};
    ///
    /// let header = AuthorizationHeader::parse("Link App=academy,Token=abc.def.ghi")?;
    /// assert_eq!(header.scheme(), Scheme::Link);
    /// assert_eq!(header.app(), "academy");
    /// # Ok::<(), academy_common_authn::AuthError>(())
    /// ```
    pub fn parse(value: &str) -> Result<Self, AuthError> {
        if let Some(rest) = value.strip_prefix(LINK_PREFIX) {
            LinkCredentials::parse(rest).map(Self::Link)
        } else if let Some(rest) = value.strip_prefix(SIGNATURE_PREFIX) {
            SignatureCredentials::parse(rest).map(Self::Signature)
        } else {
            Err(AuthError::UnknownOrForbiddenScheme)
        }
    }

    /// Scheme of this header.
    #[must_use]
    pub fn scheme(&self) -> Scheme {
        match self {
            Self::Link(_) => Scheme::Link,
            Self::Signature(_) => Scheme::Signature,
        }
    }

    /// Calling app slug.
    #[must_use]
    pub fn app(&self) -> &str {
        match self {
            Self::Link(c) => &c.app,
            Self::Signature(c) => &c.app,
        }
    }
}

impl fmt::Display for AuthorizationHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(c) => write!(f, "{LINK_PREFIX}App={},Token={}", c.app, c.token),
            Self::Signature(c) => {
                let names: Vec<&str> = c.signed_headers.iter().map(HeaderName::as_str).collect();
                write!(
                    f,
                    "{SIGNATURE_PREFIX}App={},Nonce={},SignedHeaders={},Date={}",
                    c.app,
                    c.nonce,
                    names.join(";"),
                    c.date
                )
            },
        }
    }
}

impl LinkCredentials {
    fn parse(credentials: &str) -> Result<Self, AuthError> {
        let mut fields = parse_fields(credentials, &["App", "Token"])?;
        let app = take(&mut fields, "App")?;
        let token = take(&mut fields, "Token")?;
        validate_app_slug(&app)?;
        if token.is_empty() {
            return Err(AuthError::malformed_credentials("Token must not be empty"));
        }
        Ok(Self { app, token })
    }
}

impl SignatureCredentials {
    fn parse(credentials: &str) -> Result<Self, AuthError> {
        let mut fields = parse_fields(credentials, &["App", "Date", "Nonce", "SignedHeaders"])?;
        let app = take(&mut fields, "App")?;
        let nonce = take(&mut fields, "Nonce")?;
        let signed_headers = take(&mut fields, "SignedHeaders")?;
        let date = take(&mut fields, "Date")?;

        validate_app_slug(&app)?;
        if nonce.is_empty() {
            return Err(AuthError::malformed_credentials("Nonce must not be empty"));
        }
        if date.is_empty() {
            return Err(AuthError::malformed_credentials("Date must not be empty"));
        }

        Ok(Self { app, nonce, signed_headers: parse_signed_headers(&signed_headers)?, date })
    }
}

/// Splits `key=value,key=value` and checks the key set is exactly `expected`.
fn parse_fields(credentials: &str, expected: &[&str]) -> Result<HashMap<String, String>, AuthError> {
    let mut fields = HashMap::with_capacity(expected.len());

    for part in credentials.split(',') {
        let (key, value) = part.split_once('=').ok_or_else(|| {
            AuthError::malformed_credentials(format!("'{part}' is not a key=value pair"))
        })?;
        let key = key.trim();
        if !expected.contains(&key) {
            return Err(AuthError::malformed_credentials(format!("unexpected key '{key}'")));
        }
        if fields.insert(key.to_owned(), value.trim().to_owned()).is_some() {
            return Err(AuthError::malformed_credentials(format!("duplicate key '{key}'")));
        }
    }

    if fields.len() != expected.len() {
        let missing: Vec<&str> =
            expected.iter().copied().filter(|k| !fields.contains_key(*k)).collect();
        return Err(AuthError::malformed_credentials(format!(
            "missing keys: {}",
            missing.join(", ")
        )));
    }

    Ok(fields)
}

fn take(fields: &mut HashMap<String, String>, key: &str) -> Result<String, AuthError> {
    fields.remove(key).ok_or_else(|| AuthError::malformed_credentials(format!("missing key '{key}'")))
}

fn parse_signed_headers(value: &str) -> Result<Vec<HeaderName>, AuthError> {
    value
        .split(';')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes()).map_err(|_| {
                AuthError::malformed_credentials(format!("'{name}' is not a valid header name"))
            })
        })
        .collect()
}
