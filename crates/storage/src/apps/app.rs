//! App registry records: identity, algorithm, strategy and key material.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Signing algorithm declared by an app.
///
/// The HMAC variants serve both the signature scheme and symmetric bearer
/// tokens; `EdDSA` is only valid for bearer tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256.
    #[serde(rename = "HS256")]
    Hs256,
    /// HMAC with SHA-512.
    #[serde(rename = "HS512")]
    Hs512,
    /// Ed25519 signatures.
    #[serde(rename = "EdDSA")]
    EdDsa,
}

impl SigningAlgorithm {
    /// Wire name of the algorithm (`HS256`, `HS512`, `EdDSA`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hs256 => "HS256",
            Self::Hs512 => "HS512",
            Self::EdDsa => "EdDSA",
        }
    }

    /// Whether the algorithm uses a shared secret.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::Hs256 | Self::Hs512)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HS256" => Ok(Self::Hs256),
            "HS512" => Ok(Self::Hs512),
            "EdDSA" => Ok(Self::EdDsa),
            other => Err(format!("unknown signing algorithm '{other}'")),
        }
    }
}

/// How an app prefers to authenticate its outbound calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    /// Signed bearer tokens, presented with the `Link` scheme.
    Jwt,
    /// HMAC request signatures, presented with the `Signature` scheme.
    Signature,
}

/// Authentication schema an app is registered under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthSchema {
    /// `Link App=..,Token=..`
    Link,
    /// `Signature App=..,Nonce=..,SignedHeaders=..,Date=..`
    Signature,
}

/// A registered calling/called service.
///
/// # Example
///
/// ```
/// use academy_common_storage::apps::{App, AuthSchema, SigningAlgorithm, Strategy};
///
/// let app = App::builder()
///     .slug("payments")
///     .algorithm(SigningAlgorithm::Hs512)
///     .strategy(Strategy::Signature)
///     .schema(AuthSchema::Signature)
///     .require_an_agreement(true)
///     .required_scopes(["read:member".to_owned()])
///     .build();
///
/// assert_eq!(app.slug, "payments");
/// assert!(app.optional_scopes.is_empty());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct App {
    /// Unique slug, used as the `App=` value on the wire.
    #[builder(into)]
    pub slug: String,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    /// Preferred outbound strategy.
    pub strategy: Strategy,

    /// Registered authentication schema.
    pub schema: AuthSchema,

    /// When set, scopes are re-resolved on every request and checked against
    /// the endpoint's requirement.
    #[serde(default)]
    #[builder(default)]
    pub require_an_agreement: bool,

    /// Scopes the app always needs.
    #[serde(default)]
    #[builder(default, into)]
    pub required_scopes: BTreeSet<String>,

    /// Scopes a user may additionally grant.
    #[serde(default)]
    #[builder(default, into)]
    pub optional_scopes: BTreeSet<String>,

    /// Endpoint notified of app events.
    #[builder(into)]
    pub webhook_url: Option<String>,

    /// Where users are sent after accepting the agreement.
    #[builder(into)]
    pub redirect_url: Option<String>,

    /// Public base URL of the app.
    #[builder(into)]
    pub app_url: Option<String>,
}

/// A public/private key pair. Either half may be absent depending on the
/// algorithm: HMAC apps keep their shared secret in whichever half is set.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    /// Public half (Ed25519: raw 32 bytes, base64url without padding).
    #[serde(default)]
    pub public_key: Option<String>,

    /// Private half (Ed25519: PKCS#8 DER, base64url without padding).
    #[serde(default)]
    pub private_key: Option<Zeroizing<String>>,
}

impl KeyPair {
    /// Creates a key pair holding a single shared secret.
    #[must_use]
    pub fn shared_secret(secret: impl Into<String>) -> Self {
        Self { public_key: None, private_key: Some(Zeroizing::new(secret.into())) }
    }

    /// Creates an asymmetric key pair. Pass `None` for a half that is not held.
    #[must_use]
    pub fn asymmetric(public_key: Option<String>, private_key: Option<String>) -> Self {
        Self { public_key, private_key: private_key.map(Zeroizing::new) }
    }

    /// Key used to verify: the public half if set, else the private half.
    #[must_use]
    pub fn verification_key(&self) -> Option<&str> {
        self.public_key.as_deref().or_else(|| self.private_key.as_ref().map(|k| k.as_str()))
    }

    /// Key used to issue tokens: the private half if set, else the public half.
    #[must_use]
    pub fn signing_key(&self) -> Option<&str> {
        self.private_key.as_ref().map(|k| k.as_str()).or(self.public_key.as_deref())
    }

    /// Returns `true` if neither half is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.public_key.is_none() && self.private_key.is_none()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Everything the registry knows about one app: its info, the key pair in
/// force, and the previous pair still honoured during rotation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppKeys {
    /// App record.
    pub info: App,
    /// Current key pair, used to sign and verify.
    pub current: KeyPair,
    /// Previous key pair, used only to verify.
    pub legacy: Option<KeyPair>,
}
