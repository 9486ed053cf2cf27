//! Canonical request representation shared by signer and verifier.
//!
//! The payload is the compact JSON serialization of:
//!
//! ```json
//! {
//!   "timestamp": "<Date, verbatim>",
//!   "app": "<caller slug>",
//!   "method": "POST",
//!   "params": [["k", "v"], ...],
//!   "body": null | {"json": <json>} | {"text": "<text>"} | {"base64": "<base64>"},
//!   "headers": {"<lowercase name>": "<value>", ...}
//! }
//! ```
//!
//! Query pairs are percent-decoded and sorted by key then value, so the order
//! in which a client adds parameters never changes the digest. JSON bodies are
//! re-serialized with sorted object keys.

use std::collections::BTreeMap;

use academy_common_storage::apps::SigningAlgorithm;
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use hmac::{Hmac, Mac, digest::KeyInit};
use http::{HeaderMap, HeaderName, Method, Request};
use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Sha256, Sha512};

use crate::error::AuthError;

/// The canonical form of one request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CanonicalRequest {
    timestamp: String,
    app: String,
    method: String,
    params: Vec<(String, String)>,
    body: Value,
    headers: BTreeMap<String, String>,
}

impl CanonicalRequest {
    /// Builds the canonical form from request parts.
    ///
    /// Only headers named in `signed_headers` are included; a signed header
    /// absent from `headers` is left out.
    #[must_use]
    pub fn from_parts(
        timestamp: &str,
        app: &str,
        method: &Method,
        query: Option<&str>,
        body: &[u8],
        headers: &HeaderMap,
        signed_headers: &[HeaderName],
    ) -> Self {
        Self {
            timestamp: timestamp.to_owned(),
            app: app.to_owned(),
            method: method.as_str().to_ascii_uppercase(),
            params: canonical_params(query),
            body: canonical_body(body),
            headers: canonical_headers(headers, signed_headers),
        }
    }

    /// Builds the canonical form of an inbound request.
    #[must_use]
    pub fn from_request(
        timestamp: &str,
        app: &str,
        request: &Request<Bytes>,
        signed_headers: &[HeaderName],
    ) -> Self {
        Self::from_parts(
            timestamp,
            app,
            request.method(),
            request.uri().query(),
            request.body(),
            request.headers(),
            signed_headers,
        )
    }

    /// The bytes that are signed.
    #[must_use]
    pub fn to_payload(&self) -> Vec<u8> {
        // Strings, string pairs and JSON values only; serialization cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Lowercase hex HMAC of the payload under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnsupportedAlgorithm`] for non-HMAC algorithms.
    pub fn sign(&self, algorithm: SigningAlgorithm, key: &[u8]) -> Result<String, AuthError> {
        digest(algorithm, key, &self.to_payload())
    }

    /// Compares `nonce` against the HMAC of the payload in constant time.
    ///
    /// A nonce that is not valid hex never matches.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnsupportedAlgorithm`] for non-HMAC algorithms.
    pub fn verify(
        &self,
        algorithm: SigningAlgorithm,
        key: &[u8],
        nonce: &str,
    ) -> Result<bool, AuthError> {
        let Ok(expected) = hex::decode(nonce) else {
            return Ok(false);
        };
        let payload = self.to_payload();
        match algorithm {
            SigningAlgorithm::Hs256 => Ok(mac::<Hmac<Sha256>>(key, &payload)?.verify_slice(&expected).is_ok()),
            SigningAlgorithm::Hs512 => Ok(mac::<Hmac<Sha512>>(key, &payload)?.verify_slice(&expected).is_ok()),
            other => Err(not_hmac(other)),
        }
    }
}

/// Lowercase hex HMAC of `payload`.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] for non-HMAC algorithms.
pub fn digest(algorithm: SigningAlgorithm, key: &[u8], payload: &[u8]) -> Result<String, AuthError> {
    let bytes = match algorithm {
        SigningAlgorithm::Hs256 => mac::<Hmac<Sha256>>(key, payload)?.finalize().into_bytes().to_vec(),
        SigningAlgorithm::Hs512 => mac::<Hmac<Sha512>>(key, payload)?.finalize().into_bytes().to_vec(),
        other => return Err(not_hmac(other)),
    };
    Ok(hex::encode(bytes))
}

fn mac<M: Mac + KeyInit>(key: &[u8], payload: &[u8]) -> Result<M, AuthError> {
    let mut mac = <M as Mac>::new_from_slice(key)
        .map_err(|e| AuthError::invalid_key(format!("HMAC key rejected: {e}")))?;
    mac.update(payload);
    Ok(mac)
}

fn not_hmac(algorithm: SigningAlgorithm) -> AuthError {
    AuthError::unsupported_algorithm(format!("'{algorithm}' is not an HMAC algorithm"))
}

fn canonical_params(query: Option<&str>) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default();
    params.sort();
    params
}

fn canonical_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    // Tagged by form so that no two distinct byte strings share a canonical body.
    if let Ok(json) = serde_json::from_slice::<Value>(body) {
        return json!({ "json": json });
    }
    match std::str::from_utf8(body) {
        Ok(text) => json!({ "text": text }),
        Err(_) => json!({ "base64": STANDARD.encode(body) }),
    }
}

fn canonical_headers(headers: &HeaderMap, signed: &[HeaderName]) -> BTreeMap<String, String> {
    signed
        .iter()
        .filter_map(|name| {
            let values: Vec<String> = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect();
            (!values.is_empty()).then(|| (name.as_str().to_owned(), values.join(", ")))
        })
        .collect()
}
