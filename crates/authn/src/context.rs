//! The authenticated caller, as seen by a handler.

use std::sync::Arc;

use academy_common_storage::apps::App;

use crate::{header::Scheme, jwt::TokenClaims};

/// Which key pair verified the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeySlot {
    /// The app's current key pair.
    Current,
    /// The previous key pair, still honoured during rotation.
    Legacy,
}

/// Result of a successful authentication.
#[derive(Clone, Debug)]
pub struct AuthContext {
    /// The calling app.
    pub app: Arc<App>,
    /// Verified token claims; `None` for request signatures.
    pub token: Option<TokenClaims>,
    /// Scheme the caller used.
    pub scheme: Scheme,
    /// Key pair that verified the request.
    pub key_slot: KeySlot,
}

impl AuthContext {
    /// The user the call is made on behalf of, if any.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.sub.as_str()).filter(|sub| !sub.is_empty())
    }

    /// Whether the legacy key verified the request.
    #[must_use]
    pub fn used_legacy_key(&self) -> bool {
        self.key_slot == KeySlot::Legacy
    }
}
