//! Endpoint scope requirements.

use std::collections::BTreeSet;

use academy_common_storage::apps::ResolvedScopes;

use crate::error::AuthError;

/// A set of scope strings.
pub type ScopeSet = BTreeSet<String>;

/// Builds a [`ScopeSet`] from string-likes.
///
/// ```
/// use academy_common_authn::scope::scope_set;
///
/// let scopes = scope_set(["read:member", "crud:member"]);
/// assert!(scopes.contains("crud:member"));
/// ```
pub fn scope_set<I, S>(scopes: I) -> ScopeSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    scopes.into_iter().map(Into::into).collect()
}

/// Checks that every scope in `required` is held by `resolved`.
///
/// # Errors
///
/// Returns [`AuthError::ForbiddenScope`] naming the first missing scope.
pub fn ensure_scopes(required: &ScopeSet, resolved: &ResolvedScopes) -> Result<(), AuthError> {
    match required.iter().find(|scope| !resolved.contains(scope)) {
        Some(missing) => Err(AuthError::forbidden_scope(missing.as_str())),
        None => Ok(()),
    }
}
