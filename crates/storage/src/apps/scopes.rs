//! Scope resolution: which capabilities an app, or a user acting through an
//! app, currently holds.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{StorageError, StorageResult};

/// Scopes granted to an app, or to a user through an app.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedScopes {
    /// Scopes the app always holds.
    pub required: BTreeSet<String>,
    /// Scopes granted on top of the required set.
    pub optional: BTreeSet<String>,
}

impl ResolvedScopes {
    /// Creates a resolved scope set.
    #[must_use]
    pub fn new(
        required: impl IntoIterator<Item = impl Into<String>>,
        optional: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            optional: optional.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `scope` is held, either as required or optional.
    #[must_use]
    pub fn contains(&self, scope: &str) -> bool {
        self.required.contains(scope) || self.optional.contains(scope)
    }

    /// The effective scope set: required ∪ optional.
    #[must_use]
    pub fn effective(&self) -> BTreeSet<String> {
        self.required.union(&self.optional).cloned().collect()
    }
}

/// Capability lookup consulted when an app requires a user agreement.
#[async_trait]
pub trait ScopeResolver: Send + Sync {
    /// Resolves the scopes held by `app`, or by `subject` acting through
    /// `app` when a subject is given.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when the app is unknown or, for a
    /// subject, when the user has not accepted the app's agreement.
    async fn resolve_scopes(
        &self,
        app: &str,
        subject: Option<&str>,
    ) -> StorageResult<ResolvedScopes>;
}

#[derive(Debug, Default)]
struct ScopeTables {
    apps: HashMap<String, ResolvedScopes>,
    agreements: HashMap<(String, String), BTreeSet<String>>,
}

/// In-memory [`ScopeResolver`] for tests and development.
///
/// App-level scopes come from [`set_app_scopes`](Self::set_app_scopes). A
/// user resolves to the app's required scopes plus the optional scopes they
/// accepted in their agreement.
#[derive(Debug, Default, Clone)]
pub struct MemoryScopeResolver {
    tables: Arc<RwLock<ScopeTables>>,
}

impl MemoryScopeResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scopes held by `app` itself.
    pub fn set_app_scopes(&self, app: &str, scopes: ResolvedScopes) {
        self.tables.write().apps.insert(app.to_owned(), scopes);
    }

    /// Records that `user` accepted `app`'s agreement, granting the listed
    /// optional scopes. Replaces any earlier agreement.
    pub fn accept_agreement(
        &self,
        app: &str,
        user: &str,
        optional: impl IntoIterator<Item = impl Into<String>>,
    ) {
        self.tables
            .write()
            .agreements
            .insert((app.to_owned(), user.to_owned()), optional.into_iter().map(Into::into).collect());
    }

    /// Removes `user`'s agreement with `app`. Returns whether one existed.
    pub fn revoke_agreement(&self, app: &str, user: &str) -> bool {
        self.tables.write().agreements.remove(&(app.to_owned(), user.to_owned())).is_some()
    }
}

#[async_trait]
impl ScopeResolver for MemoryScopeResolver {
    #[tracing::instrument(skip(self))]
    async fn resolve_scopes(
        &self,
        app: &str,
        subject: Option<&str>,
    ) -> StorageResult<ResolvedScopes> {
        let tables = self.tables.read();
        let app_scopes = tables.apps.get(app).ok_or_else(|| StorageError::not_found(app))?;

        match subject {
            None => Ok(app_scopes.clone()),
            Some(user) => {
                let accepted = tables
                    .agreements
                    .get(&(app.to_owned(), user.to_owned()))
                    .ok_or_else(|| StorageError::not_found(format!("{app}/{user}")))?;
                Ok(ResolvedScopes {
                    required: app_scopes.required.clone(),
                    optional: accepted.clone(),
                })
            },
        }
    }
}
