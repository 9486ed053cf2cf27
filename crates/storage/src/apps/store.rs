//! Storage trait for the app key registry.
//!
//! [`AppKeyStore`] is the lookup the authentication layer consults for every
//! inbound and outbound call. Production deployments back it with the app
//! database; [`MemoryAppKeyStore`] serves tests and local development.
//!
//! # Rotation
//!
//! ```text
//! ┌─────────────┐  rotate(new)  ┌─────────────┐  retire_legacy  ┌─────────────┐
//! │ current: K1 │──────────────►│ current: K2 │────────────────►│ current: K2 │
//! │ legacy: -   │               │ legacy: K1  │                 │ legacy: -   │
//! └─────────────┘               └─────────────┘                 └─────────────┘
//! ```
//!
//! During the window between `rotate` and `retire_legacy`, requests signed
//! with either key verify; new requests are always signed with the current
//! key.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    apps::{App, AppKeys, KeyPair},
    error::{StorageError, StorageResult},
};

/// Read access to registered apps and their key material.
#[async_trait]
pub trait AppKeyStore: Send + Sync {
    /// Returns the app record, its current key pair and the legacy key pair
    /// still honoured during rotation.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(keys))` if the app is registered
    /// - `Ok(None)` if no app has this slug
    /// - `Err(...)` on storage errors
    async fn get_app_keys(&self, slug: &str) -> StorageResult<Option<AppKeys>>;
}

/// In-memory implementation of [`AppKeyStore`] for testing.
///
/// # Examples
///
/// ```
/// use academy_common_storage::apps::{
///     App, AppKeyStore, AuthSchema, KeyPair, MemoryAppKeyStore, SigningAlgorithm, Strategy,
/// };
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryAppKeyStore::new();
///     let app = App::builder()
///         .slug("payments")
///         .algorithm(SigningAlgorithm::Hs256)
///         .strategy(Strategy::Signature)
///         .schema(AuthSchema::Signature)
///         .build();
///
///     store.register(app, KeyPair::shared_secret("s3cret"))?;
///
///     let keys = store.get_app_keys("payments").await?;
///     assert!(keys.is_some_and(|k| k.legacy.is_none()));
///     Ok(())
/// }
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryAppKeyStore {
    apps: Arc<RwLock<HashMap<String, AppKeys>>>,
}

impl MemoryAppKeyStore {
    /// Creates a new empty in-memory registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an app with its initial key pair.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if the slug is already registered.
    pub fn register(&self, info: App, current: KeyPair) -> StorageResult<()> {
        let mut apps = self.apps.write();
        if apps.contains_key(&info.slug) {
            return Err(StorageError::internal(format!("App already registered: {}", info.slug)));
        }
        apps.insert(info.slug.clone(), AppKeys { info, current, legacy: None });
        Ok(())
    }

    /// Installs `next` as the current key pair and keeps the previous one as
    /// the legacy pair. Any older legacy pair is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the app is not registered.
    #[tracing::instrument(skip(self, next))]
    pub fn rotate(&self, slug: &str, next: KeyPair) -> StorageResult<()> {
        let mut apps = self.apps.write();
        let entry = apps.get_mut(slug).ok_or_else(|| StorageError::not_found(slug))?;
        let previous = std::mem::replace(&mut entry.current, next);
        entry.legacy = Some(previous);
        Ok(())
    }

    /// Stops honouring the legacy key pair. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the app is not registered.
    #[tracing::instrument(skip(self))]
    pub fn retire_legacy(&self, slug: &str) -> StorageResult<()> {
        let mut apps = self.apps.write();
        let entry = apps.get_mut(slug).ok_or_else(|| StorageError::not_found(slug))?;
        entry.legacy = None;
        Ok(())
    }

    /// Installs an explicit legacy key pair, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the app is not registered.
    pub fn set_legacy(&self, slug: &str, legacy: KeyPair) -> StorageResult<()> {
        let mut apps = self.apps.write();
        let entry = apps.get_mut(slug).ok_or_else(|| StorageError::not_found(slug))?;
        entry.legacy = Some(legacy);
        Ok(())
    }

    /// Removes an app from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the app is not registered.
    pub fn remove(&self, slug: &str) -> StorageResult<()> {
        if self.apps.write().remove(slug).is_none() {
            return Err(StorageError::not_found(slug));
        }
        Ok(())
    }

    /// Number of registered apps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.apps.read().len()
    }

    /// Returns `true` if no app is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apps.read().is_empty()
    }
}

#[async_trait]
impl AppKeyStore for MemoryAppKeyStore {
    #[tracing::instrument(skip(self))]
    async fn get_app_keys(&self, slug: &str) -> StorageResult<Option<AppKeys>> {
        Ok(self.apps.read().get(slug).cloned())
    }
}
