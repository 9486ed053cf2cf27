//! Shared app-registry storage for academy services.
//!
//! This crate holds the data model and collaborator traits behind
//! inter-service authentication: the app key registry ([`apps::AppKeyStore`])
//! and the capability lookup ([`apps::ScopeResolver`]). The authentication
//! layer (`academy-common-authn`) depends only on these traits, so the
//! backing store can be swapped without touching verification code.
//!
//! # Quick Start
//!
//! ```
//! use academy_common_storage::apps::{
//!     App, AppKeyStore, AuthSchema, KeyPair, MemoryAppKeyStore, SigningAlgorithm, Strategy,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryAppKeyStore::new();
//!     let app = App::builder()
//!         .slug("academy")
//!         .algorithm(SigningAlgorithm::Hs512)
//!         .strategy(Strategy::Signature)
//!         .schema(AuthSchema::Signature)
//!         .build();
//!     store.register(app, KeyPair::shared_secret("s3cret"))?;
//!
//!     // Rotate: the old secret keeps verifying until retired.
//!     store.rotate("academy", KeyPair::shared_secret("n3w-s3cret"))?;
//!     let keys = store.get_app_keys("academy").await?;
//!     assert!(keys.is_some_and(|k| k.legacy.is_some()));
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! All lookups return [`StorageResult<T>`], wrapping [`StorageError`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod apps;
pub mod error;

pub use error::{StorageError, StorageResult};
pub use zeroize::Zeroizing;
