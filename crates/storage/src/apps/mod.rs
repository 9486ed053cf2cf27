//! App registry types and collaborator traits.
//!
//! These are the two lookups the authentication layer depends on:
//!
//! - [`AppKeyStore`]: app info plus current and legacy key pairs
//! - [`ScopeResolver`]: scopes granted to an app or to a user through an app
//!
//! Both are `async_trait` objects so production backends can hit the app
//! database while tests use [`MemoryAppKeyStore`] and [`MemoryScopeResolver`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  get_app_keys   ┌─────────────┐
//! │   authn     │────────────────►│ AppKeyStore │
//! │ (verifiers, │                 └─────────────┘
//! │   signer)   │ resolve_scopes  ┌───────────────┐
//! │             │────────────────►│ ScopeResolver │
//! └─────────────┘                 └───────────────┘
//! ```

mod app;
mod scopes;
mod store;

pub use app::{App, AppKeys, AuthSchema, KeyPair, SigningAlgorithm, Strategy};
pub use scopes::{MemoryScopeResolver, ResolvedScopes, ScopeResolver};
pub use store::{AppKeyStore, MemoryAppKeyStore};
