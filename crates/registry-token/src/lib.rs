//! # Registry Token
//!
//! Signed access tokens for a container registry, converged as files under
//! the registry configuration directory.
//!
//! ## Overview
//!
//! A token is an RS256-signed JWT whose header `kid` is the RFC 7638
//! thumbprint of the signing key. The payload carries the registered claims,
//! the normalized `access` grants and any custom claims. It is persisted as
//!
//! ```json
//! {"token": "<header>.<payload>.<signature>", "access": [{"name": "group/app", "type": "repository", "actions": ["pull", "push"]}]}
//! ```
//!
//! with mode 0600.
//!
//! ## Key Components
//!
//! - [`scope`]: access scope normalization and order-insensitive comparison
//! - [`ExpiryPlanner`]: renewal timing from TTL and threshold
//! - [`KeyChain`]: ordered signing key sources
//! - [`TokenIssuer`]: signing and verification
//! - [`RegistryTokenStrategy`]: the resource strategy plugged into
//!   [`converge_core::Convergence`]

#![deny(unsafe_code)]

pub mod claims;
pub mod error;
pub mod expiry;
pub mod inventory;
pub mod issuer;
pub mod jwk;
pub mod keys;
pub mod resource;
pub mod scope;
pub mod spec;
pub mod store;
pub mod ttl;

pub use error::{TokenError, TokenResult};
pub use expiry::ExpiryPlanner;
pub use inventory::{inventory, TokenInventoryEntry};
pub use issuer::{PersistedToken, TokenIssuer};
pub use jwk::RsaPublicJwk;
pub use keys::{FileKeyProvider, KeyChain, KeyProvider, SecretsDocumentKeyProvider, SigningKey};
pub use resource::{RegistryTokenStrategy, TokenContext, TokenObservation, TokenProperty};
pub use scope::{AccessScope, ScopeAction, ScopeInput};
pub use spec::{TokenParams, TokenSpec, TokenTarget};
pub use store::TokenStore;
pub use ttl::TtlMode;
