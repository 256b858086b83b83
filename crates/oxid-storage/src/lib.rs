//! # oxid-storage
//!
//! Storage abstraction traits for the oxid authorization server
//! framework, plus an in-memory reference implementation.
//!
//! Concrete backends (SQL, document stores) implement these traits and
//! must uphold two guarantees the protocol engine depends on:
//!
//! - **Atomic redemption**: [`TokenStore::try_redeem`] is a
//!   compare-and-set from valid to redeemed that succeeds for exactly
//!   one caller under concurrency.
//! - **Monotonic revocation**: a revoked entry never returns to valid.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod application;
pub mod authorization;
pub mod error;
pub mod memory;
pub mod scope;
pub mod token;

pub use application::ApplicationStore;
pub use authorization::AuthorizationStore;
pub use error::{StorageError, StorageResult};
pub use scope::ScopeStore;
pub use token::TokenStore;
