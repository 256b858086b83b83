//! # oxid-model
//!
//! Entry models persisted by the oxid authorization server framework:
//! registered applications (relying parties), authorizations (grants of
//! consent), tokens, and scopes. The models are plain data; persistence
//! is behind the store traits in `oxid-storage`.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod application;
pub mod authorization;
pub mod scope;
pub mod token;

pub use application::{Application, ClientType};
pub use authorization::{Authorization, AuthorizationKind, AuthorizationStatus};
pub use scope::Scope;
pub use token::{Token, TokenStatus};
