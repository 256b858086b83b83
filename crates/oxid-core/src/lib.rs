//! # oxid-core
//!
//! Core options, protocol vocabulary, and configuration resolution for
//! the oxid authorization server framework.
//!
//! The framework accepts a minimal operator seed through
//! [`ServerOptions`]; [`resolver::resolve`] validates the options
//! invariants and derives the supported flows, response types, response
//! modes, and key identifiers. Everything downstream (the pipeline, the
//! endpoint handlers, the token subflows) treats the resolved options as
//! immutable shared state.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod error;
pub mod options;
pub mod resolver;
pub mod types;

pub use error::{Error, Result};
pub use options::{EndpointUris, ServerOptions, StorageMode, TokenLifetimes};
pub use types::{
    CodeChallengeMethod, EndpointType, GrantType, ResponseMode, ResponseType, ResponseTypes,
    TokenKind,
};
