//! # oxid-claims
//!
//! The claims model of the oxid authorization server framework:
//!
//! - [`Claim`], [`Identity`], and [`Principal`]: the subject-attribute
//!   container every token is minted from
//! - per-claim destinations restricting which issued token kinds may
//!   carry a claim
//! - typed accessors for the protocol-private claims (audiences, scopes,
//!   token identifiers, lifetimes, dates)
//! - the versioned binary token envelope shared with earlier server
//!   generations

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod claim;
pub mod identity;
pub mod names;
pub mod principal;
pub mod serialization;

pub use claim::Claim;
pub use identity::Identity;
pub use principal::Principal;
pub use serialization::{read_envelope, write_envelope, ParseError, TokenEnvelope};
