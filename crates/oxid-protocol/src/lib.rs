//! # oxid-protocol
//!
//! The protocol processing engine of the oxid authorization server
//! framework: built-in endpoint pipelines (authorization, token,
//! device, verification, introspection, revocation, userinfo,
//! discovery, JWKS, logout), the token issuance and validation
//! subflows, and the [`ServerProvider`] entry point host adapters build
//! transactions against.
//!
//! HTTP binding is not this crate's concern: hosts parse the wire
//! request into a [`oxid_pipeline::Request`] parameter bag, attach it
//! to a transaction, and emit the resulting
//! [`oxid_pipeline::Response`].

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod cache;
pub mod driver;
pub mod endpoints;
pub mod error;
pub mod filters;
pub mod handlers;
pub mod jose;
pub mod props;
pub mod provider;

pub use cache::{MemoryRequestCache, RequestCache};
pub use driver::{challenge, sign_in};
pub use endpoints::device::DevicePollRegistry;
pub use error::{codes, http_status};
pub use handlers::authenticate_token;
pub use provider::{ServerProvider, ServerProviderBuilder};
