//! Conformance test suite.
//!
//! Drives full protocol flows through the provider with in-memory
//! stores: authorization code with PKCE, refresh rotation, the device
//! flow, introspection, revocation cascades, discovery, the token
//! envelope, and degraded mode.

mod harness;

mod basic_op;
mod concurrency;
mod config_op;
mod degraded;
mod device_op;
mod envelope;
mod introspection;
mod revocation;
mod token_endpoint;
mod userinfo;
