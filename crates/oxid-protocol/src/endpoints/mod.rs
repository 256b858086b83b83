//! Built-in endpoint pipelines.
//!
//! Each module registers the extract/validate/handle/apply handler sets
//! for one endpoint. Orders within a phase step by 1000 so operators
//! can slot custom handlers between built-ins without renumbering.

pub mod authorization;
pub mod common;
pub mod configuration;
pub mod cryptography;
pub mod device;
pub mod introspection;
pub mod logout;
pub mod revocation;
pub mod token;
pub mod userinfo;
pub mod verification;

use oxid_pipeline::endpoints as markers;
use oxid_pipeline::{ExtractRequest, HandlerDescriptor, HandlerRegistry};

use common::EnsureRequestAttached;

/// Registers every built-in endpoint pipeline.
pub fn register(registry: &HandlerRegistry) {
    macro_rules! ensure_request {
        ($marker:ty) => {
            registry.register(HandlerDescriptor::<ExtractRequest<$marker>>::new(
                "ensure_request_attached",
                1000,
                EnsureRequestAttached,
            ));
        };
    }

    ensure_request!(markers::Authorization);
    ensure_request!(markers::Token);
    ensure_request!(markers::Device);
    ensure_request!(markers::Verification);
    ensure_request!(markers::Introspection);
    ensure_request!(markers::Revocation);
    ensure_request!(markers::Userinfo);
    ensure_request!(markers::Configuration);
    ensure_request!(markers::Cryptography);
    ensure_request!(markers::Logout);

    authorization::register(registry);
    token::register(registry);
    device::register(registry);
    verification::register(registry);
    introspection::register(registry);
    revocation::register(registry);
    userinfo::register(registry);
    configuration::register(registry);
    cryptography::register(registry);
    logout::register(registry);
}
