//! Cross-cutting handler sets: sign-in issuance, token authentication,
//! challenge and error rendering.

pub mod authentication;
pub mod sign_in;

use oxid_pipeline::HandlerRegistry;

pub use authentication::authenticate_token;

/// Registers the built-in cross-cutting pipelines.
pub fn register(registry: &HandlerRegistry) {
    sign_in::register(registry);
    authentication::register(registry);
}
