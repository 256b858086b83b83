//! JSON Web Key Set endpoint pipeline (RFC 7517).

use async_trait::async_trait;
use serde_json::json;

use oxid_core::Result;
use oxid_pipeline::endpoints::Cryptography;
use oxid_pipeline::{Context, HandleRequest, Handler, HandlerDescriptor, HandlerRegistry, Response};

type Handle = HandleRequest<Cryptography>;

/// Registers the JWKS endpoint pipeline.
pub fn register(registry: &HandlerRegistry) {
    registry.register(HandlerDescriptor::<Handle>::new(
        "build_key_set",
        1000,
        BuildKeySet,
    ));
}

/// Projects the public half of the asymmetric signing credentials.
/// Symmetric keys never appear in the document.
struct BuildKeySet;

#[async_trait]
impl Handler<Handle> for BuildKeySet {
    async fn handle(&self, ctx: &mut Handle) -> Result<()> {
        let txn = ctx.transaction().clone();
        let keys: Vec<serde_json::Value> = txn
            .options()
            .signing_credentials
            .iter()
            .filter_map(oxid_crypto::SigningCredential::as_jwk)
            .collect();

        let mut response = Response::new();
        response.set("keys", json!(keys));
        txn.set_response(response);
        ctx.mark_handled();
        Ok(())
    }
}
