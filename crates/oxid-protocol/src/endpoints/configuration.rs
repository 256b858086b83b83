//! Discovery document endpoint pipeline.
//!
//! The document is a read-only projection of the resolved options
//! (OpenID Connect Discovery 1.0 / RFC 8414).

use async_trait::async_trait;
use serde_json::json;

use oxid_core::{EndpointType, Result};
use oxid_pipeline::endpoints::Configuration;
use oxid_pipeline::{Context, HandleRequest, Handler, HandlerDescriptor, HandlerRegistry, Response};

use crate::endpoints::common::absolute_endpoint_uri;

type Handle = HandleRequest<Configuration>;

/// Registers the discovery endpoint pipeline.
pub fn register(registry: &HandlerRegistry) {
    registry.register(HandlerDescriptor::<Handle>::new(
        "build_discovery_document",
        1000,
        BuildDiscoveryDocument,
    ));
}

struct BuildDiscoveryDocument;

#[async_trait]
impl Handler<Handle> for BuildDiscoveryDocument {
    async fn handle(&self, ctx: &mut Handle) -> Result<()> {
        let txn = ctx.transaction().clone();
        let options = std::sync::Arc::clone(txn.options());
        let issuer = options.issuer.clone();

        let endpoint_uri = |endpoint: EndpointType| {
            options
                .endpoints
                .get(endpoint)
                .map(|path| absolute_endpoint_uri(&issuer, path))
        };

        let mut response = Response::new();
        response.set("issuer", issuer.clone());
        if let Some(uri) = endpoint_uri(EndpointType::Authorization) {
            response.set("authorization_endpoint", uri);
        }
        if let Some(uri) = endpoint_uri(EndpointType::Token) {
            response.set("token_endpoint", uri);
        }
        if let Some(uri) = endpoint_uri(EndpointType::Device) {
            response.set("device_authorization_endpoint", uri);
        }
        if let Some(uri) = endpoint_uri(EndpointType::Introspection) {
            response.set("introspection_endpoint", uri);
        }
        if let Some(uri) = endpoint_uri(EndpointType::Revocation) {
            response.set("revocation_endpoint", uri);
        }
        if let Some(uri) = endpoint_uri(EndpointType::Userinfo) {
            response.set("userinfo_endpoint", uri);
        }
        if let Some(uri) = endpoint_uri(EndpointType::Logout) {
            response.set("end_session_endpoint", uri);
        }
        if let Some(uri) = endpoint_uri(EndpointType::Cryptography) {
            response.set("jwks_uri", uri);
        }

        // BTreeSet iteration keeps every list sorted and stable.
        response.set(
            "grant_types_supported",
            json!(options
                .grant_types
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()),
        );
        response.set(
            "response_types_supported",
            json!(options.response_types.iter().collect::<Vec<_>>()),
        );
        response.set(
            "response_modes_supported",
            json!(options
                .response_modes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()),
        );
        response.set(
            "scopes_supported",
            json!(options.scopes.iter().collect::<Vec<_>>()),
        );
        response.set(
            "code_challenge_methods_supported",
            json!(options
                .code_challenge_methods
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()),
        );

        let mut algorithms: Vec<&str> = options
            .signing_credentials
            .iter()
            .filter(|credential| credential.is_asymmetric())
            .map(|credential| credential.algorithm().jwa_name())
            .collect();
        algorithms.sort_unstable();
        algorithms.dedup();
        response.set("id_token_signing_alg_values_supported", json!(algorithms));

        response.set(
            "token_endpoint_auth_methods_supported",
            json!(["client_secret_post", "none"]),
        );
        response.set("subject_types_supported", json!(["public"]));

        txn.set_response(response);
        ctx.mark_handled();
        Ok(())
    }
}
