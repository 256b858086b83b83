//! Introspection endpoint pipeline (RFC 7662).
//!
//! The existence of a token is never revealed to an unauthorized
//! caller: any failure after client authentication answers
//! `{"active": false}` rather than an error.

use async_trait::async_trait;

use oxid_core::{EndpointType, Result, TokenKind};
use oxid_pipeline::endpoints::Introspection;
use oxid_pipeline::{
    params, Context, HandleRequest, Handler, HandlerDescriptor, HandlerRegistry, Response,
    ValidateRequest,
};

use crate::endpoints::common;
use crate::error::codes;
use crate::filters::RequireDegradedModeDisabled;
use crate::handlers::authenticate_token;
use crate::jose;
use crate::props;

type Validate = ValidateRequest<Introspection>;
type Handle = HandleRequest<Introspection>;

/// Registers the introspection endpoint pipeline.
pub fn register(registry: &HandlerRegistry) {
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_introspection_request",
        1000,
        ValidateIntrospectionRequest,
    ));
    registry.register(
        HandlerDescriptor::<Validate>::new(
            "validate_introspection_client",
            2000,
            ValidateIntrospectionClient,
        )
        .with_filter(RequireDegradedModeDisabled),
    );

    registry.register(HandlerDescriptor::<Handle>::new(
        "handle_introspection",
        1000,
        HandleIntrospection,
    ));
}

struct ValidateIntrospectionRequest;

#[async_trait]
impl Handler<Validate> for ValidateIntrospectionRequest {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let request = ctx.transaction().require_request()?;
        if request.token().is_none_or(str::is_empty) {
            ctx.reject(codes::INVALID_REQUEST, "the token parameter is required");
        }
        Ok(())
    }
}

struct ValidateIntrospectionClient;

#[async_trait]
impl Handler<Validate> for ValidateIntrospectionClient {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let txn = ctx.transaction().clone();
        let request = txn.require_request()?;
        match common::validate_client(&txn, &request, EndpointType::Introspection, None, true)
            .await?
        {
            Ok(application) => {
                txn.set_property(props::APPLICATION, application);
                Ok(())
            }
            Err(rejection) => {
                ctx.reject_with(rejection);
                Ok(())
            }
        }
    }
}

struct HandleIntrospection;

#[async_trait]
impl Handler<Handle> for HandleIntrospection {
    async fn handle(&self, ctx: &mut Handle) -> Result<()> {
        let txn = ctx.transaction().clone();
        let options = std::sync::Arc::clone(txn.options());
        let request = txn.require_request()?;

        let authentication = authenticate_token(
            &txn,
            request.token().map(ToString::to_string),
            vec![TokenKind::AccessToken, TokenKind::RefreshToken, TokenKind::IdToken],
        )
        .await?;

        let caller = txn
            .property::<oxid_model::Application>(props::APPLICATION)
            .map(|a| a.client_id.clone())
            .or_else(|| request.client_id().map(ToString::to_string));

        let principal = match (authentication.is_rejected(), authentication.principal) {
            (false, Some(principal)) => principal,
            _ => {
                txn.set_response(inactive());
                ctx.mark_handled();
                return Ok(());
            }
        };

        // The caller must be a party to the token.
        let authorized = caller.as_deref().is_some_and(|caller| {
            principal.audiences().iter().any(|a| a == caller)
                || principal.presenters().iter().any(|p| p == caller)
        });
        if !authorized {
            txn.set_response(inactive());
            ctx.mark_handled();
            return Ok(());
        }

        let kind = principal.token_kind().unwrap_or(TokenKind::AccessToken);
        let mut response = Response::new();
        response.set(params::ACTIVE, true);
        response.set("iss", options.issuer.clone());
        if let Some(subject) = principal.subject() {
            response.set("sub", subject);
        }
        let scopes = principal.scopes();
        if !scopes.is_empty() {
            response.set(params::SCOPE, scopes.join(" "));
        }
        if let Some(presenter) = principal.presenters().into_iter().next() {
            response.set(params::CLIENT_ID, presenter);
        }
        if kind == TokenKind::AccessToken {
            response.set(params::TOKEN_TYPE, "Bearer");
        }
        if let Some(token_id) = principal.token_id() {
            response.set("jti", token_id);
        }
        if let Some(creation) = principal.creation_date() {
            response.set("iat", creation.timestamp());
        }
        if let Some(expiration) = principal.expiration_date() {
            response.set("exp", expiration.timestamp());
        }
        let audiences = principal.audiences();
        match audiences.len() {
            0 => {}
            1 => response.set("aud", audiences[0].clone()),
            _ => response.set("aud", serde_json::json!(audiences)),
        }

        // Public claims, filtered symmetrically: claims carrying
        // explicit destinations must admit this token's kind; claims
        // without destinations were already filtered at issuance.
        for claim in principal.claims() {
            if jose::is_private_claim(&claim.claim_type)
                || response.get(&claim.claim_type).is_some()
            {
                continue;
            }
            let destinations = claim.destinations();
            if !destinations.is_empty() && !claim.has_destination(kind.destination()) {
                continue;
            }
            response.set(claim.claim_type.clone(), claim.value.clone());
        }

        txn.set_response(response);
        ctx.mark_handled();
        Ok(())
    }
}

fn inactive() -> Response {
    let mut response = Response::new();
    response.set(params::ACTIVE, false);
    response
}
