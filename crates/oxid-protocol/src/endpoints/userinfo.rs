//! UserInfo endpoint pipeline (OIDC Core Section 5.3).

use async_trait::async_trait;

use oxid_core::{Result, TokenKind};
use oxid_pipeline::endpoints::Userinfo;
use oxid_pipeline::{
    Context, HandleRequest, Handler, HandlerDescriptor, HandlerRegistry, Response, ValidateRequest,
};

use crate::error::codes;
use crate::handlers::authenticate_token;
use crate::jose;

type Validate = ValidateRequest<Userinfo>;
type Handle = HandleRequest<Userinfo>;

/// Registers the userinfo endpoint pipeline.
pub fn register(registry: &HandlerRegistry) {
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_userinfo_token_presence",
        1000,
        ValidateTokenPresence,
    ));
    registry.register(HandlerDescriptor::<Handle>::new(
        "handle_userinfo",
        1000,
        HandleUserinfo,
    ));
}

struct ValidateTokenPresence;

#[async_trait]
impl Handler<Validate> for ValidateTokenPresence {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let request = ctx.transaction().require_request()?;
        if request.access_token().is_none_or(str::is_empty) {
            ctx.reject(
                codes::INVALID_TOKEN,
                "a bearer access token is required",
            );
        }
        Ok(())
    }
}

/// Authenticates the bearer token and projects the identity claims.
///
/// When the token's claim destinations are recoverable (reference
/// tokens carry the full envelope), only claims destined for the
/// identity token are returned; otherwise the claims embedded in the
/// access token are used as-is, since they were already
/// destination-filtered at issuance.
struct HandleUserinfo;

#[async_trait]
impl Handler<Handle> for HandleUserinfo {
    async fn handle(&self, ctx: &mut Handle) -> Result<()> {
        let txn = ctx.transaction().clone();
        let request = txn.require_request()?;

        let authentication = authenticate_token(
            &txn,
            request.access_token().map(ToString::to_string),
            vec![TokenKind::AccessToken],
        )
        .await?;
        let Some(principal) = (!authentication.is_rejected())
            .then_some(authentication.principal)
            .flatten()
        else {
            ctx.reject(
                codes::INVALID_TOKEN,
                "the access token is invalid or has expired",
            );
            return Ok(());
        };

        let Some(subject) = principal.subject() else {
            ctx.reject(codes::INVALID_TOKEN, "the access token carries no subject");
            return Ok(());
        };

        let mut response = Response::new();
        response.set("sub", subject);
        for claim in principal.claims() {
            if jose::is_private_claim(&claim.claim_type)
                || response.get(&claim.claim_type).is_some()
            {
                continue;
            }
            let destinations = claim.destinations();
            if !destinations.is_empty()
                && !claim.has_destination(TokenKind::IdToken.destination())
            {
                continue;
            }
            response.set(claim.claim_type.clone(), claim.value.clone());
        }
        txn.set_response(response);
        ctx.mark_handled();
        Ok(())
    }
}
