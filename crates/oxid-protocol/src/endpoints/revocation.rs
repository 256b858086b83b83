//! Revocation endpoint pipeline (RFC 7009).
//!
//! Revoking an unknown token is a success: the endpoint answers 200
//! with an empty body either way, so callers cannot probe for token
//! existence.

use async_trait::async_trait;

use oxid_core::{EndpointType, Error, Result, TokenKind};
use oxid_model::Token;
use oxid_pipeline::endpoints::Revocation;
use oxid_pipeline::{
    Context, HandleRequest, Handler, HandlerDescriptor, HandlerRegistry, Response, ValidateRequest,
};
use oxid_storage::{AuthorizationStore, TokenStore};

use crate::endpoints::common;
use crate::error::codes;
use crate::filters::{RequireDegradedModeDisabled, RequireTokenStorage};
use crate::handlers::authenticate_token;
use crate::props;

type Validate = ValidateRequest<Revocation>;
type Handle = HandleRequest<Revocation>;

/// Registers the revocation endpoint pipeline.
pub fn register(registry: &HandlerRegistry) {
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_revocation_request",
        1000,
        ValidateRevocationRequest,
    ));
    registry.register(
        HandlerDescriptor::<Validate>::new(
            "validate_revocation_client",
            2000,
            ValidateRevocationClient,
        )
        .with_filter(RequireDegradedModeDisabled),
    );

    registry.register(
        HandlerDescriptor::<Handle>::new("handle_revocation", 1000, HandleRevocation)
            .with_filter(RequireTokenStorage),
    );
    registry.register(HandlerDescriptor::<Handle>::new(
        "acknowledge_revocation",
        2000,
        AcknowledgeRevocation,
    ));
}

struct ValidateRevocationRequest;

#[async_trait]
impl Handler<Validate> for ValidateRevocationRequest {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let request = ctx.transaction().require_request()?;
        if request.token().is_none_or(str::is_empty) {
            ctx.reject(codes::INVALID_REQUEST, "the token parameter is required");
        }
        Ok(())
    }
}

struct ValidateRevocationClient;

#[async_trait]
impl Handler<Validate> for ValidateRevocationClient {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let txn = ctx.transaction().clone();
        let request = txn.require_request()?;
        match common::validate_client(&txn, &request, EndpointType::Revocation, None, true).await? {
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

/// Resolves and revokes the referenced token. Refresh tokens cascade
/// through their authorization so every sibling token dies with them.
struct HandleRevocation;

#[async_trait]
impl Handler<Handle> for HandleRevocation {
    async fn handle(&self, ctx: &mut Handle) -> Result<()> {
        let txn = ctx.transaction().clone();
        let request = txn.require_request()?;

        let authentication = authenticate_token(
            &txn,
            request.token().map(ToString::to_string),
            vec![
                TokenKind::AccessToken,
                TokenKind::RefreshToken,
                TokenKind::AuthorizationCode,
                TokenKind::DeviceCode,
            ],
        )
        .await?;

        let Some(principal) = authentication.principal else {
            // Unknown or already-dead token: still a success.
            return Ok(());
        };

        // Only a party to the token may revoke it.
        let caller = txn
            .property::<oxid_model::Application>(props::APPLICATION)
            .map(|a| a.client_id.clone())
            .or_else(|| request.client_id().map(ToString::to_string));
        let authorized = caller.as_deref().is_some_and(|caller| {
            principal.presenters().iter().any(|p| p == caller)
                || principal.audiences().iter().any(|a| a == caller)
        });
        if !authorized {
            return Ok(());
        }

        let store = txn
            .services()
            .get::<dyn TokenStore>()
            .ok_or_else(|| Error::Configuration("no token store is registered".into()))?;

        let entry = txn.property::<Token>(props::TOKEN_ENTRY);
        let token_id = entry
            .as_ref()
            .map(|e| e.id.clone())
            .or_else(|| principal.token_id().map(ToString::to_string));
        if let Some(token_id) = token_id {
            // Revoking an already-dead token is still a success; only a
            // store failure surfaces.
            store
                .revoke(&token_id)
                .await
                .map_err(|e| Error::Persistence(e.to_string()))?;
        }

        if principal.token_kind() == Some(TokenKind::RefreshToken) {
            if let Some(authorization_id) = principal.authorization_id() {
                if let Some(auth_store) = txn.services().get::<dyn AuthorizationStore>() {
                    auth_store
                        .revoke(authorization_id)
                        .await
                        .map_err(|e| Error::Persistence(e.to_string()))?;
                }
                store
                    .revoke_by_authorization(authorization_id)
                    .await
                    .map_err(|e| Error::Persistence(e.to_string()))?;
            }
        }
        Ok(())
    }
}

/// Always answer 200 with an empty body.
struct AcknowledgeRevocation;

#[async_trait]
impl Handler<Handle> for AcknowledgeRevocation {
    async fn handle(&self, ctx: &mut Handle) -> Result<()> {
        ctx.transaction().set_response(Response::new());
        ctx.mark_handled();
        Ok(())
    }
}
