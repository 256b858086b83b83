//! Token consumption: the `ProcessAuthentication` pipeline.
//!
//! Resolves a wire token back to its principal: reference-handle lookup
//! first (when token storage is enabled), then decryption and signature
//! verification, then the server-entry and authorization checks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use oxid_core::{Error, Result, TokenKind};
use oxid_model::{Token, TokenStatus};
use oxid_pipeline::{
    Context, Dispatcher, Handler, HandlerDescriptor, HandlerRegistry, ProcessAuthentication,
    Transaction,
};
use oxid_storage::{AuthorizationStore, TokenStore};

use crate::error::codes;
use crate::filters::{RequireAuthorizationStorage, RequireTokenStorage};
use crate::jose;
use crate::props;

/// Registers the authentication pipeline.
pub fn register(registry: &HandlerRegistry) {
    registry.register(HandlerDescriptor::new(
        "validate_token_presence",
        1000,
        ValidateTokenPresence,
    ));
    registry.register(
        HandlerDescriptor::new("resolve_reference_token", 2000, ResolveReferenceToken)
            .with_filter(RequireTokenStorage),
    );
    registry.register(HandlerDescriptor::new(
        "unprotect_wire_token",
        3000,
        UnprotectWireToken,
    ));
    registry.register(HandlerDescriptor::new(
        "validate_token_kind",
        4000,
        ValidateTokenKind,
    ));
    registry.register(HandlerDescriptor::new(
        "validate_expiration",
        5000,
        ValidateExpiration,
    ));
    registry.register(
        HandlerDescriptor::new("validate_server_entry", 6000, ValidateServerEntry)
            .with_filter(RequireTokenStorage),
    );
    registry.register(
        HandlerDescriptor::new("validate_authorization_entry", 7000, ValidateAuthorizationEntry)
            .with_filter(RequireAuthorizationStorage),
    );
}

/// Dispatches a `ProcessAuthentication` for a wire token and returns
/// the context for the caller to inspect.
///
/// # Errors
///
/// Propagates dispatcher errors; protocol failures are reported through
/// the returned context's rejection flags.
pub async fn authenticate_token(
    transaction: &Transaction,
    token: Option<String>,
    accepted_kinds: Vec<TokenKind>,
) -> Result<ProcessAuthentication> {
    let dispatcher = transaction
        .services()
        .get::<Dispatcher>()
        .ok_or_else(|| Error::Configuration("the dispatcher is not registered".into()))?;
    let mut ctx = ProcessAuthentication::new(transaction.clone(), token, accepted_kinds);
    dispatcher.dispatch(&mut ctx).await?;
    Ok(ctx)
}

struct ValidateTokenPresence;

#[async_trait]
impl Handler<ProcessAuthentication> for ValidateTokenPresence {
    async fn handle(&self, ctx: &mut ProcessAuthentication) -> Result<()> {
        if ctx.token.as_deref().is_none_or(str::is_empty) {
            ctx.reject(codes::INVALID_TOKEN, "no token was provided");
        }
        Ok(())
    }
}

/// Opaque handles resolve through the store; the stored payload carries
/// the full principal.
struct ResolveReferenceToken;

#[async_trait]
impl Handler<ProcessAuthentication> for ResolveReferenceToken {
    async fn handle(&self, ctx: &mut ProcessAuthentication) -> Result<()> {
        let token = ctx.token.clone().unwrap_or_default();
        let store = ctx
            .transaction()
            .services()
            .get::<dyn TokenStore>()
            .ok_or_else(|| Error::Configuration("no token store is registered".into()))?;

        let Some(entry) = store
            .find_by_reference_id(&token)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?
        else {
            return Ok(());
        };

        let Some(envelope) = entry
            .payload
            .as_deref()
            .and_then(jose::decode_stored_envelope)
        else {
            ctx.reject(codes::INVALID_TOKEN, "the token payload is unreadable");
            return Ok(());
        };
        ctx.principal = Some(envelope.principal);
        ctx.transaction().set_property(props::TOKEN_ENTRY, entry);
        Ok(())
    }
}

/// Decrypts and/or verifies self-contained tokens.
struct UnprotectWireToken;

#[async_trait]
impl Handler<ProcessAuthentication> for UnprotectWireToken {
    async fn handle(&self, ctx: &mut ProcessAuthentication) -> Result<()> {
        if ctx.principal.is_some() {
            return Ok(());
        }
        let token = ctx.token.clone().unwrap_or_default();
        let options = Arc::clone(ctx.transaction().options());

        let principal = if oxid_crypto::jwe::is_encrypted(&token) {
            match jose::unprotect_bytes(&options, &token) {
                Some(bytes) => {
                    // The plaintext is either a binary envelope or a
                    // nested JWS.
                    if let Ok(Some(envelope)) =
                        oxid_claims::serialization::read_envelope(&bytes)
                    {
                        Some(envelope.principal)
                    } else {
                        String::from_utf8(bytes)
                            .ok()
                            .and_then(|jwt| jose::verify_claims(&options, &jwt).ok())
                            .map(|claims| jose::claims_to_principal(&claims))
                    }
                }
                None => None,
            }
        } else {
            jose::verify_claims(&options, &token)
                .ok()
                .map(|claims| jose::claims_to_principal(&claims))
        };

        match principal {
            Some(principal) => ctx.principal = Some(principal),
            None => ctx.reject(
                codes::INVALID_TOKEN,
                "the token is malformed or was not issued by this server",
            ),
        }
        Ok(())
    }
}

/// The token must carry one of the kinds acceptable in this position.
struct ValidateTokenKind;

#[async_trait]
impl Handler<ProcessAuthentication> for ValidateTokenKind {
    async fn handle(&self, ctx: &mut ProcessAuthentication) -> Result<()> {
        let Some(principal) = &ctx.principal else {
            ctx.reject(codes::INVALID_TOKEN, "no principal could be resolved");
            return Ok(());
        };
        match principal.token_kind() {
            Some(kind) if ctx.accepted_kinds.contains(&kind) => Ok(()),
            _ => {
                ctx.reject(
                    codes::INVALID_TOKEN,
                    "the token cannot be used in this position",
                );
                Ok(())
            }
        }
    }
}

struct ValidateExpiration;

#[async_trait]
impl Handler<ProcessAuthentication> for ValidateExpiration {
    async fn handle(&self, ctx: &mut ProcessAuthentication) -> Result<()> {
        let expired = ctx
            .principal
            .as_ref()
            .and_then(oxid_claims::Principal::expiration_date)
            .is_some_and(|expiration| expiration <= Utc::now());
        if expired {
            ctx.expired = true;
            ctx.reject(codes::INVALID_TOKEN, "the token has expired");
        }
        Ok(())
    }
}

/// The server-side entry must exist and be live.
struct ValidateServerEntry;

#[async_trait]
impl Handler<ProcessAuthentication> for ValidateServerEntry {
    async fn handle(&self, ctx: &mut ProcessAuthentication) -> Result<()> {
        let txn = ctx.transaction().clone();
        let entry = match txn.property::<Token>(props::TOKEN_ENTRY) {
            Some(entry) => Some((*entry).clone()),
            None => {
                let Some(token_id) = ctx
                    .principal
                    .as_ref()
                    .and_then(|p| p.token_id().map(ToString::to_string))
                else {
                    ctx.reject(codes::INVALID_TOKEN, "the token carries no identifier");
                    return Ok(());
                };
                let store = txn
                    .services()
                    .get::<dyn TokenStore>()
                    .ok_or_else(|| Error::Configuration("no token store is registered".into()))?;
                store
                    .find_by_id(&token_id)
                    .await
                    .map_err(|e| Error::Persistence(e.to_string()))?
            }
        };

        let Some(entry) = entry else {
            ctx.reject(codes::INVALID_TOKEN, "the token entry no longer exists");
            return Ok(());
        };
        let status = entry.status;
        // Callers inspect the entry even on rejection (e.g. to detect
        // refresh-token reuse), so it is attached unconditionally.
        txn.set_property(props::TOKEN_ENTRY, entry);
        match status {
            TokenStatus::Valid => Ok(()),
            TokenStatus::Redeemed => {
                ctx.reject(codes::INVALID_TOKEN, "the token has already been redeemed");
                Ok(())
            }
            TokenStatus::Inactive | TokenStatus::Revoked | TokenStatus::Rejected => {
                ctx.reject(codes::INVALID_TOKEN, "the token is no longer valid");
                Ok(())
            }
        }
    }
}

/// The referenced authorization must still be valid; a revoked
/// authorization revokes every dependent token (cascade).
struct ValidateAuthorizationEntry;

#[async_trait]
impl Handler<ProcessAuthentication> for ValidateAuthorizationEntry {
    async fn handle(&self, ctx: &mut ProcessAuthentication) -> Result<()> {
        let Some(authorization_id) = ctx
            .principal
            .as_ref()
            .and_then(|p| p.authorization_id().map(ToString::to_string))
        else {
            return Ok(());
        };
        let txn = ctx.transaction().clone();
        let store = txn
            .services()
            .get::<dyn AuthorizationStore>()
            .ok_or_else(|| Error::Configuration("no authorization store is registered".into()))?;

        let authorization = store
            .find_by_id(&authorization_id)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        if authorization.is_some_and(|a| a.is_valid()) {
            return Ok(());
        }

        // Propagate the cascade to the token entry itself so subsequent
        // lookups fail fast. The rejection below stands either way, so a
        // store failure here is logged rather than masking it.
        if let Some(token_store) = txn.services().get::<dyn TokenStore>() {
            if let Some(entry) = txn.property::<Token>(props::TOKEN_ENTRY) {
                if let Err(error) = token_store.revoke(&entry.id).await {
                    warn!(
                        token_id = %entry.id,
                        error = %error,
                        "failed to revoke the token entry during the authorization cascade"
                    );
                }
            }
        }
        ctx.reject(
            codes::INVALID_TOKEN,
            "the authorization backing this token has been revoked",
        );
        Ok(())
    }
}
