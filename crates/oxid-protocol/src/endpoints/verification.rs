//! User-code verification endpoint pipeline (RFC 8628).
//!
//! The user types the code the device displayed; the host authenticates
//! the user and this pipeline binds the resulting principal to the
//! pending device code.

use async_trait::async_trait;
use chrono::Utc;

use oxid_claims::Principal;
use oxid_core::{Error, Result, TokenKind};
use oxid_crypto::random::normalize_user_code;
use oxid_model::{Authorization, AuthorizationKind, Token};
use oxid_pipeline::endpoints::Verification;
use oxid_pipeline::{
    params, Context, HandleRequest, Handler, HandlerDescriptor, HandlerRegistry, Response,
    ValidateRequest,
};
use oxid_storage::{AuthorizationStore, TokenStore};

use crate::driver::challenge;
use crate::error::codes;
use crate::filters::RequireTokenStorage;
use crate::handlers::authenticate_token;
use crate::jose;
use crate::props;

type Validate = ValidateRequest<Verification>;
type Handle = HandleRequest<Verification>;

/// Registers the verification endpoint pipeline.
pub fn register(registry: &HandlerRegistry) {
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_user_code_presence",
        1000,
        ValidateUserCodePresence,
    ));
    registry.register(
        HandlerDescriptor::<Validate>::new("validate_user_code_entry", 2000, ValidateUserCodeEntry)
            .with_filter(RequireTokenStorage),
    );

    registry.register(HandlerDescriptor::<Handle>::new(
        "attach_verification_principal",
        1000,
        AttachVerificationPrincipal,
    ));
    registry.register(HandlerDescriptor::<Handle>::new(
        "challenge_unverified_user",
        2000,
        ChallengeUnverifiedUser,
    ));
    registry.register(
        HandlerDescriptor::<Handle>::new("approve_device_authorization", 3000, ApproveDevice)
            .with_filter(RequireTokenStorage),
    );
}

struct ValidateUserCodePresence;

#[async_trait]
impl Handler<Validate> for ValidateUserCodePresence {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let request = ctx.transaction().require_request()?;
        if request.user_code().is_none_or(str::is_empty) {
            ctx.reject(codes::INVALID_REQUEST, "the user_code parameter is required");
        }
        Ok(())
    }
}

/// Resolves the user-code entry through its normalized reference
/// handle.
struct ValidateUserCodeEntry;

#[async_trait]
impl Handler<Validate> for ValidateUserCodeEntry {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let txn = ctx.transaction().clone();
        let request = txn.require_request()?;
        let normalized = normalize_user_code(request.user_code().unwrap_or_default());

        let authentication =
            authenticate_token(&txn, Some(normalized), vec![TokenKind::UserCode]).await?;
        if authentication.is_rejected() || authentication.principal.is_none() {
            if authentication.expired {
                ctx.reject(codes::EXPIRED_TOKEN, "the user code has expired");
            } else {
                ctx.reject(codes::INVALID_GRANT, "the user code is not recognized");
            }
            return Ok(());
        }
        txn.set_property(
            props::GRANT_PRINCIPAL,
            authentication.principal.unwrap_or_default(),
        );
        Ok(())
    }
}

/// Reads the host-authenticated user from the transaction.
struct AttachVerificationPrincipal;

#[async_trait]
impl Handler<Handle> for AttachVerificationPrincipal {
    async fn handle(&self, ctx: &mut Handle) -> Result<()> {
        if let Some(principal) = ctx.transaction().property::<Principal>(props::PRINCIPAL) {
            ctx.principal = Some((*principal).clone());
        }
        Ok(())
    }
}

struct ChallengeUnverifiedUser;

#[async_trait]
impl Handler<Handle> for ChallengeUnverifiedUser {
    async fn handle(&self, ctx: &mut Handle) -> Result<()> {
        if ctx.principal.is_some() {
            return Ok(());
        }
        let txn = ctx.transaction().clone();
        challenge(&txn).await?;
        ctx.mark_handled();
        Ok(())
    }
}

/// Binds the authenticated user to the pending device code: rewrites
/// the device entry payload with the user principal, creates the device
/// authorization, and redeems the one-time user code.
struct ApproveDevice;

#[async_trait]
impl Handler<Handle> for ApproveDevice {
    async fn handle(&self, ctx: &mut Handle) -> Result<()> {
        let txn = ctx.transaction().clone();
        let user = ctx
            .principal
            .clone()
            .ok_or_else(|| Error::Host("verification reached approval without a principal".into()))?;
        let Some(subject) = user.subject().map(ToString::to_string) else {
            return Err(Error::Host(
                "the verification principal carries no subject claim".into(),
            ));
        };
        let user_code_principal = txn
            .require_property::<Principal>(props::GRANT_PRINCIPAL)?;
        let Some(device_code_id) = user_code_principal.device_code_id().map(ToString::to_string)
        else {
            ctx.reject(codes::INVALID_GRANT, "the user code is not bound to a device");
            return Ok(());
        };

        let store = txn
            .services()
            .get::<dyn TokenStore>()
            .ok_or_else(|| Error::Configuration("no token store is registered".into()))?;
        let Some(mut device_entry) = store
            .find_by_id(&device_code_id)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?
        else {
            ctx.reject(codes::INVALID_GRANT, "the device code no longer exists");
            return Ok(());
        };
        if !device_entry.is_usable(Utc::now()) {
            ctx.reject(codes::EXPIRED_TOKEN, "the device code has expired");
            return Ok(());
        }
        let Some(device_principal) = device_entry
            .payload
            .as_deref()
            .and_then(jose::decode_stored_envelope)
            .map(|envelope| envelope.principal)
        else {
            ctx.reject(codes::INVALID_GRANT, "the device code payload is unreadable");
            return Ok(());
        };

        // The approved principal: the user's claims, the device
        // request's scopes and presenters, the device entry identity.
        let mut approved = user;
        approved.set_scopes(device_principal.scopes());
        approved.set_presenters(device_principal.presenters());
        approved.set_token_id(device_entry.id.clone());
        approved.set_token_kind(TokenKind::DeviceCode);
        if let Some(expiration) = device_principal.expiration_date() {
            approved.set_expiration_date(expiration);
        }

        if txn.options().authorization_storage.is_enabled() {
            let auth_store = txn
                .services()
                .get::<dyn AuthorizationStore>()
                .ok_or_else(|| {
                    Error::Configuration("no authorization store is registered".into())
                })?;
            let client_id = device_principal
                .presenters()
                .into_iter()
                .next()
                .unwrap_or_default();
            let authorization = Authorization::new(
                subject.clone(),
                client_id,
                AuthorizationKind::Device,
                approved.scopes().into_iter().collect(),
                Utc::now(),
            );
            auth_store
                .create(&authorization)
                .await
                .map_err(|e| Error::Persistence(e.to_string()))?;
            approved.set_authorization_id(authorization.id);
        }

        device_entry.subject = Some(subject);
        device_entry.payload = Some(jose::encode_stored_envelope(
            &oxid_claims::serialization::TokenEnvelope::new(jose::SCHEME, approved),
        ));
        store
            .update(&device_entry)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;

        // The user code is one-time: consume it now. A `false` result
        // means a concurrent approval already consumed it, which is
        // harmless; a store failure must surface.
        if let Some(user_code_entry) = txn.property::<Token>(props::TOKEN_ENTRY) {
            store
                .try_redeem(&user_code_entry.id, Utc::now())
                .await
                .map_err(|e| Error::Persistence(e.to_string()))?;
        }

        let mut response = Response::new();
        response.set(params::USER_CODE, txn.require_request()?.user_code().unwrap_or_default());
        response.set("status", "approved");
        txn.set_response(response);
        Ok(())
    }
}
