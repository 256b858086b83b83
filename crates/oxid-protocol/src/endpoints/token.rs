//! Token endpoint pipeline.
//!
//! Dispatches by grant type: authorization code (with PKCE and one-time
//! redemption), refresh token (with rotation and sliding expiration),
//! client credentials, device code polling, and the password grant
//! delegation point.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;

use oxid_claims::Principal;
use oxid_core::{EndpointType, Error, GrantType, Result, TokenKind};
use oxid_core::types::scopes as scope_names;
use oxid_crypto::hash::{constant_time_eq, sha256};
use oxid_model::{Token, TokenStatus};
use oxid_pipeline::endpoints::Token as TokenEndpoint;
use oxid_pipeline::{
    params, ApplyResponse, Context, HandleRequest, Handler, HandlerDescriptor, HandlerRegistry,
    Response, Transaction, ValidateRequest,
};
use oxid_storage::TokenStore;

use crate::driver::sign_in;
use crate::endpoints::common;
use crate::endpoints::device::DevicePollRegistry;
use crate::error::codes;
use crate::filters::{RequireDegradedModeDisabled, RequireTokenStorage};
use crate::handlers::authenticate_token;
use crate::props;

type Validate = ValidateRequest<TokenEndpoint>;
type Handle = HandleRequest<TokenEndpoint>;
type Apply = ApplyResponse<TokenEndpoint>;

/// Registers the token endpoint pipeline.
pub fn register(registry: &HandlerRegistry) {
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_grant_type",
        1000,
        ValidateGrantType,
    ));
    registry.register(
        HandlerDescriptor::<Validate>::new("validate_token_client", 2000, ValidateTokenClient)
            .with_filter(RequireDegradedModeDisabled),
    );
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_grant_parameters",
        3000,
        ValidateGrantParameters,
    ));
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_token_scopes",
        4000,
        ValidateTokenScopes,
    ));
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_authorization_code_grant",
        5000,
        ValidateAuthorizationCodeGrant,
    ));
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_refresh_token_grant",
        6000,
        ValidateRefreshTokenGrant,
    ));
    registry.register(
        HandlerDescriptor::<Validate>::new("validate_device_code_grant", 7000, ValidateDeviceCodeGrant)
            .with_filter(RequireTokenStorage),
    );
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_client_credentials_grant",
        8000,
        ValidateClientCredentialsGrant,
    ));
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_password_grant",
        9000,
        ValidatePasswordGrant,
    ));

    registry.register(HandlerDescriptor::<Handle>::new(
        "attach_token_principal",
        1000,
        AttachTokenPrincipal,
    ));
    registry.register(HandlerDescriptor::<Handle>::new(
        "sign_in_token_request",
        2000,
        SignInTokenRequest,
    ));

    registry.register(HandlerDescriptor::<Apply>::new(
        "normalize_token_error_response",
        1000,
        NormalizeTokenErrorResponse,
    ));
}

fn request_grant(transaction: &Transaction) -> Option<GrantType> {
    transaction
        .request()
        .and_then(|request| request.grant_type().and_then(|g| g.parse().ok()))
}

struct ValidateGrantType;

#[async_trait]
impl Handler<Validate> for ValidateGrantType {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let request = ctx.transaction().require_request()?;
        let Some(raw) = request.grant_type() else {
            ctx.reject(codes::INVALID_REQUEST, "the grant_type parameter is required");
            return Ok(());
        };
        let Ok(grant) = raw.parse::<GrantType>() else {
            ctx.reject(
                codes::UNSUPPORTED_GRANT_TYPE,
                "the grant_type parameter is not recognized",
            );
            return Ok(());
        };
        if grant == GrantType::Implicit || !ctx.transaction().options().is_grant_enabled(grant) {
            ctx.reject(
                codes::UNSUPPORTED_GRANT_TYPE,
                "the requested grant type is not enabled",
            );
        }
        Ok(())
    }
}

struct ValidateTokenClient;

#[async_trait]
impl Handler<Validate> for ValidateTokenClient {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let txn = ctx.transaction().clone();
        let request = txn.require_request()?;
        // Public clients redeeming a code bound by PKCE may omit
        // client_id entirely; the code itself carries the binding.
        if request.client_id().is_none() && request.client_secret().is_none() {
            return Ok(());
        }
        let grant = request_grant(&txn);
        match common::validate_client(&txn, &request, EndpointType::Token, grant, true).await? {
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

struct ValidateGrantParameters;

#[async_trait]
impl Handler<Validate> for ValidateGrantParameters {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let request = ctx.transaction().require_request()?;
        let Some(grant) = request_grant(ctx.transaction()) else {
            return Ok(());
        };
        let missing = match grant {
            GrantType::AuthorizationCode if request.code().is_none() => Some(params::CODE),
            GrantType::RefreshToken if request.refresh_token().is_none() => {
                Some(params::REFRESH_TOKEN)
            }
            GrantType::DeviceCode if request.device_code().is_none() => Some(params::DEVICE_CODE),
            GrantType::Password if request.username().is_none() => Some(params::USERNAME),
            GrantType::Password if request.password().is_none() => Some(params::PASSWORD),
            _ => None,
        };
        if let Some(missing) = missing {
            ctx.reject(
                codes::INVALID_REQUEST,
                format!("the {missing} parameter is required for this grant type"),
            );
        }
        Ok(())
    }
}

struct ValidateTokenScopes;

#[async_trait]
impl Handler<Validate> for ValidateTokenScopes {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let txn = ctx.transaction().clone();
        let request = txn.require_request()?;
        let scopes = request.scopes();
        if scopes.is_empty() {
            return Ok(());
        }
        if let Some(unknown) = common::find_unknown_scope(&txn, &scopes).await? {
            ctx.reject(
                codes::INVALID_SCOPE,
                format!("the scope '{unknown}' is not registered"),
            );
            return Ok(());
        }
        if let Some(application) = txn.property::<oxid_model::Application>(props::APPLICATION) {
            if let Some(scope) = common::find_unpermitted_scope(&txn, &application, &scopes) {
                ctx.reject(
                    codes::INVALID_SCOPE,
                    format!("the client is not allowed to request the scope '{scope}'"),
                );
            }
        }
        Ok(())
    }
}

/// Verifies the authorization code: issuer, client binding, redirect
/// binding, PKCE, and one-time redemption.
struct ValidateAuthorizationCodeGrant;

#[async_trait]
impl Handler<Validate> for ValidateAuthorizationCodeGrant {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        if request_grant(ctx.transaction()) != Some(GrantType::AuthorizationCode) {
            return Ok(());
        }
        let txn = ctx.transaction().clone();
        let request = txn.require_request()?;

        let authentication = authenticate_token(
            &txn,
            request.code().map(ToString::to_string),
            vec![TokenKind::AuthorizationCode],
        )
        .await?;
        if authentication.is_rejected() || authentication.principal.is_none() {
            ctx.reject(
                codes::INVALID_GRANT,
                "the authorization code is invalid, expired, or has been redeemed",
            );
            return Ok(());
        }
        let principal = authentication.principal.unwrap_or_default();

        if let Some(client_id) = request.client_id() {
            if !principal.presenters().iter().any(|p| p == client_id) {
                ctx.reject(
                    codes::INVALID_GRANT,
                    "the authorization code was not issued to this client",
                );
                return Ok(());
            }
        }

        if let Some(original) = principal.original_redirect_uri() {
            if request.redirect_uri() != Some(original) {
                ctx.reject(
                    codes::INVALID_GRANT,
                    "the redirect_uri does not match the authorization request",
                );
                return Ok(());
            }
        }

        if let Some(challenge) = principal.code_challenge() {
            let Some(verifier) = request.code_verifier() else {
                ctx.reject(
                    codes::INVALID_GRANT,
                    "the code_verifier parameter is required",
                );
                return Ok(());
            };
            let derived = match principal.code_challenge_method() {
                Some("S256") => URL_SAFE_NO_PAD.encode(sha256(verifier.as_bytes())),
                _ => verifier.to_string(),
            };
            if !constant_time_eq(derived.as_bytes(), challenge.as_bytes()) {
                ctx.reject(
                    codes::INVALID_GRANT,
                    "the code_verifier does not match the code_challenge",
                );
                return Ok(());
            }
        } else if request.code_verifier().is_some() {
            ctx.reject(
                codes::INVALID_REQUEST,
                "a code_verifier was sent but the code carries no code_challenge",
            );
            return Ok(());
        }

        if !redeem_one_time_entry(&txn, &principal).await? {
            ctx.reject(
                codes::INVALID_GRANT,
                "the authorization code has already been redeemed",
            );
            return Ok(());
        }

        txn.set_property(props::GRANT_PRINCIPAL, principal);
        Ok(())
    }
}

/// Verifies the refresh token, detects reuse after rotation, rotates
/// when rolling refresh tokens are enabled, and slides the expiration
/// otherwise.
struct ValidateRefreshTokenGrant;

#[async_trait]
impl Handler<Validate> for ValidateRefreshTokenGrant {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        if request_grant(ctx.transaction()) != Some(GrantType::RefreshToken) {
            return Ok(());
        }
        let txn = ctx.transaction().clone();
        let options = Arc::clone(txn.options());
        let request = txn.require_request()?;

        let authentication = authenticate_token(
            &txn,
            request.refresh_token().map(ToString::to_string),
            vec![TokenKind::RefreshToken],
        )
        .await?;
        if authentication.is_rejected() || authentication.principal.is_none() {
            // A redeemed entry means the token was already rotated:
            // treat it as theft and revoke everything descended from
            // the same authorization.
            if let Some(entry) = txn.property::<Token>(props::TOKEN_ENTRY) {
                if entry.status == TokenStatus::Redeemed {
                    revoke_authorization_cascade(&txn, entry.authorization_id.as_deref()).await?;
                }
            }
            ctx.reject(
                codes::INVALID_GRANT,
                "the refresh token is invalid, expired, or has been revoked",
            );
            return Ok(());
        }
        let principal = authentication.principal.unwrap_or_default();

        if let Some(client_id) = request.client_id() {
            if !principal.presenters().iter().any(|p| p == client_id) {
                ctx.reject(
                    codes::INVALID_GRANT,
                    "the refresh token was not issued to this client",
                );
                return Ok(());
            }
        }

        // A narrower scope may be requested; a wider one may not.
        let requested = request.scopes();
        if !requested.is_empty() {
            let granted = principal.scopes();
            if let Some(extra) = requested.iter().find(|s| !granted.iter().any(|g| g == *s)) {
                ctx.reject(
                    codes::INVALID_SCOPE,
                    format!("the scope '{extra}' exceeds the original grant"),
                );
                return Ok(());
            }
        }

        if options.token_storage.is_enabled() {
            if options.use_rolling_refresh_tokens {
                if !redeem_one_time_entry(&txn, &principal).await? {
                    revoke_authorization_cascade(
                        &txn,
                        principal.authorization_id().map(ToString::to_string).as_deref(),
                    )
                    .await?;
                    ctx.reject(
                        codes::INVALID_GRANT,
                        "the refresh token has already been rotated",
                    );
                    return Ok(());
                }
            } else if options.uses_sliding_refresh_expiration() {
                if let Some(entry) = txn.property::<Token>(props::TOKEN_ENTRY) {
                    let mut entry = (*entry).clone();
                    entry.expiration_date = Some(Utc::now() + options.lifetimes.refresh_token);
                    let store = txn
                        .services()
                        .get::<dyn TokenStore>()
                        .ok_or_else(|| Error::Configuration("no token store is registered".into()))?;
                    store
                        .update(&entry)
                        .await
                        .map_err(|e| Error::Persistence(e.to_string()))?;
                }
            }
        }

        txn.set_property(props::GRANT_PRINCIPAL, principal);
        Ok(())
    }
}

/// Polls a device code: rate limiting, pending detection, and one-time
/// redemption once the user has approved.
struct ValidateDeviceCodeGrant;

#[async_trait]
impl Handler<Validate> for ValidateDeviceCodeGrant {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        if request_grant(ctx.transaction()) != Some(GrantType::DeviceCode) {
            return Ok(());
        }
        let txn = ctx.transaction().clone();
        let options = Arc::clone(txn.options());
        let request = txn.require_request()?;
        let device_code = request.device_code().unwrap_or_default().to_string();

        if let Some(polls) = txn.services().get::<DevicePollRegistry>() {
            if polls.poll_too_fast(&device_code, options.device_polling_interval, Utc::now()) {
                ctx.reject(codes::SLOW_DOWN, "polling faster than the allowed interval");
                return Ok(());
            }
        }

        let authentication =
            authenticate_token(&txn, Some(device_code), vec![TokenKind::DeviceCode]).await?;
        if authentication.is_rejected() {
            if authentication.expired {
                ctx.reject(codes::EXPIRED_TOKEN, "the device code has expired");
                return Ok(());
            }
            let denied = txn
                .property::<Token>(props::TOKEN_ENTRY)
                .is_some_and(|entry| entry.status == TokenStatus::Revoked);
            if denied {
                ctx.reject(codes::ACCESS_DENIED, "the user declined the authorization");
            } else {
                ctx.reject(codes::INVALID_GRANT, "the device code is invalid");
            }
            return Ok(());
        }

        // The wire token still carries the original client principal;
        // the approved principal lives in the stored entry payload.
        let Some(entry) = txn.property::<Token>(props::TOKEN_ENTRY) else {
            ctx.reject(codes::INVALID_GRANT, "the device code is invalid");
            return Ok(());
        };
        let Some(stored) = entry
            .payload
            .as_deref()
            .and_then(crate::jose::decode_stored_envelope)
        else {
            ctx.reject(codes::INVALID_GRANT, "the device code is invalid");
            return Ok(());
        };
        let principal = stored.principal;

        if principal.subject().is_none() {
            ctx.reject(
                codes::AUTHORIZATION_PENDING,
                "the user has not completed the verification yet",
            );
            return Ok(());
        }

        if !try_redeem_entry(&txn, &entry.id).await? {
            ctx.reject(
                codes::INVALID_GRANT,
                "the device code has already been redeemed",
            );
            return Ok(());
        }

        txn.set_property(props::GRANT_PRINCIPAL, principal);
        Ok(())
    }
}

struct ValidateClientCredentialsGrant;

#[async_trait]
impl Handler<Validate> for ValidateClientCredentialsGrant {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        if request_grant(ctx.transaction()) != Some(GrantType::ClientCredentials) {
            return Ok(());
        }
        if ctx
            .transaction()
            .require_request()?
            .client_id()
            .is_none()
        {
            ctx.reject(
                codes::INVALID_REQUEST,
                "the client_id parameter is required for the client_credentials grant",
            );
            return Ok(());
        }
        let public = ctx
            .transaction()
            .property::<oxid_model::Application>(props::APPLICATION)
            .is_some_and(|a| a.client_type == oxid_model::ClientType::Public);
        if public {
            ctx.reject(
                codes::UNAUTHORIZED_CLIENT,
                "public clients cannot use the client_credentials grant",
            );
        }
        Ok(())
    }
}

/// The password grant is only available through an operator-registered
/// handler that authenticates the resource owner and stores the grant
/// principal. This terminal built-in rejects unhandled requests.
struct ValidatePasswordGrant;

#[async_trait]
impl Handler<Validate> for ValidatePasswordGrant {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        if request_grant(ctx.transaction()) != Some(GrantType::Password) {
            return Ok(());
        }
        if ctx
            .transaction()
            .property::<Principal>(props::GRANT_PRINCIPAL)
            .is_none()
        {
            ctx.reject(
                codes::INVALID_GRANT,
                "the resource owner credentials could not be validated",
            );
        }
        Ok(())
    }
}

/// Builds the sign-in principal for the validated grant.
struct AttachTokenPrincipal;

#[async_trait]
impl Handler<Handle> for AttachTokenPrincipal {
    async fn handle(&self, ctx: &mut Handle) -> Result<()> {
        let txn = ctx.transaction().clone();
        if let Some(principal) = txn.property::<Principal>(props::GRANT_PRINCIPAL) {
            ctx.principal = Some((*principal).clone());
            return Ok(());
        }

        let request = txn.require_request()?;
        if request_grant(&txn) == Some(GrantType::ClientCredentials) {
            let Some(client_id) = request.client_id().map(ToString::to_string) else {
                return Err(Error::Host(
                    "client_credentials reached the handle phase without a client_id".into(),
                ));
            };
            // The client is its own subject.
            let mut principal = Principal::new();
            principal.set_subject(client_id.clone());
            principal.set_presenters([client_id]);
            let scopes: Vec<String> = request.scopes().iter().map(ToString::to_string).collect();
            if !scopes.is_empty() {
                principal.set_scopes(scopes);
            }
            ctx.principal = Some(principal);
        }
        Ok(())
    }
}

/// Signs the grant principal in and shapes the token response.
struct SignInTokenRequest;

#[async_trait]
impl Handler<Handle> for SignInTokenRequest {
    async fn handle(&self, ctx: &mut Handle) -> Result<()> {
        let txn = ctx.transaction().clone();
        let options = Arc::clone(txn.options());
        let request = txn.require_request()?;
        let Some(mut principal) = ctx.principal.clone() else {
            return Err(Error::Host(
                "the token handle phase reached sign-in without a principal".into(),
            ));
        };
        let grant = request_grant(&txn);

        // Narrow the scope set when the refresh request asked for less.
        if grant == Some(GrantType::RefreshToken) && !request.scopes().is_empty() {
            principal.set_scopes(
                request
                    .scopes()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>(),
            );
        }

        let scopes = principal.scopes();
        let mut kinds = vec![TokenKind::AccessToken];
        if scopes.iter().any(|s| s == scope_names::OPENID) {
            kinds.push(TokenKind::IdToken);
        }
        let offline = scopes.iter().any(|s| s == scope_names::OFFLINE_ACCESS);
        let refresh_allowed = options.is_grant_enabled(GrantType::RefreshToken);
        let issue_refresh = match grant {
            Some(GrantType::RefreshToken) => options.use_rolling_refresh_tokens,
            Some(GrantType::ClientCredentials) => false,
            _ => refresh_allowed && offline,
        };
        if issue_refresh {
            kinds.push(TokenKind::RefreshToken);
        }

        let result = sign_in(&txn, principal, kinds).await?;
        if result.is_rejected() {
            ctx.reject_with(result.state().rejection().cloned().unwrap_or_else(|| {
                oxid_pipeline::Rejection {
                    error: codes::SERVER_ERROR.to_string(),
                    description: None,
                    uri: None,
                }
            }));
            return Ok(());
        }

        let mut response = Response::new();
        let Some(access_token) = &result.access_token else {
            return Err(Error::Configuration(
                "the sign-in did not produce an access token".into(),
            ));
        };
        response.set(params::ACCESS_TOKEN, access_token.clone());
        response.set(params::TOKEN_TYPE, "Bearer");
        response.set(
            params::EXPIRES_IN,
            options.lifetimes.access_token.num_seconds(),
        );
        let granted = result.principal.scopes();
        if !granted.is_empty() {
            response.set(params::SCOPE, granted.join(" "));
        }
        if let Some(id_token) = &result.identity_token {
            response.set(params::ID_TOKEN, id_token.clone());
        }
        if let Some(refresh_token) = &result.refresh_token {
            response.set(params::REFRESH_TOKEN, refresh_token.clone());
        }
        txn.set_response(response);
        Ok(())
    }
}

/// The token endpoint never describes internal failures: error
/// responses are stripped down to the standardized triple.
struct NormalizeTokenErrorResponse;

#[async_trait]
impl Handler<Apply> for NormalizeTokenErrorResponse {
    async fn handle(&self, ctx: &mut Apply) -> Result<()> {
        let txn = ctx.transaction().clone();
        let Some(response) = txn.response() else {
            return Ok(());
        };
        if !response.is_error() {
            return Ok(());
        }
        let mut normalized = Response::new();
        for name in [params::ERROR, params::ERROR_DESCRIPTION, params::ERROR_URI] {
            if let Some(value) = response.get(name) {
                normalized.set(name, value.clone());
            }
        }
        txn.set_response(normalized);
        Ok(())
    }
}

async fn try_redeem_entry(transaction: &Transaction, id: &str) -> Result<bool> {
    let store = transaction
        .services()
        .get::<dyn TokenStore>()
        .ok_or_else(|| Error::Configuration("no token store is registered".into()))?;
    store
        .try_redeem(id, Utc::now())
        .await
        .map_err(|e| Error::Persistence(e.to_string()))
}

/// Atomically redeems the one-time entry backing a principal. Without
/// token storage there is nothing to redeem and the call succeeds.
async fn redeem_one_time_entry(transaction: &Transaction, principal: &Principal) -> Result<bool> {
    if !transaction.options().token_storage.is_enabled() {
        return Ok(true);
    }
    let Some(token_id) = principal.token_id() else {
        return Ok(false);
    };
    try_redeem_entry(transaction, token_id).await
}

/// Revokes the authorization and every token descended from it.
async fn revoke_authorization_cascade(
    transaction: &Transaction,
    authorization_id: Option<&str>,
) -> Result<()> {
    let Some(authorization_id) = authorization_id else {
        return Ok(());
    };
    if let Some(store) = transaction
        .services()
        .get::<dyn oxid_storage::AuthorizationStore>()
    {
        store
            .revoke(authorization_id)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
    }
    if let Some(store) = transaction.services().get::<dyn TokenStore>() {
        store
            .revoke_by_authorization(authorization_id)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
    }
    Ok(())
}
