//! Authorization endpoint pipeline.
//!
//! Implements the validation and issuance rules of RFC 6749 Section 3.1
//! and OpenID Connect Core for `response_type=code`, implicit, and
//! hybrid requests, including PKCE (RFC 7636) and optional server-side
//! request caching.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use url::Url;

use oxid_claims::Principal;
use oxid_core::{
    CodeChallengeMethod, EndpointType, Error, GrantType, Result, ResponseTypes, TokenKind,
};
use oxid_crypto::random::generate_request_id;
use oxid_model::AuthorizationKind;
use oxid_pipeline::endpoints::Authorization;
use oxid_pipeline::{
    params, ApplyResponse, Context, ExtractRequest, HandleRequest, Handler, HandlerDescriptor,
    HandlerRegistry, Request, Response, ValidateRequest,
};
use oxid_storage::AuthorizationStore;

use crate::cache::RequestCache;
use crate::driver::{challenge, sign_in};
use crate::endpoints::common;
use crate::error::codes;
use crate::filters::{
    RequireAuthorizationStorage, RequireDegradedModeDisabled, RequireRequestCaching,
};
use crate::jose;
use crate::props;

type Extract = ExtractRequest<Authorization>;
type Validate = ValidateRequest<Authorization>;
type Handle = HandleRequest<Authorization>;
type Apply = ApplyResponse<Authorization>;

/// Transaction marker set after a cached request has been restored.
const RESTORED_MARKER: &str = "oxid:request_restored";

/// Registers the authorization endpoint pipeline.
pub fn register(registry: &HandlerRegistry) {
    registry.register(
        HandlerDescriptor::<Extract>::new("restore_cached_request", 2000, RestoreCachedRequest)
            .with_filter(RequireRequestCaching),
    );
    registry.register(
        HandlerDescriptor::<Extract>::new("cache_request", 3000, CacheRequest)
            .with_filter(RequireRequestCaching),
    );

    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_client_presence",
        1000,
        ValidateClientPresence,
    ));
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_response_type",
        2000,
        ValidateResponseType,
    ));
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_response_mode",
        3000,
        ValidateResponseMode,
    ));
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_redirect_uri",
        4000,
        ValidateRedirectUri,
    ));
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_scopes",
        5000,
        ValidateScopes,
    ));
    registry.register(
        HandlerDescriptor::<Validate>::new("validate_application", 6000, ValidateApplication)
            .with_filter(RequireDegradedModeDisabled),
    );
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_proof_key",
        7000,
        ValidateProofKey,
    ));
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_nonce",
        8000,
        ValidateNonce,
    ));
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_prompt",
        9000,
        ValidatePrompt,
    ));

    registry.register(HandlerDescriptor::<Handle>::new(
        "attach_host_principal",
        1000,
        AttachHostPrincipal,
    ));
    registry.register(
        HandlerDescriptor::<Handle>::new("reuse_consented_authorization", 2000, ReuseConsent)
            .with_filter(RequireAuthorizationStorage),
    );
    registry.register(HandlerDescriptor::<Handle>::new(
        "challenge_unauthenticated",
        3000,
        ChallengeUnauthenticated,
    ));
    registry.register(HandlerDescriptor::<Handle>::new(
        "sign_in_authorization",
        4000,
        SignInAuthorization,
    ));

    registry.register(HandlerDescriptor::<Apply>::new(
        "attach_redirect_details",
        1000,
        AttachRedirectDetails,
    ));
}

/// Replaces a `request_id`-only request with the cached original.
struct RestoreCachedRequest;

#[async_trait]
impl Handler<Extract> for RestoreCachedRequest {
    async fn handle(&self, ctx: &mut Extract) -> Result<()> {
        let txn = ctx.transaction().clone();
        let request = txn.require_request()?;
        let Some(request_id) = request.request_id().map(ToString::to_string) else {
            return Ok(());
        };
        let cache = txn
            .services()
            .get::<dyn RequestCache>()
            .ok_or_else(|| Error::Configuration("no request cache is registered".into()))?;

        let Some(payload) = cache.load(&request_id).await? else {
            ctx.reject(
                codes::INVALID_REQUEST,
                "the request_id is unknown or has expired",
            );
            return Ok(());
        };

        let options = Arc::clone(txn.options());
        let restored = jose::unprotect_bytes(&options, &payload)
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .and_then(|jwt| jose::verify_claims(&options, &jwt).ok())
            .and_then(|claims| serde_json::from_value::<Request>(claims["request"].clone()).ok());
        let Some(restored) = restored else {
            ctx.reject(codes::INVALID_REQUEST, "the cached request is unreadable");
            return Ok(());
        };

        cache.remove(&request_id).await?;
        txn.set_request(restored);
        txn.set_property(RESTORED_MARKER, true);
        Ok(())
    }
}

/// Caches the original request and answers with a `request_id`-only
/// redirect back to the authorization endpoint.
struct CacheRequest;

#[async_trait]
impl Handler<Extract> for CacheRequest {
    async fn handle(&self, ctx: &mut Extract) -> Result<()> {
        let txn = ctx.transaction().clone();
        let request = txn.require_request()?;
        if txn.property::<bool>(RESTORED_MARKER).is_some() {
            // The original request was just restored; do not re-cache.
            return Ok(());
        }

        let options = Arc::clone(txn.options());
        let cache = txn
            .services()
            .get::<dyn RequestCache>()
            .ok_or_else(|| Error::Configuration("no request cache is registered".into()))?;

        let request_id = generate_request_id();
        let claims = json!({
            "iss": options.issuer,
            "request": request,
        });
        let signed = jose::sign_claims(&options, &claims)?;
        let protected = jose::protect_bytes(&options, chrono::Utc::now(), signed.as_bytes())?;
        cache.store(&request_id, &protected).await?;

        let mut response = Response::new();
        response.set(params::REQUEST_ID, request_id);
        txn.set_response(response);

        let endpoint_path = options
            .endpoints
            .get(EndpointType::Authorization)
            .unwrap_or("/authorize");
        txn.set_property(
            props::RESPONSE_REDIRECT_URI,
            common::absolute_endpoint_uri(&options.issuer, endpoint_path),
        );
        txn.set_property(props::RESPONSE_MODE, "query".to_string());
        ctx.mark_handled();
        Ok(())
    }
}

struct ValidateClientPresence;

#[async_trait]
impl Handler<Validate> for ValidateClientPresence {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let request = ctx.transaction().require_request()?;
        if request.client_id().is_none_or(str::is_empty) {
            ctx.reject(codes::INVALID_REQUEST, "the client_id parameter is required");
        }
        Ok(())
    }
}

struct ValidateResponseType;

#[async_trait]
impl Handler<Validate> for ValidateResponseType {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let request = ctx.transaction().require_request()?;
        let Some(raw) = request.response_type() else {
            ctx.reject(
                codes::INVALID_REQUEST,
                "the response_type parameter is required",
            );
            return Ok(());
        };
        let Ok(types) = raw.parse::<ResponseTypes>() else {
            ctx.reject(
                codes::UNSUPPORTED_RESPONSE_TYPE,
                "the response_type parameter is malformed",
            );
            return Ok(());
        };
        if !ctx
            .transaction()
            .options()
            .is_response_type_supported(&types.canonical())
        {
            ctx.reject(
                codes::UNSUPPORTED_RESPONSE_TYPE,
                "the requested response_type is not supported",
            );
        }
        Ok(())
    }
}

struct ValidateResponseMode;

#[async_trait]
impl Handler<Validate> for ValidateResponseMode {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let request = ctx.transaction().require_request()?;
        let Some(raw) = request.response_mode() else {
            return Ok(());
        };
        let Ok(mode) = raw.parse::<oxid_core::ResponseMode>() else {
            ctx.reject(
                codes::INVALID_REQUEST,
                "the response_mode parameter is malformed",
            );
            return Ok(());
        };
        if !ctx.transaction().options().response_modes.contains(&mode) {
            ctx.reject(
                codes::INVALID_REQUEST,
                "the requested response_mode is not supported",
            );
            return Ok(());
        }
        // Tokens must never transit in a query string.
        let types = request
            .response_type()
            .unwrap_or_default()
            .parse::<ResponseTypes>()
            .unwrap_or_default();
        if mode == oxid_core::ResponseMode::Query && !types.is_code_flow() {
            ctx.reject(
                codes::INVALID_REQUEST,
                "the query response_mode cannot be used for flows returning tokens",
            );
        }
        Ok(())
    }
}

struct ValidateRedirectUri;

#[async_trait]
impl Handler<Validate> for ValidateRedirectUri {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let request = ctx.transaction().require_request()?;
        let Some(redirect_uri) = request.redirect_uri() else {
            ctx.reject(
                codes::INVALID_REQUEST,
                "the redirect_uri parameter is required",
            );
            return Ok(());
        };
        match Url::parse(redirect_uri) {
            Ok(url) if url.fragment().is_none() => Ok(()),
            Ok(_) => {
                ctx.reject(
                    codes::INVALID_REQUEST,
                    "the redirect_uri must not contain a fragment",
                );
                Ok(())
            }
            Err(_) => {
                ctx.reject(
                    codes::INVALID_REQUEST,
                    "the redirect_uri must be an absolute URI",
                );
                Ok(())
            }
        }
    }
}

struct ValidateScopes;

#[async_trait]
impl Handler<Validate> for ValidateScopes {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let txn = ctx.transaction().clone();
        let request = txn.require_request()?;
        let scopes = request.scopes();

        if let Some(unknown) = common::find_unknown_scope(&txn, &scopes).await? {
            ctx.reject(
                codes::INVALID_SCOPE,
                format!("the scope '{unknown}' is not registered"),
            );
            return Ok(());
        }

        // id_token responses are meaningless outside OpenID Connect.
        let types = request
            .response_type()
            .unwrap_or_default()
            .parse::<ResponseTypes>()
            .unwrap_or_default();
        if types.0.contains(&oxid_core::ResponseType::IdToken) && !request.is_openid_request() {
            ctx.reject(
                codes::INVALID_SCOPE,
                "the openid scope is required to request an id_token",
            );
        }
        Ok(())
    }
}

struct ValidateApplication;

#[async_trait]
impl Handler<Validate> for ValidateApplication {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let txn = ctx.transaction().clone();
        let request = txn.require_request()?;
        let types = request
            .response_type()
            .unwrap_or_default()
            .parse::<ResponseTypes>()
            .unwrap_or_default();
        let grant = if types.0.contains(&oxid_core::ResponseType::Code) {
            GrantType::AuthorizationCode
        } else {
            GrantType::Implicit
        };

        // The authorization endpoint never authenticates the client:
        // the user agent carries the request.
        let application = match common::validate_client(
            &txn,
            &request,
            EndpointType::Authorization,
            Some(grant),
            false,
        )
        .await?
        {
            Ok(application) => application,
            Err(rejection) => {
                ctx.reject_with(rejection);
                return Ok(());
            }
        };

        if let Some(redirect_uri) = request.redirect_uri() {
            if !application.has_redirect_uri(redirect_uri) {
                ctx.reject(
                    codes::INVALID_REQUEST,
                    "the redirect_uri is not registered for this client",
                );
                return Ok(());
            }
        }
        if let Some(scope) = common::find_unpermitted_scope(&txn, &application, &request.scopes())
        {
            ctx.reject(
                codes::INVALID_SCOPE,
                format!("the client is not allowed to request the scope '{scope}'"),
            );
            return Ok(());
        }

        txn.set_property(props::APPLICATION, application);
        Ok(())
    }
}

struct ValidateProofKey;

#[async_trait]
impl Handler<Validate> for ValidateProofKey {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let txn = ctx.transaction().clone();
        let options = Arc::clone(txn.options());
        let request = txn.require_request()?;
        let types = request
            .response_type()
            .unwrap_or_default()
            .parse::<ResponseTypes>()
            .unwrap_or_default();
        let code_requested = types.0.contains(&oxid_core::ResponseType::Code);

        match (request.code_challenge(), request.code_challenge_method()) {
            (None, Some(_)) => {
                ctx.reject(
                    codes::INVALID_REQUEST,
                    "code_challenge_method cannot be used without code_challenge",
                );
            }
            (None, None) => {
                let public_client = txn
                    .property::<oxid_model::Application>(props::APPLICATION)
                    .is_some_and(|a| a.client_type == oxid_model::ClientType::Public);
                if code_requested && (options.require_proof_key_for_code_exchange || public_client)
                {
                    ctx.reject(
                        codes::INVALID_REQUEST,
                        "the code_challenge parameter is required for this client",
                    );
                }
            }
            (Some(challenge), method) => {
                if !code_requested {
                    ctx.reject(
                        codes::INVALID_REQUEST,
                        "code_challenge is only valid when a code is requested",
                    );
                    return Ok(());
                }
                if challenge.len() < 43
                    || challenge.len() > 128
                    || !challenge
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
                {
                    ctx.reject(
                        codes::INVALID_REQUEST,
                        "the code_challenge parameter is malformed",
                    );
                    return Ok(());
                }
                // Absent method means plain (RFC 7636), which must be
                // explicitly enabled.
                let method = match method {
                    Some(raw) => match raw.parse::<CodeChallengeMethod>() {
                        Ok(method) => method,
                        Err(_) => {
                            ctx.reject(
                                codes::INVALID_REQUEST,
                                "the code_challenge_method parameter is malformed",
                            );
                            return Ok(());
                        }
                    },
                    None => CodeChallengeMethod::Plain,
                };
                if !options.code_challenge_methods.contains(&method) {
                    ctx.reject(
                        codes::INVALID_REQUEST,
                        "the requested code_challenge_method is not supported",
                    );
                }
            }
        }
        Ok(())
    }
}

struct ValidateNonce;

#[async_trait]
impl Handler<Validate> for ValidateNonce {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let request = ctx.transaction().require_request()?;
        let types = request
            .response_type()
            .unwrap_or_default()
            .parse::<ResponseTypes>()
            .unwrap_or_default();
        let id_token_from_authorization =
            types.0.contains(&oxid_core::ResponseType::IdToken);
        if request.is_openid_request() && id_token_from_authorization && request.nonce().is_none() {
            ctx.reject(
                codes::INVALID_REQUEST,
                "the nonce parameter is required for implicit and hybrid flows",
            );
        }
        Ok(())
    }
}

struct ValidatePrompt;

#[async_trait]
impl Handler<Validate> for ValidatePrompt {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let request = ctx.transaction().require_request()?;
        let Some(prompt) = request.prompt() else {
            return Ok(());
        };
        let values: Vec<&str> = prompt.split_whitespace().collect();
        if values.contains(&"none") && values.len() > 1 {
            ctx.reject(
                codes::INVALID_REQUEST,
                "prompt=none cannot be combined with other prompt values",
            );
        }
        Ok(())
    }
}

/// Reads the host-authenticated principal attached to the transaction.
struct AttachHostPrincipal;

#[async_trait]
impl Handler<Handle> for AttachHostPrincipal {
    async fn handle(&self, ctx: &mut Handle) -> Result<()> {
        if let Some(principal) = ctx.transaction().property::<Principal>(props::PRINCIPAL) {
            ctx.principal = Some((*principal).clone());
        }
        Ok(())
    }
}

/// Reuses a permanent authorization covering the requested scopes so no
/// new consent entry is created.
struct ReuseConsent;

#[async_trait]
impl Handler<Handle> for ReuseConsent {
    async fn handle(&self, ctx: &mut Handle) -> Result<()> {
        let txn = ctx.transaction().clone();
        let Some(principal) = ctx.principal.as_mut() else {
            return Ok(());
        };
        let Some(subject) = principal.subject().map(ToString::to_string) else {
            return Ok(());
        };
        let request = txn.require_request()?;
        let Some(client_id) = request.client_id().map(ToString::to_string) else {
            return Ok(());
        };
        let store = txn
            .services()
            .get::<dyn AuthorizationStore>()
            .ok_or_else(|| Error::Configuration("no authorization store is registered".into()))?;

        let authorizations = store
            .find_valid(&subject, &client_id)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        let scopes = request.scopes();
        if let Some(authorization) = authorizations.iter().find(|a| {
            a.kind == AuthorizationKind::Permanent && a.covers_scopes(scopes.iter().copied())
        }) {
            principal.set_authorization_id(authorization.id.clone());
        }
        Ok(())
    }
}

/// No principal means the user has not signed in: emit a challenge for
/// the host to render a login flow.
struct ChallengeUnauthenticated;

#[async_trait]
impl Handler<Handle> for ChallengeUnauthenticated {
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

/// Signs the authenticated principal in, producing the artifacts the
/// response_type asked for.
struct SignInAuthorization;

#[async_trait]
impl Handler<Handle> for SignInAuthorization {
    async fn handle(&self, ctx: &mut Handle) -> Result<()> {
        let txn = ctx.transaction().clone();
        let request = txn.require_request()?;
        let Some(principal) = ctx.principal.clone() else {
            return Err(Error::Host(
                "the authorization handle phase reached sign-in without a principal".into(),
            ));
        };

        let types = request
            .response_type()
            .unwrap_or_default()
            .parse::<ResponseTypes>()
            .unwrap_or_default();
        let mut kinds = Vec::new();
        if types.0.contains(&oxid_core::ResponseType::Code) {
            kinds.push(TokenKind::AuthorizationCode);
        }
        if types.0.contains(&oxid_core::ResponseType::Token) {
            kinds.push(TokenKind::AccessToken);
        }
        if types.0.contains(&oxid_core::ResponseType::IdToken) {
            kinds.push(TokenKind::IdToken);
        }

        let mut sign_in_principal = principal;
        sign_in_principal.set_scopes(
            request
                .scopes()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
        );
        if let Some(client_id) = request.client_id() {
            sign_in_principal.set_presenters([client_id.to_string()]);
        }
        if let Some(nonce) = request.nonce() {
            sign_in_principal.set_nonce(nonce.to_string());
        }
        if let Some(challenge_value) = request.code_challenge() {
            sign_in_principal.set_code_challenge(challenge_value.to_string());
            let method = request.code_challenge_method().unwrap_or("plain");
            sign_in_principal.set_code_challenge_method(method.to_string());
        }
        if let Some(redirect_uri) = request.redirect_uri() {
            sign_in_principal.set_original_redirect_uri(redirect_uri.to_string());
        }

        let result = sign_in(&txn, sign_in_principal, kinds).await?;
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
        if let Some(code) = &result.authorization_code {
            response.set(params::CODE, code.clone());
        }
        if let Some(access_token) = &result.access_token {
            response.set(params::ACCESS_TOKEN, access_token.clone());
            response.set(params::TOKEN_TYPE, "Bearer");
            response.set(
                params::EXPIRES_IN,
                txn.options().lifetimes.access_token.num_seconds(),
            );
        }
        if let Some(id_token) = &result.identity_token {
            response.set(params::ID_TOKEN, id_token.clone());
        }
        if let Some(state) = request.state() {
            response.set(params::STATE, state);
        }
        txn.set_response(response);
        Ok(())
    }
}

/// Attaches the redirect target and response mode for the host, but
/// only once the redirect URI has been validated against a registered
/// client (or in degraded mode, where a custom validator owns the
/// check). An unvalidated redirect target would be an open redirector.
struct AttachRedirectDetails;

#[async_trait]
impl Handler<Apply> for AttachRedirectDetails {
    async fn handle(&self, ctx: &mut Apply) -> Result<()> {
        let txn = ctx.transaction().clone();
        if txn.property::<String>(props::RESPONSE_REDIRECT_URI).is_some() {
            // The request-caching handlers already attached a target.
            return Ok(());
        }
        let Some(request) = txn.request() else {
            return Ok(());
        };
        let validated = txn.options().degraded_mode
            || txn
                .property::<oxid_model::Application>(props::APPLICATION)
                .is_some();
        let Some(redirect_uri) = request.redirect_uri() else {
            return Ok(());
        };
        if !validated || Url::parse(redirect_uri).is_err() {
            return Ok(());
        }

        let mode = request.response_mode().map_or_else(
            || {
                let types = request
                    .response_type()
                    .unwrap_or_default()
                    .parse::<ResponseTypes>()
                    .unwrap_or_default();
                if types.is_code_flow() {
                    "query".to_string()
                } else {
                    "fragment".to_string()
                }
            },
            ToString::to_string,
        );

        txn.set_property(props::RESPONSE_REDIRECT_URI, redirect_uri.to_string());
        txn.set_property(props::RESPONSE_MODE, mode);
        Ok(())
    }
}
