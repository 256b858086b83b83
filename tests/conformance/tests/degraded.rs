//! Degraded mode: no server-side storage, operator-supplied
//! validation, self-contained tokens.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use oxid_claims::Principal;
use oxid_core::{EndpointType, EndpointUris, GrantType, ServerOptions};
use oxid_crypto::{EncryptionCredential, SigningCredential};
use oxid_pipeline::endpoints as markers;
use oxid_pipeline::{
    Context, Handler, HandlerDescriptor, Request, Response, ValidateRequest,
};
use oxid_protocol::{jose, props, ServerProvider, ServerProviderBuilder};

const ISSUER: &str = "https://degraded.example.com";

/// Stands in for the operator's validation logic: authenticates the
/// password grant and accepts everything else.
struct DegradedTokenValidator;

#[async_trait]
impl Handler<ValidateRequest<markers::Token>> for DegradedTokenValidator {
    async fn handle(&self, ctx: &mut ValidateRequest<markers::Token>) -> oxid_core::Result<()> {
        let txn = ctx.transaction().clone();
        let request = txn.require_request()?;
        if request.grant_type() != Some("password") {
            return Ok(());
        }
        if request.username() == Some("user-1") && request.password() == Some("hunter2") {
            let mut principal = Principal::new();
            principal.set_subject("user-1");
            principal.set_scopes(["openid", "offline_access"]);
            if let Some(client_id) = request.client_id() {
                principal.set_presenters([client_id.to_string()]);
            }
            txn.set_property(props::GRANT_PRINCIPAL, principal);
        }
        Ok(())
    }
}

fn degraded_options() -> ServerOptions {
    let mut options = ServerOptions::new(ISSUER)
        .enable_grant(GrantType::Password)
        .enable_grant(GrantType::RefreshToken)
        .add_signing_credential(SigningCredential::generate_dev().unwrap())
        .add_encryption_credential(EncryptionCredential::generate());
    options.degraded_mode = true;
    options.endpoints = EndpointUris::empty();
    options.endpoints.set(EndpointType::Token, "/token");
    options
        .endpoints
        .set(EndpointType::Configuration, "/.well-known/openid-configuration");
    options
}

fn degraded_provider(options: ServerOptions) -> Result<ServerProvider> {
    ServerProviderBuilder::new(options)
        .register(HandlerDescriptor::<ValidateRequest<markers::Token>>::new(
            "degraded_token_validator",
            500,
            DegradedTokenValidator,
        ))
        .build()
        .map_err(|e| anyhow!("{e}"))
}

async fn token(provider: &ServerProvider, params: &[(&str, &str)]) -> Result<Response> {
    let txn = provider.create_transaction();
    txn.set_endpoint(EndpointType::Token);
    txn.set_request(Request::from_parameters(params.iter().copied()));
    provider
        .process(&txn)
        .await?
        .ok_or_else(|| anyhow!("the request was not handled"))
}

/// degraded-1: building without a custom validator for an enabled
/// endpoint fails fast.
#[test]
fn degraded_mode_requires_custom_validators() {
    let err = ServerProviderBuilder::new(degraded_options())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("custom validation handler"));
}

/// degraded-2: resolution forces storage off and pins the refresh
/// policy to rolling when sliding expiration is active.
#[test]
fn degraded_mode_forces_rolling_refresh() {
    let provider = degraded_provider(degraded_options()).unwrap();
    let options = provider.options();
    assert!(!options.token_storage.is_enabled());
    assert!(!options.authorization_storage.is_enabled());
    assert!(options.use_rolling_refresh_tokens);
}

/// degraded-3: refresh tokens are rolled on every use; tokens are
/// fully self-contained.
#[tokio::test]
async fn degraded_refresh_tokens_are_rolled() -> Result<()> {
    let provider = degraded_provider(degraded_options())?;

    let tokens = token(
        &provider,
        &[
            ("grant_type", "password"),
            ("client_id", "c1"),
            ("username", "user-1"),
            ("password", "hunter2"),
        ],
    )
    .await?;
    assert!(!tokens.is_error(), "password grant failed: {tokens:?}");
    let rt1 = tokens
        .get_string("refresh_token")
        .ok_or_else(|| anyhow!("no refresh token"))?
        .to_string();

    let refreshed = token(
        &provider,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", &rt1),
            ("client_id", "c1"),
        ],
    )
    .await?;
    assert!(!refreshed.is_error(), "refresh failed: {refreshed:?}");
    let rt2 = refreshed.get_string("refresh_token").unwrap().to_string();
    assert_ne!(rt1, rt2, "the refresh token must be rolled");
    Ok(())
}

/// degraded-4: with sliding expiration disabled and rolling off, the
/// refresh token keeps a fixed expiration equal to the issuance-time
/// lifetime and is not reissued.
#[tokio::test]
async fn degraded_fixed_expiration_refresh_tokens() -> Result<()> {
    let mut options = degraded_options();
    options.disable_sliding_refresh_token_expiration = true;
    let provider = degraded_provider(options)?;

    let tokens = token(
        &provider,
        &[
            ("grant_type", "password"),
            ("client_id", "c1"),
            ("username", "user-1"),
            ("password", "hunter2"),
        ],
    )
    .await?;
    let rt = tokens.get_string("refresh_token").unwrap().to_string();

    // Self-contained token: the envelope carries the fixed lifetime.
    let envelope = jose::unprotect_envelope(provider.options(), &rt)
        .ok_or_else(|| anyhow!("the refresh token is not a protected envelope"))?;
    let creation = envelope.principal.creation_date().unwrap();
    let expiration = envelope.principal.expiration_date().unwrap();
    assert_eq!(
        expiration - creation,
        provider.options().lifetimes.refresh_token
    );

    // Not rolled: a refresh issues new access tokens but no new
    // refresh token.
    let refreshed = token(
        &provider,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", &rt),
            ("client_id", "c1"),
        ],
    )
    .await?;
    assert!(!refreshed.is_error());
    assert!(refreshed.get_string("refresh_token").is_none());
    assert!(refreshed.get_string("access_token").is_some());
    Ok(())
}

/// degraded-5: invalid credentials still fail through the custom
/// validator path.
#[tokio::test]
async fn degraded_rejects_bad_credentials() -> Result<()> {
    let provider = degraded_provider(degraded_options())?;
    let response = token(
        &provider,
        &[
            ("grant_type", "password"),
            ("client_id", "c1"),
            ("username", "user-1"),
            ("password", "wrong"),
        ],
    )
    .await?;
    assert_eq!(response.error_code(), Some("invalid_grant"));
    Ok(())
}

/// degraded-6: the device grant additionally demands custom sign-in
/// and authentication handlers.
#[test]
fn degraded_device_grant_requires_custom_flows() {
    let mut options = degraded_options();
    options.grant_types.insert(GrantType::DeviceCode);
    options.endpoints.set(EndpointType::Device, "/device");
    options
        .endpoints
        .set(EndpointType::Verification, "/device/verify");

    struct Noop;

    #[async_trait]
    impl Handler<ValidateRequest<markers::Device>> for Noop {
        async fn handle(
            &self,
            _ctx: &mut ValidateRequest<markers::Device>,
        ) -> oxid_core::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Handler<ValidateRequest<markers::Verification>> for Noop {
        async fn handle(
            &self,
            _ctx: &mut ValidateRequest<markers::Verification>,
        ) -> oxid_core::Result<()> {
            Ok(())
        }
    }

    let err = ServerProviderBuilder::new(options)
        .register(HandlerDescriptor::<ValidateRequest<markers::Token>>::new(
            "degraded_token_validator",
            500,
            DegradedTokenValidator,
        ))
        .register(HandlerDescriptor::<ValidateRequest<markers::Device>>::new(
            "noop_device_validator",
            500,
            Noop,
        ))
        .register(
            HandlerDescriptor::<ValidateRequest<markers::Verification>>::new(
                "noop_verification_validator",
                500,
                Noop,
            ),
        )
        .build()
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("custom authentication and sign-in handlers"));
}

/// Unused in assertions but exercises the send bound across spawns.
#[tokio::test]
async fn degraded_provider_is_shareable() -> Result<()> {
    let provider = Arc::new(degraded_provider(degraded_options())?);
    let clone = Arc::clone(&provider);
    let handle = tokio::spawn(async move {
        token(
            &clone,
            &[
                ("grant_type", "password"),
                ("client_id", "c1"),
                ("username", "user-1"),
                ("password", "hunter2"),
            ],
        )
        .await
    });
    let response = handle.await??;
    assert!(!response.is_error());
    Ok(())
}
