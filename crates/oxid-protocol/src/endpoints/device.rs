//! Device authorization endpoint pipeline (RFC 8628).
//!
//! Mints the `(device_code, user_code)` pair and the verification URIs.
//! The token endpoint polls with the device code; the verification
//! endpoint claims the user code.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use oxid_claims::Principal;
use oxid_core::{EndpointType, Error, GrantType, Result, TokenKind};
use oxid_pipeline::endpoints::Device;
use oxid_pipeline::{
    params, Context, HandleRequest, Handler, HandlerDescriptor, HandlerRegistry, Response,
    ValidateRequest,
};

use crate::driver::sign_in;
use crate::endpoints::common;
use crate::error::codes;
use crate::filters::RequireDegradedModeDisabled;
use crate::props;

type Validate = ValidateRequest<Device>;
type Handle = HandleRequest<Device>;

/// Tracks the last poll instant per device code so the token endpoint
/// can answer `slow_down` to clients polling faster than the interval.
#[derive(Debug, Default)]
pub struct DevicePollRegistry {
    polls: DashMap<String, DateTime<Utc>>,
}

impl DevicePollRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a poll and returns whether it came faster than the
    /// minimum interval.
    pub fn poll_too_fast(&self, device_code: &str, interval: Duration, now: DateTime<Utc>) -> bool {
        let mut too_fast = false;
        self.polls
            .entry(device_code.to_string())
            .and_modify(|last| {
                too_fast = now - *last < interval;
                *last = now;
            })
            .or_insert(now);
        too_fast
    }

    /// Forgets codes older than the cutoff.
    pub fn prune(&self, before: DateTime<Utc>) {
        self.polls.retain(|_, last| *last >= before);
    }
}

/// Registers the device endpoint pipeline.
pub fn register(registry: &HandlerRegistry) {
    registry.register(
        HandlerDescriptor::<Validate>::new("validate_device_client", 1000, ValidateDeviceClient)
            .with_filter(RequireDegradedModeDisabled),
    );
    registry.register(HandlerDescriptor::<Validate>::new(
        "validate_device_scopes",
        2000,
        ValidateDeviceScopes,
    ));

    registry.register(HandlerDescriptor::<Handle>::new(
        "sign_in_device_request",
        1000,
        SignInDeviceRequest,
    ));
}

struct ValidateDeviceClient;

#[async_trait]
impl Handler<Validate> for ValidateDeviceClient {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let txn = ctx.transaction().clone();
        let request = txn.require_request()?;
        match common::validate_client(
            &txn,
            &request,
            EndpointType::Device,
            Some(GrantType::DeviceCode),
            true,
        )
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

struct ValidateDeviceScopes;

#[async_trait]
impl Handler<Validate> for ValidateDeviceScopes {
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

/// Mints the device/user code pair. The sign-in principal has no
/// subject yet: the verification endpoint attaches one when the user
/// approves.
struct SignInDeviceRequest;

#[async_trait]
impl Handler<Handle> for SignInDeviceRequest {
    async fn handle(&self, ctx: &mut Handle) -> Result<()> {
        let txn = ctx.transaction().clone();
        let options = std::sync::Arc::clone(txn.options());
        let request = txn.require_request()?;

        let mut principal = Principal::new();
        if let Some(client_id) = request.client_id() {
            principal.set_presenters([client_id.to_string()]);
        }
        let scopes: Vec<String> = request.scopes().iter().map(ToString::to_string).collect();
        if !scopes.is_empty() {
            principal.set_scopes(scopes);
        }

        let result = sign_in(
            &txn,
            principal,
            vec![TokenKind::DeviceCode, TokenKind::UserCode],
        )
        .await?;
        let (Some(device_code), Some(user_code)) = (
            result.device_code.clone(),
            result.user_code.clone(),
        ) else {
            return Err(Error::Configuration(
                "the device sign-in did not produce a code pair".into(),
            ));
        };

        let verification_path = options
            .endpoints
            .get(EndpointType::Verification)
            .unwrap_or("/device/verify");
        let verification_uri = common::absolute_endpoint_uri(&options.issuer, verification_path);

        let mut response = Response::new();
        response.set(params::DEVICE_CODE, device_code);
        response.set(params::USER_CODE, user_code.clone());
        response.set(params::VERIFICATION_URI, verification_uri.clone());
        response.set(
            params::VERIFICATION_URI_COMPLETE,
            format!("{verification_uri}?user_code={user_code}"),
        );
        response.set(
            params::EXPIRES_IN,
            options.lifetimes.device_code.num_seconds(),
        );
        response.set(params::INTERVAL, options.device_polling_interval.num_seconds());
        txn.set_response(response);
        Ok(())
    }
}
