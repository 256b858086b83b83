//! Endpoint drivers: the glue between `ProcessRequest` and the
//! per-endpoint phase pipelines.
//!
//! One driver is registered per endpoint, filtered on the transaction's
//! endpoint discriminant. The driver runs extract, validate, and handle
//! in order, converts a rejection from any phase into an error response
//! through `ProcessError`, and always finishes with the apply phase.

use std::marker::PhantomData;

use async_trait::async_trait;

use oxid_claims::Principal;
use oxid_core::{EndpointType, Error, Result, TokenKind};
use oxid_pipeline::endpoints;
use oxid_pipeline::{
    ApplyResponse, Context, DispatchOutcome, Dispatcher, EndpointMarker, ExtractRequest,
    HandleRequest, Handler, HandlerDescriptor, HandlerRegistry, ProcessChallenge, ProcessError,
    ProcessRequest, ProcessSignIn, Rejection, Response, Transaction, ValidateRequest,
};

use crate::error::codes;
use crate::filters::RequireEndpoint;

/// Registers one driver per endpoint plus the default challenge and
/// error renderers.
pub fn register(registry: &HandlerRegistry) {
    macro_rules! driver {
        ($name:literal, $order:expr, $marker:ty) => {
            registry.register(
                HandlerDescriptor::new($name, $order, EndpointDriver::<$marker>::new())
                    .with_filter(RequireEndpoint(<$marker as EndpointMarker>::TYPE)),
            );
        };
    }

    driver!("authorization_driver", 1000, endpoints::Authorization);
    driver!("token_driver", 2000, endpoints::Token);
    driver!("device_driver", 3000, endpoints::Device);
    driver!("verification_driver", 4000, endpoints::Verification);
    driver!("introspection_driver", 5000, endpoints::Introspection);
    driver!("revocation_driver", 6000, endpoints::Revocation);
    driver!("userinfo_driver", 7000, endpoints::Userinfo);
    driver!("configuration_driver", 8000, endpoints::Configuration);
    driver!("cryptography_driver", 9000, endpoints::Cryptography);
    driver!("logout_driver", 10000, endpoints::Logout);

    registry.register(HandlerDescriptor::new(
        "attach_challenge_response",
        1000,
        AttachChallengeResponse,
    ));
    registry.register(HandlerDescriptor::new(
        "attach_error_response",
        1000,
        AttachErrorResponse,
    ));
}

/// Resolves the dispatcher from a transaction's service scope.
pub(crate) fn dispatcher(transaction: &Transaction) -> Result<std::sync::Arc<Dispatcher>> {
    transaction
        .services()
        .get::<Dispatcher>()
        .ok_or_else(|| Error::Configuration("the dispatcher is not registered".into()))
}

/// Dispatches a `ProcessSignIn` and returns it for the caller to read
/// the generated tokens.
///
/// # Errors
///
/// Propagates dispatcher and issuance errors.
pub async fn sign_in(
    transaction: &Transaction,
    principal: Principal,
    token_kinds: Vec<TokenKind>,
) -> Result<ProcessSignIn> {
    let dispatcher = dispatcher(transaction)?;
    let mut ctx = ProcessSignIn::new(transaction.clone(), principal, token_kinds);
    dispatcher.dispatch(&mut ctx).await?;
    Ok(ctx)
}

/// Dispatches a `ProcessChallenge`, producing the challenge response.
///
/// # Errors
///
/// Propagates dispatcher errors.
pub async fn challenge(transaction: &Transaction) -> Result<()> {
    let dispatcher = dispatcher(transaction)?;
    let mut ctx = ProcessChallenge::new(transaction.clone());
    dispatcher.dispatch(&mut ctx).await?;
    Ok(())
}

struct EndpointDriver<E: EndpointMarker> {
    _endpoint: PhantomData<E>,
}

impl<E: EndpointMarker> EndpointDriver<E> {
    fn new() -> Self {
        Self {
            _endpoint: PhantomData,
        }
    }

    async fn render_error(
        &self,
        transaction: &Transaction,
        rejection: Option<Rejection>,
    ) -> Result<()> {
        let dispatcher = dispatcher(transaction)?;
        let rejection = rejection.unwrap_or_else(|| Rejection {
            error: codes::SERVER_ERROR.to_string(),
            description: None,
            uri: None,
        });
        let mut ctx = ProcessError::new(transaction.clone(), rejection);
        dispatcher.dispatch(&mut ctx).await?;
        Ok(())
    }

    async fn apply(&self, transaction: &Transaction) -> Result<()> {
        let dispatcher = dispatcher(transaction)?;
        let mut ctx = ApplyResponse::<E>::new(transaction.clone());
        dispatcher.dispatch(&mut ctx).await?;
        Ok(())
    }
}

#[async_trait]
impl<E: EndpointMarker> Handler<ProcessRequest> for EndpointDriver<E> {
    async fn handle(&self, ctx: &mut ProcessRequest) -> Result<()> {
        let transaction = ctx.transaction().clone();

        let mut extract = ExtractRequest::<E>::new(transaction.clone());
        match dispatcher(&transaction)?.dispatch(&mut extract).await? {
            DispatchOutcome::Rejected => {
                self.render_error(&transaction, extract.state().rejection().cloned())
                    .await?;
                self.apply(&transaction).await?;
                ctx.mark_handled();
                return Ok(());
            }
            DispatchOutcome::Skipped => {
                ctx.skip();
                return Ok(());
            }
            DispatchOutcome::Handled => {
                self.apply(&transaction).await?;
                ctx.mark_handled();
                return Ok(());
            }
            DispatchOutcome::Completed => {}
        }

        let mut validate = ValidateRequest::<E>::new(transaction.clone());
        match dispatcher(&transaction)?.dispatch(&mut validate).await? {
            DispatchOutcome::Rejected => {
                self.render_error(&transaction, validate.state().rejection().cloned())
                    .await?;
                self.apply(&transaction).await?;
                ctx.mark_handled();
                return Ok(());
            }
            DispatchOutcome::Skipped => {
                ctx.skip();
                return Ok(());
            }
            DispatchOutcome::Handled => {
                self.apply(&transaction).await?;
                ctx.mark_handled();
                return Ok(());
            }
            DispatchOutcome::Completed => {}
        }

        let mut handle = HandleRequest::<E>::new(transaction.clone());
        match dispatcher(&transaction)?.dispatch(&mut handle).await? {
            DispatchOutcome::Rejected => {
                self.render_error(&transaction, handle.state().rejection().cloned())
                    .await?;
            }
            DispatchOutcome::Skipped => {
                ctx.skip();
                return Ok(());
            }
            DispatchOutcome::Handled | DispatchOutcome::Completed => {}
        }

        self.apply(&transaction).await?;
        ctx.mark_handled();
        Ok(())
    }
}

/// Default challenge renderer: an endpoint needed an authenticated user
/// the request did not carry. Hosts typically register an earlier
/// custom handler that renders a login flow instead.
struct AttachChallengeResponse;

#[async_trait]
impl Handler<ProcessChallenge> for AttachChallengeResponse {
    async fn handle(&self, ctx: &mut ProcessChallenge) -> Result<()> {
        if ctx.transaction().response().is_none() {
            ctx.transaction().set_response(Response::error(
                codes::LOGIN_REQUIRED,
                Some("authentication is required to continue".to_string()),
                None,
            ));
        }
        ctx.mark_handled();
        Ok(())
    }
}

/// Default error renderer: builds the standard error triple response
/// and echoes `state` back on user-agent-redirected endpoints. When a
/// localizer is registered, the description is translated through it.
struct AttachErrorResponse;

#[async_trait]
impl Handler<ProcessError> for AttachErrorResponse {
    async fn handle(&self, ctx: &mut ProcessError) -> Result<()> {
        let description = ctx.rejection.description.clone().map(|description| {
            ctx.transaction()
                .services()
                .get::<dyn oxid_pipeline::Localizer>()
                .and_then(|localizer| localizer.localize(&description))
                .unwrap_or(description)
        });
        let mut response = Response::error(
            ctx.rejection.error.clone(),
            description,
            ctx.rejection.uri.clone(),
        );

        let endpoint = ctx.transaction().endpoint();
        if matches!(endpoint, EndpointType::Authorization | EndpointType::Logout) {
            if let Some(state) = ctx
                .transaction()
                .request()
                .and_then(|r| r.state().map(ToString::to_string))
            {
                response.set(oxid_pipeline::params::STATE, state);
            }
        }

        ctx.transaction().set_response(response);
        ctx.mark_handled();
        Ok(())
    }
}
