//! RP-initiated logout endpoint pipeline (OIDC RP-Initiated Logout
//! 1.0).

use async_trait::async_trait;

use oxid_core::{Error, Result};
use oxid_model::Application;
use oxid_pipeline::endpoints::Logout;
use oxid_pipeline::{
    params, Context, Dispatcher, HandleRequest, Handler, HandlerDescriptor, HandlerRegistry,
    ProcessSignOut, Response, ValidateRequest,
};
use oxid_storage::ApplicationStore;

use crate::error::codes;
use crate::filters::RequireDegradedModeDisabled;
use crate::jose;
use crate::props;

type Validate = ValidateRequest<Logout>;
type Handle = HandleRequest<Logout>;

/// Registers the logout endpoint pipeline.
pub fn register(registry: &HandlerRegistry) {
    registry.register(
        HandlerDescriptor::<Validate>::new("validate_logout_request", 1000, ValidateLogoutRequest)
            .with_filter(RequireDegradedModeDisabled),
    );
    registry.register(HandlerDescriptor::<Handle>::new(
        "handle_logout",
        1000,
        HandleLogout,
    ));
}

/// Validates `id_token_hint` and `post_logout_redirect_uri`.
///
/// A post-logout target is only honored when it is registered for the
/// application identified by `client_id` or by the `id_token_hint`
/// audience; anything else would be an open redirector.
struct ValidateLogoutRequest;

#[async_trait]
impl Handler<Validate> for ValidateLogoutRequest {
    async fn handle(&self, ctx: &mut Validate) -> Result<()> {
        let txn = ctx.transaction().clone();
        let options = std::sync::Arc::clone(txn.options());
        let request = txn.require_request()?;

        let hint_client = match request.id_token_hint() {
            Some(hint) => match jose::verify_claims(&options, hint) {
                Ok(claims) => claims["azp"]
                    .as_str()
                    .or_else(|| claims["aud"].as_str())
                    .map(ToString::to_string),
                Err(_) => {
                    ctx.reject(
                        codes::INVALID_REQUEST,
                        "the id_token_hint is invalid or was not issued by this server",
                    );
                    return Ok(());
                }
            },
            None => None,
        };

        let Some(post_logout_uri) = request.post_logout_redirect_uri() else {
            return Ok(());
        };

        let client_id = request
            .client_id()
            .map(ToString::to_string)
            .or(hint_client);
        let Some(client_id) = client_id else {
            ctx.reject(
                codes::INVALID_REQUEST,
                "post_logout_redirect_uri requires a client_id or id_token_hint",
            );
            return Ok(());
        };

        let store = txn
            .services()
            .get::<dyn ApplicationStore>()
            .ok_or_else(|| Error::Configuration("no application store is registered".into()))?;
        let application = store
            .find_by_client_id(&client_id)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        match application {
            Some(application) if application.has_post_logout_redirect_uri(post_logout_uri) => {
                txn.set_property(props::APPLICATION, application);
                Ok(())
            }
            _ => {
                ctx.reject(
                    codes::INVALID_REQUEST,
                    "the post_logout_redirect_uri is not registered for this client",
                );
                Ok(())
            }
        }
    }
}

/// Runs the sign-out pipeline (hosts clear their session state there)
/// and produces the redirect.
struct HandleLogout;

#[async_trait]
impl Handler<Handle> for HandleLogout {
    async fn handle(&self, ctx: &mut Handle) -> Result<()> {
        let txn = ctx.transaction().clone();
        let dispatcher = txn
            .services()
            .get::<Dispatcher>()
            .ok_or_else(|| Error::Configuration("the dispatcher is not registered".into()))?;
        let mut sign_out = ProcessSignOut::new(txn.clone());
        dispatcher.dispatch(&mut sign_out).await?;

        let request = txn.require_request()?;
        let mut response = Response::new();
        if let Some(state) = request.state() {
            response.set(params::STATE, state);
        }
        txn.set_response(response);

        // Only a validated target is attached; otherwise the host shows
        // its own signed-out page.
        let validated = txn.options().degraded_mode
            || txn.property::<Application>(props::APPLICATION).is_some();
        if validated {
            if let Some(uri) = request.post_logout_redirect_uri() {
                txn.set_property(props::RESPONSE_REDIRECT_URI, uri.to_string());
                txn.set_property(props::RESPONSE_MODE, "query".to_string());
            }
        }
        ctx.mark_handled();
        Ok(())
    }
}
