//! The host-facing provider.
//!
//! A host adapter builds one [`ServerProvider`] at startup (resolving
//! the options and wiring stores and custom handlers), then per request
//! creates a transaction, attaches the parsed parameter bag, sets the
//! endpoint, and calls [`ServerProvider::process`].

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use oxid_core::{resolver, EndpointType, Error, GrantType, Result, ServerOptions};
use oxid_pipeline::endpoints as markers;
use oxid_pipeline::{
    Context, DispatchOutcome, Dispatcher, HandlerDescriptor, HandlerRegistry, ProcessAuthentication,
    ProcessRequest, ProcessSignIn, Response, ServiceCollection, Transaction, ValidateRequest,
};
use oxid_storage::{ApplicationStore, AuthorizationStore, ScopeStore, TokenStore};

use crate::cache::{MemoryRequestCache, RequestCache};
use crate::endpoints::device::DevicePollRegistry;
use crate::error::codes;
use crate::{driver, endpoints, handlers};

/// Builds a [`ServerProvider`].
pub struct ServerProviderBuilder {
    options: ServerOptions,
    services: ServiceCollection,
    registry: Arc<HandlerRegistry>,
}

impl ServerProviderBuilder {
    /// Starts a builder over an options seed.
    #[must_use]
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options,
            services: ServiceCollection::new(),
            registry: Arc::new(HandlerRegistry::new()),
        }
    }

    /// Registers the application store.
    #[must_use]
    pub fn with_application_store(mut self, store: Arc<dyn ApplicationStore>) -> Self {
        self.services.insert(store);
        self
    }

    /// Registers the authorization store.
    #[must_use]
    pub fn with_authorization_store(mut self, store: Arc<dyn AuthorizationStore>) -> Self {
        self.services.insert(store);
        self
    }

    /// Registers the token store.
    #[must_use]
    pub fn with_token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.services.insert(store);
        self
    }

    /// Registers the scope store.
    #[must_use]
    pub fn with_scope_store(mut self, store: Arc<dyn ScopeStore>) -> Self {
        self.services.insert(store);
        self
    }

    /// Registers the request cache used when request caching is
    /// enabled.
    #[must_use]
    pub fn with_request_cache(mut self, cache: Arc<dyn RequestCache>) -> Self {
        self.services.insert(cache);
        self
    }

    /// Registers an arbitrary root service resolvable from handler
    /// scopes.
    #[must_use]
    pub fn with_service<T: ?Sized + Send + Sync + 'static>(mut self, service: Arc<T>) -> Self {
        self.services.insert(service);
        self
    }

    /// Registers an operator handler. The descriptor is marked custom;
    /// its order decides where it runs relative to the built-ins.
    #[must_use]
    pub fn register<C: oxid_pipeline::Context + 'static>(
        self,
        descriptor: HandlerDescriptor<C>,
    ) -> Self {
        self.registry.register(descriptor.custom());
        self
    }

    /// Resolves the options, registers the built-in pipelines, and
    /// verifies the wiring.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for any violated options or
    /// wiring invariant. Configuration errors are fatal.
    pub fn build(mut self) -> Result<ServerProvider> {
        resolver::resolve(&mut self.options, Utc::now())?;

        endpoints::register(&self.registry);
        handlers::register(&self.registry);
        driver::register(&self.registry);

        if !self.options.degraded_mode && self.services.get::<dyn ApplicationStore>().is_none() {
            return Err(Error::Configuration(
                "an application store is required outside degraded mode".into(),
            ));
        }
        if self.options.token_storage.is_enabled()
            && self.services.get::<dyn TokenStore>().is_none()
        {
            return Err(Error::Configuration(
                "a token store is required while token storage is enabled".into(),
            ));
        }
        if self.options.authorization_storage.is_enabled()
            && self.services.get::<dyn AuthorizationStore>().is_none()
        {
            return Err(Error::Configuration(
                "an authorization store is required while authorization storage is enabled".into(),
            ));
        }
        if self.options.enable_request_caching && self.services.get::<dyn RequestCache>().is_none()
        {
            let cache: Arc<dyn RequestCache> = Arc::new(MemoryRequestCache::new());
            self.services.insert(cache);
        }

        if self.options.degraded_mode {
            for endpoint in EndpointType::ALL {
                if !self.options.endpoints.contains(endpoint) {
                    continue;
                }
                if !has_custom_validator(&self.registry, endpoint) {
                    return Err(Error::Configuration(format!(
                        "degraded mode requires a custom validation handler for the {endpoint} endpoint"
                    )));
                }
            }
            if self.options.is_grant_enabled(GrantType::DeviceCode)
                && (!self.registry.has_custom::<ProcessAuthentication>()
                    || !self.registry.has_custom::<ProcessSignIn>())
            {
                return Err(Error::Configuration(
                    "degraded mode requires custom authentication and sign-in handlers for the device grant"
                        .into(),
                ));
            }
        }

        if self.services.get::<DevicePollRegistry>().is_none() {
            self.services.insert(Arc::new(DevicePollRegistry::new()));
        }

        let dispatcher = Dispatcher::new(Arc::clone(&self.registry));
        self.services.insert(Arc::new(dispatcher.clone()));

        Ok(ServerProvider {
            options: Arc::new(self.options),
            services: Arc::new(self.services),
            dispatcher,
        })
    }
}

/// Discovery and JWKS are pure projections with nothing to validate, so
/// degraded mode does not demand custom validators for them.
fn has_custom_validator(registry: &HandlerRegistry, endpoint: EndpointType) -> bool {
    match endpoint {
        EndpointType::Authorization => {
            registry.has_custom::<ValidateRequest<markers::Authorization>>()
        }
        EndpointType::Token => registry.has_custom::<ValidateRequest<markers::Token>>(),
        EndpointType::Device => registry.has_custom::<ValidateRequest<markers::Device>>(),
        EndpointType::Verification => {
            registry.has_custom::<ValidateRequest<markers::Verification>>()
        }
        EndpointType::Introspection => {
            registry.has_custom::<ValidateRequest<markers::Introspection>>()
        }
        EndpointType::Revocation => registry.has_custom::<ValidateRequest<markers::Revocation>>(),
        EndpointType::Userinfo => registry.has_custom::<ValidateRequest<markers::Userinfo>>(),
        EndpointType::Logout => registry.has_custom::<ValidateRequest<markers::Logout>>(),
        EndpointType::Configuration | EndpointType::Cryptography | EndpointType::Unknown => true,
    }
}

/// The protocol engine: resolved options, root services, and the
/// dispatcher over the sorted handler registry.
#[derive(Clone)]
pub struct ServerProvider {
    options: Arc<ServerOptions>,
    services: Arc<ServiceCollection>,
    dispatcher: Dispatcher,
}

impl ServerProvider {
    /// Returns the resolved options.
    #[must_use]
    pub fn options(&self) -> &Arc<ServerOptions> {
        &self.options
    }

    /// Returns the dispatcher, for hosts that drive child contexts
    /// directly.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Creates a transaction for one request.
    #[must_use]
    pub fn create_transaction(&self) -> Transaction {
        Transaction::new(Arc::clone(&self.options), Arc::clone(&self.services))
    }

    /// Creates a transaction bound to a cancellation token (typically
    /// the host's connection lifetime or a deadline).
    #[must_use]
    pub fn create_transaction_with_cancellation(
        &self,
        cancellation: CancellationToken,
    ) -> Transaction {
        Transaction::with_cancellation(
            Arc::clone(&self.options),
            Arc::clone(&self.services),
            cancellation,
        )
    }

    /// Resolves the endpoint for a request path and stamps it on the
    /// transaction.
    pub fn assign_endpoint(&self, transaction: &Transaction, path: &str) -> EndpointType {
        let endpoint = self.options.endpoints.match_path(path);
        transaction.set_endpoint(endpoint);
        endpoint
    }

    /// Processes a transaction through the request pipeline.
    ///
    /// Returns `Ok(Some(response))` when an endpoint produced a
    /// response and `Ok(None)` when the request targets none of the
    /// registered endpoints (the host continues its own processing).
    ///
    /// # Errors
    ///
    /// Unexpected failures propagate for the host adapter to convert
    /// (see [`ServerProvider::error_response`]); they are never
    /// reflected in a protocol response body by the core itself.
    pub async fn process(&self, transaction: &Transaction) -> Result<Option<Response>> {
        let mut ctx = ProcessRequest::new(transaction.clone());
        match self.dispatcher.dispatch(&mut ctx).await? {
            DispatchOutcome::Handled => Ok(Some(transaction.response().unwrap_or_default())),
            DispatchOutcome::Rejected => {
                let rejection = ctx.state().rejection().cloned();
                Ok(Some(Response::error(
                    rejection
                        .as_ref()
                        .map_or(codes::SERVER_ERROR, |r| r.error.as_str())
                        .to_string(),
                    rejection.and_then(|r| r.description),
                    None,
                )))
            }
            DispatchOutcome::Skipped | DispatchOutcome::Completed => Ok(None),
        }
    }

    /// Converts a processing error into the response a host adapter
    /// should emit: `server_error` for everything except cancellation
    /// and `temporarily_unavailable` for overload-flavored failures.
    /// The error detail is logged, never sent.
    #[must_use]
    pub fn error_response(error: &Error) -> Response {
        debug!(error = %error, "converting a processing error into a protocol response");
        match error {
            Error::Canceled => Response::error(
                codes::TEMPORARILY_UNAVAILABLE,
                Some("the request was canceled".to_string()),
                None,
            ),
            _ => Response::error(codes::SERVER_ERROR, None, None),
        }
    }
}

impl std::fmt::Debug for ServerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerProvider")
            .field("issuer", &self.options.issuer)
            .finish()
    }
}
