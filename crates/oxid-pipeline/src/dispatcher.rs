//! The per-request dispatcher.

use std::sync::Arc;

use tracing::debug;

use oxid_core::{Error, Result};

use crate::context::Context;
use crate::registry::HandlerRegistry;

/// How a dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Every handler ran.
    Completed,
    /// A handler marked the request handled; the response is final.
    Handled,
    /// A handler marked the request as not ours.
    Skipped,
    /// A handler rejected the request; the context carries the error
    /// triple.
    Rejected,
}

/// Walks the sorted handlers for a context type.
///
/// The dispatcher holds no mutable state across calls and is freely
/// re-entrant: handlers may build child contexts and dispatch them
/// through the same instance.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    /// Creates a dispatcher over a registry.
    #[must_use]
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Dispatches a context through its handler chain.
    ///
    /// For each descriptor in order: evaluate the filters, resolve the
    /// handler per its implementation kind, invoke it, then inspect the
    /// context flags. Handled/skipped/rejected short-circuit the chain.
    /// Cancellation is checked between handlers, so a canceled
    /// transaction stops at the next boundary.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] when a filter fails or a scoped
    ///   handler's service is missing
    /// - [`Error::Canceled`] when the transaction was canceled
    /// - handler errors propagate unchanged after a debug log; there is
    ///   no handler-local recovery
    pub async fn dispatch<C: Context + 'static>(&self, ctx: &mut C) -> Result<DispatchOutcome> {
        for descriptor in self.registry.list::<C>() {
            ctx.transaction().ensure_not_canceled()?;

            let mut active = true;
            for filter in descriptor.filters() {
                match filter.is_active(ctx).await {
                    Ok(true) => {}
                    Ok(false) => {
                        active = false;
                        break;
                    }
                    Err(err) => {
                        return Err(Error::Configuration(format!(
                            "filter of handler '{}' failed: {err}",
                            descriptor.name()
                        )));
                    }
                }
            }
            if !active {
                continue;
            }

            let handler = descriptor.resolve(ctx.transaction().services()).ok_or_else(|| {
                Error::Configuration(format!(
                    "scoped handler '{}' could not be resolved from the transaction scope",
                    descriptor.name()
                ))
            })?;

            if let Err(err) = handler.handle(ctx).await {
                debug!(handler = descriptor.name(), error = %err, "handler raised an error");
                return Err(err);
            }

            if ctx.is_handled() {
                return Ok(DispatchOutcome::Handled);
            }
            if ctx.is_skipped() {
                return Ok(DispatchOutcome::Skipped);
            }
            if ctx.is_rejected() {
                return Ok(DispatchOutcome::Rejected);
            }
        }
        Ok(DispatchOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ProcessRequest;
    use crate::descriptor::{Filter, Handler, HandlerDescriptor};
    use crate::services::ServiceCollection;
    use crate::transaction::Transaction;
    use async_trait::async_trait;
    use oxid_core::ServerOptions;
    use parking_lot::Mutex;
    use tokio_util::sync::CancellationToken;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Handler<ProcessRequest> for Recorder {
        async fn handle(&self, _ctx: &mut ProcessRequest) -> Result<()> {
            self.log.lock().push(self.name);
            Ok(())
        }
    }

    struct Rejecting;

    #[async_trait]
    impl Handler<ProcessRequest> for Rejecting {
        async fn handle(&self, ctx: &mut ProcessRequest) -> Result<()> {
            ctx.reject("invalid_request", "rejected by test handler");
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Handler<ProcessRequest> for Failing {
        async fn handle(&self, _ctx: &mut ProcessRequest) -> Result<()> {
            Err(Error::Persistence("store down".to_string()))
        }
    }

    struct Inactive;

    #[async_trait]
    impl Filter<ProcessRequest> for Inactive {
        async fn is_active(&self, _ctx: &ProcessRequest) -> Result<bool> {
            Ok(false)
        }
    }

    struct Broken;

    #[async_trait]
    impl Filter<ProcessRequest> for Broken {
        async fn is_active(&self, _ctx: &ProcessRequest) -> Result<bool> {
            Err(Error::Host("filter dependency missing".to_string()))
        }
    }

    fn transaction() -> Transaction {
        Transaction::new(
            Arc::new(ServerOptions::new("https://as.example.com")),
            Arc::new(ServiceCollection::new()),
        )
    }

    fn recorder(
        name: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Recorder {
        Recorder {
            name,
            log: Arc::clone(log),
        }
    }

    #[tokio::test]
    async fn handlers_run_in_order() {
        let registry = Arc::new(HandlerRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register(HandlerDescriptor::new("third", 3000, recorder("third", &log)));
        registry.register(HandlerDescriptor::new("first", 1000, recorder("first", &log)));
        registry.register(HandlerDescriptor::new("second", 2000, recorder("second", &log)));

        let dispatcher = Dispatcher::new(registry);
        let mut ctx = ProcessRequest::new(transaction());
        let outcome = dispatcher.dispatch(&mut ctx).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Completed);
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn rejection_short_circuits() {
        let registry = Arc::new(HandlerRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register(HandlerDescriptor::new("before", 1000, recorder("before", &log)));
        registry.register(HandlerDescriptor::new("reject", 2000, Rejecting));
        registry.register(HandlerDescriptor::new("after", 3000, recorder("after", &log)));

        let dispatcher = Dispatcher::new(registry);
        let mut ctx = ProcessRequest::new(transaction());
        let outcome = dispatcher.dispatch(&mut ctx).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Rejected);
        assert_eq!(*log.lock(), vec!["before"]);
        assert_eq!(ctx.state().rejection().unwrap().error, "invalid_request");
    }

    #[tokio::test]
    async fn filtered_handlers_are_skipped_but_the_chain_continues() {
        let registry = Arc::new(HandlerRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register(
            HandlerDescriptor::new("filtered", 1000, recorder("filtered", &log))
                .with_filter(Inactive),
        );
        registry.register(HandlerDescriptor::new("active", 2000, recorder("active", &log)));

        let dispatcher = Dispatcher::new(registry);
        let mut ctx = ProcessRequest::new(transaction());
        dispatcher.dispatch(&mut ctx).await.unwrap();

        assert_eq!(*log.lock(), vec!["active"]);
    }

    #[tokio::test]
    async fn filter_failure_is_a_configuration_error() {
        let registry = Arc::new(HandlerRegistry::new());
        registry.register(
            HandlerDescriptor::new("broken", 1000, Rejecting).with_filter(Broken),
        );

        let dispatcher = Dispatcher::new(registry);
        let mut ctx = ProcessRequest::new(transaction());
        let err = dispatcher.dispatch(&mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn handler_errors_propagate() {
        let registry = Arc::new(HandlerRegistry::new());
        registry.register(HandlerDescriptor::new("failing", 1000, Failing));

        let dispatcher = Dispatcher::new(registry);
        let mut ctx = ProcessRequest::new(transaction());
        let err = dispatcher.dispatch(&mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[tokio::test]
    async fn missing_scoped_service_is_a_configuration_error() {
        let registry = Arc::new(HandlerRegistry::new());
        registry.register(HandlerDescriptor::<ProcessRequest>::scoped(
            "scoped",
            1000,
            |services| {
                services
                    .get::<Rejecting>()
                    .map(|h| h as Arc<dyn Handler<ProcessRequest>>)
            },
        ));

        let dispatcher = Dispatcher::new(registry);
        let mut ctx = ProcessRequest::new(transaction());
        let err = dispatcher.dispatch(&mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn scoped_handlers_resolve_from_the_transaction_scope() {
        let registry = Arc::new(HandlerRegistry::new());
        registry.register(HandlerDescriptor::<ProcessRequest>::scoped(
            "scoped",
            1000,
            |services| {
                services
                    .get::<Rejecting>()
                    .map(|h| h as Arc<dyn Handler<ProcessRequest>>)
            },
        ));

        let txn = transaction();
        txn.services().insert_scoped(Arc::new(Rejecting));

        let dispatcher = Dispatcher::new(registry);
        let mut ctx = ProcessRequest::new(txn);
        let outcome = dispatcher.dispatch(&mut ctx).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Rejected);
    }

    #[tokio::test]
    async fn cancellation_stops_the_chain() {
        let registry = Arc::new(HandlerRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register(HandlerDescriptor::new("only", 1000, recorder("only", &log)));

        let token = CancellationToken::new();
        token.cancel();
        let txn = Transaction::with_cancellation(
            Arc::new(ServerOptions::new("https://as.example.com")),
            Arc::new(ServiceCollection::new()),
            token,
        );

        let dispatcher = Dispatcher::new(registry);
        let mut ctx = ProcessRequest::new(txn);
        let err = dispatcher.dispatch(&mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::Canceled));
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn dispatcher_is_reentrant() {
        struct Nested {
            dispatcher: Dispatcher,
        }

        #[async_trait]
        impl Handler<ProcessRequest> for Nested {
            async fn handle(&self, ctx: &mut ProcessRequest) -> Result<()> {
                // Dispatch a child context through the same dispatcher.
                let mut child = crate::context::ProcessChallenge::new(ctx.transaction().clone());
                self.dispatcher.dispatch(&mut child).await?;
                ctx.mark_handled();
                Ok(())
            }
        }

        let registry = Arc::new(HandlerRegistry::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        registry.register(HandlerDescriptor::new(
            "nested",
            1000,
            Nested {
                dispatcher: dispatcher.clone(),
            },
        ));

        let mut ctx = ProcessRequest::new(transaction());
        let outcome = dispatcher.dispatch(&mut ctx).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Handled);
    }
}
