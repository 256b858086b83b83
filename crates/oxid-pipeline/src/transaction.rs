//! The per-request transaction.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use oxid_core::{EndpointType, Error, Result, ServerOptions};

use crate::message::{Request, Response};
use crate::services::{ServiceCollection, ServiceScope};

/// Per-request state shared by every context dispatched for a request.
///
/// Cloning a transaction is cheap and yields a handle to the same
/// underlying state; handlers communicate through the property bag and
/// the request/response records. A transaction lives for exactly one
/// request.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<Inner>,
}

struct Inner {
    options: Arc<ServerOptions>,
    endpoint: RwLock<EndpointType>,
    request: RwLock<Option<Request>>,
    response: RwLock<Option<Response>>,
    properties: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    services: ServiceScope,
    cancellation: CancellationToken,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("endpoint", &*self.inner.endpoint.read())
            .field("has_request", &self.inner.request.read().is_some())
            .field("has_response", &self.inner.response.read().is_some())
            .finish()
    }
}

impl Transaction {
    /// Creates a transaction over resolved options and root services.
    #[must_use]
    pub fn new(options: Arc<ServerOptions>, services: Arc<ServiceCollection>) -> Self {
        Self::with_cancellation(options, services, CancellationToken::new())
    }

    /// Creates a transaction with an externally-controlled cancellation
    /// token (e.g. tied to the host's connection lifetime or a
    /// deadline).
    #[must_use]
    pub fn with_cancellation(
        options: Arc<ServerOptions>,
        services: Arc<ServiceCollection>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                endpoint: RwLock::new(EndpointType::Unknown),
                request: RwLock::new(None),
                response: RwLock::new(None),
                properties: Mutex::new(HashMap::new()),
                services: ServiceScope::new(services),
                cancellation,
            }),
        }
    }

    /// Returns the options snapshot.
    #[must_use]
    pub fn options(&self) -> &Arc<ServerOptions> {
        &self.inner.options
    }

    /// Returns the endpoint this transaction targets.
    #[must_use]
    pub fn endpoint(&self) -> EndpointType {
        *self.inner.endpoint.read()
    }

    /// Sets the endpoint.
    pub fn set_endpoint(&self, endpoint: EndpointType) {
        *self.inner.endpoint.write() = endpoint;
    }

    /// Returns a copy of the parsed request, if one was stored.
    #[must_use]
    pub fn request(&self) -> Option<Request> {
        self.inner.request.read().clone()
    }

    /// Returns the parsed request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Host`] when no request was stored; the host or
    /// the extract phase must run first.
    pub fn require_request(&self) -> Result<Request> {
        self.request()
            .ok_or_else(|| Error::Host("no request has been attached to the transaction".into()))
    }

    /// Stores the parsed request.
    pub fn set_request(&self, request: Request) {
        *self.inner.request.write() = Some(request);
    }

    /// Returns a copy of the response, if one has been produced.
    #[must_use]
    pub fn response(&self) -> Option<Response> {
        self.inner.response.read().clone()
    }

    /// Stores the response, replacing any previous one.
    pub fn set_response(&self, response: Response) {
        *self.inner.response.write() = Some(response);
    }

    /// Mutates the response in place, creating an empty one first if
    /// none exists.
    pub fn update_response(&self, f: impl FnOnce(&mut Response)) {
        let mut guard = self.inner.response.write();
        f(guard.get_or_insert_with(Response::new));
    }

    /// Stores a typed property for later handlers.
    pub fn set_property<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.inner
            .properties
            .lock()
            .insert(key.into(), Arc::new(value));
    }

    /// Reads a typed property. A property stored under the same key
    /// with a different type reads as absent.
    #[must_use]
    pub fn property<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.inner
            .properties
            .lock()
            .get(key)
            .cloned()
            .and_then(|any| any.downcast::<T>().ok())
    }

    /// Reads a typed property.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Host`] when the property is missing, which
    /// indicates a handler-ordering bug in the integration.
    pub fn require_property<T: Send + Sync + 'static>(&self, key: &str) -> Result<Arc<T>> {
        self.property(key)
            .ok_or_else(|| Error::Host(format!("expected transaction property is missing: {key}")))
    }

    /// Removes a property.
    pub fn remove_property(&self, key: &str) {
        self.inner.properties.lock().remove(key);
    }

    /// Returns the service scope for this transaction.
    #[must_use]
    pub fn services(&self) -> &ServiceScope {
        &self.inner.services
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancellation
    }

    /// Fails with [`Error::Canceled`] when cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Canceled`] after the token has been triggered.
    pub fn ensure_not_canceled(&self) -> Result<()> {
        if self.inner.cancellation.is_cancelled() {
            Err(Error::Canceled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxid_core::GrantType;

    fn transaction() -> Transaction {
        let options = ServerOptions::new("https://as.example.com")
            .enable_grant(GrantType::ClientCredentials);
        Transaction::new(Arc::new(options), Arc::new(ServiceCollection::new()))
    }

    #[test]
    fn clones_share_state() {
        let txn = transaction();
        let clone = txn.clone();
        txn.set_endpoint(EndpointType::Token);
        assert_eq!(clone.endpoint(), EndpointType::Token);
    }

    #[test]
    fn properties_are_typed() {
        let txn = transaction();
        txn.set_property("count", 7u32);
        assert_eq!(txn.property::<u32>("count").as_deref(), Some(&7));
        // Same key, wrong type.
        assert!(txn.property::<String>("count").is_none());
    }

    #[test]
    fn require_request_reports_host_misuse() {
        let txn = transaction();
        let err = txn.require_request().unwrap_err();
        assert!(matches!(err, Error::Host(_)));
    }

    #[test]
    fn update_response_creates_on_demand() {
        let txn = transaction();
        txn.update_response(|response| response.set("access_token", "at"));
        assert_eq!(
            txn.response().unwrap().get_string("access_token"),
            Some("at")
        );
    }

    #[test]
    fn cancellation_is_observable() {
        let token = CancellationToken::new();
        let options = ServerOptions::new("https://as.example.com");
        let txn = Transaction::with_cancellation(
            Arc::new(options),
            Arc::new(ServiceCollection::new()),
            token.clone(),
        );
        assert!(txn.ensure_not_canceled().is_ok());
        token.cancel();
        assert!(matches!(txn.ensure_not_canceled(), Err(Error::Canceled)));
    }
}
