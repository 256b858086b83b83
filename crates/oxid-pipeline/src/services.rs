//! Typed service registration and the transaction scope.
//!
//! Handlers resolve collaborators (stores, the dispatcher, custom
//! services) from an explicit scope carried by the transaction instead
//! of an ambient provider. Root services live for the server lifetime;
//! scoped services are created per transaction and dropped with it.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Localized string resources.
///
/// The core never renders end-user text itself; hosts register a
/// localizer when error descriptions should be translated.
pub trait Localizer: Send + Sync {
    /// Returns the localized string for a key, or `None` to fall back
    /// to the built-in text.
    fn localize(&self, key: &str) -> Option<String>;
}

type ServiceMap = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

/// Root service registrations shared by every transaction.
#[derive(Default)]
pub struct ServiceCollection {
    services: ServiceMap,
}

impl std::fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCollection")
            .field("count", &self.services.len())
            .finish()
    }
}

impl ServiceCollection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service under its type. Registering the same type
    /// twice replaces the previous entry.
    pub fn insert<T: ?Sized + Send + Sync + 'static>(&mut self, service: Arc<T>) {
        self.services.insert(TypeId::of::<T>(), Box::new(service));
    }

    /// Resolves a service by type.
    #[must_use]
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<Arc<T>>())
            .cloned()
    }
}

/// Per-transaction service scope layered over the root collection.
///
/// Scoped registrations shadow root registrations of the same type and
/// are dropped when the transaction ends.
pub struct ServiceScope {
    root: Arc<ServiceCollection>,
    scoped: Mutex<ServiceMap>,
}

impl std::fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceScope")
            .field("scoped_count", &self.scoped.lock().len())
            .finish()
    }
}

impl ServiceScope {
    /// Creates a scope over a root collection.
    #[must_use]
    pub fn new(root: Arc<ServiceCollection>) -> Self {
        Self {
            root,
            scoped: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a transaction-scoped service.
    pub fn insert_scoped<T: ?Sized + Send + Sync + 'static>(&self, service: Arc<T>) {
        self.scoped
            .lock()
            .insert(TypeId::of::<T>(), Box::new(service));
    }

    /// Resolves a service, checking scoped registrations first.
    #[must_use]
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        if let Some(boxed) = self.scoped.lock().get(&TypeId::of::<T>()) {
            if let Some(service) = boxed.downcast_ref::<Arc<T>>() {
                return Some(Arc::clone(service));
            }
        }
        self.root.get::<T>()
    }
}
