//! Handler descriptors.

use std::sync::Arc;

use async_trait::async_trait;

use oxid_core::Result;

use crate::context::Context;
use crate::services::ServiceScope;

/// A unit of pipeline logic bound to exactly one context type.
#[async_trait]
pub trait Handler<C: Context>: Send + Sync {
    /// Processes the context. Protocol failures are reported through
    /// the context's rejection flags, never as `Err`; errors are
    /// reserved for configuration, host, persistence, and cancellation
    /// failures.
    async fn handle(&self, ctx: &mut C) -> Result<()>;
}

/// A predicate deciding whether a handler runs for a given context.
///
/// All filters of a descriptor must return `true` for the handler to be
/// invoked. A filter returning an error is a configuration fault and
/// aborts the dispatch.
#[async_trait]
pub trait Filter<C: Context>: Send + Sync {
    /// Returns whether the handler should run.
    async fn is_active(&self, ctx: &C) -> Result<bool>;
}

/// How a handler instance is obtained per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImplementationKind {
    /// One shared instance constructed at registration.
    Singleton,
    /// Resolved from the transaction's service scope on every
    /// invocation.
    Scoped,
    /// A pre-built object attached to the descriptor.
    Instance,
}

/// Whether a handler ships with the framework or was registered by the
/// operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerProvenance {
    /// Registered by the framework's default pipelines.
    BuiltIn,
    /// Registered by the operator.
    Custom,
}

enum Resolution<C: Context> {
    Shared(Arc<dyn Handler<C>>),
    Scoped(Arc<dyn Fn(&ServiceScope) -> Option<Arc<dyn Handler<C>>> + Send + Sync>),
}

/// Registration metadata for one handler: its context type (fixed by
/// the type parameter), order, filters, and resolution strategy.
///
/// Orders are assigned relative to neighbors (`previous + 1000` by
/// convention) so new handlers slot in without renumbering.
pub struct HandlerDescriptor<C: Context> {
    name: &'static str,
    order: i32,
    kind: ImplementationKind,
    provenance: HandlerProvenance,
    resolution: Resolution<C>,
    filters: Vec<Arc<dyn Filter<C>>>,
}

impl<C: Context> HandlerDescriptor<C> {
    /// Creates a singleton descriptor around a handler value.
    #[must_use]
    pub fn new(name: &'static str, order: i32, handler: impl Handler<C> + 'static) -> Self {
        Self {
            name,
            order,
            kind: ImplementationKind::Singleton,
            provenance: HandlerProvenance::BuiltIn,
            resolution: Resolution::Shared(Arc::new(handler)),
            filters: Vec::new(),
        }
    }

    /// Creates a descriptor around a pre-built instance.
    #[must_use]
    pub fn from_instance(name: &'static str, order: i32, handler: Arc<dyn Handler<C>>) -> Self {
        Self {
            name,
            order,
            kind: ImplementationKind::Instance,
            provenance: HandlerProvenance::BuiltIn,
            resolution: Resolution::Shared(handler),
            filters: Vec::new(),
        }
    }

    /// Creates a descriptor whose handler is resolved from the
    /// transaction's service scope on every invocation.
    #[must_use]
    pub fn scoped(
        name: &'static str,
        order: i32,
        factory: impl Fn(&ServiceScope) -> Option<Arc<dyn Handler<C>>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            order,
            kind: ImplementationKind::Scoped,
            provenance: HandlerProvenance::BuiltIn,
            resolution: Resolution::Scoped(Arc::new(factory)),
            filters: Vec::new(),
        }
    }

    /// Adds a filter. All filters must pass for the handler to run.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Filter<C> + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Marks the descriptor as operator-registered.
    #[must_use]
    pub fn custom(mut self) -> Self {
        self.provenance = HandlerProvenance::Custom;
        self
    }

    /// Returns the handler name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the sort order.
    #[must_use]
    pub const fn order(&self) -> i32 {
        self.order
    }

    /// Returns the implementation kind.
    #[must_use]
    pub const fn kind(&self) -> ImplementationKind {
        self.kind
    }

    /// Returns the provenance.
    #[must_use]
    pub const fn provenance(&self) -> HandlerProvenance {
        self.provenance
    }

    /// Returns the filters.
    #[must_use]
    pub fn filters(&self) -> &[Arc<dyn Filter<C>>] {
        &self.filters
    }

    /// Resolves the handler instance for an invocation.
    ///
    /// Returns `None` when a scoped handler's service is not
    /// registered, which the dispatcher treats as a configuration
    /// error.
    #[must_use]
    pub fn resolve(&self, services: &ServiceScope) -> Option<Arc<dyn Handler<C>>> {
        match &self.resolution {
            Resolution::Shared(handler) => Some(Arc::clone(handler)),
            Resolution::Scoped(factory) => factory(services),
        }
    }
}

impl<C: Context> std::fmt::Debug for HandlerDescriptor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("kind", &self.kind)
            .field("provenance", &self.provenance)
            .field("filters", &self.filters.len())
            .finish()
    }
}
