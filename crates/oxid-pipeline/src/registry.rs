//! The handler descriptor registry.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use crate::context::Context;
use crate::descriptor::{HandlerDescriptor, HandlerProvenance};

struct Entry {
    order: i32,
    descriptor: Arc<dyn Any + Send + Sync>,
}

/// Registry of handler descriptors keyed by context type.
///
/// Descriptors are kept sorted by `(order, insertion)`: registration
/// inserts after every existing entry with the same order, so ties
/// resolve by stable insertion order. An order collision is logged but
/// never fails registration.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: DashMap<TypeId, Vec<Entry>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("context_types", &self.entries.len())
            .finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor for its context type.
    pub fn register<C: Context>(&self, descriptor: HandlerDescriptor<C>) {
        let order = descriptor.order();
        let name = descriptor.name();
        let mut entries = self.entries.entry(TypeId::of::<C>()).or_default();

        if entries.iter().any(|e| e.order == order) {
            warn!(
                handler = name,
                order,
                context = std::any::type_name::<C>(),
                "handler order collides with an existing registration; keeping both"
            );
        }

        // Insert after every entry with order <= the new order to keep
        // the vector sorted with stable ties.
        let position = entries.partition_point(|e| e.order <= order);
        entries.insert(
            position,
            Entry {
                order,
                descriptor: Arc::new(descriptor),
            },
        );
    }

    /// Returns the sorted descriptors for a context type.
    #[must_use]
    pub fn list<C: Context>(&self) -> Vec<Arc<HandlerDescriptor<C>>> {
        self.entries
            .get(&TypeId::of::<C>())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| {
                        e.descriptor
                            .clone()
                            .downcast::<HandlerDescriptor<C>>()
                            .ok()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the number of descriptors registered for a context type.
    #[must_use]
    pub fn count<C: Context>(&self) -> usize {
        self.entries
            .get(&TypeId::of::<C>())
            .map_or(0, |entries| entries.len())
    }

    /// Returns whether an operator-registered handler exists for a
    /// context type. Used to enforce the degraded-mode requirement that
    /// every enabled endpoint has a custom validation handler.
    #[must_use]
    pub fn has_custom<C: Context>(&self) -> bool {
        self.list::<C>()
            .iter()
            .any(|d| d.provenance() == HandlerProvenance::Custom)
    }
}
