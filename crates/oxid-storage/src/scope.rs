//! Scope storage provider trait.

use async_trait::async_trait;
use oxid_model::Scope;

use crate::error::StorageResult;

/// Provider for scope-entry storage.
#[async_trait]
pub trait ScopeStore: Send + Sync {
    /// Creates a new scope.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Duplicate` if a scope with the same name
    /// exists.
    async fn create(&self, scope: &Scope) -> StorageResult<()>;

    /// Gets a scope by name.
    async fn find_by_name(&self, name: &str) -> StorageResult<Option<Scope>>;

    /// Gets the scopes matching the given names, in no particular order.
    /// Unknown names are skipped.
    async fn find_by_names(&self, names: &[String]) -> StorageResult<Vec<Scope>>;

    /// Lists every registered scope.
    async fn list(&self) -> StorageResult<Vec<Scope>>;
}
