//! Application storage provider trait.

use async_trait::async_trait;
use oxid_model::Application;

use crate::error::StorageResult;

/// Provider for registered-application storage.
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Creates a new application.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Duplicate` if an application with the same
    /// `client_id` exists.
    async fn create(&self, application: &Application) -> StorageResult<()>;

    /// Updates an existing application.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the application doesn't exist.
    async fn update(&self, application: &Application) -> StorageResult<()>;

    /// Deletes an application by `client_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the application doesn't exist.
    async fn delete(&self, client_id: &str) -> StorageResult<()>;

    /// Gets an application by its OAuth `client_id`.
    async fn find_by_client_id(&self, client_id: &str) -> StorageResult<Option<Application>>;

    /// Counts registered applications.
    async fn count(&self) -> StorageResult<u64>;
}
