//! Authorization storage provider trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oxid_model::Authorization;

use crate::error::StorageResult;

/// Provider for authorization-entry storage.
///
/// Revocation must be monotonic: once [`revoke`](Self::revoke) has
/// succeeded, the entry never reads as valid again.
#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    /// Creates a new authorization entry.
    async fn create(&self, authorization: &Authorization) -> StorageResult<()>;

    /// Gets an authorization by ID.
    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Authorization>>;

    /// Gets the valid authorizations a subject granted to a client.
    async fn find_valid(
        &self,
        subject: &str,
        client_id: &str,
    ) -> StorageResult<Vec<Authorization>>;

    /// Marks an authorization revoked.
    ///
    /// Returns `true` when the entry transitioned, `false` when it was
    /// already revoked or does not exist. Token-cascade revocation is
    /// the caller's responsibility via
    /// [`TokenStore::revoke_by_authorization`](crate::TokenStore::revoke_by_authorization).
    async fn revoke(&self, id: &str) -> StorageResult<bool>;

    /// Removes revoked and ad-hoc entries created before the cutoff.
    /// Returns the number of entries removed.
    async fn prune(&self, before: DateTime<Utc>) -> StorageResult<u64>;
}
