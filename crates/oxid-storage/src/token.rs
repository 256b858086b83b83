//! Token storage provider trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oxid_model::{Token, TokenStatus};

use crate::error::StorageResult;

/// Provider for token-entry storage.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Creates a new token entry.
    async fn create(&self, token: &Token) -> StorageResult<()>;

    /// Replaces an existing token entry.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the entry doesn't exist.
    async fn update(&self, token: &Token) -> StorageResult<()>;

    /// Gets a token by ID.
    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Token>>;

    /// Gets a token by its opaque reference handle.
    async fn find_by_reference_id(&self, reference_id: &str) -> StorageResult<Option<Token>>;

    /// Gets every token referencing an authorization entry.
    async fn find_by_authorization_id(&self, authorization_id: &str)
        -> StorageResult<Vec<Token>>;

    /// Applies a status transition, refusing non-monotonic changes.
    ///
    /// Returns `true` when the transition was applied.
    async fn set_status(&self, id: &str, status: TokenStatus) -> StorageResult<bool>;

    /// Atomically redeems a one-time token.
    ///
    /// Compare-and-set from [`TokenStatus::Valid`] to
    /// [`TokenStatus::Redeemed`]: under N concurrent calls for the same
    /// entry, exactly one returns `true`.
    async fn try_redeem(&self, id: &str, now: DateTime<Utc>) -> StorageResult<bool>;

    /// Marks a token revoked.
    ///
    /// Returns `true` when the entry transitioned.
    async fn revoke(&self, id: &str) -> StorageResult<bool>;

    /// Revokes every token referencing an authorization entry.
    /// Returns the number of tokens transitioned.
    async fn revoke_by_authorization(&self, authorization_id: &str) -> StorageResult<u64>;

    /// Removes entries that expired before the cutoff and entries that
    /// never became valid. Returns the number of entries removed.
    async fn prune(&self, before: DateTime<Utc>) -> StorageResult<u64>;
}
