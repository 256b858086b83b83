//! In-memory reference implementation of the store traits.
//!
//! Backed by `DashMap`; entry guards provide the per-entry exclusivity
//! that makes [`TokenStore::try_redeem`] an atomic compare-and-set.
//! Suitable for tests and single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use oxid_model::{Application, Authorization, AuthorizationStatus, Scope, Token, TokenStatus};

use crate::application::ApplicationStore;
use crate::authorization::AuthorizationStore;
use crate::error::{StorageError, StorageResult};
use crate::scope::ScopeStore;
use crate::token::TokenStore;

/// In-memory application store keyed by `client_id`.
#[derive(Debug, Default)]
pub struct MemoryApplicationStore {
    entries: DashMap<String, Application>,
}

impl MemoryApplicationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApplicationStore for MemoryApplicationStore {
    async fn create(&self, application: &Application) -> StorageResult<()> {
        if self.entries.contains_key(&application.client_id) {
            return Err(StorageError::Duplicate(application.client_id.clone()));
        }
        self.entries
            .insert(application.client_id.clone(), application.clone());
        Ok(())
    }

    async fn update(&self, application: &Application) -> StorageResult<()> {
        match self.entries.get_mut(&application.client_id) {
            Some(mut entry) => {
                *entry = application.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound(application.client_id.clone())),
        }
    }

    async fn delete(&self, client_id: &str) -> StorageResult<()> {
        self.entries
            .remove(client_id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(client_id.to_string()))
    }

    async fn find_by_client_id(&self, client_id: &str) -> StorageResult<Option<Application>> {
        Ok(self.entries.get(client_id).map(|e| e.clone()))
    }

    async fn count(&self) -> StorageResult<u64> {
        Ok(self.entries.len() as u64)
    }
}

/// In-memory authorization store keyed by entry ID.
#[derive(Debug, Default)]
pub struct MemoryAuthorizationStore {
    entries: DashMap<String, Authorization>,
}

impl MemoryAuthorizationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthorizationStore for MemoryAuthorizationStore {
    async fn create(&self, authorization: &Authorization) -> StorageResult<()> {
        if self.entries.contains_key(&authorization.id) {
            return Err(StorageError::Duplicate(authorization.id.clone()));
        }
        self.entries
            .insert(authorization.id.clone(), authorization.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Authorization>> {
        Ok(self.entries.get(id).map(|e| e.clone()))
    }

    async fn find_valid(
        &self,
        subject: &str,
        client_id: &str,
    ) -> StorageResult<Vec<Authorization>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.is_valid() && e.subject == subject && e.client_id == client_id)
            .map(|e| e.clone())
            .collect())
    }

    async fn revoke(&self, id: &str) -> StorageResult<bool> {
        match self.entries.get_mut(id) {
            Some(mut entry) if entry.status == AuthorizationStatus::Valid => {
                entry.status = AuthorizationStatus::Revoked;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn prune(&self, before: DateTime<Utc>) -> StorageResult<u64> {
        let mut removed = 0u64;
        self.entries.retain(|_, entry| {
            let prune = entry.creation_date < before
                && (entry.status == AuthorizationStatus::Revoked
                    || entry.kind == oxid_model::AuthorizationKind::AdHoc);
            if prune {
                removed += 1;
            }
            !prune
        });
        Ok(removed)
    }
}

/// In-memory token store keyed by entry ID with a reference-handle
/// index.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: DashMap<String, Token>,
    by_reference: DashMap<String, String>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn create(&self, token: &Token) -> StorageResult<()> {
        if self.entries.contains_key(&token.id) {
            return Err(StorageError::Duplicate(token.id.clone()));
        }
        if let Some(reference_id) = &token.reference_id {
            self.by_reference
                .insert(reference_id.clone(), token.id.clone());
        }
        self.entries.insert(token.id.clone(), token.clone());
        Ok(())
    }

    async fn update(&self, token: &Token) -> StorageResult<()> {
        match self.entries.get_mut(&token.id) {
            Some(mut entry) => {
                if let Some(reference_id) = &token.reference_id {
                    self.by_reference
                        .insert(reference_id.clone(), token.id.clone());
                }
                *entry = token.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound(token.id.clone())),
        }
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Token>> {
        Ok(self.entries.get(id).map(|e| e.clone()))
    }

    async fn find_by_reference_id(&self, reference_id: &str) -> StorageResult<Option<Token>> {
        let Some(id) = self.by_reference.get(reference_id).map(|e| e.clone()) else {
            return Ok(None);
        };
        self.find_by_id(&id).await
    }

    async fn find_by_authorization_id(
        &self,
        authorization_id: &str,
    ) -> StorageResult<Vec<Token>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.authorization_id.as_deref() == Some(authorization_id))
            .map(|e| e.clone())
            .collect())
    }

    async fn set_status(&self, id: &str, status: TokenStatus) -> StorageResult<bool> {
        match self.entries.get_mut(id) {
            Some(mut entry) => Ok(entry.transition_to(status, Utc::now())),
            None => Err(StorageError::NotFound(id.to_string())),
        }
    }

    async fn try_redeem(&self, id: &str, now: DateTime<Utc>) -> StorageResult<bool> {
        // The entry guard holds the shard lock for the duration of the
        // check-and-set, which makes the redemption atomic.
        match self.entries.get_mut(id) {
            Some(mut entry) if entry.status == TokenStatus::Valid => {
                Ok(entry.transition_to(TokenStatus::Redeemed, now))
            }
            Some(_) => Ok(false),
            None => Err(StorageError::NotFound(id.to_string())),
        }
    }

    async fn revoke(&self, id: &str) -> StorageResult<bool> {
        match self.entries.get_mut(id) {
            Some(mut entry) => Ok(entry.transition_to(TokenStatus::Revoked, Utc::now())),
            None => Ok(false),
        }
    }

    async fn revoke_by_authorization(&self, authorization_id: &str) -> StorageResult<u64> {
        let mut revoked = 0u64;
        for mut entry in self.entries.iter_mut() {
            if entry.authorization_id.as_deref() == Some(authorization_id)
                && entry.transition_to(TokenStatus::Revoked, Utc::now())
            {
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn prune(&self, before: DateTime<Utc>) -> StorageResult<u64> {
        let mut removed = 0u64;
        self.entries.retain(|_, entry| {
            let prune = entry.creation_date < before
                && (entry.is_expired(before) || entry.status != TokenStatus::Valid);
            if prune {
                removed += 1;
                if let Some(reference_id) = &entry.reference_id {
                    self.by_reference.remove(reference_id);
                }
            }
            !prune
        });
        Ok(removed)
    }
}

/// In-memory scope store keyed by name.
#[derive(Debug, Default)]
pub struct MemoryScopeStore {
    entries: DashMap<String, Scope>,
}

impl MemoryScopeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScopeStore for MemoryScopeStore {
    async fn create(&self, scope: &Scope) -> StorageResult<()> {
        if self.entries.contains_key(&scope.name) {
            return Err(StorageError::Duplicate(scope.name.clone()));
        }
        self.entries.insert(scope.name.clone(), scope.clone());
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> StorageResult<Option<Scope>> {
        Ok(self.entries.get(name).map(|e| e.clone()))
    }

    async fn find_by_names(&self, names: &[String]) -> StorageResult<Vec<Scope>> {
        Ok(names
            .iter()
            .filter_map(|name| self.entries.get(name).map(|e| e.clone()))
            .collect())
    }

    async fn list(&self) -> StorageResult<Vec<Scope>> {
        Ok(self.entries.iter().map(|e| e.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxid_core::TokenKind;
    use oxid_model::{AuthorizationKind, ClientType};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn application_duplicate_client_id_is_rejected() {
        let store = MemoryApplicationStore::new();
        let app = Application::new("c1", ClientType::Public);
        store.create(&app).await.unwrap();
        assert!(matches!(
            store.create(&app).await,
            Err(StorageError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn token_reference_lookup() {
        let store = MemoryTokenStore::new();
        let mut token = Token::new(TokenKind::AccessToken, Utc::now());
        token.reference_id = Some("ref-1".to_string());
        store.create(&token).await.unwrap();

        let found = store.find_by_reference_id("ref-1").await.unwrap().unwrap();
        assert_eq!(found.id, token.id);
        assert!(store.find_by_reference_id("ref-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_redemption_succeeds_exactly_once() {
        let store = Arc::new(MemoryTokenStore::new());
        let now = Utc::now();
        let mut token = Token::new(TokenKind::AuthorizationCode, now);
        token.transition_to(TokenStatus::Valid, now);
        store.create(&token).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let id = token.id.clone();
            handles.push(tokio::spawn(async move {
                store.try_redeem(&id, Utc::now()).await.unwrap()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn revocation_cascade_covers_all_tokens() {
        let auth_store = MemoryAuthorizationStore::new();
        let token_store = MemoryTokenStore::new();
        let now = Utc::now();

        let auth = Authorization::new(
            "user-1",
            "c1",
            AuthorizationKind::Permanent,
            BTreeSet::from(["openid".to_string()]),
            now,
        );
        auth_store.create(&auth).await.unwrap();

        for kind in [TokenKind::AccessToken, TokenKind::RefreshToken] {
            let mut token = Token::new(kind, now);
            token.authorization_id = Some(auth.id.clone());
            token.transition_to(TokenStatus::Valid, now);
            token_store.create(&token).await.unwrap();
        }

        assert!(auth_store.revoke(&auth.id).await.unwrap());
        assert_eq!(
            token_store.revoke_by_authorization(&auth.id).await.unwrap(),
            2
        );
        for token in token_store.find_by_authorization_id(&auth.id).await.unwrap() {
            assert_eq!(token.status, TokenStatus::Revoked);
        }
    }

    #[tokio::test]
    async fn authorization_revocation_is_monotonic() {
        let store = MemoryAuthorizationStore::new();
        let auth = Authorization::new(
            "user-1",
            "c1",
            AuthorizationKind::AdHoc,
            BTreeSet::new(),
            Utc::now(),
        );
        store.create(&auth).await.unwrap();
        assert!(store.revoke(&auth.id).await.unwrap());
        assert!(!store.revoke(&auth.id).await.unwrap());
        assert!(!store.find_by_id(&auth.id).await.unwrap().unwrap().is_valid());
    }

    #[tokio::test]
    async fn prune_removes_expired_invalid_tokens() {
        let store = MemoryTokenStore::new();
        let now = Utc::now();
        let mut old = Token::new(TokenKind::AccessToken, now - chrono::Duration::days(30));
        old.expiration_date = Some(now - chrono::Duration::days(29));
        store.create(&old).await.unwrap();

        let mut live = Token::new(TokenKind::AccessToken, now);
        live.transition_to(TokenStatus::Valid, now);
        live.expiration_date = Some(now + chrono::Duration::hours(1));
        store.create(&live).await.unwrap();

        assert_eq!(store.prune(now).await.unwrap(), 1);
        assert!(store.find_by_id(&old.id).await.unwrap().is_none());
        assert!(store.find_by_id(&live.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn scope_lookup_by_names_skips_unknown() {
        let store = MemoryScopeStore::new();
        store.create(&Scope::new("openid")).await.unwrap();
        store.create(&Scope::new("profile")).await.unwrap();

        let scopes = store
            .find_by_names(&["openid".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes[0].name, "openid");
    }
}
