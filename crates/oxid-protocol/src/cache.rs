//! Server-side cache for authorization request parameters.
//!
//! When request caching is enabled, the authorization endpoint stores
//! the original request under a generated `request_id` and redirects
//! with that single parameter; the cached payload is a signed and
//! encrypted JWT so a tampered or fabricated `request_id` payload can
//! never round-trip.

use async_trait::async_trait;
use dashmap::DashMap;

use oxid_core::Result;

/// Storage for cached authorization requests.
#[async_trait]
pub trait RequestCache: Send + Sync {
    /// Stores a protected payload under an identifier.
    async fn store(&self, id: &str, payload: &str) -> Result<()>;

    /// Loads a payload, or `None` when unknown or expired.
    async fn load(&self, id: &str) -> Result<Option<String>>;

    /// Removes a cached payload.
    async fn remove(&self, id: &str) -> Result<()>;
}

/// In-memory request cache for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryRequestCache {
    entries: DashMap<String, String>,
}

impl MemoryRequestCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestCache for MemoryRequestCache {
    async fn store(&self, id: &str, payload: &str) -> Result<()> {
        self.entries.insert(id.to_string(), payload.to_string());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<String>> {
        Ok(self.entries.get(id).map(|e| e.clone()))
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.entries.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_load_remove() {
        let cache = MemoryRequestCache::new();
        cache.store("r1", "payload").await.unwrap();
        assert_eq!(cache.load("r1").await.unwrap().as_deref(), Some("payload"));
        cache.remove("r1").await.unwrap();
        assert_eq!(cache.load("r1").await.unwrap(), None);
    }
}
