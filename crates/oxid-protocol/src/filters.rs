//! Built-in handler filters.
//!
//! Filters keep storage-dependent handlers out of degraded pipelines
//! and let one registration serve every endpoint by matching on the
//! transaction's endpoint discriminant.

use async_trait::async_trait;

use oxid_core::{EndpointType, Result};
use oxid_pipeline::{Context, Filter};

/// Activates the handler only when token storage is enabled.
pub struct RequireTokenStorage;

#[async_trait]
impl<C: Context + Sync> Filter<C> for RequireTokenStorage {
    async fn is_active(&self, ctx: &C) -> Result<bool> {
        Ok(ctx.transaction().options().token_storage.is_enabled())
    }
}

/// Activates the handler only when authorization storage is enabled.
pub struct RequireAuthorizationStorage;

#[async_trait]
impl<C: Context + Sync> Filter<C> for RequireAuthorizationStorage {
    async fn is_active(&self, ctx: &C) -> Result<bool> {
        Ok(ctx
            .transaction()
            .options()
            .authorization_storage
            .is_enabled())
    }
}

/// Activates the handler only outside degraded mode.
pub struct RequireDegradedModeDisabled;

#[async_trait]
impl<C: Context + Sync> Filter<C> for RequireDegradedModeDisabled {
    async fn is_active(&self, ctx: &C) -> Result<bool> {
        Ok(!ctx.transaction().options().degraded_mode)
    }
}

/// Activates the handler only for transactions targeting one endpoint.
pub struct RequireEndpoint(pub EndpointType);

#[async_trait]
impl<C: Context + Sync> Filter<C> for RequireEndpoint {
    async fn is_active(&self, ctx: &C) -> Result<bool> {
        Ok(ctx.transaction().endpoint() == self.0)
    }
}

/// Activates the handler only when request caching is enabled.
pub struct RequireRequestCaching;

#[async_trait]
impl<C: Context + Sync> Filter<C> for RequireRequestCaching {
    async fn is_active(&self, ctx: &C) -> Result<bool> {
        Ok(ctx.transaction().options().enable_request_caching)
    }
}
