//! Helpers shared by the endpoint pipelines.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use oxid_core::{EndpointType, Error, GrantType, Result};
use oxid_crypto::hash::{constant_time_eq, sha256};
use oxid_model::Application;
use oxid_pipeline::{
    Context, EndpointMarker, ExtractRequest, Handler, Rejection, Request, Transaction,
};
use oxid_storage::{ApplicationStore, ScopeStore};

use crate::error::codes;

/// Prefix marking a hashed client secret.
const HASHED_SECRET_PREFIX: &str = "sha256:";

/// Extract-phase guard: the host must attach the parsed request before
/// dispatching. A missing request is integration misuse, not a protocol
/// error.
pub struct EnsureRequestAttached;

#[async_trait]
impl<E: EndpointMarker> Handler<ExtractRequest<E>> for EnsureRequestAttached {
    async fn handle(&self, ctx: &mut ExtractRequest<E>) -> Result<()> {
        ctx.transaction().require_request().map(|_| ())
    }
}

fn rejection(error: &str, description: &str) -> Rejection {
    Rejection {
        error: error.to_string(),
        description: Some(description.to_string()),
        uri: None,
    }
}

/// Validates the calling client against its registration.
///
/// Checks existence, endpoint permission, grant permission, and the
/// client secret (mandatory for confidential and hybrid clients when
/// `check_secret` is set, forbidden for public clients). Returns the
/// application on success or the rejection to report.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when no application store is
/// registered and [`Error::Persistence`] on store failure.
pub async fn validate_client(
    transaction: &Transaction,
    request: &Request,
    endpoint: EndpointType,
    grant: Option<GrantType>,
    check_secret: bool,
) -> Result<std::result::Result<Application, Rejection>> {
    let options = transaction.options();

    let Some(client_id) = request.client_id() else {
        return Ok(Err(rejection(
            codes::INVALID_REQUEST,
            "the client_id parameter is required",
        )));
    };

    let store = transaction
        .services()
        .get::<dyn ApplicationStore>()
        .ok_or_else(|| Error::Configuration("no application store is registered".into()))?;
    let Some(application) = store
        .find_by_client_id(client_id)
        .await
        .map_err(|e| Error::Persistence(e.to_string()))?
    else {
        return Ok(Err(rejection(
            codes::INVALID_CLIENT,
            "the client application is unknown",
        )));
    };

    if !options.ignore_endpoint_permissions && !application.has_endpoint_permission(endpoint) {
        return Ok(Err(rejection(
            codes::UNAUTHORIZED_CLIENT,
            "the client is not allowed to use this endpoint",
        )));
    }
    if let Some(grant) = grant {
        if !options.ignore_grant_type_permissions && !application.has_grant_permission(grant) {
            return Ok(Err(rejection(
                codes::UNAUTHORIZED_CLIENT,
                "the client is not allowed to use this grant type",
            )));
        }
    }

    if check_secret {
        if application.client_type.requires_secret() {
            let Some(candidate) = request.client_secret() else {
                return Ok(Err(rejection(
                    codes::INVALID_CLIENT,
                    "the client_secret parameter is required for this client",
                )));
            };
            let stored = application.client_secret.as_deref().unwrap_or_default();
            if !verify_client_secret(stored, candidate) {
                return Ok(Err(rejection(
                    codes::INVALID_CLIENT,
                    "the client credentials are invalid",
                )));
            }
        } else if request.client_secret().is_some() {
            return Ok(Err(rejection(
                codes::INVALID_REQUEST,
                "public clients must not send a client_secret",
            )));
        }
    }

    Ok(Ok(application))
}

/// Compares a candidate secret against the stored secret in constant
/// time. Stored secrets prefixed with `sha256:` hold the base64url
/// digest instead of the plaintext.
#[must_use]
pub fn verify_client_secret(stored: &str, candidate: &str) -> bool {
    if let Some(digest) = stored.strip_prefix(HASHED_SECRET_PREFIX) {
        let hashed = URL_SAFE_NO_PAD.encode(sha256(candidate.as_bytes()));
        constant_time_eq(hashed.as_bytes(), digest.as_bytes())
    } else {
        constant_time_eq(stored.as_bytes(), candidate.as_bytes())
    }
}

/// Hashes a client secret for storage.
#[must_use]
pub fn hash_client_secret(secret: &str) -> String {
    format!(
        "{HASHED_SECRET_PREFIX}{}",
        URL_SAFE_NO_PAD.encode(sha256(secret.as_bytes()))
    )
}

/// Returns the first requested scope that is not registered, checking
/// the options and, when available, the scope store.
///
/// # Errors
///
/// Returns [`Error::Persistence`] on store failure.
pub async fn find_unknown_scope(
    transaction: &Transaction,
    scopes: &[&str],
) -> Result<Option<String>> {
    let options = transaction.options();
    let store = transaction.services().get::<dyn ScopeStore>();
    for scope in scopes {
        if options.scopes.contains(*scope) {
            continue;
        }
        if let Some(store) = &store {
            if store
                .find_by_name(scope)
                .await
                .map_err(|e| Error::Persistence(e.to_string()))?
                .is_some()
            {
                continue;
            }
        }
        return Ok(Some((*scope).to_string()));
    }
    Ok(None)
}

/// Returns the first requested scope the application is not permitted
/// to request, honoring `ignore_scope_permissions`.
#[must_use]
pub fn find_unpermitted_scope(
    transaction: &Transaction,
    application: &Application,
    scopes: &[&str],
) -> Option<String> {
    if transaction.options().ignore_scope_permissions {
        return None;
    }
    scopes
        .iter()
        .find(|scope| {
            // offline_access is governed by the grant permission, not a
            // scope permission.
            **scope != oxid_core::types::scopes::OFFLINE_ACCESS
                && !application.has_scope_permission(scope)
        })
        .map(ToString::to_string)
}

/// Joins the issuer and a relative endpoint path into an absolute URI.
#[must_use]
pub fn absolute_endpoint_uri(issuer: &str, path: &str) -> String {
    format!("{}{path}", issuer.trim_end_matches('/'))
}
