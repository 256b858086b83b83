//! Registered applications (relying parties).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use oxid_core::{EndpointType, GrantType};

/// How a client authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    /// Cannot keep a secret (SPAs, native apps). Never authenticated by
    /// secret; PKCE is the binding mechanism.
    Public,
    /// Can keep a secret; secret verification is mandatory.
    Confidential,
    /// Treated as confidential at the token endpoint but allowed
    /// public-style flows at the authorization endpoint.
    Hybrid,
}

impl ClientType {
    /// Returns whether this client must present a secret.
    #[must_use]
    pub const fn requires_secret(self) -> bool {
        matches!(self, Self::Confidential | Self::Hybrid)
    }
}

/// A registered relying-party application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    /// Internal identifier.
    pub id: String,

    /// OAuth `client_id`.
    pub client_id: String,

    /// Client secret. `None` for public clients. May be stored hashed;
    /// the protocol layer performs the comparison.
    pub client_secret: Option<String>,

    /// Client type.
    pub client_type: ClientType,

    /// Human-readable name shown on consent screens.
    pub display_name: Option<String>,

    /// Endpoints this application may call.
    pub endpoint_permissions: BTreeSet<EndpointType>,

    /// Grant types this application may use.
    pub grant_permissions: BTreeSet<GrantType>,

    /// Scopes this application may request.
    pub scope_permissions: BTreeSet<String>,

    /// Registered redirect URIs, compared by exact string match.
    pub redirect_uris: BTreeSet<String>,

    /// Registered post-logout redirect URIs.
    pub post_logout_redirect_uris: BTreeSet<String>,
}

impl Application {
    /// Creates an application with no permissions.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_type: ClientType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.into(),
            client_secret: None,
            client_type,
            display_name: None,
            endpoint_permissions: BTreeSet::new(),
            grant_permissions: BTreeSet::new(),
            scope_permissions: BTreeSet::new(),
            redirect_uris: BTreeSet::new(),
            post_logout_redirect_uris: BTreeSet::new(),
        }
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Permits an endpoint.
    #[must_use]
    pub fn permit_endpoint(mut self, endpoint: EndpointType) -> Self {
        self.endpoint_permissions.insert(endpoint);
        self
    }

    /// Permits a grant type.
    #[must_use]
    pub fn permit_grant(mut self, grant: GrantType) -> Self {
        self.grant_permissions.insert(grant);
        self
    }

    /// Permits a scope.
    #[must_use]
    pub fn permit_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope_permissions.insert(scope.into());
        self
    }

    /// Registers a redirect URI.
    #[must_use]
    pub fn add_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uris.insert(uri.into());
        self
    }

    /// Registers a post-logout redirect URI.
    #[must_use]
    pub fn add_post_logout_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.post_logout_redirect_uris.insert(uri.into());
        self
    }

    /// Returns whether the application may call an endpoint.
    #[must_use]
    pub fn has_endpoint_permission(&self, endpoint: EndpointType) -> bool {
        self.endpoint_permissions.contains(&endpoint)
    }

    /// Returns whether the application may use a grant type.
    #[must_use]
    pub fn has_grant_permission(&self, grant: GrantType) -> bool {
        self.grant_permissions.contains(&grant)
    }

    /// Returns whether the application may request a scope.
    #[must_use]
    pub fn has_scope_permission(&self, scope: &str) -> bool {
        self.scope_permissions.contains(scope)
    }

    /// Returns whether a redirect URI is registered. Comparison is an
    /// exact string match; no wildcard or prefix logic.
    #[must_use]
    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.contains(uri)
    }

    /// Returns whether a post-logout redirect URI is registered.
    #[must_use]
    pub fn has_post_logout_redirect_uri(&self, uri: &str) -> bool {
        self.post_logout_redirect_uris.contains(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_clients_do_not_require_a_secret() {
        assert!(!ClientType::Public.requires_secret());
        assert!(ClientType::Confidential.requires_secret());
        assert!(ClientType::Hybrid.requires_secret());
    }

    #[test]
    fn redirect_uri_matching_is_exact() {
        let app = Application::new("c1", ClientType::Public)
            .add_redirect_uri("https://c1.example.com/cb");
        assert!(app.has_redirect_uri("https://c1.example.com/cb"));
        assert!(!app.has_redirect_uri("https://c1.example.com/cb/"));
        assert!(!app.has_redirect_uri("https://c1.example.com/CB"));
    }

    #[test]
    fn permissions_default_to_empty() {
        let app = Application::new("c1", ClientType::Confidential);
        assert!(!app.has_endpoint_permission(EndpointType::Token));
        assert!(!app.has_grant_permission(GrantType::ClientCredentials));
        assert!(!app.has_scope_permission("openid"));
    }
}
