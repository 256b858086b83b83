//! Server options.
//!
//! The operator supplies a minimal seed (issuer, enabled grants,
//! credentials, storage switches); [`crate::resolver::resolve`] derives
//! the rest and enforces the options invariants. After resolution the
//! options are immutable shared state for the lifetime of the server.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Duration;
use oxid_crypto::{EncryptionCredential, SigningCredential};

use crate::types::{CodeChallengeMethod, EndpointType, GrantType, ResponseMode, TokenKind};

/// Whether a class of server-side entries is persisted.
///
/// Degraded mode forces both token and authorization storage to
/// [`StorageMode::Disabled`]; handlers that need a store consult this
/// variant instead of a boolean so the disabled state is explicit at
/// every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// Entries are persisted through the registered store.
    #[default]
    Enabled,
    /// No server-side entries; tokens are fully self-contained.
    Disabled,
}

impl StorageMode {
    /// Returns whether storage is enabled.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// Relative URIs at which endpoints are mounted.
///
/// Removing an endpoint disables it; the resolver rejects configurations
/// whose enabled grants require a missing endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUris {
    uris: BTreeMap<EndpointType, String>,
}

impl EndpointUris {
    /// Creates an empty set with no endpoints enabled.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            uris: BTreeMap::new(),
        }
    }

    /// Creates the standard endpoint layout.
    #[must_use]
    pub fn standard() -> Self {
        let mut uris = Self::empty();
        uris.set(EndpointType::Authorization, "/authorize");
        uris.set(EndpointType::Token, "/token");
        uris.set(EndpointType::Device, "/device");
        uris.set(EndpointType::Verification, "/device/verify");
        uris.set(EndpointType::Introspection, "/introspect");
        uris.set(EndpointType::Revocation, "/revoke");
        uris.set(EndpointType::Userinfo, "/userinfo");
        uris.set(EndpointType::Configuration, "/.well-known/openid-configuration");
        uris.set(EndpointType::Cryptography, "/.well-known/jwks");
        uris.set(EndpointType::Logout, "/logout");
        uris
    }

    /// Returns the URI of an endpoint, if registered.
    #[must_use]
    pub fn get(&self, endpoint: EndpointType) -> Option<&str> {
        self.uris.get(&endpoint).map(String::as_str)
    }

    /// Registers or replaces an endpoint URI.
    pub fn set(&mut self, endpoint: EndpointType, uri: impl Into<String>) {
        self.uris.insert(endpoint, uri.into());
    }

    /// Removes an endpoint, disabling it.
    pub fn remove(&mut self, endpoint: EndpointType) {
        self.uris.remove(&endpoint);
    }

    /// Returns whether an endpoint is registered.
    #[must_use]
    pub fn contains(&self, endpoint: EndpointType) -> bool {
        self.uris.contains_key(&endpoint)
    }

    /// Resolves the endpoint matching a request path, if any.
    #[must_use]
    pub fn match_path(&self, path: &str) -> EndpointType {
        self.uris
            .iter()
            .find(|(_, uri)| uri.as_str() == path)
            .map_or(EndpointType::Unknown, |(endpoint, _)| *endpoint)
    }
}

impl Default for EndpointUris {
    fn default() -> Self {
        Self::standard()
    }
}

/// Default lifetimes per token kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenLifetimes {
    /// Access token lifetime.
    pub access_token: Duration,
    /// Authorization code lifetime.
    pub authorization_code: Duration,
    /// Device code lifetime.
    pub device_code: Duration,
    /// Identity token lifetime.
    pub identity_token: Duration,
    /// Refresh token lifetime.
    pub refresh_token: Duration,
    /// User code lifetime.
    pub user_code: Duration,
}

impl TokenLifetimes {
    /// Returns the lifetime for a token kind.
    #[must_use]
    pub const fn for_kind(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::AccessToken => self.access_token,
            TokenKind::AuthorizationCode => self.authorization_code,
            TokenKind::DeviceCode => self.device_code,
            TokenKind::IdToken => self.identity_token,
            TokenKind::RefreshToken => self.refresh_token,
            TokenKind::UserCode => self.user_code,
        }
    }
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_token: Duration::seconds(3600),
            authorization_code: Duration::seconds(300),
            device_code: Duration::seconds(600),
            identity_token: Duration::seconds(1200),
            refresh_token: Duration::days(14),
            user_code: Duration::seconds(600),
        }
    }
}

/// The server configuration.
///
/// Fields are public and freely editable until
/// [`crate::resolver::resolve`] runs; afterwards the options should be
/// treated as frozen.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Issuer identifier, used as the `iss` claim and discovery issuer.
    pub issuer: String,

    /// Enabled endpoints and their URIs.
    pub endpoints: EndpointUris,

    /// Enabled grant types.
    pub grant_types: BTreeSet<GrantType>,

    /// Supported `response_type` combinations in canonical form.
    /// Derived from the enabled grants; seeding extra values is allowed.
    pub response_types: BTreeSet<String>,

    /// Supported response modes. Derived.
    pub response_modes: BTreeSet<ResponseMode>,

    /// Supported PKCE challenge methods. Derived; `plain` is only
    /// supported when the operator adds it explicitly.
    pub code_challenge_methods: BTreeSet<CodeChallengeMethod>,

    /// Registered scope names.
    pub scopes: BTreeSet<String>,

    /// Default token lifetimes.
    pub lifetimes: TokenLifetimes,

    /// Token signing credentials, sorted by the resolver.
    pub signing_credentials: Vec<SigningCredential>,

    /// Content-encryption credentials. The first currently-valid entry
    /// encrypts; all entries are tried for decryption.
    pub encryption_credentials: Vec<EncryptionCredential>,

    /// Degraded mode: no server-side storage, no permission checks, all
    /// validation delegated to operator-registered handlers.
    pub degraded_mode: bool,

    /// Whether token entries are persisted.
    pub token_storage: StorageMode,

    /// Whether authorization entries are persisted.
    pub authorization_storage: StorageMode,

    /// Issue access tokens as bare signed JWTs instead of wrapping them
    /// in an encrypted envelope. Resource servers can then read the
    /// claims directly.
    pub disable_access_token_encryption: bool,

    /// Issue access tokens as opaque reference handles.
    pub use_reference_access_tokens: bool,

    /// Issue refresh tokens as opaque reference handles.
    pub use_reference_refresh_tokens: bool,

    /// Keep refresh token expiration fixed at issuance instead of
    /// extending it on every use.
    pub disable_sliding_refresh_token_expiration: bool,

    /// Rotate refresh tokens on every use, redeeming the previous one.
    pub use_rolling_refresh_tokens: bool,

    /// Skip application endpoint-permission checks.
    pub ignore_endpoint_permissions: bool,

    /// Skip application grant-type-permission checks.
    pub ignore_grant_type_permissions: bool,

    /// Skip application scope-permission checks.
    pub ignore_scope_permissions: bool,

    /// Require PKCE for every authorization-code request, not just for
    /// public clients.
    pub require_proof_key_for_code_exchange: bool,

    /// Cache authorization request parameters server-side under a
    /// generated `request_id` and redirect with that single parameter.
    pub enable_request_caching: bool,

    /// Minimum interval between device-flow token polls.
    pub device_polling_interval: Duration,
}

impl ServerOptions {
    /// Creates options with the standard endpoint layout and default
    /// scopes. No grants are enabled and no credentials are registered;
    /// the resolver rejects the seed until the operator supplies both.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        use crate::types::scopes;
        let mut scope_set = BTreeSet::new();
        for scope in [
            scopes::OPENID,
            scopes::PROFILE,
            scopes::EMAIL,
            scopes::ADDRESS,
            scopes::PHONE,
        ] {
            scope_set.insert(scope.to_string());
        }
        Self {
            issuer: issuer.into(),
            endpoints: EndpointUris::standard(),
            grant_types: BTreeSet::new(),
            response_types: BTreeSet::new(),
            response_modes: BTreeSet::new(),
            code_challenge_methods: BTreeSet::new(),
            scopes: scope_set,
            lifetimes: TokenLifetimes::default(),
            signing_credentials: Vec::new(),
            encryption_credentials: Vec::new(),
            degraded_mode: false,
            token_storage: StorageMode::Enabled,
            authorization_storage: StorageMode::Enabled,
            disable_access_token_encryption: false,
            use_reference_access_tokens: false,
            use_reference_refresh_tokens: false,
            disable_sliding_refresh_token_expiration: false,
            use_rolling_refresh_tokens: false,
            ignore_endpoint_permissions: false,
            ignore_grant_type_permissions: false,
            ignore_scope_permissions: false,
            require_proof_key_for_code_exchange: false,
            enable_request_caching: false,
            device_polling_interval: Duration::seconds(5),
        }
    }

    /// Enables a grant type.
    #[must_use]
    pub fn enable_grant(mut self, grant: GrantType) -> Self {
        self.grant_types.insert(grant);
        self
    }

    /// Registers a signing credential.
    #[must_use]
    pub fn add_signing_credential(mut self, credential: SigningCredential) -> Self {
        self.signing_credentials.push(credential);
        self
    }

    /// Registers an encryption credential.
    #[must_use]
    pub fn add_encryption_credential(mut self, credential: EncryptionCredential) -> Self {
        self.encryption_credentials.push(credential);
        self
    }

    /// Registers a scope.
    #[must_use]
    pub fn add_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.insert(scope.into());
        self
    }

    /// Returns whether a grant type is enabled.
    #[must_use]
    pub fn is_grant_enabled(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }

    /// Returns whether a canonical `response_type` combination is
    /// supported.
    #[must_use]
    pub fn is_response_type_supported(&self, canonical: &str) -> bool {
        self.response_types.contains(canonical)
    }

    /// Returns whether sliding refresh-token expiration is active.
    #[must_use]
    pub const fn uses_sliding_refresh_expiration(&self) -> bool {
        !self.disable_sliding_refresh_token_expiration
    }

    /// Returns the preferred signing credential.
    ///
    /// Valid only after resolution, which sorts credentials and
    /// guarantees the vector is non-empty.
    #[must_use]
    pub fn preferred_signing_credential(&self) -> Option<&SigningCredential> {
        self.signing_credentials.first()
    }

    /// Returns the encryption credential to use for new tokens at the
    /// given instant.
    #[must_use]
    pub fn active_encryption_credential(
        &self,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<&EncryptionCredential> {
        self.encryption_credentials
            .iter()
            .find(|credential| credential.is_valid_at(now))
    }
}
