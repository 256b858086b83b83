//! Protocol error vocabulary.
//!
//! Standard OAuth 2.0 / OpenID Connect error codes as defined in:
//! - RFC 6749 (OAuth 2.0)
//! - RFC 7009 (Token Revocation)
//! - RFC 7662 (Token Introspection)
//! - RFC 8628 (Device Authorization Grant)
//! - `OpenID` Connect Core 1.0
//!
//! Handlers report these through the context rejection flags; the host
//! adapter maps them to HTTP statuses with [`http_status`].

/// Standard error codes.
pub mod codes {
    /// Malformed or incomplete request.
    pub const INVALID_REQUEST: &str = "invalid_request";
    /// Client authentication failed.
    pub const INVALID_CLIENT: &str = "invalid_client";
    /// Invalid, expired, redeemed, or revoked grant.
    pub const INVALID_GRANT: &str = "invalid_grant";
    /// Unknown or unpermitted scope.
    pub const INVALID_SCOPE: &str = "invalid_scope";
    /// Invalid or expired bearer token.
    pub const INVALID_TOKEN: &str = "invalid_token";
    /// Client is not authorized for this grant or endpoint.
    pub const UNAUTHORIZED_CLIENT: &str = "unauthorized_client";
    /// Grant type not supported by this server.
    pub const UNSUPPORTED_GRANT_TYPE: &str = "unsupported_grant_type";
    /// Response type not supported by this server.
    pub const UNSUPPORTED_RESPONSE_TYPE: &str = "unsupported_response_type";
    /// The resource owner or server denied the request.
    pub const ACCESS_DENIED: &str = "access_denied";
    /// Internal failure; details are never exposed.
    pub const SERVER_ERROR: &str = "server_error";
    /// The server is temporarily unable to handle the request.
    pub const TEMPORARILY_UNAVAILABLE: &str = "temporarily_unavailable";
    /// Device flow: the user has not completed verification yet.
    pub const AUTHORIZATION_PENDING: &str = "authorization_pending";
    /// Device flow: the client is polling too fast.
    pub const SLOW_DOWN: &str = "slow_down";
    /// Device flow: the device code expired.
    pub const EXPIRED_TOKEN: &str = "expired_token";
    /// OIDC: user authentication is required.
    pub const LOGIN_REQUIRED: &str = "login_required";
    /// OIDC: user consent is required.
    pub const CONSENT_REQUIRED: &str = "consent_required";
    /// OIDC: some user interaction is required.
    pub const INTERACTION_REQUIRED: &str = "interaction_required";
}

/// Returns the HTTP status a host adapter should use for an error code.
#[must_use]
pub fn http_status(code: &str) -> u16 {
    match code {
        codes::INVALID_CLIENT | codes::INVALID_TOKEN => 401,
        codes::ACCESS_DENIED | codes::UNAUTHORIZED_CLIENT => 403,
        codes::SERVER_ERROR => 500,
        codes::TEMPORARILY_UNAVAILABLE => 503,
        _ => 400,
    }
}
