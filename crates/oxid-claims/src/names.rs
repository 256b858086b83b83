//! Claim type, property key, and legacy-envelope default constants.

/// Claim types.
///
/// Standard claim types carry subject attributes; the private claim
/// types under the same namespace carry protocol state that the envelope
/// serializer maps to and from the authentication-property side table.
pub mod claims {
    // === Standard subject claims ===
    /// Subject identifier.
    pub const SUBJECT: &str = "sub";
    /// Full name.
    pub const NAME: &str = "name";
    /// Email address.
    pub const EMAIL: &str = "email";
    /// Role.
    pub const ROLE: &str = "role";
    /// Preferred username.
    pub const PREFERRED_USERNAME: &str = "preferred_username";

    // === Protocol-private claims ===
    /// One audience per claim; array-valued across the identity.
    pub const AUDIENCE: &str = "audience";
    /// One presenter (authorized party) per claim; array-valued.
    pub const PRESENTER: &str = "presenter";
    /// One resource per claim; array-valued.
    pub const RESOURCE: &str = "resource";
    /// One granted scope per claim; array-valued.
    pub const SCOPE: &str = "scope";
    /// Server-side token entry identifier.
    pub const TOKEN_ID: &str = "token_id";
    /// Server-side authorization entry identifier.
    pub const AUTHORIZATION_ID: &str = "authorization_id";
    /// Device-code entry identifier, carried by user codes.
    pub const DEVICE_CODE_ID: &str = "device_code_id";
    /// The kind of token this principal was serialized into.
    pub const TOKEN_KIND: &str = "token_kind";
    /// OIDC nonce.
    pub const NONCE: &str = "nonce";
    /// PKCE code challenge bound to an authorization code.
    pub const CODE_CHALLENGE: &str = "code_challenge";
    /// PKCE code challenge method.
    pub const CODE_CHALLENGE_METHOD: &str = "code_challenge_method";
    /// `redirect_uri` of the original authorization request.
    pub const ORIGINAL_REDIRECT_URI: &str = "original_redirect_uri";
    /// Instant the token was created.
    pub const CREATION_DATE: &str = "creation_date";
    /// Instant the token expires.
    pub const EXPIRATION_DATE: &str = "expiration_date";
    /// Access token lifetime override, in seconds.
    pub const ACCESS_TOKEN_LIFETIME: &str = "access_token_lifetime";
    /// Authorization code lifetime override, in seconds.
    pub const AUTHORIZATION_CODE_LIFETIME: &str = "authorization_code_lifetime";
    /// Device code lifetime override, in seconds.
    pub const DEVICE_CODE_LIFETIME: &str = "device_code_lifetime";
    /// Identity token lifetime override, in seconds.
    pub const IDENTITY_TOKEN_LIFETIME: &str = "identity_token_lifetime";
    /// Refresh token lifetime override, in seconds.
    pub const REFRESH_TOKEN_LIFETIME: &str = "refresh_token_lifetime";
    /// User code lifetime override, in seconds.
    pub const USER_CODE_LIFETIME: &str = "user_code_lifetime";
}

/// Property keys.
///
/// [`DESTINATIONS`](properties::DESTINATIONS) is a per-claim property;
/// the rest are authentication-property side-table keys written by the
/// envelope serializer. The key strings are frozen: earlier token
/// envelopes used the same spellings.
pub mod properties {
    /// Per-claim JSON array of token-kind tags the claim may appear in.
    pub const DESTINATIONS: &str = "destinations";

    /// JSON array of audiences.
    pub const AUDIENCES: &str = "audiences";
    /// JSON array of presenters.
    pub const PRESENTERS: &str = "presenters";
    /// JSON array of resources.
    pub const RESOURCES: &str = "resources";
    /// JSON array of granted scopes.
    pub const SCOPES: &str = "scopes";
    /// Token entry identifier.
    pub const TOKEN_ID: &str = "token_id";
    /// Authorization entry identifier.
    pub const AUTHORIZATION_ID: &str = "authorization_id";
    /// Device-code entry identifier.
    pub const DEVICE_CODE_ID: &str = "device_code_id";
    /// Token kind tag.
    pub const TOKEN_KIND: &str = "token_kind";
    /// OIDC nonce.
    pub const NONCE: &str = "nonce";
    /// PKCE code challenge.
    pub const CODE_CHALLENGE: &str = "code_challenge";
    /// PKCE code challenge method.
    pub const CODE_CHALLENGE_METHOD: &str = "code_challenge_method";
    /// Original `redirect_uri`.
    pub const ORIGINAL_REDIRECT_URI: &str = "original_redirect_uri";
    /// Creation instant (RFC 3339).
    pub const CREATION_DATE: &str = "creation_date";
    /// Expiration instant (RFC 3339).
    pub const EXPIRATION_DATE: &str = "expiration_date";
    /// Access token lifetime override.
    pub const ACCESS_TOKEN_LIFETIME: &str = "access_token_lifetime";
    /// Authorization code lifetime override.
    pub const AUTHORIZATION_CODE_LIFETIME: &str = "authorization_code_lifetime";
    /// Device code lifetime override.
    pub const DEVICE_CODE_LIFETIME: &str = "device_code_lifetime";
    /// Identity token lifetime override.
    pub const IDENTITY_TOKEN_LIFETIME: &str = "identity_token_lifetime";
    /// Refresh token lifetime override.
    pub const REFRESH_TOKEN_LIFETIME: &str = "refresh_token_lifetime";
    /// User code lifetime override.
    pub const USER_CODE_LIFETIME: &str = "user_code_lifetime";
}

/// Defaults baked into the legacy envelope format.
///
/// A `defaulted string` field whose value equals the applicable default
/// is written as the `"\0"` sentinel; the reader reverses the
/// substitution. Changing any of these breaks compatibility with tokens
/// issued by earlier server generations.
pub mod defaults {
    /// Default name claim type.
    pub const NAME_CLAIM_TYPE: &str =
        "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name";
    /// Default role claim type.
    pub const ROLE_CLAIM_TYPE: &str =
        "http://schemas.microsoft.com/ws/2008/06/identity/claims/role";
    /// Default claim value type.
    pub const STRING_VALUE_TYPE: &str = "http://www.w3.org/2001/XMLSchema#string";
    /// Default claim issuer.
    pub const LOCAL_AUTHORITY: &str = "LOCAL AUTHORITY";
}
