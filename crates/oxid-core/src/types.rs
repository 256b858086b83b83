//! Shared protocol vocabulary.
//!
//! Implements types from OAuth 2.0 and `OpenID` Connect specifications used
//! across the options, the pipeline, and the endpoint handlers:
//! - RFC 6749 (OAuth 2.0)
//! - RFC 8628 (Device Authorization Grant)
//! - `OpenID` Connect Core 1.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// OAuth 2.0 grant types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GrantType {
    /// Authorization code grant (RFC 6749 Section 4.1).
    #[serde(rename = "authorization_code")]
    AuthorizationCode,

    /// Client credentials grant (RFC 6749 Section 4.4).
    #[serde(rename = "client_credentials")]
    ClientCredentials,

    /// Implicit grant (RFC 6749 Section 4.2).
    #[serde(rename = "implicit")]
    Implicit,

    /// Resource owner password credentials grant (RFC 6749 Section 4.3).
    /// Deprecated; handled only through a custom handler.
    #[serde(rename = "password")]
    Password,

    /// Refresh token grant (RFC 6749 Section 6).
    #[serde(rename = "refresh_token")]
    RefreshToken,

    /// Device authorization grant (RFC 8628).
    #[serde(rename = "urn:ietf:params:oauth:grant-type:device_code")]
    DeviceCode,
}

impl GrantType {
    /// Returns the endpoints this grant requires to be registered.
    #[must_use]
    pub const fn required_endpoints(self) -> &'static [EndpointType] {
        match self {
            Self::AuthorizationCode => &[EndpointType::Authorization, EndpointType::Token],
            Self::Implicit => &[EndpointType::Authorization],
            Self::ClientCredentials | Self::Password | Self::RefreshToken => {
                &[EndpointType::Token]
            }
            Self::DeviceCode => &[
                EndpointType::Device,
                EndpointType::Token,
                EndpointType::Verification,
            ],
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::Implicit => "implicit",
            Self::Password => "password",
            Self::RefreshToken => "refresh_token",
            Self::DeviceCode => "urn:ietf:params:oauth:grant-type:device_code",
        };
        write!(f, "{s}")
    }
}

impl FromStr for GrantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(Self::AuthorizationCode),
            "client_credentials" => Ok(Self::ClientCredentials),
            "implicit" => Ok(Self::Implicit),
            "password" => Ok(Self::Password),
            "refresh_token" => Ok(Self::RefreshToken),
            "urn:ietf:params:oauth:grant-type:device_code" => Ok(Self::DeviceCode),
            _ => Err(format!("unknown grant type: {s}")),
        }
    }
}

/// OAuth 2.0 response types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResponseType {
    /// Authorization code response.
    #[serde(rename = "code")]
    Code,

    /// `OpenID` Connect - ID token.
    #[serde(rename = "id_token")]
    IdToken,

    /// Implicit grant - access token.
    #[serde(rename = "token")]
    Token,

    /// None (error-only redirects).
    #[serde(rename = "none")]
    None,
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Code => "code",
            Self::IdToken => "id_token",
            Self::Token => "token",
            Self::None => "none",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ResponseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(Self::Code),
            "id_token" => Ok(Self::IdToken),
            "token" => Ok(Self::Token),
            "none" => Ok(Self::None),
            _ => Err(format!("unknown response type: {s}")),
        }
    }
}

/// A combined `response_type` value, e.g. `code id_token`.
///
/// Stored as a sorted set so that equivalent permutations compare equal and
/// canonicalize to the same wire form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseTypes(pub BTreeSet<ResponseType>);

impl ResponseTypes {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Checks if this is a pure code flow.
    #[must_use]
    pub fn is_code_flow(&self) -> bool {
        self.0.len() == 1 && self.0.contains(&ResponseType::Code)
    }

    /// Checks if this is an implicit flow (no code).
    #[must_use]
    pub fn is_implicit_flow(&self) -> bool {
        !self.0.contains(&ResponseType::Code)
            && (self.0.contains(&ResponseType::Token) || self.0.contains(&ResponseType::IdToken))
    }

    /// Checks if this is a hybrid flow (code plus tokens).
    #[must_use]
    pub fn is_hybrid_flow(&self) -> bool {
        self.0.contains(&ResponseType::Code)
            && (self.0.contains(&ResponseType::Token) || self.0.contains(&ResponseType::IdToken))
    }

    /// Returns the canonical space-joined wire form.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ResponseTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

impl FromStr for ResponseTypes {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut types = BTreeSet::new();
        for part in s.split_whitespace() {
            types.insert(ResponseType::from_str(part)?);
        }
        if types.is_empty() {
            return Err("response_type is empty".to_string());
        }
        Ok(Self(types))
    }
}

/// OAuth 2.0 response modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResponseMode {
    /// Query string parameters (default for code-only flows).
    #[serde(rename = "query")]
    Query,

    /// Fragment parameters (default for flows returning tokens).
    #[serde(rename = "fragment")]
    Fragment,

    /// Auto-submitting form POST to the redirect URI.
    #[serde(rename = "form_post")]
    FormPost,
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Query => "query",
            Self::Fragment => "fragment",
            Self::FormPost => "form_post",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(Self::Query),
            "fragment" => Ok(Self::Fragment),
            "form_post" => Ok(Self::FormPost),
            _ => Err(format!("unknown response mode: {s}")),
        }
    }
}

/// PKCE code challenge methods (RFC 7636).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    /// Plain code verifier.
    #[serde(rename = "plain")]
    Plain,

    /// SHA-256 hash of the code verifier.
    #[serde(rename = "S256")]
    S256,
}

impl fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::S256 => write!(f, "S256"),
        }
    }
}

impl FromStr for CodeChallengeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "S256" => Ok(Self::S256),
            _ => Err(format!("unknown code challenge method: {s}")),
        }
    }
}

/// The endpoint a transaction targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointType {
    /// Authorization endpoint (RFC 6749 Section 3.1).
    Authorization,
    /// Token endpoint (RFC 6749 Section 3.2).
    Token,
    /// Device authorization endpoint (RFC 8628).
    Device,
    /// User-code verification endpoint (RFC 8628).
    Verification,
    /// Introspection endpoint (RFC 7662).
    Introspection,
    /// Revocation endpoint (RFC 7009).
    Revocation,
    /// `UserInfo` endpoint (OIDC Core Section 5.3).
    Userinfo,
    /// Discovery document endpoint (OIDC Discovery).
    Configuration,
    /// JSON Web Key Set endpoint.
    Cryptography,
    /// RP-initiated logout endpoint.
    Logout,
    /// Not a recognized endpoint; the request is not ours.
    Unknown,
}

impl EndpointType {
    /// All concrete endpoints, in registration order.
    pub const ALL: [Self; 10] = [
        Self::Authorization,
        Self::Token,
        Self::Device,
        Self::Verification,
        Self::Introspection,
        Self::Revocation,
        Self::Userinfo,
        Self::Configuration,
        Self::Cryptography,
        Self::Logout,
    ];
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Authorization => "authorization",
            Self::Token => "token",
            Self::Device => "device",
            Self::Verification => "verification",
            Self::Introspection => "introspection",
            Self::Revocation => "revocation",
            Self::Userinfo => "userinfo",
            Self::Configuration => "configuration",
            Self::Cryptography => "cryptography",
            Self::Logout => "logout",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Kinds of security tokens issued and consumed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Credential presented to resource servers.
    AccessToken,
    /// One-time artifact exchanged at the token endpoint.
    AuthorizationCode,
    /// Device-flow polling artifact.
    DeviceCode,
    /// JWT conveying authentication facts.
    IdToken,
    /// Credential used to obtain new access tokens.
    RefreshToken,
    /// Short human-typable device-flow artifact.
    UserCode,
}

impl TokenKind {
    /// Returns the destination tag naming this token kind in claim
    /// destination sets.
    #[must_use]
    pub const fn destination(self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::AuthorizationCode => "authorization_code",
            Self::DeviceCode => "device_code",
            Self::IdToken => "id_token",
            Self::RefreshToken => "refresh_token",
            Self::UserCode => "user_code",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.destination())
    }
}

impl FromStr for TokenKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access_token" => Ok(Self::AccessToken),
            "authorization_code" => Ok(Self::AuthorizationCode),
            "device_code" => Ok(Self::DeviceCode),
            "id_token" => Ok(Self::IdToken),
            "refresh_token" => Ok(Self::RefreshToken),
            "user_code" => Ok(Self::UserCode),
            _ => Err(format!("unknown token kind: {s}")),
        }
    }
}

/// Standard scopes.
pub mod scopes {
    /// `OpenID` Connect scope (required for OIDC requests).
    pub const OPENID: &str = "openid";
    /// Profile claims scope.
    pub const PROFILE: &str = "profile";
    /// Email claims scope.
    pub const EMAIL: &str = "email";
    /// Address claims scope.
    pub const ADDRESS: &str = "address";
    /// Phone claims scope.
    pub const PHONE: &str = "phone";
    /// Offline access scope (refresh tokens).
    pub const OFFLINE_ACCESS: &str = "offline_access";
}
