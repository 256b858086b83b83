//! Request and response parameter bags.
//!
//! Flat maps over JSON values with typed accessors for the parameters
//! defined by RFC 6749, RFC 8628, and OpenID Connect Core, plus an open
//! map for extensions. An absent parameter and an empty parameter are
//! different things; accessors return `Option` and never conflate the
//! two.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known parameter names.
pub mod params {
    /// `client_id`.
    pub const CLIENT_ID: &str = "client_id";
    /// `client_secret`.
    pub const CLIENT_SECRET: &str = "client_secret";
    /// `grant_type`.
    pub const GRANT_TYPE: &str = "grant_type";
    /// `response_type`.
    pub const RESPONSE_TYPE: &str = "response_type";
    /// `response_mode`.
    pub const RESPONSE_MODE: &str = "response_mode";
    /// `redirect_uri`.
    pub const REDIRECT_URI: &str = "redirect_uri";
    /// `scope`.
    pub const SCOPE: &str = "scope";
    /// `state`.
    pub const STATE: &str = "state";
    /// `nonce`.
    pub const NONCE: &str = "nonce";
    /// `prompt`.
    pub const PROMPT: &str = "prompt";
    /// `code`.
    pub const CODE: &str = "code";
    /// `code_challenge`.
    pub const CODE_CHALLENGE: &str = "code_challenge";
    /// `code_challenge_method`.
    pub const CODE_CHALLENGE_METHOD: &str = "code_challenge_method";
    /// `code_verifier`.
    pub const CODE_VERIFIER: &str = "code_verifier";
    /// `refresh_token`.
    pub const REFRESH_TOKEN: &str = "refresh_token";
    /// `device_code`.
    pub const DEVICE_CODE: &str = "device_code";
    /// `user_code`.
    pub const USER_CODE: &str = "user_code";
    /// `username`.
    pub const USERNAME: &str = "username";
    /// `password`.
    pub const PASSWORD: &str = "password";
    /// `token`.
    pub const TOKEN: &str = "token";
    /// `token_type_hint`.
    pub const TOKEN_TYPE_HINT: &str = "token_type_hint";
    /// `access_token`.
    pub const ACCESS_TOKEN: &str = "access_token";
    /// `token_type`.
    pub const TOKEN_TYPE: &str = "token_type";
    /// `expires_in`.
    pub const EXPIRES_IN: &str = "expires_in";
    /// `id_token`.
    pub const ID_TOKEN: &str = "id_token";
    /// `id_token_hint`.
    pub const ID_TOKEN_HINT: &str = "id_token_hint";
    /// `post_logout_redirect_uri`.
    pub const POST_LOGOUT_REDIRECT_URI: &str = "post_logout_redirect_uri";
    /// `verification_uri`.
    pub const VERIFICATION_URI: &str = "verification_uri";
    /// `verification_uri_complete`.
    pub const VERIFICATION_URI_COMPLETE: &str = "verification_uri_complete";
    /// `interval`.
    pub const INTERVAL: &str = "interval";
    /// `error`.
    pub const ERROR: &str = "error";
    /// `error_description`.
    pub const ERROR_DESCRIPTION: &str = "error_description";
    /// `error_uri`.
    pub const ERROR_URI: &str = "error_uri";
    /// `active` (introspection).
    pub const ACTIVE: &str = "active";
    /// `request_id` (cached authorization requests).
    pub const REQUEST_ID: &str = "request_id";
    /// `max_age`.
    pub const MAX_AGE: &str = "max_age";
}

/// An incoming protocol request as a flat parameter bag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Request {
    parameters: BTreeMap<String, Value>,
}

macro_rules! string_accessor {
    ($(#[$doc:meta])* $name:ident, $param:expr) => {
        $(#[$doc])*
        #[must_use]
        pub fn $name(&self) -> Option<&str> {
            self.get_string($param)
        }
    };
}

impl Request {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a request from string parameters.
    pub fn from_parameters<I, K, V>(parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            parameters: parameters
                .into_iter()
                .map(|(k, v)| (k.into(), Value::String(v.into())))
                .collect(),
        }
    }

    /// Returns a raw parameter value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Returns a parameter as a string slice. A present-but-non-string
    /// parameter reads as absent.
    #[must_use]
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(Value::as_str)
    }

    /// Sets a parameter.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.parameters.insert(name.into(), value.into());
    }

    /// Removes a parameter.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.parameters.remove(name)
    }

    /// Returns whether a parameter is present (possibly empty).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// Iterates over all parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.parameters.iter().map(|(k, v)| (k.as_str(), v))
    }

    string_accessor!(
        /// Returns `client_id`.
        client_id,
        params::CLIENT_ID
    );
    string_accessor!(
        /// Returns `client_secret`.
        client_secret,
        params::CLIENT_SECRET
    );
    string_accessor!(
        /// Returns `grant_type`.
        grant_type,
        params::GRANT_TYPE
    );
    string_accessor!(
        /// Returns `response_type`.
        response_type,
        params::RESPONSE_TYPE
    );
    string_accessor!(
        /// Returns `response_mode`.
        response_mode,
        params::RESPONSE_MODE
    );
    string_accessor!(
        /// Returns `redirect_uri`.
        redirect_uri,
        params::REDIRECT_URI
    );
    string_accessor!(
        /// Returns `scope`.
        scope,
        params::SCOPE
    );
    string_accessor!(
        /// Returns `state`.
        state,
        params::STATE
    );
    string_accessor!(
        /// Returns `nonce`.
        nonce,
        params::NONCE
    );
    string_accessor!(
        /// Returns `prompt`.
        prompt,
        params::PROMPT
    );
    string_accessor!(
        /// Returns `code`.
        code,
        params::CODE
    );
    string_accessor!(
        /// Returns `code_challenge`.
        code_challenge,
        params::CODE_CHALLENGE
    );
    string_accessor!(
        /// Returns `code_challenge_method`.
        code_challenge_method,
        params::CODE_CHALLENGE_METHOD
    );
    string_accessor!(
        /// Returns `code_verifier`.
        code_verifier,
        params::CODE_VERIFIER
    );
    string_accessor!(
        /// Returns `refresh_token`.
        refresh_token,
        params::REFRESH_TOKEN
    );
    string_accessor!(
        /// Returns `device_code`.
        device_code,
        params::DEVICE_CODE
    );
    string_accessor!(
        /// Returns `user_code`.
        user_code,
        params::USER_CODE
    );
    string_accessor!(
        /// Returns `username`.
        username,
        params::USERNAME
    );
    string_accessor!(
        /// Returns `password`.
        password,
        params::PASSWORD
    );
    string_accessor!(
        /// Returns `token`.
        token,
        params::TOKEN
    );
    string_accessor!(
        /// Returns `token_type_hint`.
        token_type_hint,
        params::TOKEN_TYPE_HINT
    );
    string_accessor!(
        /// Returns the bearer `access_token`.
        access_token,
        params::ACCESS_TOKEN
    );
    string_accessor!(
        /// Returns `id_token_hint`.
        id_token_hint,
        params::ID_TOKEN_HINT
    );
    string_accessor!(
        /// Returns `post_logout_redirect_uri`.
        post_logout_redirect_uri,
        params::POST_LOGOUT_REDIRECT_URI
    );
    string_accessor!(
        /// Returns `request_id`.
        request_id,
        params::REQUEST_ID
    );

    /// Returns the requested scopes, split on whitespace.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scope()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Returns whether `openid` was requested.
    #[must_use]
    pub fn is_openid_request(&self) -> bool {
        self.scopes().contains(&"openid")
    }
}

/// An outgoing protocol response as a flat parameter bag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Response {
    parameters: BTreeMap<String, Value>,
}

impl Response {
    /// Creates an empty response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an error response.
    #[must_use]
    pub fn error(
        error: impl Into<String>,
        description: Option<String>,
        uri: Option<String>,
    ) -> Self {
        let mut response = Self::new();
        response.set(params::ERROR, error.into());
        if let Some(description) = description {
            response.set(params::ERROR_DESCRIPTION, description);
        }
        if let Some(uri) = uri {
            response.set(params::ERROR_URI, uri);
        }
        response
    }

    /// Returns a raw parameter value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Returns a parameter as a string slice.
    #[must_use]
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(Value::as_str)
    }

    /// Sets a parameter.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.parameters.insert(name.into(), value.into());
    }

    /// Removes a parameter.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.parameters.remove(name)
    }

    /// Returns the error code, when this is an error response.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.get_string(params::ERROR)
    }

    /// Returns whether this is an error response.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.parameters.contains_key(params::ERROR)
    }

    /// Iterates over all parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.parameters.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_and_empty_are_distinct() {
        let request = Request::from_parameters([("scope", "")]);
        assert_eq!(request.scope(), Some(""));
        assert!(request.contains(params::SCOPE));
        assert_eq!(request.redirect_uri(), None);
        assert!(!request.contains(params::REDIRECT_URI));
    }

    #[test]
    fn scopes_split_on_whitespace() {
        let request = Request::from_parameters([("scope", "openid  profile email")]);
        assert_eq!(request.scopes(), vec!["openid", "profile", "email"]);
        assert!(request.is_openid_request());
    }

    #[test]
    fn extension_parameters_survive() {
        let mut request = Request::new();
        request.set("x_vendor_hint", "custom");
        assert_eq!(request.get_string("x_vendor_hint"), Some("custom"));
    }

    #[test]
    fn response_serializes_flat() {
        let mut response = Response::new();
        response.set(params::ACCESS_TOKEN, "at");
        response.set(params::EXPIRES_IN, 3600);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["access_token"], "at");
        assert_eq!(json["expires_in"], 3600);
    }

    #[test]
    fn error_response_shape() {
        let response = Response::error("invalid_grant", Some("code redeemed".to_string()), None);
        assert!(response.is_error());
        assert_eq!(response.error_code(), Some("invalid_grant"));
        assert_eq!(
            response.get_string(params::ERROR_DESCRIPTION),
            Some("code redeemed")
        );
        assert_eq!(response.get_string(params::ERROR_URI), None);
    }
}
