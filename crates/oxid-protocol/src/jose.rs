//! Bridging principals, JWTs, and protected envelopes.
//!
//! Two wire forms exist:
//!
//! - **JWS claims tokens** (access and identity tokens): standard JWT
//!   claims derived from the principal, readable by resource servers.
//!   Access tokens are additionally JWE-wrapped unless the operator
//!   disables access-token encryption.
//! - **Protected envelopes** (authorization codes, refresh tokens,
//!   device codes): the binary envelope wrapped in a JWE. These tokens
//!   are only ever consumed by this server, and the envelope preserves
//!   the full principal including claim destinations.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, decode_header, encode, Header, Validation};
use serde_json::{json, Map, Value};

use oxid_claims::names::claims as claim_names;
use oxid_claims::serialization::{read_envelope, write_envelope, TokenEnvelope};
use oxid_claims::Principal;
use oxid_core::{Error, Result, ServerOptions, TokenKind};

/// Private claim carrying the token kind inside JWS claims tokens.
pub const TOKEN_USE: &str = "token_use";

/// Authentication scheme tag written into envelopes.
pub const SCHEME: &str = "oxid";

/// Claim types never copied verbatim into JWS claims tokens; they are
/// either mapped to registered JWT claims or are internal state.
const PRIVATE_CLAIMS: &[&str] = &[
    claim_names::SUBJECT,
    claim_names::AUDIENCE,
    claim_names::PRESENTER,
    claim_names::RESOURCE,
    claim_names::SCOPE,
    claim_names::TOKEN_ID,
    claim_names::AUTHORIZATION_ID,
    claim_names::DEVICE_CODE_ID,
    claim_names::TOKEN_KIND,
    claim_names::NONCE,
    claim_names::CODE_CHALLENGE,
    claim_names::CODE_CHALLENGE_METHOD,
    claim_names::ORIGINAL_REDIRECT_URI,
    claim_names::CREATION_DATE,
    claim_names::EXPIRATION_DATE,
    claim_names::ACCESS_TOKEN_LIFETIME,
    claim_names::AUTHORIZATION_CODE_LIFETIME,
    claim_names::DEVICE_CODE_LIFETIME,
    claim_names::IDENTITY_TOKEN_LIFETIME,
    claim_names::REFRESH_TOKEN_LIFETIME,
    claim_names::USER_CODE_LIFETIME,
];

/// Returns whether a claim type is protocol-private.
#[must_use]
pub fn is_private_claim(claim_type: &str) -> bool {
    PRIVATE_CLAIMS.contains(&claim_type)
}

/// Builds the JWT claims object for a principal.
///
/// The principal is expected to already be destination-filtered for the
/// token kind; public claims are copied as-is, protocol state maps to
/// the registered JWT claims.
#[must_use]
pub fn principal_to_claims(principal: &Principal, options: &ServerOptions, kind: TokenKind) -> Value {
    let mut claims = Map::new();
    claims.insert("iss".to_string(), json!(options.issuer));
    if let Some(subject) = principal.subject() {
        claims.insert("sub".to_string(), json!(subject));
    }
    if let Some(creation) = principal.creation_date() {
        claims.insert("iat".to_string(), json!(creation.timestamp()));
    }
    if let Some(expiration) = principal.expiration_date() {
        claims.insert("exp".to_string(), json!(expiration.timestamp()));
    }
    if let Some(token_id) = principal.token_id() {
        claims.insert("jti".to_string(), json!(token_id));
    }
    if let Some(authorization_id) = principal.authorization_id() {
        claims.insert(
            claim_names::AUTHORIZATION_ID.to_string(),
            json!(authorization_id),
        );
    }
    claims.insert(TOKEN_USE.to_string(), json!(kind.destination()));

    let audiences = principal.audiences();
    match audiences.len() {
        0 => {}
        1 => {
            claims.insert("aud".to_string(), json!(audiences[0]));
        }
        _ => {
            claims.insert("aud".to_string(), json!(audiences));
        }
    }

    if let Some(presenter) = principal.presenters().into_iter().next() {
        let key = if kind == TokenKind::IdToken { "azp" } else { "client_id" };
        claims.insert(key.to_string(), json!(presenter));
    }

    if kind == TokenKind::AccessToken {
        let scopes = principal.scopes();
        if !scopes.is_empty() {
            claims.insert("scope".to_string(), json!(scopes.join(" ")));
        }
    }
    if kind == TokenKind::IdToken {
        if let Some(nonce) = principal.nonce() {
            claims.insert("nonce".to_string(), json!(nonce));
        }
    }

    for claim in principal.claims() {
        if is_private_claim(&claim.claim_type) || claims.contains_key(&claim.claim_type) {
            continue;
        }
        let values = principal.get_claims(&claim.claim_type);
        if values.len() == 1 {
            claims.insert(claim.claim_type.clone(), json!(values[0]));
        } else {
            claims.insert(claim.claim_type.clone(), json!(values));
        }
    }

    Value::Object(claims)
}

/// Reconstructs a principal from verified JWT claims.
#[must_use]
pub fn claims_to_principal(claims: &Value) -> Principal {
    let mut principal = Principal::new();
    if let Some(subject) = claims["sub"].as_str() {
        principal.set_subject(subject);
    }
    match &claims["aud"] {
        Value::String(audience) => principal.set_audiences([audience.clone()]),
        Value::Array(audiences) => principal.set_audiences(
            audiences
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
        ),
        _ => {}
    }
    if let Some(presenter) = claims["client_id"].as_str().or_else(|| claims["azp"].as_str()) {
        principal.set_presenters([presenter.to_string()]);
    }
    if let Some(scope) = claims["scope"].as_str() {
        principal.set_scopes(scope.split_whitespace().map(ToString::to_string).collect::<Vec<_>>());
    }
    if let Some(token_id) = claims["jti"].as_str() {
        principal.set_token_id(token_id);
    }
    if let Some(authorization_id) = claims[claim_names::AUTHORIZATION_ID].as_str() {
        principal.set_authorization_id(authorization_id);
    }
    if let Some(kind) = claims[TOKEN_USE].as_str().and_then(|k| k.parse().ok()) {
        principal.set_token_kind(kind);
    }
    if let Some(nonce) = claims["nonce"].as_str() {
        principal.set_nonce(nonce);
    }
    if let Some(iat) = claims["iat"].as_i64() {
        if let Some(date) = timestamp(iat) {
            principal.set_creation_date(date);
        }
    }
    if let Some(exp) = claims["exp"].as_i64() {
        if let Some(date) = timestamp(exp) {
            principal.set_expiration_date(date);
        }
    }

    if let Some(object) = claims.as_object() {
        for (name, value) in object {
            if is_registered_jwt_claim(name) || is_private_claim(name) {
                continue;
            }
            match value {
                Value::String(s) => principal.set_claim(name, s.clone()),
                Value::Array(values) => principal.set_claims(
                    name,
                    values
                        .iter()
                        .filter_map(Value::as_str)
                        .map(ToString::to_string)
                        .collect::<Vec<_>>(),
                ),
                other => principal.set_claim(name, other.to_string()),
            }
        }
    }
    principal
}

fn is_registered_jwt_claim(name: &str) -> bool {
    matches!(
        name,
        "iss" | "sub" | "aud" | "exp" | "iat" | "nbf" | "jti" | "scope" | "client_id" | "azp"
            | "nonce" | TOKEN_USE
    )
}

fn timestamp(seconds: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0).single()
}

/// Signs a claims object with the preferred signing credential.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when no signing credential is
/// registered and [`Error::Crypto`] when signing fails.
pub fn sign_claims(options: &ServerOptions, claims: &Value) -> Result<String> {
    let credential = options
        .preferred_signing_credential()
        .ok_or_else(|| Error::Configuration("no signing credential is registered".into()))?;

    let mut header = Header::new(credential.algorithm().jwt_algorithm());
    header.kid = credential.key_id().map(ToString::to_string);

    encode(&header, claims, credential.encoding_key()).map_err(|e| Error::Crypto(e.to_string()))
}

/// Verifies a JWS claims token against the registered signing
/// credentials and the configured issuer.
///
/// Expiration is deliberately not validated here: the authentication
/// pipeline applies its own expiration and entry checks so that the
/// failure modes stay distinguishable.
///
/// # Errors
///
/// Returns [`Error::Crypto`] for any signature or format failure.
pub fn verify_claims(options: &ServerOptions, token: &str) -> Result<Value> {
    let header = decode_header(token).map_err(|e| Error::Crypto(e.to_string()))?;

    let candidates: Vec<_> = options
        .signing_credentials
        .iter()
        .filter(|credential| match (&header.kid, credential.key_id()) {
            (Some(kid), Some(candidate)) => kid == candidate,
            _ => true,
        })
        .collect();

    for credential in candidates {
        let mut validation = Validation::new(credential.algorithm().jwt_algorithm());
        validation.set_issuer(&[&options.issuer]);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        if let Ok(data) = decode::<Value>(token, credential.decoding_key(), &validation) {
            return Ok(data.claims);
        }
    }
    Err(Error::Crypto("token signature verification failed".into()))
}

/// Encrypts arbitrary bytes with the active encryption credential.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when no encryption credential is
/// currently valid.
pub fn protect_bytes(options: &ServerOptions, now: DateTime<Utc>, bytes: &[u8]) -> Result<String> {
    let credential = options
        .active_encryption_credential(now)
        .ok_or_else(|| Error::Configuration("no encryption credential is currently valid".into()))?;
    Ok(credential.encrypt(bytes)?)
}

/// Decrypts a JWE with any registered encryption credential.
///
/// Returns `None` when no credential can open the token.
#[must_use]
pub fn unprotect_bytes(options: &ServerOptions, token: &str) -> Option<Vec<u8>> {
    options
        .encryption_credentials
        .iter()
        .find_map(|credential| credential.decrypt(token).ok())
}

/// Serializes and encrypts an envelope.
///
/// # Errors
///
/// Propagates [`protect_bytes`] failures.
pub fn protect_envelope(
    options: &ServerOptions,
    now: DateTime<Utc>,
    envelope: &TokenEnvelope,
) -> Result<String> {
    protect_bytes(options, now, &write_envelope(envelope))
}

/// Decrypts and deserializes an envelope token.
///
/// Returns `None` for tokens that cannot be decrypted or do not carry a
/// current-version envelope.
#[must_use]
pub fn unprotect_envelope(options: &ServerOptions, token: &str) -> Option<TokenEnvelope> {
    let bytes = unprotect_bytes(options, token)?;
    read_envelope(&bytes).ok().flatten()
}

/// Encodes an envelope for server-side storage.
#[must_use]
pub fn encode_stored_envelope(envelope: &TokenEnvelope) -> String {
    URL_SAFE_NO_PAD.encode(write_envelope(envelope))
}

/// Decodes an envelope from server-side storage.
#[must_use]
pub fn decode_stored_envelope(payload: &str) -> Option<TokenEnvelope> {
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    read_envelope(&bytes).ok().flatten()
}
