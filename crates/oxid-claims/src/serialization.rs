//! The versioned binary token envelope.
//!
//! The envelope carries a principal plus a side table of authentication
//! properties, in the exact byte layout used by earlier server
//! generations so existing tokens remain readable:
//!
//! ```text
//! [i32 version=5][string scheme][i32 identity_count]{identity}*[properties]
//! identity   = [string auth_type][defaulted name_claim_type]
//!              [defaulted role_claim_type][i32 claim_count]{claim}*
//!              [bool has_bootstrap][string?][bool has_actor][identity?]
//! claim      = [defaulted type][string value][defaulted value_type]
//!              [defaulted issuer][defaulted original_issuer]
//!              [i32 property_count]{string key, string value}*
//! properties = [i32 version=5][i32 count]{string key, string value}*
//! ```
//!
//! Integers are little-endian; strings are UTF-8 with a 7-bit varint
//! byte-length prefix. A `defaulted` string equal to its default is
//! written as the one-character sentinel `"\0"`.
//!
//! The serializer additionally maps a fixed set of protocol-private
//! claims to the property side table on write and back to claims on
//! read, which is how earlier envelopes stored them.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::claim::Claim;
use crate::identity::Identity;
use crate::names::{claims, defaults, properties};
use crate::principal::Principal;

/// Envelope format version.
const VERSION: i32 = 5;

/// Default-value sentinel for `defaulted string` fields.
const DEFAULT_SENTINEL: &str = "\0";

/// Maximum actor nesting accepted on read.
const MAX_ACTOR_DEPTH: usize = 32;

/// Claims serialized as JSON arrays in the property side table.
const ARRAY_MAPPINGS: [(&str, &str); 4] = [
    (claims::AUDIENCE, properties::AUDIENCES),
    (claims::PRESENTER, properties::PRESENTERS),
    (claims::RESOURCE, properties::RESOURCES),
    (claims::SCOPE, properties::SCOPES),
];

/// Claims serialized as scalar property values.
const SCALAR_MAPPINGS: [(&str, &str); 16] = [
    (claims::TOKEN_ID, properties::TOKEN_ID),
    (claims::AUTHORIZATION_ID, properties::AUTHORIZATION_ID),
    (claims::DEVICE_CODE_ID, properties::DEVICE_CODE_ID),
    (claims::TOKEN_KIND, properties::TOKEN_KIND),
    (claims::NONCE, properties::NONCE),
    (claims::CODE_CHALLENGE, properties::CODE_CHALLENGE),
    (claims::CODE_CHALLENGE_METHOD, properties::CODE_CHALLENGE_METHOD),
    (claims::ORIGINAL_REDIRECT_URI, properties::ORIGINAL_REDIRECT_URI),
    (claims::CREATION_DATE, properties::CREATION_DATE),
    (claims::EXPIRATION_DATE, properties::EXPIRATION_DATE),
    (claims::ACCESS_TOKEN_LIFETIME, properties::ACCESS_TOKEN_LIFETIME),
    (
        claims::AUTHORIZATION_CODE_LIFETIME,
        properties::AUTHORIZATION_CODE_LIFETIME,
    ),
    (claims::DEVICE_CODE_LIFETIME, properties::DEVICE_CODE_LIFETIME),
    (claims::IDENTITY_TOKEN_LIFETIME, properties::IDENTITY_TOKEN_LIFETIME),
    (claims::REFRESH_TOKEN_LIFETIME, properties::REFRESH_TOKEN_LIFETIME),
    (claims::USER_CODE_LIFETIME, properties::USER_CODE_LIFETIME),
];

/// Errors raised while reading a malformed envelope.
///
/// A version mismatch is not an error: it yields a `None` result.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The stream ended before the structure was complete.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    /// A length prefix or count was malformed or negative.
    #[error("malformed length prefix")]
    InvalidLength,

    /// A boolean field held a value other than 0 or 1.
    #[error("malformed boolean")]
    InvalidBool,

    /// Actor identities were nested beyond the supported depth.
    #[error("actor nesting too deep")]
    NestingTooDeep,
}

/// A deserialized token payload: scheme, principal, and the
/// authentication-property side table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenEnvelope {
    /// Authentication scheme tag.
    pub scheme: String,
    /// The subject principal.
    pub principal: Principal,
    /// Properties that do not map to claims.
    pub properties: BTreeMap<String, String>,
}

impl TokenEnvelope {
    /// Creates an envelope around a principal.
    #[must_use]
    pub fn new(scheme: impl Into<String>, principal: Principal) -> Self {
        Self {
            scheme: scheme.into(),
            principal,
            properties: BTreeMap::new(),
        }
    }
}

/// Serializes an envelope.
///
/// Mapped protocol-private claims are copied into the property side
/// table and stripped from the written principal; reading reverses the
/// mapping.
#[must_use]
pub fn write_envelope(envelope: &TokenEnvelope) -> Vec<u8> {
    let mut principal = envelope.principal.clone();
    let mut props = envelope.properties.clone();

    for (claim_type, property) in ARRAY_MAPPINGS {
        let values = principal.get_claims(claim_type);
        if !values.is_empty() {
            let encoded =
                serde_json::to_string(&values).unwrap_or_else(|_| "[]".to_string());
            props.insert(property.to_string(), encoded);
        }
        principal.remove_claims(claim_type);
    }
    for (claim_type, property) in SCALAR_MAPPINGS {
        if let Some(value) = principal.get_claim(claim_type) {
            props.insert(property.to_string(), value.to_string());
        }
        principal.remove_claims(claim_type);
    }

    let mut writer = Writer::new();
    writer.write_i32(VERSION);
    writer.write_string(&envelope.scheme);
    writer.write_i32(i32::try_from(principal.identities.len()).unwrap_or(0));
    for identity in &principal.identities {
        write_identity(&mut writer, identity);
    }
    writer.write_i32(VERSION);
    writer.write_i32(i32::try_from(props.len()).unwrap_or(0));
    for (key, value) in &props {
        writer.write_string(key);
        writer.write_string(value);
    }
    writer.into_bytes()
}

/// Deserializes an envelope.
///
/// Returns `Ok(None)` when the version field does not match: unknown
/// envelope versions read as "no principal", not as an error.
///
/// # Errors
///
/// Returns a [`ParseError`] for truncated or malformed input.
pub fn read_envelope(data: &[u8]) -> Result<Option<TokenEnvelope>, ParseError> {
    let mut reader = Reader::new(data);
    if reader.read_i32()? != VERSION {
        return Ok(None);
    }

    let scheme = reader.read_string()?;
    let identity_count = reader.read_count()?;
    let mut identities = Vec::with_capacity(identity_count.min(16));
    for _ in 0..identity_count {
        identities.push(read_identity(&mut reader, 0)?);
    }
    let mut principal = Principal { identities };

    let mut props = BTreeMap::new();
    // Earlier generations tolerate an unknown property-block version by
    // treating the side table as empty.
    if !reader.is_empty() && reader.read_i32()? == VERSION {
        let count = reader.read_count()?;
        for _ in 0..count {
            let key = reader.read_string()?;
            let value = reader.read_string()?;
            props.insert(key, value);
        }
    }

    for (claim_type, property) in ARRAY_MAPPINGS {
        if let Some(raw) = props.remove(property) {
            if let Ok(values) = serde_json::from_str::<Vec<String>>(&raw) {
                principal.set_claims(claim_type, values);
            }
        }
    }
    for (claim_type, property) in SCALAR_MAPPINGS {
        if let Some(value) = props.remove(property) {
            principal.set_claim(claim_type, value);
        }
    }

    Ok(Some(TokenEnvelope {
        scheme,
        principal,
        properties: props,
    }))
}

fn write_identity(writer: &mut Writer, identity: &Identity) {
    writer.write_string(&identity.authentication_type);
    writer.write_defaulted(&identity.name_claim_type, defaults::NAME_CLAIM_TYPE);
    writer.write_defaulted(&identity.role_claim_type, defaults::ROLE_CLAIM_TYPE);
    writer.write_i32(i32::try_from(identity.claims.len()).unwrap_or(0));
    for claim in &identity.claims {
        write_claim(writer, claim, &identity.name_claim_type);
    }
    match &identity.bootstrap_context {
        Some(context) => {
            writer.write_bool(true);
            writer.write_string(context);
        }
        None => writer.write_bool(false),
    }
    match &identity.actor {
        Some(actor) => {
            writer.write_bool(true);
            write_identity(writer, actor);
        }
        None => writer.write_bool(false),
    }
}

fn read_identity(reader: &mut Reader<'_>, depth: usize) -> Result<Identity, ParseError> {
    if depth > MAX_ACTOR_DEPTH {
        return Err(ParseError::NestingTooDeep);
    }

    let authentication_type = reader.read_string()?;
    let name_claim_type = reader.read_defaulted(defaults::NAME_CLAIM_TYPE)?;
    let role_claim_type = reader.read_defaulted(defaults::ROLE_CLAIM_TYPE)?;

    let claim_count = reader.read_count()?;
    let mut claims = Vec::with_capacity(claim_count.min(64));
    for _ in 0..claim_count {
        claims.push(read_claim(reader, &name_claim_type)?);
    }

    let bootstrap_context = if reader.read_bool()? {
        Some(reader.read_string()?)
    } else {
        None
    };
    let actor = if reader.read_bool()? {
        Some(Box::new(read_identity(reader, depth + 1)?))
    } else {
        None
    };

    Ok(Identity {
        authentication_type,
        name_claim_type,
        role_claim_type,
        claims,
        bootstrap_context,
        actor,
    })
}

fn write_claim(writer: &mut Writer, claim: &Claim, name_claim_type: &str) {
    writer.write_defaulted(&claim.claim_type, name_claim_type);
    writer.write_string(&claim.value);
    writer.write_defaulted(&claim.value_type, defaults::STRING_VALUE_TYPE);
    writer.write_defaulted(&claim.issuer, defaults::LOCAL_AUTHORITY);
    // The original issuer defaults to the issuer itself.
    writer.write_defaulted(&claim.original_issuer, &claim.issuer);
    writer.write_i32(i32::try_from(claim.properties.len()).unwrap_or(0));
    for (key, value) in &claim.properties {
        writer.write_string(key);
        writer.write_string(value);
    }
}

fn read_claim(reader: &mut Reader<'_>, name_claim_type: &str) -> Result<Claim, ParseError> {
    let claim_type = reader.read_defaulted(name_claim_type)?;
    let value = reader.read_string()?;
    let value_type = reader.read_defaulted(defaults::STRING_VALUE_TYPE)?;
    let issuer = reader.read_defaulted(defaults::LOCAL_AUTHORITY)?;
    let original_issuer = reader.read_defaulted(&issuer)?;

    let property_count = reader.read_count()?;
    let mut properties = BTreeMap::new();
    for _ in 0..property_count {
        let key = reader.read_string()?;
        let value = reader.read_string()?;
        properties.insert(key, value);
    }

    Ok(Claim {
        claim_type,
        value,
        value_type,
        issuer,
        original_issuer,
        properties,
    })
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    fn write_string(&mut self, value: &str) {
        let bytes = value.as_bytes();
        let mut len = bytes.len();
        loop {
            let byte = u8::try_from(len & 0x7f).unwrap_or(0);
            len >>= 7;
            if len == 0 {
                self.buf.push(byte);
                break;
            }
            self.buf.push(byte | 0x80);
        }
        self.buf.extend_from_slice(bytes);
    }

    fn write_defaulted(&mut self, value: &str, default: &str) {
        if value == default {
            self.write_string(DEFAULT_SENTINEL);
        } else {
            self.write_string(value);
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        let end = self.pos.checked_add(len).ok_or(ParseError::InvalidLength)?;
        if end > self.data.len() {
            return Err(ParseError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_i32(&mut self) -> Result<i32, ParseError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_count(&mut self) -> Result<usize, ParseError> {
        let value = self.read_i32()?;
        usize::try_from(value).map_err(|_| ParseError::InvalidLength)
    }

    fn read_bool(&mut self) -> Result<bool, ParseError> {
        match self.take(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ParseError::InvalidBool),
        }
    }

    fn read_string(&mut self) -> Result<String, ParseError> {
        let mut len: usize = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.take(1)?[0];
            if shift >= 35 {
                return Err(ParseError::InvalidLength);
            }
            len |= usize::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ParseError::InvalidUtf8)
    }

    fn read_defaulted(&mut self, default: &str) -> Result<String, ParseError> {
        let value = self.read_string()?;
        if value == DEFAULT_SENTINEL {
            Ok(default.to_string())
        } else {
            Ok(value)
        }
    }
}
