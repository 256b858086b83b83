//! Token envelope round-trips.

use std::collections::BTreeMap;

use oxid_claims::{read_envelope, write_envelope, Claim, Identity, Principal, TokenEnvelope};

/// envelope-1: a principal with claims and array-valued properties
/// survives the round trip.
#[test]
fn principal_round_trip() {
    let mut identity = Identity::new("test");
    identity.add_claim(Claim::new("name", "Bob"));
    identity.add_claim(Claim::new("email", "b@x"));
    let mut principal = Principal::from_identity(identity);
    principal.set_audiences(["a1", "a2"]);

    let bytes = write_envelope(&TokenEnvelope::new("oxid", principal));
    let decoded = read_envelope(&bytes).unwrap().unwrap();

    assert_eq!(decoded.principal.audiences(), vec!["a1", "a2"]);
    assert_eq!(decoded.principal.get_claim("email"), Some("b@x"));
    assert_eq!(decoded.principal.get_claim("name"), Some("Bob"));
}

/// envelope-2: properties written in property form populate claims on
/// read, symmetrically with claims being stripped on write.
#[test]
fn property_form_populates_claims() {
    let mut envelope = TokenEnvelope::new("oxid", Principal::new());
    envelope.properties = BTreeMap::from([
        ("audiences".to_string(), r#"["a1","a2"]"#.to_string()),
        ("token_id".to_string(), "tok-9".to_string()),
        ("unmapped".to_string(), "kept".to_string()),
    ]);

    let decoded = read_envelope(&write_envelope(&envelope)).unwrap().unwrap();
    assert_eq!(decoded.principal.audiences(), vec!["a1", "a2"]);
    assert_eq!(decoded.principal.token_id(), Some("tok-9"));
    assert_eq!(decoded.properties.get("unmapped").map(String::as_str), Some("kept"));
    assert!(!decoded.properties.contains_key("audiences"));
}

/// envelope-3: an unknown version reads as no principal, not an error.
#[test]
fn unknown_version_reads_as_none() {
    let mut principal = Principal::new();
    principal.set_subject("user-1");
    let mut bytes = write_envelope(&TokenEnvelope::new("oxid", principal));
    bytes[0] = 7;
    assert_eq!(read_envelope(&bytes).unwrap(), None);
}

/// envelope-4: truncation is a parse error.
#[test]
fn truncation_is_an_error() {
    let mut principal = Principal::new();
    principal.set_subject("user-1");
    let bytes = write_envelope(&TokenEnvelope::new("oxid", principal));
    assert!(read_envelope(&bytes[..10]).is_err());
}
