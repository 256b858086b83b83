//! Discovery document and JWKS projections.
//!
//! Reference: OpenID Connect Discovery 1.0, RFC 8414, RFC 7517.

use oxid_core::EndpointType;
use serde_json::Value;

use crate::harness::TestHarness;

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// config-op-1: grant_types_supported lists exactly the enabled
/// grants, sorted.
#[tokio::test]
async fn discovery_lists_enabled_grants() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let document = harness.discovery().await?;

    let grants = string_list(document.get("grant_types_supported").unwrap());
    assert_eq!(
        grants,
        vec![
            "authorization_code",
            "client_credentials",
            "implicit",
            "refresh_token",
            "urn:ietf:params:oauth:grant-type:device_code",
        ]
    );
    Ok(())
}

/// config-op-2: response modes follow the derivation: form_post and
/// fragment whenever any response type is enabled, query only when a
/// code response type exists.
#[tokio::test]
async fn discovery_response_modes_follow_the_derivation() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let document = harness.discovery().await?;
    let modes = string_list(document.get("response_modes_supported").unwrap());
    assert!(modes.contains(&"query".to_string()));
    assert!(modes.contains(&"fragment".to_string()));
    assert!(modes.contains(&"form_post".to_string()));

    // Implicit-only configuration loses the query mode.
    let implicit_only = TestHarness::with_options(|options| {
        options.grant_types.clear();
        options.grant_types.insert(oxid_core::GrantType::Implicit);
    })
    .await?;
    let document = implicit_only.discovery().await?;
    let modes = string_list(document.get("response_modes_supported").unwrap());
    assert!(!modes.contains(&"query".to_string()));
    assert!(modes.contains(&"fragment".to_string()));

    let types = string_list(document.get("response_types_supported").unwrap());
    assert_eq!(types, vec!["id_token", "id_token token", "token"]);
    Ok(())
}

/// config-op-3: endpoints appear as absolute URIs under the issuer.
#[tokio::test]
async fn discovery_endpoints_are_absolute() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let document = harness.discovery().await?;
    assert_eq!(document.get_string("issuer"), Some(crate::harness::ISSUER));
    assert_eq!(
        document.get_string("token_endpoint"),
        Some("https://as.example.com/token")
    );
    assert_eq!(
        document.get_string("jwks_uri"),
        Some("https://as.example.com/.well-known/jwks")
    );
    Ok(())
}

/// config-op-4: the key set publishes the asymmetric signing keys with
/// their derived identifiers, and nothing symmetric.
#[tokio::test]
async fn jwks_projects_the_signing_keys() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let document = harness
        .request(EndpointType::Cryptography, &[], None)
        .await?;
    let keys = document.get("keys").and_then(Value::as_array).cloned().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["kty"], "EC");
    assert_eq!(keys[0]["alg"], "ES256");
    assert!(keys[0]["kid"].is_string());
    assert!(keys[0].get("d").is_none(), "private material must not leak");
    Ok(())
}

/// config-op-5: requests for unregistered paths are not ours.
#[tokio::test]
async fn unknown_endpoint_is_skipped() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let txn = harness.provider.create_transaction();
    harness.provider.assign_endpoint(&txn, "/not-an-endpoint");
    txn.set_request(oxid_pipeline::Request::new());
    let outcome = harness.provider.process(&txn).await?;
    assert!(outcome.is_none());
    Ok(())
}
