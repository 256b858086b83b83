//! Introspection endpoint.
//!
//! Reference: RFC 7662.

use serde_json::json;

use crate::harness::{
    TestHarness, CONFIDENTIAL_CLIENT_ID, CONFIDENTIAL_CLIENT_SECRET, TEST_CLIENT_ID,
};

/// introspection-1: an unknown token reads as exactly
/// `{"active": false}`.
#[tokio::test]
async fn unknown_token_is_inactive() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let response = harness
        .introspect(&[
            ("token", "not-a-token"),
            ("client_id", CONFIDENTIAL_CLIENT_ID),
            ("client_secret", CONFIDENTIAL_CLIENT_SECRET),
        ])
        .await?;
    assert_eq!(serde_json::to_value(&response)?, json!({ "active": false }));
    Ok(())
}

/// introspection-2: a live access token introspected by its own client
/// reads active with the registered claims.
#[tokio::test]
async fn live_token_is_active_for_its_client() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let tokens = harness.obtain_tokens("openid profile").await?;
    let access_token = tokens.get_string("access_token").unwrap();

    let response = harness
        .introspect(&[("token", access_token), ("client_id", TEST_CLIENT_ID)])
        .await?;
    assert_eq!(response.get("active"), Some(&json!(true)));
    assert_eq!(response.get_string("sub"), Some("user-1"));
    assert_eq!(response.get_string("client_id"), Some(TEST_CLIENT_ID));
    assert_eq!(response.get_string("scope"), Some("openid profile"));
    assert_eq!(response.get_string("token_type"), Some("Bearer"));
    assert!(response.get("exp").is_some());
    assert!(response.get("iat").is_some());
    Ok(())
}

/// introspection-3: a revoked token reads inactive, never an error.
#[tokio::test]
async fn revoked_token_is_inactive() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let tokens = harness
        .obtain_tokens("openid offline_access")
        .await?;
    let access_token = tokens.get_string("access_token").unwrap().to_string();
    let refresh_token = tokens.get_string("refresh_token").unwrap();

    // Revoking the refresh token cascades through the authorization.
    let revoked = harness
        .revoke(&[("token", refresh_token), ("client_id", TEST_CLIENT_ID)])
        .await?;
    assert!(!revoked.is_error());

    let response = harness
        .introspect(&[("token", &access_token), ("client_id", TEST_CLIENT_ID)])
        .await?;
    assert_eq!(serde_json::to_value(&response)?, json!({ "active": false }));
    Ok(())
}

/// introspection-4: a caller that is not a party to the token learns
/// nothing.
#[tokio::test]
async fn foreign_caller_sees_inactive() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let tokens = harness.obtain_tokens("openid").await?;
    let access_token = tokens.get_string("access_token").unwrap();

    let response = harness
        .introspect(&[
            ("token", access_token),
            ("client_id", CONFIDENTIAL_CLIENT_ID),
            ("client_secret", CONFIDENTIAL_CLIENT_SECRET),
        ])
        .await?;
    assert_eq!(serde_json::to_value(&response)?, json!({ "active": false }));
    Ok(())
}

/// introspection-5: client authentication is enforced before anything
/// is disclosed.
#[tokio::test]
async fn unauthenticated_introspection_is_rejected() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let response = harness
        .introspect(&[
            ("token", "whatever"),
            ("client_id", CONFIDENTIAL_CLIENT_ID),
            ("client_secret", "wrong"),
        ])
        .await?;
    assert_eq!(response.error_code(), Some("invalid_client"));
    Ok(())
}
