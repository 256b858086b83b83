//! Revocation endpoint and the authorization cascade.
//!
//! Reference: RFC 7009.

use oxid_model::TokenStatus;
use oxid_storage::TokenStore;

use crate::harness::{TestHarness, TEST_CLIENT_ID};

/// revocation-1: revoking an unknown token still succeeds with an
/// empty body.
#[tokio::test]
async fn unknown_token_revocation_succeeds() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let response = harness
        .revoke(&[("token", "never-issued"), ("client_id", TEST_CLIENT_ID)])
        .await?;
    assert!(!response.is_error());
    assert_eq!(serde_json::to_value(&response)?, serde_json::json!({}));
    Ok(())
}

/// revocation-2: revoking a refresh token revokes every token under
/// the same authorization, and each validates as revoked afterwards.
#[tokio::test]
async fn revocation_cascades_through_the_authorization() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let tokens = harness.obtain_tokens("openid offline_access").await?;
    let access_token = tokens.get_string("access_token").unwrap().to_string();
    let refresh_token = tokens.get_string("refresh_token").unwrap().to_string();

    let response = harness
        .revoke(&[("token", &refresh_token), ("client_id", TEST_CLIENT_ID)])
        .await?;
    assert!(!response.is_error());

    // The refresh token no longer works.
    let refreshed = harness
        .token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh_token),
            ("client_id", TEST_CLIENT_ID),
        ])
        .await?;
    assert_eq!(refreshed.error_code(), Some("invalid_grant"));

    // The sibling access token validates as revoked on its next use.
    let introspected = harness
        .introspect(&[("token", &access_token), ("client_id", TEST_CLIENT_ID)])
        .await?;
    assert_eq!(
        serde_json::to_value(&introspected)?,
        serde_json::json!({ "active": false })
    );
    Ok(())
}

/// revocation-3: a client cannot revoke another client's token, but
/// the endpoint still answers 200.
#[tokio::test]
async fn foreign_tokens_are_not_revoked() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let tokens = harness.obtain_tokens("openid").await?;
    let access_token = tokens.get_string("access_token").unwrap().to_string();

    let claims = harness.decode_access_token(&access_token)?;
    let token_id = claims["jti"].as_str().unwrap().to_string();

    let response = harness
        .revoke(&[
            ("token", &access_token),
            ("client_id", crate::harness::CONFIDENTIAL_CLIENT_ID),
            ("client_secret", crate::harness::CONFIDENTIAL_CLIENT_SECRET),
        ])
        .await?;
    assert!(!response.is_error());

    let entry = harness.token_store.find_by_id(&token_id).await?;
    assert_eq!(entry.unwrap().status, TokenStatus::Valid);
    Ok(())
}
