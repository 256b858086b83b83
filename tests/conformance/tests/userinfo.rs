//! UserInfo endpoint.
//!
//! Reference: OpenID Connect Core 1.0 Section 5.3.

use oxid_core::EndpointType;

use crate::harness::TestHarness;

/// userinfo-1: a valid bearer token returns the subject and identity
/// claims.
#[tokio::test]
async fn userinfo_returns_identity_claims() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let tokens = harness.obtain_tokens("openid profile").await?;
    let access_token = tokens.get_string("access_token").unwrap();

    let response = harness
        .request(
            EndpointType::Userinfo,
            &[("access_token", access_token)],
            None,
        )
        .await?;
    assert!(!response.is_error(), "userinfo failed: {response:?}");
    assert_eq!(response.get_string("sub"), Some("user-1"));
    assert_eq!(response.get_string("name"), Some("Bob"));
    Ok(())
}

/// userinfo-2: a garbage token is rejected with invalid_token.
#[tokio::test]
async fn userinfo_rejects_invalid_tokens() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let response = harness
        .request(
            EndpointType::Userinfo,
            &[("access_token", "garbage")],
            None,
        )
        .await?;
    assert_eq!(response.error_code(), Some("invalid_token"));
    Ok(())
}

/// userinfo-3: a refresh token cannot be presented as a bearer token.
#[tokio::test]
async fn userinfo_rejects_wrong_token_kind() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let tokens = harness.obtain_tokens("openid offline_access").await?;
    let refresh_token = tokens.get_string("refresh_token").unwrap();

    let response = harness
        .request(
            EndpointType::Userinfo,
            &[("access_token", refresh_token)],
            None,
        )
        .await?;
    assert_eq!(response.error_code(), Some("invalid_token"));
    Ok(())
}
