//! Token endpoint: refresh rotation, client credentials, and grant
//! validation.
//!
//! Reference: RFC 6749 Sections 4.4 and 6.

use crate::harness::{
    TestHarness, CONFIDENTIAL_CLIENT_ID, CONFIDENTIAL_CLIENT_SECRET, TEST_CLIENT_ID,
};

/// token-endpoint-1: with rolling refresh tokens, two sequential
/// refreshes yield three distinct refresh tokens, and reusing a rotated
/// token fails and revokes the descendants.
#[tokio::test]
async fn refresh_token_rotation_and_reuse_detection() -> anyhow::Result<()> {
    let harness = TestHarness::with_options(|options| {
        options.use_rolling_refresh_tokens = true;
    })
    .await?;

    let tokens = harness.obtain_tokens("openid offline_access").await?;
    let rt1 = tokens.get_string("refresh_token").expect("no refresh token").to_string();

    let refreshed = harness
        .token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", &rt1),
            ("client_id", TEST_CLIENT_ID),
        ])
        .await?;
    assert!(!refreshed.is_error(), "first refresh failed: {refreshed:?}");
    let rt2 = refreshed.get_string("refresh_token").unwrap().to_string();

    let refreshed = harness
        .token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", &rt2),
            ("client_id", TEST_CLIENT_ID),
        ])
        .await?;
    let rt3 = refreshed.get_string("refresh_token").unwrap().to_string();

    assert_ne!(rt1, rt2);
    assert_ne!(rt2, rt3);
    assert_ne!(rt1, rt3);

    // Reusing the first (already rotated) token is treated as theft.
    let reused = harness
        .token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", &rt1),
            ("client_id", TEST_CLIENT_ID),
        ])
        .await?;
    assert_eq!(reused.error_code(), Some("invalid_grant"));

    // The cascade revoked the live descendant too.
    let descendant = harness
        .token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", &rt3),
            ("client_id", TEST_CLIENT_ID),
        ])
        .await?;
    assert_eq!(descendant.error_code(), Some("invalid_grant"));
    Ok(())
}

/// token-endpoint-2: client credentials grant for a confidential
/// client.
#[tokio::test]
async fn client_credentials_grant() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let response = harness
        .token(&[
            ("grant_type", "client_credentials"),
            ("client_id", CONFIDENTIAL_CLIENT_ID),
            ("client_secret", CONFIDENTIAL_CLIENT_SECRET),
            ("scope", "profile"),
        ])
        .await?;
    assert!(!response.is_error(), "grant failed: {response:?}");
    assert!(response.get_string("access_token").is_some());
    // No user, no identity token, no refresh token.
    assert!(response.get_string("id_token").is_none());
    assert!(response.get_string("refresh_token").is_none());

    let claims = harness.decode_access_token(response.get_string("access_token").unwrap())?;
    assert_eq!(claims["sub"], CONFIDENTIAL_CLIENT_ID);
    assert_eq!(claims["client_id"], CONFIDENTIAL_CLIENT_ID);
    Ok(())
}

/// token-endpoint-3: a wrong client secret is rejected.
#[tokio::test]
async fn wrong_client_secret_is_rejected() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let response = harness
        .token(&[
            ("grant_type", "client_credentials"),
            ("client_id", CONFIDENTIAL_CLIENT_ID),
            ("client_secret", "not-the-secret"),
        ])
        .await?;
    assert_eq!(response.error_code(), Some("invalid_client"));
    Ok(())
}

/// token-endpoint-4: unknown grant types are rejected.
#[tokio::test]
async fn unknown_grant_type_is_rejected() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let response = harness
        .token(&[("grant_type", "urn:example:custom"), ("client_id", TEST_CLIENT_ID)])
        .await?;
    assert_eq!(response.error_code(), Some("unsupported_grant_type"));
    Ok(())
}

/// token-endpoint-5: the password grant requires an operator handler.
#[tokio::test]
async fn password_grant_requires_custom_handler() -> anyhow::Result<()> {
    let harness = TestHarness::with_options(|options| {
        options.grant_types.insert(oxid_core::GrantType::Password);
        options.ignore_grant_type_permissions = true;
    })
    .await?;
    let response = harness
        .token(&[
            ("grant_type", "password"),
            ("client_id", CONFIDENTIAL_CLIENT_ID),
            ("client_secret", CONFIDENTIAL_CLIENT_SECRET),
            ("username", "user-1"),
            ("password", "hunter2"),
        ])
        .await?;
    assert_eq!(response.error_code(), Some("invalid_grant"));
    Ok(())
}

/// token-endpoint-6: a refresh request cannot widen the granted scopes.
#[tokio::test]
async fn refresh_cannot_widen_scopes() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let tokens = harness.obtain_tokens("openid offline_access").await?;
    let refresh_token = tokens.get_string("refresh_token").unwrap().to_string();

    let response = harness
        .token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh_token),
            ("client_id", TEST_CLIENT_ID),
            ("scope", "openid profile offline_access"),
        ])
        .await?;
    assert_eq!(response.error_code(), Some("invalid_scope"));
    Ok(())
}

/// token-endpoint-7: error responses carry only the standardized
/// fields.
#[tokio::test]
async fn error_responses_are_normalized() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let response = harness
        .token(&[
            ("grant_type", "authorization_code"),
            ("code", "garbage"),
            ("redirect_uri", "https://c1.example.com/cb"),
            ("state", "should-not-echo"),
        ])
        .await?;
    assert!(response.is_error());
    assert!(response.get_string("state").is_none());
    for (name, _) in response.iter() {
        assert!(
            matches!(name, "error" | "error_description" | "error_uri"),
            "unexpected field {name}"
        );
    }
    Ok(())
}
