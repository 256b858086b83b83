//! Authorization-code flow with PKCE.
//!
//! Reference: RFC 6749 Section 4.1, RFC 7636.

use crate::harness::{
    TestHarness, CODE_CHALLENGE, CODE_VERIFIER, REDIRECT_URI, TEST_CLIENT_ID,
};

/// basic-op-1: the code flow issues a code, then exchanges it for an
/// access token and an id_token.
#[tokio::test]
async fn authorization_code_flow_with_pkce() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;

    let response = harness
        .authorize(&[
            ("response_type", "code"),
            ("client_id", TEST_CLIENT_ID),
            ("redirect_uri", REDIRECT_URI),
            ("scope", "openid profile"),
            ("code_challenge", CODE_CHALLENGE),
            ("code_challenge_method", "S256"),
        ])
        .await?;
    assert!(!response.is_error(), "authorize failed: {response:?}");
    let code = response.get_string("code").expect("missing code").to_string();

    let tokens = harness
        .token(&[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", CODE_VERIFIER),
        ])
        .await?;
    assert!(!tokens.is_error(), "token exchange failed: {tokens:?}");
    assert!(tokens.get_string("access_token").is_some());
    assert_eq!(tokens.get_string("token_type"), Some("Bearer"));
    assert_eq!(tokens.get("expires_in").and_then(|v| v.as_i64()), Some(3600));
    assert!(tokens.get_string("id_token").is_some());
    assert_eq!(tokens.get_string("scope"), Some("openid profile"));

    Ok(())
}

/// basic-op-2: a code is one-time; the second exchange fails with
/// invalid_grant.
#[tokio::test]
async fn authorization_code_is_single_use() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let code = harness.obtain_code("openid profile").await?;

    let params = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", REDIRECT_URI),
        ("code_verifier", CODE_VERIFIER),
    ];
    let first = harness.token(&params).await?;
    assert!(!first.is_error());

    let second = harness.token(&params).await?;
    assert_eq!(second.error_code(), Some("invalid_grant"));
    Ok(())
}

/// basic-op-3: a wrong PKCE verifier is rejected.
#[tokio::test]
async fn wrong_code_verifier_is_rejected() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let code = harness.obtain_code("openid").await?;

    let response = harness
        .token(&[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", "wrong-wrong-wrong-wrong-wrong-wrong-wrong-wr"),
        ])
        .await?;
    assert_eq!(response.error_code(), Some("invalid_grant"));
    Ok(())
}

/// basic-op-4: the redirect_uri presented at the token endpoint must
/// match the one from the authorization request.
#[tokio::test]
async fn mismatched_redirect_uri_is_rejected() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let code = harness.obtain_code("openid").await?;

    let response = harness
        .token(&[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "https://evil.example.com/cb"),
            ("code_verifier", CODE_VERIFIER),
        ])
        .await?;
    assert_eq!(response.error_code(), Some("invalid_grant"));
    Ok(())
}

/// basic-op-5: an unregistered redirect_uri never reaches issuance.
#[tokio::test]
async fn unregistered_redirect_uri_is_rejected() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let response = harness
        .authorize(&[
            ("response_type", "code"),
            ("client_id", TEST_CLIENT_ID),
            ("redirect_uri", "https://evil.example.com/cb"),
            ("scope", "openid"),
            ("code_challenge", CODE_CHALLENGE),
            ("code_challenge_method", "S256"),
        ])
        .await?;
    assert_eq!(response.error_code(), Some("invalid_request"));
    Ok(())
}

/// basic-op-6: public clients must send a PKCE challenge.
#[tokio::test]
async fn public_client_requires_pkce() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let response = harness
        .authorize(&[
            ("response_type", "code"),
            ("client_id", TEST_CLIENT_ID),
            ("redirect_uri", REDIRECT_URI),
            ("scope", "openid"),
        ])
        .await?;
    assert_eq!(response.error_code(), Some("invalid_request"));
    Ok(())
}

/// basic-op-7: claims follow their destinations; `email` is confined
/// to the id_token.
#[tokio::test]
async fn claim_destinations_are_honored() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let tokens = harness.obtain_tokens("openid profile email").await?;

    let id_claims = harness.decode_jws(tokens.get_string("id_token").unwrap())?;
    assert_eq!(id_claims["name"], "Bob");
    assert_eq!(id_claims["email"], "b@x");
    assert_eq!(id_claims["sub"], "user-1");

    let access_claims =
        harness.decode_access_token(tokens.get_string("access_token").unwrap())?;
    assert_eq!(access_claims["name"], "Bob");
    assert!(
        access_claims.get("email").is_none(),
        "email must not leak into the access token"
    );
    Ok(())
}

/// basic-op-8: the state parameter is echoed on success and error
/// redirects.
#[tokio::test]
async fn state_is_echoed() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let response = harness
        .authorize(&[
            ("response_type", "code"),
            ("client_id", TEST_CLIENT_ID),
            ("redirect_uri", REDIRECT_URI),
            ("scope", "openid"),
            ("code_challenge", CODE_CHALLENGE),
            ("code_challenge_method", "S256"),
            ("state", "af0ifjsldkj"),
        ])
        .await?;
    assert_eq!(response.get_string("state"), Some("af0ifjsldkj"));
    Ok(())
}
