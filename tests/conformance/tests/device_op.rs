//! Device authorization flow.
//!
//! Reference: RFC 8628.

use crate::harness::{TestHarness, TEST_CLIENT_ID};

/// device-op-1: the device endpoint mints the code pair; polling is
/// pending until the user verifies, then tokens are issued.
#[tokio::test]
async fn device_flow_end_to_end() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;

    let device = harness
        .device(&[("client_id", TEST_CLIENT_ID), ("scope", "openid")])
        .await?;
    assert!(!device.is_error(), "device request failed: {device:?}");
    let device_code = device.get_string("device_code").unwrap().to_string();
    let user_code = device.get_string("user_code").unwrap().to_string();
    assert_eq!(
        device.get_string("verification_uri"),
        Some("https://as.example.com/device/verify")
    );
    assert_eq!(device.get("expires_in").and_then(|v| v.as_i64()), Some(600));
    assert_eq!(device.get("interval").and_then(|v| v.as_i64()), Some(0));

    // Polling before verification reports pending.
    let poll = [
        ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
        ("device_code", device_code.as_str()),
        ("client_id", TEST_CLIENT_ID),
    ];
    let pending = harness.token(&poll).await?;
    assert_eq!(pending.error_code(), Some("authorization_pending"));

    // The user types the code and approves.
    let verified = harness.verify(&user_code).await?;
    assert!(!verified.is_error(), "verification failed: {verified:?}");
    assert_eq!(verified.get_string("status"), Some("approved"));

    // The next poll returns the token set.
    let tokens = harness.token(&poll).await?;
    assert!(!tokens.is_error(), "device token failed: {tokens:?}");
    assert!(tokens.get_string("access_token").is_some());
    assert!(tokens.get_string("id_token").is_some());

    let claims = harness.decode_access_token(tokens.get_string("access_token").unwrap())?;
    assert_eq!(claims["sub"], "user-1");
    assert_eq!(claims["client_id"], TEST_CLIENT_ID);

    // The device code is one-time.
    let replay = harness.token(&poll).await?;
    assert_eq!(replay.error_code(), Some("invalid_grant"));
    Ok(())
}

/// device-op-2: polling faster than the interval returns slow_down.
#[tokio::test]
async fn polling_too_fast_returns_slow_down() -> anyhow::Result<()> {
    let harness = TestHarness::with_options(|options| {
        options.device_polling_interval = chrono::Duration::seconds(5);
    })
    .await?;

    let device = harness
        .device(&[("client_id", TEST_CLIENT_ID), ("scope", "openid")])
        .await?;
    let device_code = device.get_string("device_code").unwrap().to_string();

    let poll = [
        ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
        ("device_code", device_code.as_str()),
        ("client_id", TEST_CLIENT_ID),
    ];
    let first = harness.token(&poll).await?;
    assert_eq!(first.error_code(), Some("authorization_pending"));

    let second = harness.token(&poll).await?;
    assert_eq!(second.error_code(), Some("slow_down"));
    Ok(())
}

/// device-op-3: user codes are formatted for humans and normalized on
/// input.
#[tokio::test]
async fn user_codes_accept_sloppy_input() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let device = harness
        .device(&[("client_id", TEST_CLIENT_ID), ("scope", "openid")])
        .await?;
    let user_code = device.get_string("user_code").unwrap().to_string();
    assert_eq!(user_code.len(), 9);
    assert_eq!(user_code.as_bytes()[4], b'-');

    // Lowercased, no separator: still accepted.
    let sloppy = user_code.replace('-', "").to_lowercase();
    let verified = harness.verify(&sloppy).await?;
    assert!(!verified.is_error(), "verification failed: {verified:?}");
    Ok(())
}

/// device-op-4: an unknown user code is not verifiable.
#[tokio::test]
async fn unknown_user_code_is_rejected() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let response = harness.verify("ZZZZ-ZZZZ").await?;
    assert_eq!(response.error_code(), Some("invalid_grant"));
    Ok(())
}
