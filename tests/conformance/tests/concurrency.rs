//! Concurrency properties of one-time redemption.

use std::sync::Arc;

use crate::harness::{TestHarness, CODE_VERIFIER, REDIRECT_URI};

/// concurrency-1: N concurrent exchanges of the same code produce
/// exactly one token response; the rest fail with invalid_grant.
#[tokio::test]
async fn code_redemption_is_atomic() -> anyhow::Result<()> {
    let harness = Arc::new(TestHarness::new().await?);
    let code = harness.obtain_code("openid").await?;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let harness = Arc::clone(&harness);
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            harness
                .token(&[
                    ("grant_type", "authorization_code"),
                    ("code", &code),
                    ("redirect_uri", REDIRECT_URI),
                    ("code_verifier", CODE_VERIFIER),
                ])
                .await
        }));
    }

    let mut successes = 0;
    let mut invalid_grants = 0;
    for handle in handles {
        let response = handle.await??;
        if response.is_error() {
            assert_eq!(response.error_code(), Some("invalid_grant"));
            invalid_grants += 1;
        } else {
            successes += 1;
        }
    }
    assert_eq!(successes, 1, "exactly one exchange must win");
    assert_eq!(invalid_grants, 15);
    Ok(())
}
