//! Configuration resolution.
//!
//! Turns an operator-supplied options seed into the fully-materialized
//! operational configuration. The steps run in a fixed order because
//! later steps observe the effects of earlier ones (degraded-mode forcing
//! must precede the storage-coupling checks; derivation must precede
//! nothing but reads the final grant set). Resolution is idempotent:
//! resolving already-resolved options is a no-op.

use chrono::{DateTime, Utc};
use oxid_crypto::sort_signing_credentials;
use tracing::warn;

use crate::error::{Error, Result};
use crate::options::{ServerOptions, StorageMode};
use crate::types::{scopes, CodeChallengeMethod, GrantType, ResponseMode};

/// Resolves the options in place.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when an options invariant is
/// violated. Configuration errors are fatal at initialization.
pub fn resolve(options: &mut ServerOptions, now: DateTime<Utc>) -> Result<()> {
    apply_degraded_mode(options);
    validate_endpoints(options)?;
    validate_credentials(options, now)?;
    validate_storage_coupling(options)?;
    sort_signing_credentials(&mut options.signing_credentials, now);
    derive_supported_surface(options);
    assign_key_ids(options);
    Ok(())
}

/// Step 1: degraded mode turns off storage and permissions and pins the
/// refresh-token policy to something self-contained tokens can honor.
fn apply_degraded_mode(options: &mut ServerOptions) {
    if !options.degraded_mode {
        return;
    }
    options.token_storage = StorageMode::Disabled;
    options.authorization_storage = StorageMode::Disabled;
    options.ignore_endpoint_permissions = true;
    options.ignore_grant_type_permissions = true;
    options.ignore_scope_permissions = true;
    options.use_reference_access_tokens = false;
    options.use_reference_refresh_tokens = false;
    // Sliding expiration needs a server-side entry to slide; without
    // storage the token must be rotated instead.
    if options.uses_sliding_refresh_expiration() {
        options.use_rolling_refresh_tokens = true;
    }
}

/// Step 2: every enabled grant must have its endpoints registered.
fn validate_endpoints(options: &ServerOptions) -> Result<()> {
    if options.grant_types.is_empty() {
        return Err(Error::Configuration(
            "at least one grant type must be enabled".to_string(),
        ));
    }
    for grant in &options.grant_types {
        for endpoint in grant.required_endpoints() {
            if !options.endpoints.contains(*endpoint) {
                return Err(Error::Configuration(format!(
                    "the {grant} grant requires the {endpoint} endpoint to be registered"
                )));
            }
        }
    }
    Ok(())
}

/// Step 3: credential-set invariants.
fn validate_credentials(options: &ServerOptions, now: DateTime<Utc>) -> Result<()> {
    if !options
        .signing_credentials
        .iter()
        .any(oxid_crypto::SigningCredential::is_asymmetric)
    {
        return Err(Error::Configuration(
            "at least one signing credential must be asymmetric".to_string(),
        ));
    }
    let signing_valid = options.signing_credentials.iter().any(|credential| {
        credential
            .certificate()
            .is_none_or(|cert| cert.is_valid_at(now))
    });
    if !signing_valid {
        return Err(Error::Configuration(
            "no signing credential is currently valid".to_string(),
        ));
    }

    if options.encryption_credentials.is_empty() {
        return Err(Error::Configuration(
            "at least one encryption credential must be registered".to_string(),
        ));
    }
    if !options
        .encryption_credentials
        .iter()
        .any(|credential| credential.is_valid_at(now))
    {
        return Err(Error::Configuration(
            "no encryption credential is currently valid".to_string(),
        ));
    }
    Ok(())
}

/// Step 4 (storage part): without token storage there is nothing to hold
/// reference payloads or sliding-expiration state.
///
/// The other degraded-mode requirement, a custom validation handler per
/// enabled endpoint, involves the handler registry and is enforced when
/// the provider is built.
fn validate_storage_coupling(options: &ServerOptions) -> Result<()> {
    if options.token_storage.is_enabled() {
        return Ok(());
    }
    if options.use_reference_access_tokens || options.use_reference_refresh_tokens {
        return Err(Error::Configuration(
            "reference tokens require token storage".to_string(),
        ));
    }
    if options.uses_sliding_refresh_expiration() && !options.use_rolling_refresh_tokens {
        return Err(Error::Configuration(
            "sliding refresh-token expiration requires token storage unless rolling refresh tokens are enabled"
                .to_string(),
        ));
    }
    Ok(())
}

/// Step 7: derive the supported response types, modes, challenge methods,
/// and scopes from the enabled grants.
fn derive_supported_surface(options: &mut ServerOptions) {
    if options.is_grant_enabled(GrantType::RefreshToken) {
        options.scopes.insert(scopes::OFFLINE_ACCESS.to_string());
    }

    let code = options.is_grant_enabled(GrantType::AuthorizationCode);
    let implicit = options.is_grant_enabled(GrantType::Implicit);

    if code {
        options.response_types.insert("code".to_string());
        options
            .code_challenge_methods
            .insert(CodeChallengeMethod::S256);
    }
    if implicit {
        options.response_types.insert("id_token".to_string());
        options.response_types.insert("id_token token".to_string());
        options.response_types.insert("token".to_string());
    }
    if code && implicit {
        options.response_types.insert("code id_token".to_string());
        options
            .response_types
            .insert("code id_token token".to_string());
        options.response_types.insert("code token".to_string());
    }

    if !options.response_types.is_empty() {
        options.response_modes.insert(ResponseMode::FormPost);
        options.response_modes.insert(ResponseMode::Fragment);
        if options.response_types.contains("code") {
            options.response_modes.insert(ResponseMode::Query);
        }
    }

    if options.response_types.is_empty() && options.endpoints.contains(crate::types::EndpointType::Authorization) {
        warn!("authorization endpoint is registered but no response type is supported");
    }
}

/// Step 8: every credential gets a key identifier.
fn assign_key_ids(options: &mut ServerOptions) {
    for credential in &mut options.signing_credentials {
        credential.ensure_key_id();
    }
    for credential in &mut options.encryption_credentials {
        credential.ensure_key_id();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EndpointType;
    use oxid_crypto::{EncryptionCredential, SigningCredential, SigningAlgorithm};

    fn seeded(grants: &[GrantType]) -> ServerOptions {
        let mut options = ServerOptions::new("https://as.example.com")
            .add_signing_credential(SigningCredential::generate_dev().unwrap())
            .add_encryption_credential(EncryptionCredential::generate());
        for grant in grants {
            options.grant_types.insert(*grant);
        }
        options
    }

    #[test]
    fn resolve_requires_a_grant() {
        let mut options = seeded(&[]);
        let err = resolve(&mut options, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("grant type"));
    }

    #[test]
    fn resolve_requires_grant_endpoints() {
        let mut options = seeded(&[GrantType::DeviceCode]);
        options.endpoints.remove(EndpointType::Verification);
        let err = resolve(&mut options, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("verification"));
    }

    #[test]
    fn resolve_requires_an_asymmetric_signing_credential() {
        let mut options = ServerOptions::new("https://as.example.com")
            .enable_grant(GrantType::ClientCredentials)
            .add_signing_credential(
                SigningCredential::from_symmetric(&[0x42; 32], SigningAlgorithm::Hs256).unwrap(),
            )
            .add_encryption_credential(EncryptionCredential::generate());
        let err = resolve(&mut options, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("asymmetric"));
    }

    #[test]
    fn resolve_requires_a_valid_encryption_credential() {
        let now = Utc::now();
        let mut options = seeded(&[GrantType::ClientCredentials]);
        options.encryption_credentials = vec![EncryptionCredential::generate()
            .with_validity(now - chrono::Duration::days(10), now - chrono::Duration::days(5))];
        let err = resolve(&mut options, now).unwrap_err();
        assert!(err.to_string().contains("encryption"));
    }

    #[test]
    fn degraded_mode_forces_storage_off_and_rolling_refresh() {
        let mut options = seeded(&[GrantType::AuthorizationCode, GrantType::RefreshToken]);
        options.degraded_mode = true;
        options.use_reference_access_tokens = true;
        resolve(&mut options, Utc::now()).unwrap();

        assert!(!options.token_storage.is_enabled());
        assert!(!options.authorization_storage.is_enabled());
        assert!(!options.use_reference_access_tokens);
        assert!(options.use_rolling_refresh_tokens);
        assert!(options.ignore_scope_permissions);
    }

    #[test]
    fn reference_tokens_without_storage_are_rejected() {
        let mut options = seeded(&[GrantType::ClientCredentials]);
        options.token_storage = StorageMode::Disabled;
        options.use_reference_access_tokens = true;
        let err = resolve(&mut options, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("reference tokens"));
    }

    #[test]
    fn sliding_without_storage_requires_rolling() {
        let mut options = seeded(&[GrantType::RefreshToken]);
        options.token_storage = StorageMode::Disabled;
        let err = resolve(&mut options, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("sliding"));

        let mut options = seeded(&[GrantType::RefreshToken]);
        options.token_storage = StorageMode::Disabled;
        options.use_rolling_refresh_tokens = true;
        resolve(&mut options, Utc::now()).unwrap();
    }

    #[test]
    fn derivation_for_code_grant() {
        let mut options = seeded(&[GrantType::AuthorizationCode]);
        resolve(&mut options, Utc::now()).unwrap();

        assert!(options.response_types.contains("code"));
        assert!(options
            .code_challenge_methods
            .contains(&CodeChallengeMethod::S256));
        assert!(options.response_modes.contains(&ResponseMode::Query));
        assert!(options.response_modes.contains(&ResponseMode::Fragment));
        assert!(options.response_modes.contains(&ResponseMode::FormPost));
    }

    #[test]
    fn derivation_for_implicit_only_has_no_query_mode() {
        let mut options = seeded(&[GrantType::Implicit]);
        resolve(&mut options, Utc::now()).unwrap();

        assert!(options.response_types.contains("token"));
        assert!(options.response_types.contains("id_token"));
        assert!(options.response_types.contains("id_token token"));
        assert!(!options.response_types.contains("code"));
        assert!(!options.response_modes.contains(&ResponseMode::Query));
    }

    #[test]
    fn derivation_for_hybrid_combinations() {
        let mut options = seeded(&[GrantType::AuthorizationCode, GrantType::Implicit]);
        resolve(&mut options, Utc::now()).unwrap();

        for combo in [
            "code",
            "code id_token",
            "code id_token token",
            "code token",
            "id_token",
            "id_token token",
            "token",
        ] {
            assert!(options.response_types.contains(combo), "missing {combo}");
        }
    }

    #[test]
    fn refresh_grant_adds_offline_access() {
        let mut options = seeded(&[GrantType::RefreshToken]);
        resolve(&mut options, Utc::now()).unwrap();
        assert!(options.scopes.contains("offline_access"));
    }

    #[test]
    fn key_ids_are_assigned() {
        let mut options = seeded(&[GrantType::ClientCredentials]);
        resolve(&mut options, Utc::now()).unwrap();
        assert!(options.signing_credentials[0].key_id().is_some());
        assert!(options.encryption_credentials[0].key_id().is_some());
    }

    #[test]
    fn resolution_is_idempotent() {
        let now = Utc::now();
        let mut options = seeded(&[
            GrantType::AuthorizationCode,
            GrantType::RefreshToken,
            GrantType::Implicit,
        ]);
        resolve(&mut options, now).unwrap();

        let response_types = options.response_types.clone();
        let response_modes = options.response_modes.clone();
        let scopes = options.scopes.clone();
        let key_id = options.signing_credentials[0].key_id().unwrap().to_string();

        resolve(&mut options, now).unwrap();
        assert_eq!(options.response_types, response_types);
        assert_eq!(options.response_modes, response_modes);
        assert_eq!(options.scopes, scopes);
        assert_eq!(options.signing_credentials[0].key_id().unwrap(), key_id);
    }
}
