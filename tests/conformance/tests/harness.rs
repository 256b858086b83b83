//! Shared test harness.
//!
//! Builds a provider over in-memory stores with two registered
//! applications: `c1`, a public client used for the interactive flows,
//! and `c2`, a confidential client used for client credentials and
//! introspection.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::Value;

use oxid_claims::{Claim, Identity, Principal};
use oxid_core::{EndpointType, GrantType, ServerOptions};
use oxid_crypto::{EncryptionCredential, SigningCredential};
use oxid_model::{Application, ClientType};
use oxid_pipeline::{Request, Response};
use oxid_protocol::{jose, props, ServerProvider, ServerProviderBuilder};
use oxid_storage::memory::{
    MemoryApplicationStore, MemoryAuthorizationStore, MemoryScopeStore, MemoryTokenStore,
};
use oxid_storage::ApplicationStore;

pub const ISSUER: &str = "https://as.example.com";
pub const TEST_CLIENT_ID: &str = "c1";
pub const CONFIDENTIAL_CLIENT_ID: &str = "c2";
pub const CONFIDENTIAL_CLIENT_SECRET: &str = "c2-secret";
pub const REDIRECT_URI: &str = "https://c1.example.com/cb";

// PKCE test vector from RFC 7636 Appendix B.
pub const CODE_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const CODE_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

pub struct TestHarness {
    pub provider: ServerProvider,
    pub token_store: Arc<MemoryTokenStore>,
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        Self::with_options(|_| {}).await
    }

    pub async fn with_options(configure: impl FnOnce(&mut ServerOptions)) -> Result<Self> {
        let mut options = ServerOptions::new(ISSUER)
            .enable_grant(GrantType::AuthorizationCode)
            .enable_grant(GrantType::ClientCredentials)
            .enable_grant(GrantType::DeviceCode)
            .enable_grant(GrantType::Implicit)
            .enable_grant(GrantType::RefreshToken)
            .add_signing_credential(SigningCredential::generate_dev()?)
            .add_encryption_credential(EncryptionCredential::generate());
        // Tests poll without real-time delays.
        options.device_polling_interval = chrono::Duration::zero();
        configure(&mut options);

        let application_store = Arc::new(MemoryApplicationStore::new());
        let authorization_store = Arc::new(MemoryAuthorizationStore::new());
        let token_store = Arc::new(MemoryTokenStore::new());
        let scope_store = Arc::new(MemoryScopeStore::new());

        seed_applications(&application_store).await?;

        let provider = ServerProviderBuilder::new(options)
            .with_application_store(application_store)
            .with_authorization_store(authorization_store)
            .with_token_store(Arc::clone(&token_store) as Arc<dyn oxid_storage::TokenStore>)
            .with_scope_store(scope_store)
            .build()?;

        Ok(Self {
            provider,
            token_store,
        })
    }

    /// Sends a request to an endpoint, optionally with an
    /// authenticated user attached the way a host session would.
    pub async fn request(
        &self,
        endpoint: EndpointType,
        params: &[(&str, &str)],
        principal: Option<Principal>,
    ) -> Result<Response> {
        let txn = self.provider.create_transaction();
        txn.set_endpoint(endpoint);
        txn.set_request(Request::from_parameters(params.iter().copied()));
        if let Some(principal) = principal {
            txn.set_property(props::PRINCIPAL, principal);
        }
        self.provider
            .process(&txn)
            .await?
            .ok_or_else(|| anyhow!("the request was not handled"))
    }

    pub async fn authorize(&self, params: &[(&str, &str)]) -> Result<Response> {
        self.request(EndpointType::Authorization, params, Some(user_principal()))
            .await
    }

    pub async fn token(&self, params: &[(&str, &str)]) -> Result<Response> {
        self.request(EndpointType::Token, params, None).await
    }

    pub async fn device(&self, params: &[(&str, &str)]) -> Result<Response> {
        self.request(EndpointType::Device, params, None).await
    }

    pub async fn verify(&self, user_code: &str) -> Result<Response> {
        self.request(
            EndpointType::Verification,
            &[("user_code", user_code)],
            Some(user_principal()),
        )
        .await
    }

    pub async fn introspect(&self, params: &[(&str, &str)]) -> Result<Response> {
        self.request(EndpointType::Introspection, params, None).await
    }

    pub async fn revoke(&self, params: &[(&str, &str)]) -> Result<Response> {
        self.request(EndpointType::Revocation, params, None).await
    }

    pub async fn discovery(&self) -> Result<Response> {
        self.request(EndpointType::Configuration, &[], None).await
    }

    /// Runs the authorization-code flow and returns the code.
    pub async fn obtain_code(&self, scope: &str) -> Result<String> {
        let response = self
            .authorize(&[
                ("response_type", "code"),
                ("client_id", TEST_CLIENT_ID),
                ("redirect_uri", REDIRECT_URI),
                ("scope", scope),
                ("code_challenge", CODE_CHALLENGE),
                ("code_challenge_method", "S256"),
            ])
            .await?;
        response
            .get_string("code")
            .map(ToString::to_string)
            .ok_or_else(|| anyhow!("no code in authorization response: {response:?}"))
    }

    /// Runs the full code flow and returns the token response.
    pub async fn obtain_tokens(&self, scope: &str) -> Result<Response> {
        let code = self.obtain_code(scope).await?;
        self.token(&[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", CODE_VERIFIER),
            ("client_id", TEST_CLIENT_ID),
        ])
        .await
    }

    /// Verifies a signed JWT (an id_token) against the provider keys.
    pub fn decode_jws(&self, token: &str) -> Result<Value> {
        jose::verify_claims(self.provider.options(), token).map_err(|e| anyhow!("{e}"))
    }

    /// Decrypts and verifies an encrypted access token.
    pub fn decode_access_token(&self, token: &str) -> Result<Value> {
        let options = self.provider.options();
        let bytes = jose::unprotect_bytes(options, token)
            .ok_or_else(|| anyhow!("the access token could not be decrypted"))?;
        let jwt = String::from_utf8(bytes)?;
        jose::verify_claims(options, &jwt).map_err(|e| anyhow!("{e}"))
    }
}

/// The user a host session would attach: `name` goes to both visible
/// token kinds, `email` only to identity tokens.
pub fn user_principal() -> Principal {
    let mut identity = Identity::new("test");
    identity.add_claim(Claim::new("sub", "user-1"));
    identity.add_claim(Claim::new("name", "Bob").with_destinations(["access_token", "id_token"]));
    identity.add_claim(Claim::new("email", "b@x").with_destinations(["id_token"]));
    Principal::from_identity(identity)
}

async fn seed_applications(store: &MemoryApplicationStore) -> Result<()> {
    let public = Application::new(TEST_CLIENT_ID, ClientType::Public)
        .with_display_name("Test Client")
        .add_redirect_uri(REDIRECT_URI)
        .permit_endpoint(EndpointType::Authorization)
        .permit_endpoint(EndpointType::Token)
        .permit_endpoint(EndpointType::Device)
        .permit_endpoint(EndpointType::Verification)
        .permit_endpoint(EndpointType::Introspection)
        .permit_endpoint(EndpointType::Revocation)
        .permit_endpoint(EndpointType::Userinfo)
        .permit_grant(GrantType::AuthorizationCode)
        .permit_grant(GrantType::RefreshToken)
        .permit_grant(GrantType::DeviceCode)
        .permit_grant(GrantType::Implicit)
        .permit_scope("openid")
        .permit_scope("profile")
        .permit_scope("email");
    store.create(&public).await?;

    let confidential = Application::new(CONFIDENTIAL_CLIENT_ID, ClientType::Confidential)
        .with_secret(CONFIDENTIAL_CLIENT_SECRET)
        .permit_endpoint(EndpointType::Token)
        .permit_endpoint(EndpointType::Introspection)
        .permit_endpoint(EndpointType::Revocation)
        .permit_grant(GrantType::ClientCredentials)
        .permit_scope("openid")
        .permit_scope("profile");
    store.create(&confidential).await?;
    Ok(())
}
