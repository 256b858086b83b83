//! The subject principal and its typed protocol-claim accessors.

use chrono::{DateTime, Duration, Utc};
use oxid_core::TokenKind;

use crate::claim::Claim;
use crate::identity::Identity;
use crate::names::claims;

/// An ordered set of identities describing one subject.
///
/// The first identity is the primary identity: scalar protocol claims
/// live there, and the typed accessors below create it on demand.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Principal {
    /// The identities, primary first.
    pub identities: Vec<Identity>,
}

impl Principal {
    /// Creates an empty principal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a principal from a single identity.
    #[must_use]
    pub fn from_identity(identity: Identity) -> Self {
        Self {
            identities: vec![identity],
        }
    }

    /// Returns the primary identity, if any.
    #[must_use]
    pub fn primary(&self) -> Option<&Identity> {
        self.identities.first()
    }

    /// Returns the primary identity, creating an anonymous one when the
    /// principal is empty.
    pub fn primary_mut(&mut self) -> &mut Identity {
        if self.identities.is_empty() {
            self.identities.push(Identity::new(""));
        }
        &mut self.identities[0]
    }

    /// Iterates over every claim of every identity.
    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.identities.iter().flat_map(|i| i.claims.iter())
    }

    /// Returns the first claim of the given type across all identities.
    #[must_use]
    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.identities
            .iter()
            .find_map(|i| i.find_first(claim_type))
    }

    /// Returns the value of the first claim of the given type.
    #[must_use]
    pub fn get_claim(&self, claim_type: &str) -> Option<&str> {
        self.find_first(claim_type).map(|c| c.value.as_str())
    }

    /// Returns every value of the given claim type, in order.
    #[must_use]
    pub fn get_claims(&self, claim_type: &str) -> Vec<String> {
        self.claims()
            .filter(|c| c.claim_type == claim_type)
            .map(|c| c.value.clone())
            .collect()
    }

    /// Replaces the given claim type on the primary identity with a
    /// single value.
    pub fn set_claim(&mut self, claim_type: &str, value: impl Into<String>) {
        self.primary_mut().set_claim(claim_type, value);
    }

    /// Removes the given claim type from every identity.
    pub fn remove_claims(&mut self, claim_type: &str) {
        for identity in &mut self.identities {
            identity.remove_claims(claim_type);
        }
    }

    /// Replaces an array-valued claim type with one claim per value on
    /// the primary identity.
    pub fn set_claims<I, S>(&mut self, claim_type: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_claims(claim_type);
        let identity = self.primary_mut();
        for value in values {
            identity.add_claim(Claim::new(claim_type, value));
        }
    }

    // === Typed protocol accessors ===

    /// Returns the subject identifier.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.get_claim(claims::SUBJECT)
    }

    /// Sets the subject identifier.
    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.set_claim(claims::SUBJECT, subject);
    }

    /// Returns the audiences.
    #[must_use]
    pub fn audiences(&self) -> Vec<String> {
        self.get_claims(claims::AUDIENCE)
    }

    /// Sets the audiences.
    pub fn set_audiences<I, S>(&mut self, audiences: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_claims(claims::AUDIENCE, audiences);
    }

    /// Returns the presenters (authorized parties).
    #[must_use]
    pub fn presenters(&self) -> Vec<String> {
        self.get_claims(claims::PRESENTER)
    }

    /// Sets the presenters.
    pub fn set_presenters<I, S>(&mut self, presenters: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_claims(claims::PRESENTER, presenters);
    }

    /// Returns the resources.
    #[must_use]
    pub fn resources(&self) -> Vec<String> {
        self.get_claims(claims::RESOURCE)
    }

    /// Sets the resources.
    pub fn set_resources<I, S>(&mut self, resources: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_claims(claims::RESOURCE, resources);
    }

    /// Returns the granted scopes.
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.get_claims(claims::SCOPE)
    }

    /// Sets the granted scopes.
    pub fn set_scopes<I, S>(&mut self, scopes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_claims(claims::SCOPE, scopes);
    }

    /// Returns whether a scope was granted.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.claims()
            .any(|c| c.claim_type == claims::SCOPE && c.value == scope)
    }

    /// Returns the token entry identifier.
    #[must_use]
    pub fn token_id(&self) -> Option<&str> {
        self.get_claim(claims::TOKEN_ID)
    }

    /// Sets the token entry identifier.
    pub fn set_token_id(&mut self, id: impl Into<String>) {
        self.set_claim(claims::TOKEN_ID, id);
    }

    /// Returns the authorization entry identifier.
    #[must_use]
    pub fn authorization_id(&self) -> Option<&str> {
        self.get_claim(claims::AUTHORIZATION_ID)
    }

    /// Sets the authorization entry identifier.
    pub fn set_authorization_id(&mut self, id: impl Into<String>) {
        self.set_claim(claims::AUTHORIZATION_ID, id);
    }

    /// Returns the device-code entry identifier.
    #[must_use]
    pub fn device_code_id(&self) -> Option<&str> {
        self.get_claim(claims::DEVICE_CODE_ID)
    }

    /// Sets the device-code entry identifier.
    pub fn set_device_code_id(&mut self, id: impl Into<String>) {
        self.set_claim(claims::DEVICE_CODE_ID, id);
    }

    /// Returns the kind of token this principal was serialized into.
    #[must_use]
    pub fn token_kind(&self) -> Option<TokenKind> {
        self.get_claim(claims::TOKEN_KIND)?.parse().ok()
    }

    /// Sets the token kind tag.
    pub fn set_token_kind(&mut self, kind: TokenKind) {
        self.set_claim(claims::TOKEN_KIND, kind.destination());
    }

    /// Returns the OIDC nonce.
    #[must_use]
    pub fn nonce(&self) -> Option<&str> {
        self.get_claim(claims::NONCE)
    }

    /// Sets the OIDC nonce.
    pub fn set_nonce(&mut self, nonce: impl Into<String>) {
        self.set_claim(claims::NONCE, nonce);
    }

    /// Returns the PKCE code challenge.
    #[must_use]
    pub fn code_challenge(&self) -> Option<&str> {
        self.get_claim(claims::CODE_CHALLENGE)
    }

    /// Sets the PKCE code challenge.
    pub fn set_code_challenge(&mut self, challenge: impl Into<String>) {
        self.set_claim(claims::CODE_CHALLENGE, challenge);
    }

    /// Returns the PKCE code challenge method.
    #[must_use]
    pub fn code_challenge_method(&self) -> Option<&str> {
        self.get_claim(claims::CODE_CHALLENGE_METHOD)
    }

    /// Sets the PKCE code challenge method.
    pub fn set_code_challenge_method(&mut self, method: impl Into<String>) {
        self.set_claim(claims::CODE_CHALLENGE_METHOD, method);
    }

    /// Returns the original `redirect_uri`.
    #[must_use]
    pub fn original_redirect_uri(&self) -> Option<&str> {
        self.get_claim(claims::ORIGINAL_REDIRECT_URI)
    }

    /// Sets the original `redirect_uri`.
    pub fn set_original_redirect_uri(&mut self, uri: impl Into<String>) {
        self.set_claim(claims::ORIGINAL_REDIRECT_URI, uri);
    }

    /// Returns the creation instant.
    #[must_use]
    pub fn creation_date(&self) -> Option<DateTime<Utc>> {
        self.get_date(claims::CREATION_DATE)
    }

    /// Sets the creation instant.
    pub fn set_creation_date(&mut self, date: DateTime<Utc>) {
        self.set_claim(claims::CREATION_DATE, date.to_rfc3339());
    }

    /// Returns the expiration instant.
    #[must_use]
    pub fn expiration_date(&self) -> Option<DateTime<Utc>> {
        self.get_date(claims::EXPIRATION_DATE)
    }

    /// Sets the expiration instant.
    pub fn set_expiration_date(&mut self, date: DateTime<Utc>) {
        self.set_claim(claims::EXPIRATION_DATE, date.to_rfc3339());
    }

    /// Returns the lifetime override for a token kind.
    #[must_use]
    pub fn lifetime(&self, kind: TokenKind) -> Option<Duration> {
        let seconds: i64 = self.get_claim(lifetime_claim(kind))?.parse().ok()?;
        Some(Duration::seconds(seconds))
    }

    /// Sets the lifetime override for a token kind.
    pub fn set_lifetime(&mut self, kind: TokenKind, lifetime: Duration) {
        self.set_claim(lifetime_claim(kind), lifetime.num_seconds().to_string());
    }

    /// Creates a filtered copy retaining only the claims whose
    /// destinations admit the given token kind.
    ///
    /// The subject claim is always retained: a token without a subject
    /// is useless regardless of destination configuration.
    #[must_use]
    pub fn clone_for_destination(&self, kind: TokenKind) -> Self {
        let destination = kind.destination();
        let identities = self
            .identities
            .iter()
            .map(|identity| {
                let mut filtered = identity.clone();
                filtered.claims.retain(|claim| {
                    claim.claim_type == claims::SUBJECT || claim.has_destination(destination)
                });
                filtered
            })
            .collect();
        Self { identities }
    }

    fn get_date(&self, claim_type: &str) -> Option<DateTime<Utc>> {
        let raw = self.get_claim(claim_type)?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }
}

const fn lifetime_claim(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::AccessToken => claims::ACCESS_TOKEN_LIFETIME,
        TokenKind::AuthorizationCode => claims::AUTHORIZATION_CODE_LIFETIME,
        TokenKind::DeviceCode => claims::DEVICE_CODE_LIFETIME,
        TokenKind::IdToken => claims::IDENTITY_TOKEN_LIFETIME,
        TokenKind::RefreshToken => claims::REFRESH_TOKEN_LIFETIME,
        TokenKind::UserCode => claims::USER_CODE_LIFETIME,
    }
}
