//! Claims identities.

use crate::claim::Claim;
use crate::names::defaults;

/// A set of claims issued under one authentication type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Authentication type tag (e.g. the scheme that produced this
    /// identity). Empty for unauthenticated identities.
    pub authentication_type: String,
    /// Claim type treated as the identity's name.
    pub name_claim_type: String,
    /// Claim type treated as the identity's roles.
    pub role_claim_type: String,
    /// The claims, in insertion order.
    pub claims: Vec<Claim>,
    /// Opaque bootstrap context carried through serialization.
    pub bootstrap_context: Option<String>,
    /// Delegation actor, when this identity acts on behalf of another.
    pub actor: Option<Box<Identity>>,
}

impl Identity {
    /// Creates an identity with the given authentication type and the
    /// legacy default name/role claim types.
    #[must_use]
    pub fn new(authentication_type: impl Into<String>) -> Self {
        Self {
            authentication_type: authentication_type.into(),
            name_claim_type: defaults::NAME_CLAIM_TYPE.to_string(),
            role_claim_type: defaults::ROLE_CLAIM_TYPE.to_string(),
            claims: Vec::new(),
            bootstrap_context: None,
            actor: None,
        }
    }

    /// Appends a claim.
    pub fn add_claim(&mut self, claim: Claim) {
        self.claims.push(claim);
    }

    /// Builder form of [`Self::add_claim`].
    #[must_use]
    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.add_claim(claim);
        self
    }

    /// Returns the first claim of the given type.
    #[must_use]
    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_type == claim_type)
    }

    /// Returns all claims of the given type, in insertion order.
    pub fn find_all<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a Claim> {
        self.claims.iter().filter(move |c| c.claim_type == claim_type)
    }

    /// Removes every claim of the given type.
    pub fn remove_claims(&mut self, claim_type: &str) {
        self.claims.retain(|c| c.claim_type != claim_type);
    }

    /// Replaces every claim of the given type with a single claim
    /// holding the new value.
    pub fn set_claim(&mut self, claim_type: &str, value: impl Into<String>) {
        self.remove_claims(claim_type);
        self.claims.push(Claim::new(claim_type, value));
    }

    /// Returns whether this identity carries any claims.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_identity_uses_default_claim_types() {
        let identity = Identity::new("bearer");
        assert_eq!(identity.name_claim_type, defaults::NAME_CLAIM_TYPE);
        assert_eq!(identity.role_claim_type, defaults::ROLE_CLAIM_TYPE);
        assert!(identity.is_empty());
    }

    #[test]
    fn set_claim_replaces_duplicates() {
        let mut identity = Identity::new("bearer");
        identity.add_claim(Claim::new("email", "old@example.com"));
        identity.add_claim(Claim::new("email", "older@example.com"));
        identity.set_claim("email", "new@example.com");

        let values: Vec<&str> = identity.find_all("email").map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["new@example.com"]);
    }

    #[test]
    fn find_all_preserves_insertion_order() {
        let mut identity = Identity::new("bearer");
        identity.add_claim(Claim::new("audience", "a1"));
        identity.add_claim(Claim::new("audience", "a2"));
        let values: Vec<&str> = identity
            .find_all("audience")
            .map(|c| c.value.as_str())
            .collect();
        assert_eq!(values, vec!["a1", "a2"]);
    }
}
