//! Individual claims and their destinations.

use std::collections::{BTreeMap, BTreeSet};

use crate::names::{defaults, properties};

/// A single subject attribute or protocol-private value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// Claim type.
    pub claim_type: String,
    /// Claim value.
    pub value: String,
    /// Value type tag.
    pub value_type: String,
    /// Issuer of the claim.
    pub issuer: String,
    /// Original issuer, for claims re-issued across trust boundaries.
    pub original_issuer: String,
    /// Additional per-claim properties.
    pub properties: BTreeMap<String, String>,
}

impl Claim {
    /// Creates a claim with the default value type and issuer.
    #[must_use]
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
            value_type: defaults::STRING_VALUE_TYPE.to_string(),
            issuer: defaults::LOCAL_AUTHORITY.to_string(),
            original_issuer: defaults::LOCAL_AUTHORITY.to_string(),
            properties: BTreeMap::new(),
        }
    }

    /// Sets the value type.
    #[must_use]
    pub fn with_value_type(mut self, value_type: impl Into<String>) -> Self {
        self.value_type = value_type.into();
        self
    }

    /// Sets the issuer and original issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();
        self.original_issuer.clone_from(&issuer);
        self.issuer = issuer;
        self
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns the destination set of this claim.
    ///
    /// An absent or unparseable `destinations` property yields the empty
    /// set, meaning the claim is never copied into an issued token.
    #[must_use]
    pub fn destinations(&self) -> BTreeSet<String> {
        let Some(raw) = self.properties.get(properties::DESTINATIONS) else {
            return BTreeSet::new();
        };
        let Ok(values) = serde_json::from_str::<Vec<String>>(raw) else {
            return BTreeSet::new();
        };
        values.into_iter().map(|d| d.to_lowercase()).collect()
    }

    /// Replaces the destination set.
    ///
    /// Destinations are compared case-insensitively: values are
    /// lowercased and deduplicated before being stored as a JSON array.
    /// An empty set erases the property.
    pub fn set_destinations<I, S>(&mut self, destinations: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let canonical: BTreeSet<String> = destinations
            .into_iter()
            .map(|d| d.as_ref().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        if canonical.is_empty() {
            self.properties.remove(properties::DESTINATIONS);
            return;
        }
        let encoded = serde_json::to_string(&canonical.iter().collect::<Vec<_>>())
            .unwrap_or_else(|_| "[]".to_string());
        self.properties
            .insert(properties::DESTINATIONS.to_string(), encoded);
    }

    /// Builder form of [`Self::set_destinations`].
    #[must_use]
    pub fn with_destinations<I, S>(mut self, destinations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.set_destinations(destinations);
        self
    }

    /// Returns whether the claim may appear in tokens tagged with the
    /// given destination. Comparison is case-insensitive.
    #[must_use]
    pub fn has_destination(&self, destination: &str) -> bool {
        self.destinations().contains(&destination.to_lowercase())
    }
}
