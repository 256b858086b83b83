//! Scope entries.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A registered scope and the resources it maps to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    /// Scope name as it appears in `scope` parameters.
    pub name: String,
    /// Display name shown on consent screens.
    pub display_name: Option<String>,
    /// Description shown on consent screens.
    pub description: Option<String>,
    /// Resource identifiers granted by this scope; copied into the
    /// audiences of issued access tokens.
    pub resources: BTreeSet<String>,
}

impl Scope {
    /// Creates a scope with no resources.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            description: None,
            resources: BTreeSet::new(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a resource.
    #[must_use]
    pub fn add_resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.insert(resource.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_builder() {
        let scope = Scope::new("api:read")
            .with_display_name("Read access")
            .add_resource("https://api.example.com");
        assert_eq!(scope.name, "api:read");
        assert!(scope.resources.contains("https://api.example.com"));
    }
}
