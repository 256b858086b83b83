//! Authorization entries (grants of consent).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authorization status. Revocation is monotonic: a revoked
/// authorization never returns to valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    /// The authorization is active.
    Valid,
    /// The authorization was revoked; every token referencing it is
    /// revoked by cascade.
    Revoked,
}

/// How the authorization came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationKind {
    /// Explicit consent, reusable across requests.
    Permanent,
    /// Created implicitly for a single sign-in.
    AdHoc,
    /// Granted outside the interactive flows (e.g. by an administrator).
    External,
    /// Created by the device-authorization flow.
    Device,
}

/// A grant of consent tying a subject, a client, and a scope set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authorization {
    /// Entry identifier.
    pub id: String,
    /// Subject the consent belongs to.
    pub subject: String,
    /// OAuth `client_id` of the application.
    pub client_id: String,
    /// Status.
    pub status: AuthorizationStatus,
    /// Kind.
    pub kind: AuthorizationKind,
    /// Granted scopes.
    pub scopes: BTreeSet<String>,
    /// Creation instant.
    pub creation_date: DateTime<Utc>,
}

impl Authorization {
    /// Creates a valid authorization.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        client_id: impl Into<String>,
        kind: AuthorizationKind,
        scopes: BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            subject: subject.into(),
            client_id: client_id.into(),
            status: AuthorizationStatus::Valid,
            kind,
            scopes,
            creation_date: now,
        }
    }

    /// Returns whether the authorization is valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status == AuthorizationStatus::Valid
    }

    /// Returns whether the authorization covers every requested scope.
    #[must_use]
    pub fn covers_scopes<'a, I>(&self, requested: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        requested.into_iter().all(|s| self.scopes.contains(s))
    }
}
