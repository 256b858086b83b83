//! Token entries and their status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use oxid_core::TokenKind;

/// Token entry status.
///
/// Entries are created inactive during sign-in, promoted to valid when
/// issuance completes, redeemed on one-time use, and revoked explicitly
/// or by authorization cascade. Transitions are monotonic: revoked and
/// rejected entries never come back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// Created but not yet returned to the caller.
    Inactive,
    /// Live.
    Valid,
    /// Consumed by its one-time use.
    Redeemed,
    /// Revoked explicitly or by cascade.
    Revoked,
    /// Rejected during issuance; never became live.
    Rejected,
}

impl TokenStatus {
    /// Returns whether a transition to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Inactive => matches!(next, Self::Valid | Self::Revoked | Self::Rejected),
            Self::Valid => matches!(next, Self::Redeemed | Self::Revoked | Self::Rejected),
            Self::Redeemed => matches!(next, Self::Revoked),
            Self::Revoked | Self::Rejected => false,
        }
    }
}

/// A server-side token entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Entry identifier; also the `token_id` claim of the issued token.
    pub id: String,
    /// Subject, when the token belongs to a user.
    pub subject: Option<String>,
    /// OAuth `client_id` of the application the token was issued to.
    pub client_id: Option<String>,
    /// Authorization entry this token references, if any.
    pub authorization_id: Option<String>,
    /// Token kind.
    pub kind: TokenKind,
    /// Status.
    pub status: TokenStatus,
    /// Opaque reference handle, for reference tokens.
    pub reference_id: Option<String>,
    /// Full wire payload, stored server-side for reference tokens.
    pub payload: Option<String>,
    /// Creation instant.
    pub creation_date: DateTime<Utc>,
    /// Expiration instant, when bounded.
    pub expiration_date: Option<DateTime<Utc>>,
    /// Instant of one-time-use redemption.
    pub redemption_date: Option<DateTime<Utc>>,
}

impl Token {
    /// Creates an inactive entry.
    #[must_use]
    pub fn new(kind: TokenKind, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            subject: None,
            client_id: None,
            authorization_id: None,
            kind,
            status: TokenStatus::Inactive,
            reference_id: None,
            payload: None,
            creation_date: now,
            expiration_date: None,
            redemption_date: None,
        }
    }

    /// Returns whether the entry has expired at the given instant.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|exp| exp <= now)
    }

    /// Returns whether the entry is live and unexpired.
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == TokenStatus::Valid && !self.is_expired(now)
    }

    /// Applies a status transition.
    ///
    /// Returns `false` and leaves the entry untouched when the
    /// transition would violate monotonicity.
    pub fn transition_to(&mut self, next: TokenStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        if next == TokenStatus::Redeemed {
            self.redemption_date = Some(now);
        }
        self.status = next;
        true
    }
}
