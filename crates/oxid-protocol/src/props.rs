//! Transaction property keys used by the built-in pipelines.

use parking_lot::Mutex;

/// The host-authenticated subject principal
/// (`std::sync::Arc<oxid_claims::Principal>`). Interactive endpoints
/// (authorization, verification) read it; the host or a custom handler
/// stores it after authenticating the user session.
pub const PRINCIPAL: &str = "oxid:principal";

/// The validated application entry (`Arc<oxid_model::Application>`),
/// stored by the client validation handlers.
pub const APPLICATION: &str = "oxid:application";

/// The principal recovered from the presented grant
/// (`Arc<oxid_claims::Principal>`), stored by the grant validation
/// handlers and consumed by the token endpoint's handle phase.
pub const GRANT_PRINCIPAL: &str = "oxid:grant_principal";

/// The server-side token entry resolved during authentication
/// (`Arc<oxid_model::Token>`).
pub const TOKEN_ENTRY: &str = "oxid:token_entry";

/// Identifiers of token entries created by the current sign-in
/// (`Arc<CreatedTokenIds>`), promoted to valid when issuance completes.
pub const CREATED_TOKENS: &str = "oxid:created_tokens";

/// The redirect target the host should send the response to
/// (`Arc<String>`), attached by the apply phase of redirect-based
/// endpoints.
pub const RESPONSE_REDIRECT_URI: &str = "oxid:response_redirect_uri";

/// The response mode the host should use (`Arc<String>`, one of
/// `query`, `fragment`, `form_post`).
pub const RESPONSE_MODE: &str = "oxid:response_mode";

/// Token entry identifiers accumulated during one sign-in.
#[derive(Debug, Default)]
pub struct CreatedTokenIds {
    ids: Mutex<Vec<String>>,
}

impl CreatedTokenIds {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a created entry.
    pub fn push(&self, id: String) {
        self.ids.lock().push(id);
    }

    /// Drains the recorded entries.
    #[must_use]
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.ids.lock())
    }
}
