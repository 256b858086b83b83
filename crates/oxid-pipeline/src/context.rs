//! The context hierarchy.
//!
//! Every dispatchable unit of work is a context: a typed envelope over
//! the transaction. Endpoint phases are generic over an endpoint marker
//! so each `(phase, endpoint)` pair is a distinct context type with its
//! own handler chain; the cross-cutting process contexts (sign-in,
//! sign-out, challenge, authentication, error) are standalone types.

use std::marker::PhantomData;

use oxid_claims::Principal;
use oxid_core::{EndpointType, TokenKind};

use crate::transaction::Transaction;

/// A protocol rejection: the standard error triple carried by a
/// short-circuited context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Standard OAuth error code.
    pub error: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// URI with more information.
    pub uri: Option<String>,
}

/// Control flags inspected by the dispatcher after every handler.
#[derive(Debug, Default)]
pub struct ContextState {
    handled: bool,
    skipped: bool,
    rejection: Option<Rejection>,
}

impl ContextState {
    /// Returns the rejection, if the context was rejected.
    #[must_use]
    pub fn rejection(&self) -> Option<&Rejection> {
        self.rejection.as_ref()
    }
}

/// A dispatchable context.
pub trait Context: Send + 'static {
    /// Returns the transaction this context wraps.
    fn transaction(&self) -> &Transaction;

    /// Returns the control flags.
    fn state(&self) -> &ContextState;

    /// Returns the control flags mutably.
    fn state_mut(&mut self) -> &mut ContextState;

    /// Marks the request as fully handled: the pipeline stops and the
    /// caller treats the stored response as final.
    fn mark_handled(&mut self) {
        self.state_mut().handled = true;
    }

    /// Returns whether the request was marked handled.
    fn is_handled(&self) -> bool {
        self.state().handled
    }

    /// Marks the request as not ours: the pipeline stops and the caller
    /// lets the host continue processing the request.
    fn skip(&mut self) {
        self.state_mut().skipped = true;
    }

    /// Returns whether the request was skipped.
    fn is_skipped(&self) -> bool {
        self.state().skipped
    }

    /// Rejects the request with a protocol error.
    fn reject(
        &mut self,
        error: impl Into<String>,
        description: impl Into<String>,
    ) where
        Self: Sized,
    {
        self.state_mut().rejection = Some(Rejection {
            error: error.into(),
            description: Some(description.into()),
            uri: None,
        });
    }

    /// Rejects the request with a full error triple.
    fn reject_with(&mut self, rejection: Rejection) {
        self.state_mut().rejection = Some(rejection);
    }

    /// Returns whether the request was rejected.
    fn is_rejected(&self) -> bool {
        self.state().rejection.is_some()
    }
}

/// Marker trait tying a phase context to an endpoint.
pub trait EndpointMarker: Send + Sync + 'static {
    /// The endpoint this marker stands for.
    const TYPE: EndpointType;
}

/// Endpoint marker types.
pub mod endpoints {
    use super::EndpointMarker;
    use oxid_core::EndpointType;

    macro_rules! marker {
        ($(#[$doc:meta])* $name:ident => $variant:ident) => {
            $(#[$doc])*
            #[derive(Debug, Clone, Copy)]
            pub struct $name;

            impl EndpointMarker for $name {
                const TYPE: EndpointType = EndpointType::$variant;
            }
        };
    }

    marker!(
        /// Authorization endpoint.
        Authorization => Authorization
    );
    marker!(
        /// Token endpoint.
        Token => Token
    );
    marker!(
        /// Device authorization endpoint.
        Device => Device
    );
    marker!(
        /// User-code verification endpoint.
        Verification => Verification
    );
    marker!(
        /// Introspection endpoint.
        Introspection => Introspection
    );
    marker!(
        /// Revocation endpoint.
        Revocation => Revocation
    );
    marker!(
        /// UserInfo endpoint.
        Userinfo => Userinfo
    );
    marker!(
        /// Discovery document endpoint.
        Configuration => Configuration
    );
    marker!(
        /// JSON Web Key Set endpoint.
        Cryptography => Cryptography
    );
    marker!(
        /// RP-initiated logout endpoint.
        Logout => Logout
    );
}

macro_rules! impl_context {
    ($type:ty) => {
        impl<E: EndpointMarker> Context for $type {
            fn transaction(&self) -> &Transaction {
                &self.transaction
            }
            fn state(&self) -> &ContextState {
                &self.state
            }
            fn state_mut(&mut self) -> &mut ContextState {
                &mut self.state
            }
        }
    };
    (plain $type:ty) => {
        impl Context for $type {
            fn transaction(&self) -> &Transaction {
                &self.transaction
            }
            fn state(&self) -> &ContextState {
                &self.state
            }
            fn state_mut(&mut self) -> &mut ContextState {
                &mut self.state
            }
        }
    };
}

/// Extract phase: parse the wire parameters into a [`crate::Request`]
/// stored on the transaction.
pub struct ExtractRequest<E: EndpointMarker> {
    transaction: Transaction,
    state: ContextState,
    _endpoint: PhantomData<E>,
}

impl<E: EndpointMarker> ExtractRequest<E> {
    /// Creates the context.
    #[must_use]
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: ContextState::default(),
            _endpoint: PhantomData,
        }
    }
}

impl_context!(ExtractRequest<E>);

/// Validate phase: per-rule handlers each rejecting on one specific
/// failure.
pub struct ValidateRequest<E: EndpointMarker> {
    transaction: Transaction,
    state: ContextState,
    _endpoint: PhantomData<E>,
}

impl<E: EndpointMarker> ValidateRequest<E> {
    /// Creates the context.
    #[must_use]
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: ContextState::default(),
            _endpoint: PhantomData,
        }
    }
}

impl_context!(ValidateRequest<E>);

/// Handle phase: produce a principal or a finished response.
pub struct HandleRequest<E: EndpointMarker> {
    transaction: Transaction,
    state: ContextState,
    /// The principal produced by the handler chain, when the endpoint
    /// signs a subject in.
    pub principal: Option<Principal>,
    _endpoint: PhantomData<E>,
}

impl<E: EndpointMarker> HandleRequest<E> {
    /// Creates the context.
    #[must_use]
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: ContextState::default(),
            principal: None,
            _endpoint: PhantomData,
        }
    }
}

impl_context!(HandleRequest<E>);

/// Apply phase: finalize the response record for the host to emit.
pub struct ApplyResponse<E: EndpointMarker> {
    transaction: Transaction,
    state: ContextState,
    _endpoint: PhantomData<E>,
}

impl<E: EndpointMarker> ApplyResponse<E> {
    /// Creates the context.
    #[must_use]
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: ContextState::default(),
            _endpoint: PhantomData,
        }
    }
}

impl_context!(ApplyResponse<E>);

/// Top-level per-request context dispatched by the host adapter.
pub struct ProcessRequest {
    transaction: Transaction,
    state: ContextState,
}

impl ProcessRequest {
    /// Creates the context.
    #[must_use]
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: ContextState::default(),
        }
    }
}

impl_context!(plain ProcessRequest);

/// Cross-cutting sign-in: turn a principal into issued tokens.
pub struct ProcessSignIn {
    transaction: Transaction,
    state: ContextState,
    /// The principal being signed in.
    pub principal: Principal,
    /// Token kinds the sign-in should produce. Issuance handlers skip
    /// kinds not listed here.
    pub token_kinds: Vec<TokenKind>,
    /// Generated access token.
    pub access_token: Option<String>,
    /// Generated identity token.
    pub identity_token: Option<String>,
    /// Generated refresh token.
    pub refresh_token: Option<String>,
    /// Generated authorization code.
    pub authorization_code: Option<String>,
    /// Generated device code.
    pub device_code: Option<String>,
    /// Generated user code.
    pub user_code: Option<String>,
}

impl ProcessSignIn {
    /// Creates the context.
    #[must_use]
    pub fn new(transaction: Transaction, principal: Principal, token_kinds: Vec<TokenKind>) -> Self {
        Self {
            transaction,
            state: ContextState::default(),
            principal,
            token_kinds,
            access_token: None,
            identity_token: None,
            refresh_token: None,
            authorization_code: None,
            device_code: None,
            user_code: None,
        }
    }

    /// Returns whether the sign-in should produce the given token kind.
    #[must_use]
    pub fn produces(&self, kind: TokenKind) -> bool {
        self.token_kinds.contains(&kind)
    }

    /// Returns the generated token of the given kind, if any.
    #[must_use]
    pub fn token(&self, kind: TokenKind) -> Option<&str> {
        match kind {
            TokenKind::AccessToken => self.access_token.as_deref(),
            TokenKind::IdToken => self.identity_token.as_deref(),
            TokenKind::RefreshToken => self.refresh_token.as_deref(),
            TokenKind::AuthorizationCode => self.authorization_code.as_deref(),
            TokenKind::DeviceCode => self.device_code.as_deref(),
            TokenKind::UserCode => self.user_code.as_deref(),
        }
    }

    /// Stores a generated token.
    pub fn set_token(&mut self, kind: TokenKind, token: String) {
        let slot = match kind {
            TokenKind::AccessToken => &mut self.access_token,
            TokenKind::IdToken => &mut self.identity_token,
            TokenKind::RefreshToken => &mut self.refresh_token,
            TokenKind::AuthorizationCode => &mut self.authorization_code,
            TokenKind::DeviceCode => &mut self.device_code,
            TokenKind::UserCode => &mut self.user_code,
        };
        *slot = Some(token);
    }
}

impl_context!(plain ProcessSignIn);

/// Cross-cutting sign-out: validate and produce the logout redirect.
pub struct ProcessSignOut {
    transaction: Transaction,
    state: ContextState,
}

impl ProcessSignOut {
    /// Creates the context.
    #[must_use]
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: ContextState::default(),
        }
    }
}

impl_context!(plain ProcessSignOut);

/// Cross-cutting challenge: the endpoint needs user authentication the
/// request did not carry.
pub struct ProcessChallenge {
    transaction: Transaction,
    state: ContextState,
}

impl ProcessChallenge {
    /// Creates the context.
    #[must_use]
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: ContextState::default(),
        }
    }
}

impl_context!(plain ProcessChallenge);

/// Cross-cutting authentication: resolve and validate a presented
/// token, producing its principal.
pub struct ProcessAuthentication {
    transaction: Transaction,
    state: ContextState,
    /// The wire token to authenticate.
    pub token: Option<String>,
    /// Token kinds acceptable in this position.
    pub accepted_kinds: Vec<TokenKind>,
    /// The validated principal, set by the validation handlers.
    pub principal: Option<Principal>,
    /// Set alongside rejection when the token failed only because it
    /// expired, so callers can map the failure to the flow-specific
    /// error code.
    pub expired: bool,
}

impl ProcessAuthentication {
    /// Creates the context.
    #[must_use]
    pub fn new(
        transaction: Transaction,
        token: Option<String>,
        accepted_kinds: Vec<TokenKind>,
    ) -> Self {
        Self {
            transaction,
            state: ContextState::default(),
            token,
            accepted_kinds,
            principal: None,
            expired: false,
        }
    }
}

impl_context!(plain ProcessAuthentication);

/// Cross-cutting error rendering: turn a rejection into a response.
pub struct ProcessError {
    transaction: Transaction,
    state: ContextState,
    /// The rejection being rendered.
    pub rejection: Rejection,
}

impl ProcessError {
    /// Creates the context.
    #[must_use]
    pub fn new(transaction: Transaction, rejection: Rejection) -> Self {
        Self {
            transaction,
            state: ContextState::default(),
            rejection,
        }
    }
}

impl_context!(plain ProcessError);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceCollection;
    use oxid_core::ServerOptions;
    use std::sync::Arc;

    fn transaction() -> Transaction {
        Transaction::new(
            Arc::new(ServerOptions::new("https://as.example.com")),
            Arc::new(ServiceCollection::new()),
        )
    }

    #[test]
    fn phase_contexts_are_distinct_types() {
        use std::any::TypeId;
        assert_ne!(
            TypeId::of::<ValidateRequest<endpoints::Token>>(),
            TypeId::of::<ValidateRequest<endpoints::Authorization>>()
        );
        assert_ne!(
            TypeId::of::<ExtractRequest<endpoints::Token>>(),
            TypeId::of::<ValidateRequest<endpoints::Token>>()
        );
    }

    #[test]
    fn rejection_carries_the_error_triple() {
        let mut ctx = ValidateRequest::<endpoints::Token>::new(transaction());
        assert!(!ctx.is_rejected());
        ctx.reject("invalid_request", "client_id is missing");
        assert!(ctx.is_rejected());
        let rejection = ctx.state().rejection().unwrap();
        assert_eq!(rejection.error, "invalid_request");
        assert_eq!(rejection.description.as_deref(), Some("client_id is missing"));
    }

    #[test]
    fn handled_and_skipped_are_independent() {
        let mut ctx = ProcessRequest::new(transaction());
        ctx.mark_handled();
        assert!(ctx.is_handled());
        assert!(!ctx.is_skipped());
    }

    #[test]
    fn sign_in_token_slots() {
        let mut ctx = ProcessSignIn::new(
            transaction(),
            Principal::new(),
            vec![TokenKind::AccessToken, TokenKind::IdToken],
        );
        assert!(ctx.produces(TokenKind::AccessToken));
        assert!(!ctx.produces(TokenKind::RefreshToken));

        ctx.set_token(TokenKind::AccessToken, "at".to_string());
        assert_eq!(ctx.token(TokenKind::AccessToken), Some("at"));
        assert_eq!(ctx.token(TokenKind::RefreshToken), None);
    }
}
