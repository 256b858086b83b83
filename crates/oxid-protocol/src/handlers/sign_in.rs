//! Token issuance: the `ProcessSignIn` pipeline.
//!
//! The sign-in context enters with a principal and the token kinds the
//! endpoint wants produced. The handlers attach defaults, create the
//! server-side entries (inactive), serialize each token in its wire
//! form, and finally promote every created entry to valid.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use oxid_claims::names::claims as claim_names;
use oxid_claims::serialization::TokenEnvelope;
use oxid_core::{Error, Result, TokenKind};
use oxid_crypto::random::{generate_reference_id, generate_user_code, normalize_user_code};
use oxid_model::{Authorization, AuthorizationKind, Token};
use oxid_pipeline::{Context, Handler, HandlerDescriptor, HandlerRegistry, ProcessSignIn};
use oxid_storage::{AuthorizationStore, ScopeStore, TokenStore};

use crate::filters::{RequireAuthorizationStorage, RequireTokenStorage};
use crate::jose;
use crate::props::{self, CreatedTokenIds};

/// Registers the sign-in pipeline.
pub fn register(registry: &HandlerRegistry) {
    registry.register(HandlerDescriptor::new(
        "validate_sign_in_demand",
        1000,
        ValidateSignInDemand,
    ));
    registry.register(HandlerDescriptor::new(
        "attach_default_scopes",
        2000,
        AttachDefaultScopes,
    ));
    registry.register(HandlerDescriptor::new(
        "attach_default_presenters",
        3000,
        AttachDefaultPresenters,
    ));
    registry.register(HandlerDescriptor::new(
        "attach_scope_resources",
        3500,
        AttachScopeResources,
    ));
    registry.register(
        HandlerDescriptor::new("attach_authorization_entry", 4000, AttachAuthorizationEntry)
            .with_filter(RequireAuthorizationStorage),
    );
    registry.register(HandlerDescriptor::new(
        "generate_access_token",
        5000,
        GenerateToken::new(TokenKind::AccessToken),
    ));
    registry.register(HandlerDescriptor::new(
        "generate_authorization_code",
        6000,
        GenerateToken::new(TokenKind::AuthorizationCode),
    ));
    registry.register(
        HandlerDescriptor::new(
            "generate_device_code",
            7000,
            GenerateToken::new(TokenKind::DeviceCode),
        )
        .with_filter(RequireTokenStorage),
    );
    registry.register(
        HandlerDescriptor::new(
            "generate_user_code",
            8000,
            GenerateToken::new(TokenKind::UserCode),
        )
        .with_filter(RequireTokenStorage),
    );
    registry.register(HandlerDescriptor::new(
        "generate_refresh_token",
        9000,
        GenerateToken::new(TokenKind::RefreshToken),
    ));
    registry.register(HandlerDescriptor::new(
        "generate_identity_token",
        10000,
        GenerateToken::new(TokenKind::IdToken),
    ));
    registry.register(
        HandlerDescriptor::new("promote_token_entries", 11000, PromoteTokenEntries)
            .with_filter(RequireTokenStorage),
    );
}

/// Rejects sign-ins that cannot possibly produce a token.
struct ValidateSignInDemand;

#[async_trait]
impl Handler<ProcessSignIn> for ValidateSignInDemand {
    async fn handle(&self, ctx: &mut ProcessSignIn) -> Result<()> {
        if ctx.token_kinds.is_empty() {
            return Err(Error::Host(
                "the sign-in operation requests no token kinds".into(),
            ));
        }
        // Device authorization signs in the client alone; every other
        // flow needs a subject.
        if ctx.principal.subject().is_none() && !ctx.produces(TokenKind::DeviceCode) {
            return Err(Error::Host(
                "the sign-in principal carries no subject claim".into(),
            ));
        }
        Ok(())
    }
}

/// Copies the request scopes onto the principal when the caller did not
/// grant an explicit set. Unregistered scopes are dropped.
struct AttachDefaultScopes;

#[async_trait]
impl Handler<ProcessSignIn> for AttachDefaultScopes {
    async fn handle(&self, ctx: &mut ProcessSignIn) -> Result<()> {
        if !ctx.principal.scopes().is_empty() {
            return Ok(());
        }
        let Some(request) = ctx.transaction().request() else {
            return Ok(());
        };
        let options = Arc::clone(ctx.transaction().options());
        let granted: Vec<String> = request
            .scopes()
            .iter()
            .filter(|scope| options.scopes.contains(**scope))
            .map(ToString::to_string)
            .collect();
        if !granted.is_empty() {
            ctx.principal.set_scopes(granted);
        }
        Ok(())
    }
}

/// Defaults the presenters to the requesting client.
struct AttachDefaultPresenters;

#[async_trait]
impl Handler<ProcessSignIn> for AttachDefaultPresenters {
    async fn handle(&self, ctx: &mut ProcessSignIn) -> Result<()> {
        if !ctx.principal.presenters().is_empty() {
            return Ok(());
        }
        let client_id = ctx
            .transaction()
            .request()
            .and_then(|request| request.client_id().map(ToString::to_string));
        if let Some(client_id) = client_id {
            ctx.principal.set_presenters([client_id]);
        }
        Ok(())
    }
}

/// Derives access-token audiences from the resources of the granted
/// scopes, when a scope store is registered.
struct AttachScopeResources;

#[async_trait]
impl Handler<ProcessSignIn> for AttachScopeResources {
    async fn handle(&self, ctx: &mut ProcessSignIn) -> Result<()> {
        if !ctx.principal.audiences().is_empty() {
            return Ok(());
        }
        let Some(store) = ctx.transaction().services().get::<dyn ScopeStore>() else {
            return Ok(());
        };
        let names = ctx.principal.scopes();
        if names.is_empty() {
            return Ok(());
        }
        let scopes = store
            .find_by_names(&names)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        let resources: Vec<String> = scopes
            .into_iter()
            .flat_map(|scope| scope.resources.into_iter())
            .collect();
        if !resources.is_empty() {
            ctx.principal.set_audiences(resources);
        }
        Ok(())
    }
}

/// Creates an ad-hoc authorization entry when the sign-in is not
/// already attached to one.
struct AttachAuthorizationEntry;

#[async_trait]
impl Handler<ProcessSignIn> for AttachAuthorizationEntry {
    async fn handle(&self, ctx: &mut ProcessSignIn) -> Result<()> {
        if ctx.principal.authorization_id().is_some() {
            return Ok(());
        }
        let Some(subject) = ctx.principal.subject().map(ToString::to_string) else {
            return Ok(());
        };
        let Some(client_id) = ctx.principal.presenters().into_iter().next() else {
            return Ok(());
        };
        let store = ctx
            .transaction()
            .services()
            .get::<dyn AuthorizationStore>()
            .ok_or_else(|| {
                Error::Configuration("no authorization store is registered".into())
            })?;

        let kind = if ctx.produces(TokenKind::DeviceCode) {
            AuthorizationKind::Device
        } else {
            AuthorizationKind::AdHoc
        };
        let authorization = Authorization::new(
            subject,
            client_id,
            kind,
            ctx.principal.scopes().into_iter().collect(),
            Utc::now(),
        );
        store
            .create(&authorization)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        ctx.principal.set_authorization_id(authorization.id);
        Ok(())
    }
}

/// Generates one kind of token: assembles the per-token principal,
/// creates the inactive server entry, and serializes the wire form.
struct GenerateToken {
    kind: TokenKind,
}

impl GenerateToken {
    const fn new(kind: TokenKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Handler<ProcessSignIn> for GenerateToken {
    async fn handle(&self, ctx: &mut ProcessSignIn) -> Result<()> {
        if !ctx.produces(self.kind) {
            return Ok(());
        }

        let kind = self.kind;
        let txn = ctx.transaction().clone();
        let options = Arc::clone(txn.options());
        let now = Utc::now();

        // Externally visible tokens are destination-filtered; internal
        // tokens (codes, refresh tokens) keep the full principal so the
        // claims survive until a visible token is minted from them.
        let mut principal = match kind {
            TokenKind::AccessToken | TokenKind::IdToken => {
                ctx.principal.clone_for_destination(kind)
            }
            _ => {
                let mut principal = ctx.principal.clone();
                for claim_type in [
                    claim_names::TOKEN_ID,
                    claim_names::TOKEN_KIND,
                    claim_names::CREATION_DATE,
                    claim_names::EXPIRATION_DATE,
                    claim_names::NONCE,
                    claim_names::CODE_CHALLENGE,
                    claim_names::CODE_CHALLENGE_METHOD,
                    claim_names::ORIGINAL_REDIRECT_URI,
                    claim_names::DEVICE_CODE_ID,
                ] {
                    principal.remove_claims(claim_type);
                }
                principal
            }
        };
        principal.set_token_kind(kind);

        let presenters = ctx.principal.presenters();
        if !presenters.is_empty() {
            principal.set_presenters(presenters.clone());
        }
        if kind != TokenKind::IdToken {
            let scopes = ctx.principal.scopes();
            if !scopes.is_empty() {
                principal.set_scopes(scopes);
            }
        }
        match kind {
            TokenKind::AccessToken => {
                let audiences = ctx.principal.audiences();
                if !audiences.is_empty() {
                    principal.set_audiences(audiences);
                }
            }
            TokenKind::IdToken => {
                // The identity token is addressed to the client.
                if !presenters.is_empty() {
                    principal.set_audiences(presenters.clone());
                }
            }
            _ => {}
        }
        if matches!(
            kind,
            TokenKind::IdToken
                | TokenKind::AuthorizationCode
                | TokenKind::RefreshToken
                | TokenKind::DeviceCode
        ) {
            if let Some(nonce) = ctx.principal.nonce() {
                principal.set_nonce(nonce.to_string());
            }
        }
        if kind == TokenKind::AuthorizationCode {
            if let Some(challenge) = ctx.principal.code_challenge() {
                principal.set_code_challenge(challenge.to_string());
            }
            if let Some(method) = ctx.principal.code_challenge_method() {
                principal.set_code_challenge_method(method.to_string());
            }
            if let Some(uri) = ctx.principal.original_redirect_uri() {
                principal.set_original_redirect_uri(uri.to_string());
            }
        }
        if kind == TokenKind::UserCode {
            if let Some(device_code_id) = ctx.principal.device_code_id() {
                principal.set_device_code_id(device_code_id.to_string());
            }
        }
        if let Some(authorization_id) = ctx.principal.authorization_id() {
            principal.set_authorization_id(authorization_id.to_string());
        }

        let lifetime = ctx
            .principal
            .lifetime(kind)
            .unwrap_or_else(|| options.lifetimes.for_kind(kind));
        principal.set_creation_date(now);
        principal.set_expiration_date(now + lifetime);

        // User codes exist only as server entries looked up by their
        // normalized form; everything else is self-contained.
        let display_code = (kind == TokenKind::UserCode).then(generate_user_code);

        let store = txn.services().get::<dyn TokenStore>();
        let token_id = if options.token_storage.is_enabled() {
            let store = store.clone().ok_or_else(|| {
                Error::Configuration("no token store is registered".into())
            })?;

            let mut entry = Token::new(kind, now);
            entry.subject = principal.subject().map(ToString::to_string);
            entry.client_id = presenters.first().cloned();
            entry.authorization_id = principal.authorization_id().map(ToString::to_string);
            entry.expiration_date = Some(now + lifetime);
            principal.set_token_id(entry.id.clone());

            match kind {
                TokenKind::AccessToken if options.use_reference_access_tokens => {
                    entry.reference_id = Some(generate_reference_id());
                    entry.payload = Some(jose::encode_stored_envelope(&TokenEnvelope::new(
                        jose::SCHEME,
                        principal.clone(),
                    )));
                }
                TokenKind::RefreshToken if options.use_reference_refresh_tokens => {
                    entry.reference_id = Some(generate_reference_id());
                    entry.payload = Some(jose::encode_stored_envelope(&TokenEnvelope::new(
                        jose::SCHEME,
                        principal.clone(),
                    )));
                }
                TokenKind::UserCode => {
                    entry.reference_id =
                        display_code.as_deref().map(normalize_user_code);
                    entry.payload = Some(jose::encode_stored_envelope(&TokenEnvelope::new(
                        jose::SCHEME,
                        principal.clone(),
                    )));
                }
                TokenKind::DeviceCode => {
                    // Rewritten with the user principal at verification.
                    entry.payload = Some(jose::encode_stored_envelope(&TokenEnvelope::new(
                        jose::SCHEME,
                        principal.clone(),
                    )));
                }
                _ => {}
            }

            let reference_id = entry.reference_id.clone();
            let id = entry.id.clone();
            store
                .create(&entry)
                .await
                .map_err(|e| Error::Persistence(e.to_string()))?;

            let created = match txn.property::<CreatedTokenIds>(props::CREATED_TOKENS) {
                Some(created) => created,
                None => {
                    txn.set_property(props::CREATED_TOKENS, CreatedTokenIds::new());
                    txn.require_property::<CreatedTokenIds>(props::CREATED_TOKENS)?
                }
            };
            created.push(id.clone());

            if let Some(reference_id) = reference_id {
                // Reference tokens go out as their opaque handle.
                if matches!(kind, TokenKind::AccessToken | TokenKind::RefreshToken) {
                    ctx.set_token(kind, reference_id);
                    return Ok(());
                }
            }
            id
        } else {
            let id = Uuid::new_v4().to_string();
            principal.set_token_id(id.clone());
            id
        };

        if kind == TokenKind::DeviceCode {
            // Later generators and the device response need the entry id.
            ctx.principal.set_device_code_id(token_id);
        }

        // Reference tokens were already attached above.
        if ctx.token(kind).is_some() {
            return Ok(());
        }

        let wire = match kind {
            TokenKind::AccessToken => {
                let jwt = jose::sign_claims(
                    &options,
                    &jose::principal_to_claims(&principal, &options, kind),
                )?;
                if options.disable_access_token_encryption {
                    jwt
                } else {
                    jose::protect_bytes(&options, now, jwt.as_bytes())?
                }
            }
            TokenKind::IdToken => jose::sign_claims(
                &options,
                &jose::principal_to_claims(&principal, &options, kind),
            )?,
            TokenKind::UserCode => display_code.unwrap_or_default(),
            TokenKind::AuthorizationCode | TokenKind::DeviceCode | TokenKind::RefreshToken => {
                jose::protect_envelope(
                    &options,
                    now,
                    &TokenEnvelope::new(jose::SCHEME, principal.clone()),
                )?
            }
        };
        ctx.set_token(kind, wire);
        Ok(())
    }
}

/// Promotes every entry created by this sign-in from inactive to valid.
struct PromoteTokenEntries;

#[async_trait]
impl Handler<ProcessSignIn> for PromoteTokenEntries {
    async fn handle(&self, ctx: &mut ProcessSignIn) -> Result<()> {
        let Some(created) = ctx
            .transaction()
            .property::<CreatedTokenIds>(props::CREATED_TOKENS)
        else {
            return Ok(());
        };
        let store = ctx
            .transaction()
            .services()
            .get::<dyn TokenStore>()
            .ok_or_else(|| Error::Configuration("no token store is registered".into()))?;

        for id in created.drain() {
            store
                .set_status(&id, oxid_model::TokenStatus::Valid)
                .await
                .map_err(|e| Error::Persistence(e.to_string()))?;
        }
        Ok(())
    }
}
