//! Register / authenticate / resend orchestration.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::models::{
    AuthEvent, AuthMethod, Census, EventStatus, NewPrincipal, PrincipalStatus,
};
use crate::pipes::{AuthenticatePipe, ExecContext, PipeDeps, Pipeline, RegisterPipe};
use crate::store::{EventStore, PrincipalStore};
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

use super::acl::PermissionService;
use super::codes::CodeService;
use super::error::ServiceError;
use super::ident::Identifier;
use super::notify::{spawn_code_notification, Notifier};
use super::token::TokenCodec;

pub const AUTH_EVENT_OBJECT: &str = "AuthEvent";
pub const VOTE_PERM: &str = "vote";

/// Structured reply exposed to the transport layer: `ok` plus either a
/// payload or a stable error codename with human-readable context.
#[derive(Debug, Serialize)]
pub struct AuthReply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_codename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_context: Option<String>,
}

impl AuthReply {
    pub fn from_result<T: Serialize>(result: Result<T, ServiceError>) -> Self {
        match result {
            Ok(payload) => Self {
                ok: true,
                payload: serde_json::to_value(payload).ok(),
                error_codename: None,
                error_context: None,
            },
            Err(error) => Self {
                ok: false,
                payload: None,
                error_codename: Some(error.codename().to_string()),
                error_context: Some(error.context()),
            },
        }
    }
}

/// Result of a successful registration.
#[derive(Debug, Serialize)]
pub struct RegisterOutcome {
    pub principal_id: i64,
    pub username: String,
    pub status: PrincipalStatus,
    /// Whether a challenge code was issued and dispatched.
    pub code_sent: bool,
    /// Present only for the password method, which needs no code exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

/// Result of a successful authentication.
#[derive(Debug, Serialize)]
pub struct AuthOutcome {
    pub principal_id: i64,
    pub username: String,
    pub auth_token: String,
}

#[derive(Debug, Serialize)]
pub struct PermissionOutcome {
    pub permission_token: String,
}

/// Orchestrates the four caller-facing operations over the configured
/// pipelines, the code manager, the permission store and the token codec.
#[derive(Clone)]
pub struct AuthFlow {
    config: EngineConfig,
    principals: Arc<dyn PrincipalStore>,
    events: Arc<dyn EventStore>,
    codec: TokenCodec,
    perms: PermissionService,
    codes: CodeService,
    notifier: Arc<dyn Notifier>,
    pipe_deps: PipeDeps,
}

impl AuthFlow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        principals: Arc<dyn PrincipalStore>,
        events: Arc<dyn EventStore>,
        codec: TokenCodec,
        perms: PermissionService,
        codes: CodeService,
        notifier: Arc<dyn Notifier>,
        pipe_deps: PipeDeps,
    ) -> Self {
        Self {
            config,
            principals,
            events,
            codec,
            perms,
            codes,
            notifier,
            pipe_deps,
        }
    }

    async fn load_event(&self, event_id: i64) -> Result<AuthEvent, ServiceError> {
        self.events
            .get(event_id)
            .await?
            .ok_or(ServiceError::NotFound("auth event"))
    }

    /// Register a principal into an auth event.
    ///
    /// Admission requires an open census and a started event. The register
    /// pipeline is built (and its step configs validated) before any side
    /// effect; a misconfigured pipeline therefore leaves no trace.
    #[tracing::instrument(skip(self, fields))]
    pub async fn register(
        &self,
        event_id: i64,
        fields: Map<String, Value>,
    ) -> Result<RegisterOutcome, ServiceError> {
        let event = self.load_event(event_id).await?;

        if event.census == Census::Close {
            return Err(ServiceError::RegistrationClosed);
        }
        if event.status != EventStatus::Started {
            return Err(ServiceError::EventNotStarted);
        }

        let pipeline = Pipeline::<RegisterPipe>::build(&event.register_pipeline)?;
        let mut ctx = ExecContext::new(event.clone(), fields);
        pipeline.run(&mut ctx, &self.pipe_deps).await?;

        let identifier =
            Identifier::extract(&event, &ctx.fields, &self.config.phone).ok_or_else(|| {
                ServiceError::FieldValidation(format!(
                    "field {} is required",
                    identifier_field(event.auth_method)
                ))
            })?;

        if identifier
            .resolve(&self.principals, event_id)
            .await?
            .is_some()
        {
            tracing::info!(
                event_id,
                field = identifier.field_name(),
                "registration repeats an existing identifier"
            );
            return Err(ServiceError::DuplicateValue {
                field: identifier.field_name().to_string(),
                value: identifier.value().to_string(),
            });
        }

        let mut metadata = Map::new();
        for descriptor in &event.extra_fields {
            if let Some(value) = ctx.fields.get(&descriptor.name) {
                metadata.insert(descriptor.name.clone(), value.clone());
            }
        }
        for (key, value) in ctx.annotations.iter() {
            metadata.insert(key.clone(), value.clone());
        }

        let mut new = NewPrincipal {
            metadata,
            status: Some(ctx.status),
            event_id: Some(event_id),
            ..Default::default()
        };
        match &identifier {
            Identifier::Email(email) => new.email = Some(email.clone()),
            Identifier::Phone(phone) => new.phone = Some(phone.clone()),
            Identifier::Username(username) => {
                new.username = Some(username.clone());
                let password = ctx.field_str("password").ok_or_else(|| {
                    ServiceError::FieldValidation("field password is required".to_string())
                })?;
                let hash = hash_password(&Password::new(password.to_string()))?;
                new.password_hash = Some(hash.into_string());
            }
        }

        let principal = self.principals.create(new).await?;
        tracing::info!(
            principal_id = principal.id,
            event_id,
            status = principal.status.as_str(),
            "principal registered"
        );

        if principal.status != PrincipalStatus::Active {
            // held for manual review: no code, no token
            return Ok(RegisterOutcome {
                principal_id: principal.id,
                username: principal.username,
                status: principal.status,
                code_sent: false,
                auth_token: None,
            });
        }

        if event.auth_method.uses_codes() {
            let code = self
                .codes
                .issue(principal.id, event_id, self.config.max_codes_for(&event))
                .await?;
            spawn_code_notification(
                Arc::clone(&self.notifier),
                &event,
                principal.clone(),
                code,
            );
            Ok(RegisterOutcome {
                principal_id: principal.id,
                username: principal.username,
                status: principal.status,
                code_sent: true,
                auth_token: None,
            })
        } else {
            let token = self.codec.login_token(&principal.username);
            Ok(RegisterOutcome {
                principal_id: principal.id,
                username: principal.username,
                status: principal.status,
                code_sent: false,
                auth_token: Some(token),
            })
        }
    }

    /// Authenticate against an auth event and mint a login token.
    ///
    /// Allowed regardless of census and status; only the credentials decide.
    /// All credential failures are a uniform `InvalidCredentials` toward the
    /// caller and distinguished only in the server log.
    #[tracing::instrument(skip(self, credentials))]
    pub async fn authenticate(
        &self,
        event_id: i64,
        credentials: Map<String, Value>,
    ) -> Result<AuthOutcome, ServiceError> {
        let event = self.load_event(event_id).await?;

        let pipeline = Pipeline::<AuthenticatePipe>::build(&event.authenticate_pipeline)?;
        let mut ctx = ExecContext::new(event.clone(), credentials);
        pipeline.run(&mut ctx, &self.pipe_deps).await?;

        let Some(identifier) = Identifier::extract(&event, &ctx.fields, &self.config.phone)
        else {
            tracing::info!(event_id, "authentication without identifier");
            return Err(ServiceError::InvalidCredentials);
        };
        let Some(principal) = identifier.resolve(&self.principals, event_id).await? else {
            tracing::info!(event_id, "authentication for unknown principal");
            return Err(ServiceError::InvalidCredentials);
        };
        if !principal.is_active() {
            tracing::info!(
                principal_id = principal.id,
                status = principal.status.as_str(),
                "authentication for non-active principal"
            );
            return Err(ServiceError::InvalidCredentials);
        }

        // fields marked required at authentication must match the stored
        // registration values
        for descriptor in event
            .extra_fields
            .iter()
            .filter(|d| d.required_on_authentication)
        {
            if ctx.fields.get(&descriptor.name) != principal.metadata.get(&descriptor.name) {
                tracing::info!(
                    principal_id = principal.id,
                    field = %descriptor.name,
                    "authentication field mismatch"
                );
                return Err(ServiceError::InvalidCredentials);
            }
        }

        match event.auth_method {
            AuthMethod::Email | AuthMethod::Sms => {
                let Some(code) = ctx.field_str("code") else {
                    tracing::info!(principal_id = principal.id, "authentication without code");
                    return Err(ServiceError::InvalidCredentials);
                };
                if !self
                    .codes
                    .verify(principal.id, event_id, code.trim())
                    .await?
                {
                    return Err(ServiceError::InvalidCredentials);
                }
            }
            AuthMethod::Password => {
                let Some(password) = ctx.field_str("password") else {
                    tracing::info!(principal_id = principal.id, "authentication without password");
                    return Err(ServiceError::InvalidCredentials);
                };
                let Some(hash) = principal.password_hash.clone() else {
                    tracing::warn!(principal_id = principal.id, "principal has no password set");
                    return Err(ServiceError::InvalidCredentials);
                };
                verify_password(
                    &Password::new(password.to_string()),
                    &PasswordHashString::new(hash),
                )
                .map_err(|_| ServiceError::InvalidCredentials)?;
            }
        }

        // idempotent census grant
        if !self
            .perms
            .has_perm(&principal, AUTH_EVENT_OBJECT, VOTE_PERM, event_id)
            .await?
        {
            self.perms
                .grant(principal.id, AUTH_EVENT_OBJECT, VOTE_PERM, event_id)
                .await?;
        }

        let token = self.codec.login_token(&principal.username);
        tracing::info!(principal_id = principal.id, event_id, "principal authenticated");
        Ok(AuthOutcome {
            principal_id: principal.id,
            username: principal.username,
            auth_token: token,
        })
    }

    /// Re-issue and dispatch a challenge code.
    ///
    /// `EventClosed` and `InvalidCredentials` are deliberately the only two
    /// failure kinds here; which sub-check failed is visible in the server
    /// log, never to the caller.
    #[tracing::instrument(skip(self, credentials))]
    pub async fn resend_code(
        &self,
        event_id: i64,
        credentials: Map<String, Value>,
    ) -> Result<(), ServiceError> {
        let event = self.load_event(event_id).await?;

        if !event.auth_method.uses_codes() {
            return Err(ServiceError::ConfigInvalid(
                "auth method does not use codes".to_string(),
            ));
        }
        if !event.registration_open() {
            tracing::info!(
                event_id,
                census = ?event.census,
                status = event.status.as_str(),
                "resend refused: event closed"
            );
            return Err(ServiceError::EventClosed);
        }

        let Some(identifier) = Identifier::extract(&event, &credentials, &self.config.phone)
        else {
            tracing::info!(event_id, "resend refused: missing identifier");
            return Err(ServiceError::InvalidCredentials);
        };
        let Some(principal) = identifier.resolve(&self.principals, event_id).await? else {
            tracing::info!(event_id, "resend refused: unknown principal");
            return Err(ServiceError::InvalidCredentials);
        };
        if !principal.is_active() {
            tracing::info!(
                principal_id = principal.id,
                status = principal.status.as_str(),
                "resend refused: principal not active"
            );
            return Err(ServiceError::InvalidCredentials);
        }

        let code = self
            .codes
            .issue(principal.id, event_id, self.config.max_codes_for(&event))
            .await?;
        spawn_code_notification(Arc::clone(&self.notifier), &event, principal, code);
        Ok(())
    }

    /// Mint a permission token for a claim the principal holds; `Forbidden`
    /// otherwise.
    pub async fn check_permission(
        &self,
        principal_id: i64,
        object_type: &str,
        perm: &str,
        object_id: i64,
    ) -> Result<PermissionOutcome, ServiceError> {
        let principal = self
            .principals
            .get(principal_id)
            .await?
            .ok_or(ServiceError::NotFound("principal"))?;
        let permission_token = self
            .perms
            .permission_token(&self.codec, &principal, object_type, perm, object_id)
            .await?;
        Ok(PermissionOutcome { permission_token })
    }

    // Reply-envelope variants of the four operations, for transports that
    // only speak the structured form.

    pub async fn register_reply(&self, event_id: i64, fields: Map<String, Value>) -> AuthReply {
        AuthReply::from_result(self.register(event_id, fields).await)
    }

    pub async fn authenticate_reply(
        &self,
        event_id: i64,
        credentials: Map<String, Value>,
    ) -> AuthReply {
        AuthReply::from_result(self.authenticate(event_id, credentials).await)
    }

    pub async fn resend_code_reply(
        &self,
        event_id: i64,
        credentials: Map<String, Value>,
    ) -> AuthReply {
        AuthReply::from_result(self.resend_code(event_id, credentials).await)
    }

    pub async fn check_permission_reply(
        &self,
        principal_id: i64,
        object_type: &str,
        perm: &str,
        object_id: i64,
    ) -> AuthReply {
        AuthReply::from_result(
            self.check_permission(principal_id, object_type, perm, object_id)
                .await,
        )
    }
}

fn identifier_field(method: AuthMethod) -> &'static str {
    match method {
        AuthMethod::Email => "email",
        AuthMethod::Sms => "tlf",
        AuthMethod::Password => "username",
    }
}
