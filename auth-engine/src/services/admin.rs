//! Administrative operations over auth events and their census.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::models::{
    AuthEvent, AuthMethod, Census, EventStatus, FieldDescriptor, MethodConfig, NewAuthEvent,
    NewPrincipal, PipeSpec, Principal, PrincipalStatus,
};
use crate::pipes::fields::validate_request_fields;
use crate::pipes::{AuthenticatePipe, Pipeline, RegisterPipe};
use crate::store::{EventStore, PrincipalStore};
use crate::utils::{hash_password, Password};

use super::acl::PermissionService;
use super::codes::CodeService;
use super::error::ServiceError;
use super::flow::{AUTH_EVENT_OBJECT, VOTE_PERM};
use super::ident::Identifier;
use super::notify::{spawn_code_notification, Notifier};
use super::paging::{Page, PageParams};

const EVENT_EDIT_PERM: &str = "edit";
const EVENT_CREATE_PERM: &str = "create";

/// Raw auth-event specification as an admin submits it. Everything is
/// validated together so one response lists every problem.
#[derive(Debug, Clone, Default)]
pub struct CreateEventRequest {
    pub auth_method: String,
    pub census: String,
    pub method_config: Option<Value>,
    pub extra_fields: Option<Vec<Value>>,
    pub register_pipeline: Option<Vec<PipeSpec>>,
    pub authenticate_pipeline: Option<Vec<PipeSpec>>,
}

#[derive(Debug, Serialize)]
pub struct CensusAddOutcome {
    pub added: Vec<i64>,
    pub skipped: usize,
}

#[derive(Debug, Serialize)]
pub struct SendCodesOutcome {
    pub sent: usize,
    pub skipped: usize,
}

/// One census member as listed to admins.
#[derive(Debug, Serialize)]
pub struct CensusEntry {
    pub principal_id: i64,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: PrincipalStatus,
    pub metadata: Map<String, Value>,
}

#[derive(Clone)]
pub struct AdminService {
    config: EngineConfig,
    principals: Arc<dyn PrincipalStore>,
    events: Arc<dyn EventStore>,
    perms: PermissionService,
    codes: CodeService,
    notifier: Arc<dyn Notifier>,
}

impl AdminService {
    pub fn new(
        config: EngineConfig,
        principals: Arc<dyn PrincipalStore>,
        events: Arc<dyn EventStore>,
        perms: PermissionService,
        codes: CodeService,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            principals,
            events,
            perms,
            codes,
            notifier,
        }
    }

    async fn load_event(&self, event_id: i64) -> Result<AuthEvent, ServiceError> {
        self.events
            .get(event_id)
            .await?
            .ok_or(ServiceError::NotFound("auth event"))
    }

    /// Create an auth event. The whole specification (method, census,
    /// extra fields, method config, both pipelines) is validated before the
    /// event is stored, and every violation is reported in one pass. The
    /// creator receives `edit` on the event and `create` on its user data.
    #[tracing::instrument(skip(self, actor, request), fields(actor_id = actor.id))]
    pub async fn create_event(
        &self,
        actor: &Principal,
        request: CreateEventRequest,
    ) -> Result<AuthEvent, ServiceError> {
        self.perms
            .require_perm(actor, AUTH_EVENT_OBJECT, EVENT_CREATE_PERM, 0)
            .await?;

        let mut errors = Vec::new();

        let method = AuthMethod::parse(&request.auth_method);
        if method.is_none() {
            errors.push(format!("invalid auth method: {}", request.auth_method));
        }
        let census = Census::parse(&request.census);
        if census.is_none() {
            errors.push(format!("invalid type of census: {}", request.census));
        }

        let mut extra_fields: Vec<FieldDescriptor> = Vec::new();
        if let Some(raw) = &request.extra_fields {
            match FieldDescriptor::parse_list(raw) {
                Ok(fields) => extra_fields = fields,
                Err(mut field_errors) => errors.append(&mut field_errors),
            }
        }

        let method_config = match (method, &request.method_config) {
            (Some(m), Some(raw)) => match MethodConfig::parse(m, raw) {
                Ok(config) => Some(config),
                Err(mut config_errors) => {
                    errors.append(&mut config_errors);
                    None
                }
            },
            (Some(m), None) => Some(MethodConfig::default_for(m)),
            (None, _) => None,
        };

        let register_pipeline = request
            .register_pipeline
            .clone()
            .or_else(|| method.map(|m| m.default_register_pipeline()))
            .unwrap_or_default();
        if let Err(error) = Pipeline::<RegisterPipe>::build(&register_pipeline) {
            errors.push(error.context());
        }
        let authenticate_pipeline = request
            .authenticate_pipeline
            .clone()
            .or_else(|| method.map(|m| m.default_authenticate_pipeline()))
            .unwrap_or_default();
        if let Err(error) = Pipeline::<AuthenticatePipe>::build(&authenticate_pipeline) {
            errors.push(error.context());
        }

        if !errors.is_empty() {
            return Err(ServiceError::ConfigInvalid(errors.join("\n")));
        }
        let (Some(method), Some(census), Some(method_config)) = (method, census, method_config)
        else {
            return Err(ServiceError::ConfigInvalid(
                "invalid event specification".to_string(),
            ));
        };

        let event = self
            .events
            .create(NewAuthEvent {
                auth_method: method,
                method_config,
                register_pipeline,
                authenticate_pipeline,
                extra_fields,
                status: EventStatus::NotStarted,
                census,
            })
            .await?;

        self.perms
            .grant(actor.id, AUTH_EVENT_OBJECT, EVENT_EDIT_PERM, event.id)
            .await?;
        self.perms
            .grant(actor.id, "UserData", "create", event.id)
            .await?;

        tracing::info!(
            event_id = event.id,
            method = method.as_str(),
            "auth event created"
        );
        Ok(event)
    }

    /// Advance event status. Transitions are monotonic forward-only;
    /// same-status no-ops are rejected.
    #[tracing::instrument(skip(self, actor), fields(actor_id = actor.id))]
    pub async fn set_status(
        &self,
        actor: &Principal,
        event_id: i64,
        to: EventStatus,
    ) -> Result<(), ServiceError> {
        self.perms
            .require_perm(actor, AUTH_EVENT_OBJECT, EVENT_EDIT_PERM, event_id)
            .await?;
        let event = self.load_event(event_id).await?;

        if !event.status.can_transition_to(to) {
            return Err(ServiceError::InvalidTransition {
                from: event.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        let applied = self.events.set_status(event_id, event.status, to).await?;
        if !applied {
            // lost a race with a concurrent transition; report fresh state
            let fresh = self.load_event(event_id).await?;
            return Err(ServiceError::InvalidTransition {
                from: fresh.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        tracing::info!(event_id, status = to.as_str(), "auth event status changed");
        Ok(())
    }

    pub async fn set_census(
        &self,
        actor: &Principal,
        event_id: i64,
        census: Census,
    ) -> Result<(), ServiceError> {
        self.perms
            .require_perm(actor, AUTH_EVENT_OBJECT, EVENT_EDIT_PERM, event_id)
            .await?;
        self.load_event(event_id).await?;
        self.events.set_census(event_id, census).await?;
        tracing::info!(event_id, census = ?census, "auth event census changed");
        Ok(())
    }

    /// Bulk pre-registration of census members.
    ///
    /// With validation on, every entry is checked (field shapes, identifier
    /// presence, duplicates against the store and within the batch) before
    /// anything is inserted; any violation fails the whole request. With
    /// validation off, entries with a missing or already-registered
    /// identifier are skipped silently.
    #[tracing::instrument(skip(self, actor, entries), fields(actor_id = actor.id))]
    pub async fn census_add(
        &self,
        actor: &Principal,
        event_id: i64,
        entries: Vec<Map<String, Value>>,
        validate: bool,
    ) -> Result<CensusAddOutcome, ServiceError> {
        self.perms
            .require_perm(actor, AUTH_EVENT_OBJECT, EVENT_EDIT_PERM, event_id)
            .await?;
        let event = self.load_event(event_id).await?;

        if validate {
            let mut errors = Vec::new();
            let mut identifiers = Vec::with_capacity(entries.len());
            let mut seen = HashSet::new();

            for (index, entry) in entries.iter().enumerate() {
                for error in validate_request_fields(&event, entry, false, &self.config.phone) {
                    errors.push(format!("entry {}: {}", index, error));
                }
                match Identifier::extract(&event, entry, &self.config.phone) {
                    Some(identifier) => {
                        if !seen.insert(identifier.clone()) {
                            errors.push(format!(
                                "entry {}: {} repeated in request",
                                index,
                                identifier.field_name()
                            ));
                        } else if identifier
                            .resolve(&self.principals, event_id)
                            .await?
                            .is_some()
                        {
                            errors.push(format!(
                                "entry {}: {} repeats an existing registration",
                                index,
                                identifier.field_name()
                            ));
                        }
                        identifiers.push(identifier);
                    }
                    None => errors.push(format!("entry {}: missing identifier", index)),
                }
            }

            if !errors.is_empty() {
                return Err(ServiceError::FieldValidation(errors.join("; ")));
            }

            let mut added = Vec::with_capacity(entries.len());
            for (entry, identifier) in entries.iter().zip(identifiers) {
                let principal = self.insert_member(&event, entry, identifier).await?;
                added.push(principal.id);
            }
            tracing::info!(event_id, count = added.len(), "census members added");
            Ok(CensusAddOutcome { added, skipped: 0 })
        } else {
            let mut added = Vec::new();
            let mut skipped = 0;
            for entry in &entries {
                match Identifier::extract(&event, entry, &self.config.phone) {
                    Some(identifier)
                        if identifier
                            .resolve(&self.principals, event_id)
                            .await?
                            .is_none() =>
                    {
                        let principal = self.insert_member(&event, entry, identifier).await?;
                        added.push(principal.id);
                    }
                    _ => skipped += 1,
                }
            }
            tracing::info!(
                event_id,
                count = added.len(),
                skipped,
                "census members added without validation"
            );
            Ok(CensusAddOutcome { added, skipped })
        }
    }

    async fn insert_member(
        &self,
        event: &AuthEvent,
        entry: &Map<String, Value>,
        identifier: Identifier,
    ) -> Result<Principal, ServiceError> {
        let mut metadata = Map::new();
        for descriptor in &event.extra_fields {
            if let Some(value) = entry.get(&descriptor.name) {
                metadata.insert(descriptor.name.clone(), value.clone());
            }
        }

        let mut new = NewPrincipal {
            metadata,
            status: Some(PrincipalStatus::Active),
            event_id: Some(event.id),
            ..Default::default()
        };
        match identifier {
            Identifier::Email(email) => new.email = Some(email),
            Identifier::Phone(phone) => new.phone = Some(phone),
            Identifier::Username(username) => new.username = Some(username),
        }
        if let Some(password) = entry.get("password").and_then(|v| v.as_str()) {
            let hash = hash_password(&Password::new(password.to_string()))?;
            new.password_hash = Some(hash.into_string());
        }

        let principal = self.principals.create(new).await?;
        self.perms
            .grant(principal.id, AUTH_EVENT_OBJECT, VOTE_PERM, event.id)
            .await?;
        Ok(principal)
    }

    /// Paginated census listing for an event.
    pub async fn census_list(
        &self,
        actor: &Principal,
        event_id: i64,
        params: PageParams,
    ) -> Result<Page<CensusEntry>, ServiceError> {
        self.perms
            .require_perm(actor, AUTH_EVENT_OBJECT, EVENT_EDIT_PERM, event_id)
            .await?;
        self.load_event(event_id).await?;

        let holders = self
            .perms
            .holders_of(AUTH_EVENT_OBJECT, VOTE_PERM, event_id)
            .await?;
        let mut entries = Vec::with_capacity(holders.len());
        for holder_id in holders {
            if let Some(principal) = self.principals.get(holder_id).await? {
                entries.push(CensusEntry {
                    principal_id: principal.id,
                    username: principal.username,
                    email: principal.email,
                    phone: principal.phone,
                    status: principal.status,
                    metadata: principal.metadata,
                });
            }
        }
        entries.sort_by_key(|e| e.principal_id);
        Ok(Page::slice(entries, params))
    }

    /// Issue and dispatch codes to every census member that has not already
    /// used one. Members over their send limit are skipped, not fatal.
    #[tracing::instrument(skip(self, actor), fields(actor_id = actor.id))]
    pub async fn send_codes_to_census(
        &self,
        actor: &Principal,
        event_id: i64,
    ) -> Result<SendCodesOutcome, ServiceError> {
        self.perms
            .require_perm(actor, AUTH_EVENT_OBJECT, EVENT_EDIT_PERM, event_id)
            .await?;
        let event = self.load_event(event_id).await?;

        if event.status != EventStatus::Started {
            return Err(ServiceError::EventNotStarted);
        }
        if !event.auth_method.uses_codes() {
            return Err(ServiceError::ConfigInvalid(
                "auth method does not use codes".to_string(),
            ));
        }

        let holders = self
            .perms
            .holders_of(AUTH_EVENT_OBJECT, VOTE_PERM, event_id)
            .await?;
        let max_codes = self.config.max_codes_for(&event);
        let mut sent = 0;
        let mut skipped = 0;

        for holder_id in holders {
            let Some(principal) = self.principals.get(holder_id).await? else {
                skipped += 1;
                continue;
            };
            if !principal.is_active() {
                skipped += 1;
                continue;
            }
            if self.codes.has_consumed_code(principal.id, event_id).await? {
                // already authenticated with a code
                skipped += 1;
                continue;
            }
            match self.codes.issue(principal.id, event_id, max_codes).await {
                Ok(code) => {
                    spawn_code_notification(
                        Arc::clone(&self.notifier),
                        &event,
                        principal,
                        code,
                    );
                    sent += 1;
                }
                Err(ServiceError::SendLimitExceeded) => {
                    tracing::warn!(
                        principal_id = holder_id,
                        event_id,
                        "census send skipped: limit reached"
                    );
                    skipped += 1;
                }
                Err(error) => return Err(error),
            }
        }

        tracing::info!(event_id, sent, skipped, "census codes dispatched");
        Ok(SendCodesOutcome { sent, skipped })
    }

    /// Remove census members, cascading their grants.
    pub async fn remove_census_members(
        &self,
        actor: &Principal,
        event_id: i64,
        principal_ids: &[i64],
    ) -> Result<u64, ServiceError> {
        self.perms
            .require_perm(actor, AUTH_EVENT_OBJECT, EVENT_EDIT_PERM, event_id)
            .await?;
        self.load_event(event_id).await?;

        let mut removed = 0;
        for id in principal_ids {
            let Some(principal) = self.principals.get(*id).await? else {
                continue;
            };
            if principal.event_id != Some(event_id) {
                continue;
            }
            self.perms.revoke_all_for(principal.id).await?;
            self.principals.delete(principal.id).await?;
            removed += 1;
        }
        tracing::info!(event_id, removed, "census members removed");
        Ok(removed)
    }

    /// Resolve a pending review or deactivate/reactivate a principal.
    pub async fn set_principal_status(
        &self,
        actor: &Principal,
        principal_id: i64,
        status: PrincipalStatus,
    ) -> Result<(), ServiceError> {
        let principal = self
            .principals
            .get(principal_id)
            .await?
            .ok_or(ServiceError::NotFound("principal"))?;
        let event_id = principal.event_id.unwrap_or(0);
        self.perms
            .require_perm(actor, AUTH_EVENT_OBJECT, EVENT_EDIT_PERM, event_id)
            .await?;

        self.principals.set_status(principal_id, status).await?;
        tracing::info!(
            principal_id,
            status = status.as_str(),
            "principal status changed"
        );
        Ok(())
    }

    /// Administrative reset of a member's code send quota.
    pub async fn reset_code_quota(
        &self,
        actor: &Principal,
        event_id: i64,
        principal_id: i64,
    ) -> Result<(), ServiceError> {
        self.perms
            .require_perm(actor, AUTH_EVENT_OBJECT, EVENT_EDIT_PERM, event_id)
            .await?;
        self.codes.reset_send_count(principal_id, event_id).await
    }
}
