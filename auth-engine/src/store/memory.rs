//! In-memory storage backend.
//!
//! Default backend for tests and single-process deployments. DashMap's
//! per-entry locking gives the atomicity `CodeStore` requires: the entry
//! guard is held across the check-and-mutate in both
//! `try_increment_send_count` and `consume_code_if_matches`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use subtle::ConstantTimeEq;

use super::{
    AclStore, CodeStore, EventStore, PrincipalStore, StoreError, StoreResult,
};
use crate::models::{
    Acl, AuthEvent, Census, ChallengeCode, EventStatus, NewAuthEvent, NewPrincipal, Principal,
    PrincipalStatus,
};
use crate::utils::random_username;

#[derive(Default)]
pub struct MemoryStore {
    principals: DashMap<i64, Principal>,
    events: DashMap<i64, AuthEvent>,
    acls: RwLock<Vec<Acl>>,
    codes: DashMap<(i64, i64), ChallengeCode>,
    send_counts: DashMap<(i64, i64), u64>,
    next_principal_id: AtomicI64,
    next_event_id: AtomicI64,
    next_acl_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn acls_write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, Vec<Acl>>> {
        self.acls
            .write()
            .map_err(|_| StoreError::Backend("acl lock poisoned".to_string()))
    }

    fn acls_read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Vec<Acl>>> {
        self.acls
            .read()
            .map_err(|_| StoreError::Backend("acl lock poisoned".to_string()))
    }
}

#[async_trait]
impl PrincipalStore for MemoryStore {
    async fn create(&self, new: NewPrincipal) -> StoreResult<Principal> {
        let id = self.next_principal_id.fetch_add(1, Ordering::SeqCst) + 1;
        let principal = Principal {
            id,
            username: new.username.unwrap_or_else(random_username),
            email: new.email,
            phone: new.phone,
            password_hash: new.password_hash,
            metadata: new.metadata,
            status: new.status.unwrap_or(PrincipalStatus::Active),
            superuser: new.superuser,
            event_id: new.event_id,
            created: Utc::now(),
        };
        self.principals.insert(id, principal.clone());
        Ok(principal)
    }

    async fn get(&self, id: i64) -> StoreResult<Option<Principal>> {
        Ok(self.principals.get(&id).map(|p| p.clone()))
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Principal>> {
        Ok(self
            .principals
            .iter()
            .find(|p| p.username == username)
            .map(|p| p.clone()))
    }

    async fn find_by_email(&self, event_id: i64, email: &str) -> StoreResult<Option<Principal>> {
        Ok(self
            .principals
            .iter()
            .find(|p| p.event_id == Some(event_id) && p.email.as_deref() == Some(email))
            .map(|p| p.clone()))
    }

    async fn find_by_phone(&self, event_id: i64, phone: &str) -> StoreResult<Option<Principal>> {
        Ok(self
            .principals
            .iter()
            .find(|p| p.event_id == Some(event_id) && p.phone.as_deref() == Some(phone))
            .map(|p| p.clone()))
    }

    async fn find_by_metadata(
        &self,
        event_id: i64,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<Principal>> {
        Ok(self
            .principals
            .iter()
            .filter(|p| p.event_id == Some(event_id) && p.metadata.get(field) == Some(value))
            .map(|p| p.clone())
            .collect())
    }

    async fn set_status(&self, id: i64, status: PrincipalStatus) -> StoreResult<()> {
        match self.principals.get_mut(&id) {
            Some(mut p) => {
                p.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn update_metadata(&self, id: i64, metadata: Map<String, Value>) -> StoreResult<()> {
        match self.principals.get_mut(&id) {
            Some(mut p) => {
                p.metadata = metadata;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        self.principals
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn create(&self, new: NewAuthEvent) -> StoreResult<AuthEvent> {
        let id = self.next_event_id.fetch_add(1, Ordering::SeqCst) + 1;
        let event = AuthEvent {
            id,
            auth_method: new.auth_method,
            method_config: new.method_config,
            register_pipeline: new.register_pipeline,
            authenticate_pipeline: new.authenticate_pipeline,
            extra_fields: new.extra_fields,
            status: new.status,
            census: new.census,
            created: Utc::now(),
        };
        self.events.insert(id, event.clone());
        Ok(event)
    }

    async fn get(&self, id: i64) -> StoreResult<Option<AuthEvent>> {
        Ok(self.events.get(&id).map(|e| e.clone()))
    }

    async fn set_status(&self, id: i64, from: EventStatus, to: EventStatus) -> StoreResult<bool> {
        match self.events.get_mut(&id) {
            Some(mut e) => {
                if e.status != from {
                    return Ok(false);
                }
                e.status = to;
                Ok(true)
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn set_census(&self, id: i64, census: Census) -> StoreResult<()> {
        match self.events.get_mut(&id) {
            Some(mut e) => {
                e.census = census;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn list(&self) -> StoreResult<Vec<AuthEvent>> {
        let mut events: Vec<AuthEvent> = self.events.iter().map(|e| e.clone()).collect();
        events.sort_by_key(|e| e.id);
        Ok(events)
    }
}

#[async_trait]
impl AclStore for MemoryStore {
    async fn insert(
        &self,
        holder_id: i64,
        object_type: &str,
        perm: &str,
        object_id: i64,
    ) -> StoreResult<Acl> {
        let acl = Acl {
            id: self.next_acl_id.fetch_add(1, Ordering::SeqCst) + 1,
            holder_id,
            object_type: object_type.to_string(),
            perm: perm.to_string(),
            object_id,
            created: Utc::now(),
        };
        self.acls_write()?.push(acl.clone());
        Ok(acl)
    }

    async fn delete_matching(
        &self,
        holder_id: i64,
        object_type: &str,
        perm: &str,
        object_id: i64,
    ) -> StoreResult<u64> {
        let mut acls = self.acls_write()?;
        let before = acls.len();
        acls.retain(|a| {
            !(a.holder_id == holder_id
                && a.object_type == object_type
                && a.perm == perm
                && a.object_id == object_id)
        });
        Ok((before - acls.len()) as u64)
    }

    async fn delete_for_holder(&self, holder_id: i64) -> StoreResult<u64> {
        let mut acls = self.acls_write()?;
        let before = acls.len();
        acls.retain(|a| a.holder_id != holder_id);
        Ok((before - acls.len()) as u64)
    }

    async fn list_for_holder(&self, holder_id: i64) -> StoreResult<Vec<Acl>> {
        Ok(self
            .acls_read()?
            .iter()
            .filter(|a| a.holder_id == holder_id)
            .cloned()
            .collect())
    }

    async fn list_matching(
        &self,
        object_type: &str,
        perm: &str,
        object_id: i64,
    ) -> StoreResult<Vec<Acl>> {
        Ok(self
            .acls_read()?
            .iter()
            .filter(|a| {
                a.object_type == object_type && a.perm == perm && a.object_id == object_id
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CodeStore for MemoryStore {
    async fn put_code(&self, code: ChallengeCode) -> StoreResult<()> {
        self.codes
            .insert((code.principal_id, code.event_id), code);
        Ok(())
    }

    async fn current_code(
        &self,
        principal_id: i64,
        event_id: i64,
    ) -> StoreResult<Option<ChallengeCode>> {
        Ok(self
            .codes
            .get(&(principal_id, event_id))
            .map(|c| c.clone()))
    }

    async fn consume_code_if_matches(
        &self,
        principal_id: i64,
        event_id: i64,
        submitted: &str,
    ) -> StoreResult<bool> {
        match self.codes.get_mut(&(principal_id, event_id)) {
            Some(mut entry) => {
                if entry.consumed {
                    return Ok(false);
                }
                let matches = entry.code.len() == submitted.len()
                    && entry
                        .code
                        .as_bytes()
                        .ct_eq(submitted.as_bytes())
                        .unwrap_u8()
                        == 1;
                if matches {
                    entry.consumed = true;
                }
                Ok(matches)
            }
            None => Ok(false),
        }
    }

    async fn try_increment_send_count(
        &self,
        principal_id: i64,
        event_id: i64,
        max: u32,
    ) -> StoreResult<bool> {
        let mut entry = self
            .send_counts
            .entry((principal_id, event_id))
            .or_insert(0);
        if *entry >= u64::from(max) {
            return Ok(false);
        }
        *entry += 1;
        Ok(true)
    }

    async fn send_count(&self, principal_id: i64, event_id: i64) -> StoreResult<u64> {
        Ok(self
            .send_counts
            .get(&(principal_id, event_id))
            .map(|c| *c)
            .unwrap_or(0))
    }

    async fn reset_send_count(&self, principal_id: i64, event_id: i64) -> StoreResult<()> {
        self.send_counts.remove(&(principal_id, event_id));
        Ok(())
    }
}
