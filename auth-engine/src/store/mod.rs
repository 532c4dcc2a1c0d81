//! Storage abstractions for the engine.
//!
//! Persistence is an external collaborator; the engine only sees these
//! traits. Implementations must provide the two atomic operations the
//! concurrency model depends on: `try_increment_send_count` (check and
//! increment in one step) and `consume_code_if_matches` (compare and mark
//! consumed in one step). Everything else is plain CRUD.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{
    Acl, AuthEvent, Census, ChallengeCode, EventStatus, NewAuthEvent, NewPrincipal, Principal,
    PrincipalStatus,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn create(&self, new: NewPrincipal) -> StoreResult<Principal>;

    async fn get(&self, id: i64) -> StoreResult<Option<Principal>>;

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Principal>>;

    /// Lookup by email within one auth event.
    async fn find_by_email(&self, event_id: i64, email: &str) -> StoreResult<Option<Principal>>;

    /// Lookup by canonical phone within one auth event.
    async fn find_by_phone(&self, event_id: i64, phone: &str) -> StoreResult<Option<Principal>>;

    /// All principals of an event whose metadata field equals `value`.
    async fn find_by_metadata(
        &self,
        event_id: i64,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<Principal>>;

    async fn set_status(&self, id: i64, status: PrincipalStatus) -> StoreResult<()>;

    async fn update_metadata(&self, id: i64, metadata: Map<String, Value>) -> StoreResult<()>;

    async fn delete(&self, id: i64) -> StoreResult<()>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn create(&self, new: NewAuthEvent) -> StoreResult<AuthEvent>;

    async fn get(&self, id: i64) -> StoreResult<Option<AuthEvent>>;

    /// Compare-and-set status transition; returns false when the stored
    /// status no longer equals `from`.
    async fn set_status(&self, id: i64, from: EventStatus, to: EventStatus) -> StoreResult<bool>;

    async fn set_census(&self, id: i64, census: Census) -> StoreResult<()>;

    async fn list(&self) -> StoreResult<Vec<AuthEvent>>;
}

#[async_trait]
pub trait AclStore: Send + Sync {
    async fn insert(
        &self,
        holder_id: i64,
        object_type: &str,
        perm: &str,
        object_id: i64,
    ) -> StoreResult<Acl>;

    /// Delete every grant exactly matching the triple; returns the count.
    async fn delete_matching(
        &self,
        holder_id: i64,
        object_type: &str,
        perm: &str,
        object_id: i64,
    ) -> StoreResult<u64>;

    async fn delete_for_holder(&self, holder_id: i64) -> StoreResult<u64>;

    async fn list_for_holder(&self, holder_id: i64) -> StoreResult<Vec<Acl>>;

    /// All grants with exactly this type, perm and object id (no wildcard
    /// expansion; used for census listings).
    async fn list_matching(
        &self,
        object_type: &str,
        perm: &str,
        object_id: i64,
    ) -> StoreResult<Vec<Acl>>;
}

#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Store a new current code for the pair, superseding any previous one.
    async fn put_code(&self, code: ChallengeCode) -> StoreResult<()>;

    async fn current_code(
        &self,
        principal_id: i64,
        event_id: i64,
    ) -> StoreResult<Option<ChallengeCode>>;

    /// Atomically compare the submitted value against the current unconsumed
    /// code and mark it consumed on match. Returns whether it matched.
    async fn consume_code_if_matches(
        &self,
        principal_id: i64,
        event_id: i64,
        submitted: &str,
    ) -> StoreResult<bool>;

    /// Atomically increment the cumulative send counter unless it has
    /// reached `max`. Returns whether the increment was applied.
    async fn try_increment_send_count(
        &self,
        principal_id: i64,
        event_id: i64,
        max: u32,
    ) -> StoreResult<bool>;

    async fn send_count(&self, principal_id: i64, event_id: i64) -> StoreResult<u64>;

    /// Administrative reset of the send counter for a pair.
    async fn reset_send_count(&self, principal_id: i64, event_id: i64) -> StoreResult<()>;
}
