//! ACL-backed permission checks and grants.

use std::sync::Arc;

use crate::models::{Acl, Principal};
use crate::store::AclStore;

use super::error::ServiceError;
use super::paging::{Page, PageParams};
use super::token::TokenCodec;

/// Optional filters for listing a holder's grants.
#[derive(Debug, Clone, Default)]
pub struct AclFilter {
    pub object_type: Option<String>,
    pub perm: Option<String>,
    pub object_id: Option<i64>,
}

/// Permission store facade over the ACL records.
#[derive(Clone)]
pub struct PermissionService {
    acls: Arc<dyn AclStore>,
}

impl PermissionService {
    pub fn new(acls: Arc<dyn AclStore>) -> Self {
        Self { acls }
    }

    /// Append a grant. Duplicates are allowed; their effect is idempotent.
    pub async fn grant(
        &self,
        holder_id: i64,
        object_type: &str,
        perm: &str,
        object_id: i64,
    ) -> Result<Acl, ServiceError> {
        let acl = self
            .acls
            .insert(holder_id, object_type, perm, object_id)
            .await?;
        tracing::info!(
            holder_id,
            object_type,
            perm,
            object_id,
            "permission granted"
        );
        Ok(acl)
    }

    /// Delete every grant exactly matching the triple; 0 deletions is not an
    /// error.
    pub async fn revoke_matching(
        &self,
        holder_id: i64,
        object_type: &str,
        perm: &str,
        object_id: i64,
    ) -> Result<u64, ServiceError> {
        let deleted = self
            .acls
            .delete_matching(holder_id, object_type, perm, object_id)
            .await?;
        tracing::info!(holder_id, object_type, perm, object_id, deleted, "permissions revoked");
        Ok(deleted)
    }

    /// Wildcard-aware permission check. Superusers always pass.
    pub async fn has_perm(
        &self,
        holder: &Principal,
        object_type: &str,
        perm: &str,
        object_id: i64,
    ) -> Result<bool, ServiceError> {
        if holder.superuser {
            return Ok(true);
        }
        let acls = self.acls.list_for_holder(holder.id).await?;
        Ok(acls.iter().any(|a| a.matches(object_type, perm, object_id)))
    }

    /// Check-or-forbid; the error names the missing permission for the log,
    /// not the caller.
    pub async fn require_perm(
        &self,
        holder: &Principal,
        object_type: &str,
        perm: &str,
        object_id: i64,
    ) -> Result<(), ServiceError> {
        if self.has_perm(holder, object_type, perm, object_id).await? {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "{} {} on {}:{}",
                holder.username, perm, object_type, object_id
            )))
        }
    }

    /// Holder ids of every grant with exactly this triple (census listings).
    pub async fn holders_of(
        &self,
        object_type: &str,
        perm: &str,
        object_id: i64,
    ) -> Result<Vec<i64>, ServiceError> {
        let mut holders: Vec<i64> = self
            .acls
            .list_matching(object_type, perm, object_id)
            .await?
            .into_iter()
            .map(|a| a.holder_id)
            .collect();
        holders.sort_unstable();
        holders.dedup();
        Ok(holders)
    }

    /// Cascade deletion of every grant a holder has; used when the holder is
    /// removed.
    pub async fn revoke_all_for(&self, holder_id: i64) -> Result<u64, ServiceError> {
        Ok(self.acls.delete_for_holder(holder_id).await?)
    }

    /// Paginated listing of a holder's grants, optionally filtered.
    pub async fn list_for(
        &self,
        holder_id: i64,
        filter: &AclFilter,
        params: PageParams,
    ) -> Result<Page<Acl>, ServiceError> {
        let mut acls = self.acls.list_for_holder(holder_id).await?;
        acls.retain(|a| {
            filter
                .object_type
                .as_ref()
                .map_or(true, |t| &a.object_type == t)
                && filter.perm.as_ref().map_or(true, |p| &a.perm == p)
                && filter.object_id.map_or(true, |id| a.object_id == id)
        });
        acls.sort_by_key(|a| a.id);
        Ok(Page::slice(acls, params))
    }

    /// Mint a permission token for a claim the holder actually has.
    pub async fn permission_token(
        &self,
        codec: &TokenCodec,
        holder: &Principal,
        object_type: &str,
        perm: &str,
        object_id: i64,
    ) -> Result<String, ServiceError> {
        self.require_perm(holder, object_type, perm, object_id)
            .await?;
        Ok(codec.permission_token(&holder.username, object_type, object_id, perm))
    }
}
