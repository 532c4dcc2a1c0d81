//! ACL model - a single permission grant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `object_id` value meaning "any instance of this object type".
pub const WILDCARD_OBJECT_ID: i64 = 0;

/// Permission grant: holder may perform `perm` on `object_type`/`object_id`.
///
/// Grants are append-only and not deduplicated in storage; permission checks
/// short-circuit on the first match, so duplicates are harmless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acl {
    pub id: i64,
    pub holder_id: i64,
    pub object_type: String,
    pub perm: String,
    pub object_id: i64,
    pub created: DateTime<Utc>,
}

impl Acl {
    /// Wildcard matching applies in both directions: a stored grant with
    /// object_id 0 satisfies any query, and a query for object_id 0 is
    /// satisfied by any stored grant of the same type and perm.
    pub fn matches(&self, object_type: &str, perm: &str, object_id: i64) -> bool {
        self.object_type == object_type
            && self.perm == perm
            && (object_id == WILDCARD_OBJECT_ID
                || self.object_id == object_id
                || self.object_id == WILDCARD_OBJECT_ID)
    }
}
