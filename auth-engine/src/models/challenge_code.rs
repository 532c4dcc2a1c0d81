//! Challenge code model - one-time numeric code for email/SMS auth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One-time code bound to a (principal, auth event) pair.
///
/// At most one unconsumed code is current per pair; issuing a new one
/// supersedes the previous. The cumulative send counter lives in the store,
/// not here, so superseding codes never resets the quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeCode {
    pub code: String,
    pub principal_id: i64,
    pub event_id: i64,
    pub consumed: bool,
    pub created: DateTime<Utc>,
}

impl ChallengeCode {
    pub fn new(principal_id: i64, event_id: i64, code: String) -> Self {
        Self {
            code,
            principal_id,
            event_id,
            consumed: false,
            created: Utc::now(),
        }
    }
}
