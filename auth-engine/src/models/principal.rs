//! Principal model - a voter or administrator identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle state of a principal.
///
/// `PendingReview` is distinct from both `Active` and `Disabled`: it marks a
/// registration that an external check could not confirm and that awaits
/// manual review. Pending principals cannot authenticate but are still
/// counted for uniqueness checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalStatus {
    Active,
    PendingReview,
    Disabled,
}

impl PrincipalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalStatus::Active => "active",
            PrincipalStatus::PendingReview => "pending_review",
            PrincipalStatus::Disabled => "disabled",
        }
    }
}

/// Principal entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    /// Canonical national-format phone number.
    pub phone: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub metadata: Map<String, Value>,
    pub status: PrincipalStatus,
    pub superuser: bool,
    /// Auth event this principal belongs to. `None` for system principals.
    pub event_id: Option<i64>,
    pub created: DateTime<Utc>,
}

impl Principal {
    pub fn is_active(&self) -> bool {
        self.status == PrincipalStatus::Active
    }
}

/// Data for creating a principal; the store assigns the id and fills a
/// generated username when none is given.
#[derive(Debug, Clone, Default)]
pub struct NewPrincipal {
    pub username: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
    pub metadata: Map<String, Value>,
    pub status: Option<PrincipalStatus>,
    pub superuser: bool,
    pub event_id: Option<i64>,
}
