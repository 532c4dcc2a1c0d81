//! Principal identifier resolution shared by the flow and admin services.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::models::{AuthEvent, AuthMethod, Principal};
use crate::store::PrincipalStore;
use crate::utils::{canonicalize_phone, PhoneConfig};

use super::error::ServiceError;

/// The per-method field that uniquely identifies a principal within an
/// event. Phones are held in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Identifier {
    Email(String),
    Phone(String),
    Username(String),
}

impl Identifier {
    pub fn extract(
        event: &AuthEvent,
        fields: &Map<String, Value>,
        phone: &PhoneConfig,
    ) -> Option<Self> {
        match event.auth_method {
            AuthMethod::Email => fields
                .get("email")
                .and_then(|v| v.as_str())
                .map(|s| Identifier::Email(s.trim().to_string())),
            AuthMethod::Sms => fields
                .get("tlf")
                .and_then(|v| v.as_str())
                .map(|s| Identifier::Phone(canonicalize_phone(s, phone))),
            AuthMethod::Password => fields
                .get("username")
                .and_then(|v| v.as_str())
                .map(|s| Identifier::Username(s.trim().to_string())),
        }
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            Identifier::Email(_) => "email",
            Identifier::Phone(_) => "tlf",
            Identifier::Username(_) => "username",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Identifier::Email(v) | Identifier::Phone(v) | Identifier::Username(v) => v,
        }
    }

    /// Look the identifier up among the event's principals.
    pub async fn resolve(
        &self,
        principals: &Arc<dyn PrincipalStore>,
        event_id: i64,
    ) -> Result<Option<Principal>, ServiceError> {
        let found = match self {
            Identifier::Email(email) => principals.find_by_email(event_id, email).await?,
            Identifier::Phone(phone) => principals.find_by_phone(event_id, phone).await?,
            Identifier::Username(username) => principals
                .find_by_username(username)
                .await?
                .filter(|p| p.event_id == Some(event_id)),
        };
        Ok(found)
    }
}
