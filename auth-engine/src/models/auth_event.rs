//! Auth event model - a bounded election or registration campaign context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::field::FieldDescriptor;

/// Authentication method of an auth event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Email,
    Sms,
    Password,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Email => "email",
            AuthMethod::Sms => "sms",
            AuthMethod::Password => "password",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(AuthMethod::Email),
            "sms" => Some(AuthMethod::Sms),
            "password" | "user-and-password" => Some(AuthMethod::Password),
            _ => None,
        }
    }

    /// Whether authentication goes through one-time challenge codes.
    pub fn uses_codes(&self) -> bool {
        matches!(self, AuthMethod::Email | AuthMethod::Sms)
    }

    pub fn default_register_pipeline(&self) -> Vec<PipeSpec> {
        vec![PipeSpec::bare("check_fields")]
    }

    pub fn default_authenticate_pipeline(&self) -> Vec<PipeSpec> {
        vec![PipeSpec::bare("check_fields")]
    }
}

/// Event lifecycle status. Transitions only move forward:
/// not_started -> started -> stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    NotStarted,
    Started,
    Stopped,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::NotStarted => "not_started",
            EventStatus::Started => "started",
            EventStatus::Stopped => "stopped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" | "notstarted" => Some(EventStatus::NotStarted),
            "started" => Some(EventStatus::Started),
            "stopped" => Some(EventStatus::Stopped),
            _ => None,
        }
    }

    /// Same-status no-ops are not valid transitions.
    pub fn can_transition_to(&self, to: EventStatus) -> bool {
        matches!(
            (self, to),
            (EventStatus::NotStarted, EventStatus::Started)
                | (EventStatus::NotStarted, EventStatus::Stopped)
                | (EventStatus::Started, EventStatus::Stopped)
        )
    }
}

/// Census membership policy: open self-registration or a fixed,
/// admin-managed population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Census {
    Open,
    Close,
}

impl Census {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Census::Open),
            "close" => Some(Census::Close),
            _ => None,
        }
    }
}

/// One named pipeline step with its raw configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipeSpec {
    pub name: String,
    #[serde(default)]
    pub config: Value,
}

impl PipeSpec {
    pub fn bare(name: &str) -> Self {
        Self {
            name: name.to_string(),
            config: Value::Null,
        }
    }

    pub fn with_config(name: &str, config: Value) -> Self {
        Self {
            name: name.to_string(),
            config,
        }
    }
}

const EMAIL_MESSAGE_MAX: usize = 10_000;
const SMS_MESSAGE_MAX: usize = 120;

/// Email method settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    pub subject: String,
    /// Body template; `{code}` is replaced with the issued code.
    pub message: String,
    #[serde(default)]
    pub max_codes: Option<u32>,
}

impl EmailConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.subject.is_empty() {
            errors.push("email config: empty subject".to_string());
        }
        if self.message.is_empty() || self.message.len() > EMAIL_MESSAGE_MAX {
            errors.push(format!(
                "email config: message length must be 1..={}",
                EMAIL_MESSAGE_MAX
            ));
        }
        if self.max_codes == Some(0) {
            errors.push("email config: max_codes must be positive".to_string());
        }
        errors
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            subject: "Confirm your registration".to_string(),
            message: "Your authentication code is {code}".to_string(),
            max_codes: None,
        }
    }
}

/// SMS method settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmsConfig {
    /// Body template; `{code}` is replaced with the issued code.
    pub message: String,
    #[serde(default)]
    pub max_codes: Option<u32>,
}

impl SmsConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.message.is_empty() || self.message.len() > SMS_MESSAGE_MAX {
            errors.push(format!(
                "sms config: message length must be 1..={}",
                SMS_MESSAGE_MAX
            ));
        }
        if self.max_codes == Some(0) {
            errors.push("sms config: max_codes must be positive".to_string());
        }
        errors
    }
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            message: "Your authentication code is {code}".to_string(),
            max_codes: None,
        }
    }
}

/// Per-method configuration, one typed variant per auth method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodConfig {
    Email(EmailConfig),
    Sms(SmsConfig),
    Password,
}

impl MethodConfig {
    pub fn default_for(method: AuthMethod) -> Self {
        match method {
            AuthMethod::Email => MethodConfig::Email(EmailConfig::default()),
            AuthMethod::Sms => MethodConfig::Sms(SmsConfig::default()),
            AuthMethod::Password => MethodConfig::Password,
        }
    }

    /// Parse a raw config blob for the given method, returning every
    /// violation found.
    pub fn parse(method: AuthMethod, raw: &Value) -> Result<Self, Vec<String>> {
        let parsed = match method {
            AuthMethod::Email => serde_json::from_value::<EmailConfig>(raw.clone())
                .map(MethodConfig::Email)
                .map_err(|e| vec![format!("invalid email method config: {}", e)])?,
            AuthMethod::Sms => serde_json::from_value::<SmsConfig>(raw.clone())
                .map(MethodConfig::Sms)
                .map_err(|e| vec![format!("invalid sms method config: {}", e)])?,
            AuthMethod::Password => {
                if raw.is_null() || raw == &Value::Object(Default::default()) {
                    MethodConfig::Password
                } else {
                    return Err(vec![
                        "password method takes no configuration".to_string()
                    ]);
                }
            }
        };
        let errors = parsed.validate();
        if errors.is_empty() {
            Ok(parsed)
        } else {
            Err(errors)
        }
    }

    pub fn validate(&self) -> Vec<String> {
        match self {
            MethodConfig::Email(c) => c.validate(),
            MethodConfig::Sms(c) => c.validate(),
            MethodConfig::Password => Vec::new(),
        }
    }

    pub fn max_codes(&self) -> Option<u32> {
        match self {
            MethodConfig::Email(c) => c.max_codes,
            MethodConfig::Sms(c) => c.max_codes,
            MethodConfig::Password => None,
        }
    }

    pub fn subject(&self) -> Option<&str> {
        match self {
            MethodConfig::Email(c) => Some(&c.subject),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            MethodConfig::Email(c) => Some(&c.message),
            MethodConfig::Sms(c) => Some(&c.message),
            MethodConfig::Password => None,
        }
    }
}

/// Auth event entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthEvent {
    pub id: i64,
    pub auth_method: AuthMethod,
    pub method_config: MethodConfig,
    pub register_pipeline: Vec<PipeSpec>,
    pub authenticate_pipeline: Vec<PipeSpec>,
    pub extra_fields: Vec<FieldDescriptor>,
    pub status: EventStatus,
    pub census: Census,
    pub created: DateTime<Utc>,
}

impl AuthEvent {
    /// True when self-registration is currently admitted.
    pub fn registration_open(&self) -> bool {
        self.census == Census::Open && self.status == EventStatus::Started
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.extra_fields.iter().find(|f| f.name == name)
    }
}

/// Data for creating an auth event; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewAuthEvent {
    pub auth_method: AuthMethod,
    pub method_config: MethodConfig,
    pub register_pipeline: Vec<PipeSpec>,
    pub authenticate_pipeline: Vec<PipeSpec>,
    pub extra_fields: Vec<FieldDescriptor>,
    pub status: EventStatus,
    pub census: Census,
}

impl NewAuthEvent {
    /// Event with per-method defaults; starts not-started.
    pub fn with_defaults(method: AuthMethod, census: Census) -> Self {
        Self {
            auth_method: method,
            method_config: MethodConfig::default_for(method),
            register_pipeline: method.default_register_pipeline(),
            authenticate_pipeline: method.default_authenticate_pipeline(),
            extra_fields: Vec::new(),
            status: EventStatus::NotStarted,
            census,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_transitions_forward_only() {
        assert!(EventStatus::NotStarted.can_transition_to(EventStatus::Started));
        assert!(EventStatus::Started.can_transition_to(EventStatus::Stopped));
        // no-ops and backward moves rejected
        assert!(!EventStatus::Started.can_transition_to(EventStatus::Started));
        assert!(!EventStatus::Stopped.can_transition_to(EventStatus::Started));
        assert!(!EventStatus::Stopped.can_transition_to(EventStatus::Stopped));
        assert!(!EventStatus::Started.can_transition_to(EventStatus::NotStarted));
    }

    #[test]
    fn test_method_parse_accepts_legacy_alias() {
        assert_eq!(AuthMethod::parse("user-and-password"), Some(AuthMethod::Password));
        assert_eq!(AuthMethod::parse("email"), Some(AuthMethod::Email));
        assert_eq!(AuthMethod::parse("dnie"), None);
    }

    #[test]
    fn test_method_config_parse_rejects_unknown_keys() {
        let raw = json!({"subject": "s", "message": "m", "boo": 1});
        let errors = MethodConfig::parse(AuthMethod::Email, &raw).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_sms_message_too_long() {
        let raw = json!({"message": "a".repeat(121)});
        let errors = MethodConfig::parse(AuthMethod::Sms, &raw).unwrap_err();
        assert!(errors[0].contains("length"));
    }

    #[test]
    fn test_registration_open_requires_open_and_started() {
        let mut event = AuthEvent {
            id: 1,
            auth_method: AuthMethod::Email,
            method_config: MethodConfig::default_for(AuthMethod::Email),
            register_pipeline: vec![],
            authenticate_pipeline: vec![],
            extra_fields: vec![],
            status: EventStatus::Started,
            census: Census::Open,
            created: Utc::now(),
        };
        assert!(event.registration_open());
        event.census = Census::Close;
        assert!(!event.registration_open());
        event.census = Census::Open;
        event.status = EventStatus::Stopped;
        assert!(!event.registration_open());
    }
}
