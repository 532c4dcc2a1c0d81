//! Field-shape validation shared by the register and authenticate pipelines.

use serde_json::{Map, Value};
use validator::ValidateEmail;

use crate::models::{AuthEvent, AuthMethod, FieldDescriptor, FieldType};
use crate::utils::{canonicalize_phone, PhoneConfig};

/// Keys the engine itself consumes and therefore always accepts.
const PASSTHROUGH_FIELDS: &[&str] = &["code", "captcha", "captcha_id"];

const MIN_PASSWORD_LENGTH: usize = 6;

/// Validate a request's fields against the event's declarations and its auth
/// method. Violations are collected, not short-circuited, so one response
/// reports every broken field.
pub fn validate_request_fields(
    event: &AuthEvent,
    fields: &Map<String, Value>,
    at_authentication: bool,
    phone: &PhoneConfig,
) -> Vec<String> {
    let mut errors = Vec::new();

    validate_method_fields(event.auth_method, fields, at_authentication, phone, &mut errors);

    for name in fields.keys() {
        let known = event.field(name).is_some()
            || PASSTHROUGH_FIELDS.contains(&name.as_str())
            || method_field(event.auth_method, name);
        if !known {
            errors.push(format!("unexpected field {}", name));
        }
    }

    for descriptor in &event.extra_fields {
        match fields.get(&descriptor.name) {
            Some(value) => {
                if let Some(error) = check_value(descriptor, value) {
                    errors.push(error);
                }
            }
            None => {
                let needed = if at_authentication {
                    descriptor.required_on_authentication
                } else {
                    descriptor.required
                };
                if needed {
                    errors.push(format!("field {} is required", descriptor.name));
                }
            }
        }
    }

    errors
}

fn method_field(method: AuthMethod, name: &str) -> bool {
    match method {
        AuthMethod::Email => name == "email",
        AuthMethod::Sms => name == "tlf",
        AuthMethod::Password => name == "username" || name == "password",
    }
}

fn validate_method_fields(
    method: AuthMethod,
    fields: &Map<String, Value>,
    at_authentication: bool,
    phone: &PhoneConfig,
    errors: &mut Vec<String>,
) {
    match method {
        AuthMethod::Email => match fields.get("email").and_then(|v| v.as_str()) {
            Some(email) if email.validate_email() => {}
            Some(_) => errors.push("field email is not a valid address".to_string()),
            None => errors.push("field email is required".to_string()),
        },
        AuthMethod::Sms => match fields.get("tlf").and_then(|v| v.as_str()) {
            Some(raw) => {
                let canonical = canonicalize_phone(raw, phone);
                if canonical.len() < 6
                    || canonical.len() > 14
                    || !canonical.chars().all(|c| c.is_ascii_digit())
                {
                    errors.push("field tlf is not a valid phone number".to_string());
                }
            }
            None => errors.push("field tlf is required".to_string()),
        },
        AuthMethod::Password => {
            match fields.get("username").and_then(|v| v.as_str()) {
                Some(username) if !username.is_empty() && username.len() <= 255 => {}
                Some(_) => errors.push("field username has invalid length".to_string()),
                None => errors.push("field username is required".to_string()),
            }
            match fields.get("password").and_then(|v| v.as_str()) {
                Some(password) if at_authentication || password.len() >= MIN_PASSWORD_LENGTH => {}
                Some(_) => errors.push(format!(
                    "field password must have at least {} characters",
                    MIN_PASSWORD_LENGTH
                )),
                None => errors.push("field password is required".to_string()),
            }
        }
    }
}

fn check_value(descriptor: &FieldDescriptor, value: &Value) -> Option<String> {
    match descriptor.field_type {
        FieldType::Text => match value.as_str() {
            Some(s) => {
                let length = s.chars().count() as i64;
                if descriptor.min.map_or(false, |min| length < min) {
                    Some(format!(
                        "field {} is shorter than {} characters",
                        descriptor.name,
                        descriptor.min.unwrap_or(0)
                    ))
                } else if descriptor.max.map_or(false, |max| length > max) {
                    Some(format!(
                        "field {} is longer than {} characters",
                        descriptor.name,
                        descriptor.max.unwrap_or(0)
                    ))
                } else {
                    None
                }
            }
            None => Some(format!("field {} must be a string", descriptor.name)),
        },
        FieldType::Int => match value.as_i64() {
            Some(v) => {
                if descriptor.min.map_or(false, |min| v < min) {
                    Some(format!("field {} is below {}", descriptor.name, descriptor.min.unwrap_or(0)))
                } else if descriptor.max.map_or(false, |max| v > max) {
                    Some(format!("field {} is above {}", descriptor.name, descriptor.max.unwrap_or(0)))
                } else {
                    None
                }
            }
            None => Some(format!("field {} must be an integer", descriptor.name)),
        },
        FieldType::Bool => {
            if value.is_boolean() {
                None
            } else {
                Some(format!("field {} must be a boolean", descriptor.name))
            }
        }
    }
}

const DNI_CHECK_LETTERS: &[u8] = b"TRWAGMYFPDXBNJZSQVHLCKE";

/// Spanish national identity number: eight digits plus a checksum letter.
pub fn valid_dni(value: &str) -> bool {
    let normalized = value.trim().to_ascii_uppercase();
    if normalized.len() != 9 {
        return false;
    }
    let (digits, letter) = normalized.split_at(8);
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let Ok(number) = digits.parse::<u32>() else {
        return false;
    };
    letter.as_bytes()[0] == DNI_CHECK_LETTERS[(number % 23) as usize]
}
