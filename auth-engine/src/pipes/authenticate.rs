//! Built-in authenticate-pipeline steps.
//!
//! A deliberately smaller registry than the register side: authentication
//! re-validates field shapes and honors denylists, but uniqueness, captcha
//! and external lookups belong to registration.

use std::collections::HashMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::services::error::ServiceError;
use crate::utils::canonicalize_phone;

use super::fields::validate_request_fields;
use super::register::ListConfig;
use super::{
    ensure_no_config, keys, parse_step_config, ExecContext, Pipe, PipeDeps, PipeOutcome, Rejection,
};

const CONTEXT: &str = "authenticate";

/// Closed set of authenticate-pipeline steps.
#[derive(Debug)]
pub enum AuthenticatePipe {
    CheckFields,
    CheckDenied(ListConfig),
}

type Builder = fn(&Value) -> Result<AuthenticatePipe, ServiceError>;

static REGISTRY: Lazy<HashMap<&'static str, Builder>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, Builder> = HashMap::new();
    table.insert("check_fields", |config| {
        ensure_no_config(CONTEXT, "check_fields", config)?;
        Ok(AuthenticatePipe::CheckFields)
    });
    table.insert("check_denied", |config| {
        let parsed: ListConfig = parse_step_config(CONTEXT, "check_denied", config)?;
        if parsed.field.is_empty() {
            return Err(ServiceError::ConfigInvalid(
                "authenticate step check_denied: field must not be empty".to_string(),
            ));
        }
        Ok(AuthenticatePipe::CheckDenied(parsed))
    });
    table
});

pub fn known_step_names() -> Vec<&'static str> {
    let mut names: Vec<_> = REGISTRY.keys().copied().collect();
    names.sort_unstable();
    names
}

#[async_trait]
impl Pipe for AuthenticatePipe {
    const CONTEXT: &'static str = CONTEXT;

    fn build(name: &str, config: &Value) -> Result<Self, ServiceError> {
        match REGISTRY.get(name) {
            Some(builder) => builder(config),
            None => Err(ServiceError::ConfigInvalid(format!(
                "unknown authenticate step: {}",
                name
            ))),
        }
    }

    async fn execute(
        &self,
        ctx: &mut ExecContext,
        deps: &PipeDeps,
    ) -> Result<PipeOutcome, ServiceError> {
        match self {
            AuthenticatePipe::CheckFields => {
                let errors = validate_request_fields(&ctx.event, &ctx.fields, true, &deps.phone);
                if errors.is_empty() {
                    Ok(PipeOutcome::Continue)
                } else {
                    Ok(PipeOutcome::Reject(Rejection::new(
                        keys::INVALID_FIELDS,
                        errors.join("; "),
                    )))
                }
            }

            AuthenticatePipe::CheckDenied(config) => {
                let value = ctx.field_str(&config.field).map(|raw| {
                    if config.field == "tlf" {
                        canonicalize_phone(raw, &deps.phone)
                    } else {
                        raw.to_string()
                    }
                });
                match value {
                    Some(value) if config.values.contains(&value) => {
                        Ok(PipeOutcome::Reject(Rejection::new(
                            keys::DENIED,
                            format!("field {} is denied from authenticating", config.field),
                        )))
                    }
                    _ => Ok(PipeOutcome::Continue),
                }
            }
        }
    }
}
