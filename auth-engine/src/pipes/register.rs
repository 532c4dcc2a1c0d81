//! Built-in register-pipeline steps.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::Value;

use crate::models::PrincipalStatus;
use crate::services::error::ServiceError;
use crate::utils::canonicalize_phone;

use super::fields::{valid_dni, validate_request_fields};
use super::{
    ensure_no_config, keys, parse_step_config, ExecContext, Pipe, PipeDeps, PipeOutcome, Rejection,
};

const CONTEXT: &str = "register";

fn default_id_field() -> String {
    "dni".to_string()
}

fn default_lookup_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdNumberConfig {
    #[serde(default = "default_id_field")]
    pub field: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalLookupConfig {
    pub field: String,
    #[serde(default = "default_lookup_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListConfig {
    pub field: String,
    pub values: Vec<String>,
}

impl ListConfig {
    fn validate(self, name: &str) -> Result<Self, ServiceError> {
        if self.field.is_empty() {
            return Err(ServiceError::ConfigInvalid(format!(
                "register step {}: field must not be empty",
                name
            )));
        }
        Ok(self)
    }
}

/// Closed set of register-pipeline steps.
#[derive(Debug)]
pub enum RegisterPipe {
    CheckFields,
    CheckUniqueness,
    CheckIdNumber(IdNumberConfig),
    ExternalLookup(ExternalLookupConfig),
    CheckCaptcha,
    CheckAllowed(ListConfig),
    CheckDenied(ListConfig),
}

type Builder = fn(&Value) -> Result<RegisterPipe, ServiceError>;

/// Name registry, fixed at startup. Unknown names fail at pipeline build.
static REGISTRY: Lazy<HashMap<&'static str, Builder>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, Builder> = HashMap::new();
    table.insert("check_fields", |config| {
        ensure_no_config(CONTEXT, "check_fields", config)?;
        Ok(RegisterPipe::CheckFields)
    });
    table.insert("check_uniqueness", |config| {
        ensure_no_config(CONTEXT, "check_uniqueness", config)?;
        Ok(RegisterPipe::CheckUniqueness)
    });
    table.insert("check_id_number", |config| {
        Ok(RegisterPipe::CheckIdNumber(parse_step_config(
            CONTEXT,
            "check_id_number",
            config,
        )?))
    });
    table.insert("external_lookup", |config| {
        let parsed: ExternalLookupConfig =
            parse_step_config(CONTEXT, "external_lookup", config)?;
        if parsed.field.is_empty() {
            return Err(ServiceError::ConfigInvalid(
                "register step external_lookup: field must not be empty".to_string(),
            ));
        }
        if parsed.timeout_secs == 0 || parsed.timeout_secs > 60 {
            return Err(ServiceError::ConfigInvalid(
                "register step external_lookup: timeout_secs must be within 1..=60".to_string(),
            ));
        }
        Ok(RegisterPipe::ExternalLookup(parsed))
    });
    table.insert("check_captcha", |config| {
        ensure_no_config(CONTEXT, "check_captcha", config)?;
        Ok(RegisterPipe::CheckCaptcha)
    });
    table.insert("check_allowed", |config| {
        let parsed: ListConfig = parse_step_config(CONTEXT, "check_allowed", config)?;
        Ok(RegisterPipe::CheckAllowed(parsed.validate("check_allowed")?))
    });
    table.insert("check_denied", |config| {
        let parsed: ListConfig = parse_step_config(CONTEXT, "check_denied", config)?;
        Ok(RegisterPipe::CheckDenied(parsed.validate("check_denied")?))
    });
    table
});

pub fn known_step_names() -> Vec<&'static str> {
    let mut names: Vec<_> = REGISTRY.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Value a list step matches against; phone fields are canonicalized first
/// so the configured lists hold canonical numbers.
fn list_value(ctx: &ExecContext, deps: &PipeDeps, field: &str) -> Option<String> {
    let raw = ctx.field_str(field)?;
    if field == "tlf" {
        Some(canonicalize_phone(raw, &deps.phone))
    } else {
        Some(raw.to_string())
    }
}

#[async_trait]
impl Pipe for RegisterPipe {
    const CONTEXT: &'static str = CONTEXT;

    fn build(name: &str, config: &Value) -> Result<Self, ServiceError> {
        match REGISTRY.get(name) {
            Some(builder) => builder(config),
            None => Err(ServiceError::ConfigInvalid(format!(
                "unknown register step: {}",
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
            RegisterPipe::CheckFields => {
                let errors =
                    validate_request_fields(&ctx.event, &ctx.fields, false, &deps.phone);
                if errors.is_empty() {
                    Ok(PipeOutcome::Continue)
                } else {
                    Ok(PipeOutcome::Reject(Rejection::new(
                        keys::INVALID_FIELDS,
                        errors.join("; "),
                    )))
                }
            }

            RegisterPipe::CheckUniqueness => {
                for descriptor in ctx.event.extra_fields.iter().filter(|f| f.unique) {
                    let Some(value) = ctx.fields.get(&descriptor.name) else {
                        continue;
                    };
                    let holders = deps
                        .principals
                        .find_by_metadata(ctx.event.id, &descriptor.name, value)
                        .await?;
                    if holders
                        .iter()
                        .any(|p| p.status != PrincipalStatus::Disabled)
                    {
                        return Ok(PipeOutcome::Reject(Rejection::new(
                            keys::DUPLICATE_VALUE,
                            format!("field {} repeats an existing registration", descriptor.name),
                        )));
                    }
                }
                Ok(PipeOutcome::Continue)
            }

            RegisterPipe::CheckIdNumber(config) => {
                let Some(raw) = ctx.field_str(&config.field).map(str::to_owned) else {
                    return Ok(PipeOutcome::Reject(Rejection::new(
                        keys::INVALID_ID_NUMBER,
                        format!("field {} is required", config.field),
                    )));
                };
                let normalized = raw.trim().to_ascii_uppercase();
                if !valid_dni(&normalized) {
                    return Ok(PipeOutcome::Reject(Rejection::new(
                        keys::INVALID_ID_NUMBER,
                        format!("field {} is not a valid identity number", config.field),
                    )));
                }
                ctx.fields
                    .insert(config.field.clone(), Value::String(normalized));
                Ok(PipeOutcome::Continue)
            }

            RegisterPipe::ExternalLookup(config) => {
                let Some(identifier) = ctx.field_str(&config.field).map(str::to_owned) else {
                    return Ok(PipeOutcome::Reject(Rejection::new(
                        keys::INVALID_FIELDS,
                        format!("field {} is required", config.field),
                    )));
                };

                let lookup = deps.lookup.lookup(&identifier);
                match tokio::time::timeout(Duration::from_secs(config.timeout_secs), lookup).await
                {
                    Ok(Ok(outcome)) if outcome.valid => {
                        ctx.annotations
                            .insert("external_data".to_string(), Value::Object(outcome.data));
                    }
                    Ok(Ok(_)) => {
                        // inconclusive: leave the decision to manual review
                        // instead of rejecting outright
                        tracing::info!(
                            event_id = ctx.event.id,
                            "external lookup did not confirm identifier, pending review"
                        );
                        ctx.status = PrincipalStatus::PendingReview;
                    }
                    Ok(Err(error)) => {
                        tracing::warn!(
                            event_id = ctx.event.id,
                            error = %error,
                            "external lookup failed, pending review"
                        );
                        ctx.status = PrincipalStatus::PendingReview;
                    }
                    Err(_) => {
                        tracing::warn!(
                            event_id = ctx.event.id,
                            timeout_secs = config.timeout_secs,
                            "external lookup timed out, pending review"
                        );
                        ctx.status = PrincipalStatus::PendingReview;
                    }
                }
                Ok(PipeOutcome::Continue)
            }

            RegisterPipe::CheckCaptcha => {
                let challenge = ctx.field_str("captcha_id").map(str::to_owned);
                let answer = ctx.field_str("captcha").map(str::to_owned);
                let (Some(challenge), Some(answer)) = (challenge, answer) else {
                    return Ok(PipeOutcome::Reject(Rejection::new(
                        keys::INVALID_CAPTCHA,
                        "captcha answer required",
                    )));
                };
                let solved = deps
                    .captcha
                    .verify(&challenge, &answer)
                    .await
                    .map_err(|e| ServiceError::ExternalUnavailable(e.to_string()))?;
                if solved {
                    Ok(PipeOutcome::Continue)
                } else {
                    Ok(PipeOutcome::Reject(Rejection::new(
                        keys::INVALID_CAPTCHA,
                        "captcha answer is wrong",
                    )))
                }
            }

            RegisterPipe::CheckAllowed(config) => {
                match list_value(ctx, deps, &config.field) {
                    Some(value) if config.values.contains(&value) => {
                        Ok(PipeOutcome::StopChain)
                    }
                    _ => Ok(PipeOutcome::Continue),
                }
            }

            RegisterPipe::CheckDenied(config) => match list_value(ctx, deps, &config.field) {
                Some(value) if config.values.contains(&value) => {
                    Ok(PipeOutcome::Reject(Rejection::new(
                        keys::DENIED,
                        format!("field {} is denied from registering", config.field),
                    )))
                }
                _ => Ok(PipeOutcome::Continue),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_step_rejected_at_build() {
        let err = RegisterPipe::build("check_everything", &Value::Null).unwrap_err();
        assert!(matches!(err, ServiceError::ConfigInvalid(_)));
    }

    #[test]
    fn test_config_contract_checked_at_build() {
        // unknown key
        let err =
            RegisterPipe::build("external_lookup", &json!({"field": "dni", "boo": 1}))
                .unwrap_err();
        assert!(matches!(err, ServiceError::ConfigInvalid(_)));

        // out-of-range timeout
        let err = RegisterPipe::build(
            "external_lookup",
            &json!({"field": "dni", "timeout_secs": 0}),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::ConfigInvalid(_)));

        // config where none is allowed
        let err = RegisterPipe::build("check_fields", &json!({"x": 1})).unwrap_err();
        assert!(matches!(err, ServiceError::ConfigInvalid(_)));
    }

    #[test]
    fn test_registry_is_closed() {
        let names = known_step_names();
        assert!(names.contains(&"check_fields"));
        assert!(names.contains(&"check_uniqueness"));
        assert!(names.contains(&"external_lookup"));
        assert_eq!(names.len(), 7);
    }

    #[test]
    fn test_defaults_applied() {
        let pipe = RegisterPipe::build("check_id_number", &Value::Null).unwrap();
        match pipe {
            RegisterPipe::CheckIdNumber(config) => assert_eq!(config.field, "dni"),
            _ => panic!("wrong variant"),
        }
    }
}
