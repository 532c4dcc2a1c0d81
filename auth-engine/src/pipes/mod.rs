//! Pipeline engine.
//!
//! A pipeline is an ordered list of named steps resolved from a fixed
//! per-context registry (register steps and authenticate steps are separate
//! registries; a name valid in one is not automatically valid in the other).
//! Building a pipeline parses and validates every step configuration before
//! anything runs, so a misconfigured pipeline fails as `ConfigInvalid` with
//! zero side effects. Steps communicate forward only by mutating the
//! execution context.

pub mod authenticate;
pub mod fields;
pub mod register;

pub use authenticate::AuthenticatePipe;
pub use register::RegisterPipe;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::models::{AuthEvent, PipeSpec, Principal, PrincipalStatus};
use crate::services::captcha::CaptchaVerifier;
use crate::services::error::ServiceError;
use crate::services::lookup::ExternalLookup;
use crate::store::PrincipalStore;
use crate::utils::PhoneConfig;

/// Machine-readable rejection reason keys used by the built-in steps.
pub mod keys {
    pub const INVALID_FIELDS: &str = "invalid_fields";
    pub const DUPLICATE_VALUE: &str = "duplicate_value";
    pub const INVALID_ID_NUMBER: &str = "invalid_id_number";
    pub const INVALID_CAPTCHA: &str = "invalid_captcha";
    pub const DENIED: &str = "denied";
}

/// A step's reason for aborting the operation.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub key: String,
    pub context: String,
}

impl Rejection {
    pub fn new(key: &str, context: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            context: context.into(),
        }
    }
}

/// Outcome of one step.
#[derive(Debug)]
pub enum PipeOutcome {
    /// Proceed to the next step.
    Continue,
    /// Definitive accept; later steps are skipped.
    StopChain,
    /// Abort the whole operation.
    Reject(Rejection),
}

/// Mutable state threaded through a pipeline run.
#[derive(Debug)]
pub struct ExecContext {
    pub event: AuthEvent,
    /// Inbound request fields. Steps may normalize values in place.
    pub fields: Map<String, Value>,
    /// Resolved principal, present when authenticating an existing one.
    pub principal: Option<Principal>,
    /// Status the principal will be created with; steps downgrade this to
    /// `PendingReview` instead of rejecting when an external check is
    /// inconclusive.
    pub status: PrincipalStatus,
    /// Metadata attached by steps, merged into the principal on success.
    pub annotations: Map<String, Value>,
    /// Step-to-step scratch space.
    pub scratch: HashMap<String, Value>,
}

impl ExecContext {
    pub fn new(event: AuthEvent, fields: Map<String, Value>) -> Self {
        Self {
            event,
            fields,
            principal: None,
            status: PrincipalStatus::Active,
            annotations: Map::new(),
            scratch: HashMap::new(),
        }
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

/// Collaborators available to steps.
#[derive(Clone)]
pub struct PipeDeps {
    pub principals: Arc<dyn PrincipalStore>,
    pub lookup: Arc<dyn ExternalLookup>,
    pub captcha: Arc<dyn CaptchaVerifier>,
    pub phone: PhoneConfig,
}

/// A validated, executable pipeline step.
#[async_trait]
pub trait Pipe: Sized + Send + Sync {
    /// Registry context name, for diagnostics.
    const CONTEXT: &'static str;

    /// Resolve a step name and validate its configuration. Unknown names and
    /// contract violations fail here, before anything executes.
    fn build(name: &str, config: &Value) -> Result<Self, ServiceError>;

    async fn execute(
        &self,
        ctx: &mut ExecContext,
        deps: &PipeDeps,
    ) -> Result<PipeOutcome, ServiceError>;
}

/// An ordered, fully validated list of steps.
pub struct Pipeline<P> {
    steps: Vec<(String, P)>,
}

impl<P: Pipe> Pipeline<P> {
    /// Validate-then-run, phase one: every step config is checked against its
    /// contract before any step executes.
    pub fn build(specs: &[PipeSpec]) -> Result<Self, ServiceError> {
        let mut steps = Vec::with_capacity(specs.len());
        for spec in specs {
            let pipe = P::build(&spec.name, &spec.config)?;
            steps.push((spec.name.clone(), pipe));
        }
        Ok(Self { steps })
    }

    /// Phase two: execute in order. A `Reject` outcome becomes the
    /// operation's failure result without running later steps.
    pub async fn run(&self, ctx: &mut ExecContext, deps: &PipeDeps) -> Result<(), ServiceError> {
        for (name, pipe) in &self.steps {
            match pipe.execute(ctx, deps).await? {
                PipeOutcome::Continue => {}
                PipeOutcome::StopChain => {
                    tracing::debug!(context = P::CONTEXT, step = %name, "pipeline accepted early");
                    break;
                }
                PipeOutcome::Reject(rejection) => {
                    tracing::info!(
                        context = P::CONTEXT,
                        step = %name,
                        key = %rejection.key,
                        "pipeline rejected"
                    );
                    return Err(ServiceError::Rejected {
                        key: rejection.key,
                        context: rejection.context,
                    });
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn parse_step_config<T: DeserializeOwned>(
    context: &str,
    name: &str,
    config: &Value,
) -> Result<T, ServiceError> {
    // a missing config means "all defaults", same as an empty object
    let effective = if config.is_null() {
        Value::Object(Map::new())
    } else {
        config.clone()
    };
    serde_json::from_value(effective).map_err(|e| {
        ServiceError::ConfigInvalid(format!("{} step {}: {}", context, name, e))
    })
}

pub(crate) fn ensure_no_config(
    context: &str,
    name: &str,
    config: &Value,
) -> Result<(), ServiceError> {
    let empty_object = config.as_object().map(|o| o.is_empty()).unwrap_or(false);
    if config.is_null() || empty_object {
        Ok(())
    } else {
        Err(ServiceError::ConfigInvalid(format!(
            "{} step {} takes no configuration",
            context, name
        )))
    }
}
