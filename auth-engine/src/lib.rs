//! auth-engine: authentication and authorization engine for election auth
//! events.
//!
//! The engine issues and verifies keyed-HMAC bearer tokens, governs access
//! through ACL grants, drives register/authenticate through configurable
//! validation pipelines, and runs the one-time-code challenge flow with
//! durable send limits. Persistence, message transport, captcha and external
//! verification are collaborators behind traits in [`store`] and
//! [`services`]; an in-memory backend ships for tests and single-process
//! embedding.

pub mod config;
pub mod models;
pub mod pipes;
pub mod services;
pub mod store;
pub mod utils;

use std::sync::Arc;

use pipes::PipeDeps;
use services::captcha::CaptchaVerifier;
use services::lookup::ExternalLookup;
use services::notify::Notifier;
use store::{AclStore, CodeStore, EventStore, MemoryStore, PrincipalStore};

pub use config::EngineConfig;
pub use services::{
    AdminService, AuthFlow, AuthReply, CodeService, PermissionService, ServiceError, TokenCodec,
};

/// Fully wired engine: the four flow operations plus the admin surface,
/// sharing one set of stores and collaborators.
#[derive(Clone)]
pub struct Engine {
    pub config: EngineConfig,
    pub codec: TokenCodec,
    pub perms: PermissionService,
    pub codes: CodeService,
    pub flow: AuthFlow,
    pub admin: AdminService,
    pub principals: Arc<dyn PrincipalStore>,
    pub events: Arc<dyn EventStore>,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        principals: Arc<dyn PrincipalStore>,
        events: Arc<dyn EventStore>,
        acls: Arc<dyn AclStore>,
        code_store: Arc<dyn CodeStore>,
        notifier: Arc<dyn Notifier>,
        lookup: Arc<dyn ExternalLookup>,
        captcha: Arc<dyn CaptchaVerifier>,
    ) -> Self {
        let codec = TokenCodec::new(config.shared_secret.clone());
        let perms = PermissionService::new(acls);
        let codes = CodeService::new(code_store, config.code_length);
        let pipe_deps = PipeDeps {
            principals: Arc::clone(&principals),
            lookup,
            captcha,
            phone: config.phone.clone(),
        };
        let flow = AuthFlow::new(
            config.clone(),
            Arc::clone(&principals),
            Arc::clone(&events),
            codec.clone(),
            perms.clone(),
            codes.clone(),
            Arc::clone(&notifier),
            pipe_deps,
        );
        let admin = AdminService::new(
            config.clone(),
            Arc::clone(&principals),
            Arc::clone(&events),
            perms.clone(),
            codes.clone(),
            notifier,
        );
        Self {
            config,
            codec,
            perms,
            codes,
            flow,
            admin,
            principals,
            events,
        }
    }

    /// Engine over the in-memory backend.
    pub fn in_memory(
        config: EngineConfig,
        notifier: Arc<dyn Notifier>,
        lookup: Arc<dyn ExternalLookup>,
        captcha: Arc<dyn CaptchaVerifier>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(
            config,
            Arc::clone(&store) as Arc<dyn PrincipalStore>,
            Arc::clone(&store) as Arc<dyn EventStore>,
            Arc::clone(&store) as Arc<dyn AclStore>,
            store as Arc<dyn CodeStore>,
            notifier,
            lookup,
            captcha,
        )
    }
}
