//! Test helper module for auth-engine integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{Map, Value};

use auth_engine::config::EngineConfig;
use auth_engine::models::{
    AuthEvent, AuthMethod, Census, EventStatus, NewAuthEvent, NewPrincipal, Principal,
};
use auth_engine::services::captcha::CaptchaVerifier;
use auth_engine::services::lookup::{ExternalLookup, LookupOutcome};
use auth_engine::services::notify::{Channel, Notifier, RenderedMessage};
use auth_engine::store::{CodeStore, EventStore, MemoryStore, PrincipalStore};
use auth_engine::Engine;

pub const TEST_SECRET: &str = "integration-test-secret";
pub const CAPTCHA_ANSWER: &str = "a1b2c3";

/// Notifier that records every dispatched message.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(Channel, i64, RenderedMessage)>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_body(&self) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .last()
            .map(|(_, _, m)| m.body.clone())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        channel: Channel,
        principal: &Principal,
        message: &RenderedMessage,
    ) -> Result<(), anyhow::Error> {
        self.sent
            .lock()
            .unwrap()
            .push((channel, principal.id, message.clone()));
        Ok(())
    }
}

/// Scripted external lookup behaviors.
pub enum LookupScript {
    Valid(Map<String, Value>),
    Invalid,
    Error,
    Hang,
}

pub struct ScriptedLookup {
    pub script: LookupScript,
}

#[async_trait]
impl ExternalLookup for ScriptedLookup {
    async fn lookup(&self, _identifier: &str) -> Result<LookupOutcome, anyhow::Error> {
        match &self.script {
            LookupScript::Valid(data) => Ok(LookupOutcome {
                valid: true,
                data: data.clone(),
            }),
            LookupScript::Invalid => Ok(LookupOutcome {
                valid: false,
                data: Map::new(),
            }),
            LookupScript::Error => Err(anyhow::anyhow!("lookup backend down")),
            LookupScript::Hang => {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                unreachable!("sleep outlives every test timeout")
            }
        }
    }
}

/// Captcha that accepts exactly one answer.
pub struct StaticCaptcha;

#[async_trait]
impl CaptchaVerifier for StaticCaptcha {
    async fn verify(&self, _challenge_id: &str, submitted: &str) -> Result<bool, anyhow::Error> {
        Ok(submitted == CAPTCHA_ANSWER)
    }
}

/// Engine over the in-memory store with recording/mock collaborators.
pub struct TestApp {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_lookup(LookupScript::Valid(Map::new()))
    }

    pub fn with_lookup(script: LookupScript) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let config = EngineConfig::with_secret(SecretString::new(TEST_SECRET.to_string()));
        let engine = Engine::new(
            config,
            Arc::clone(&store) as Arc<dyn PrincipalStore>,
            Arc::clone(&store) as Arc<dyn EventStore>,
            Arc::clone(&store) as _,
            Arc::clone(&store) as _,
            Arc::clone(&notifier) as _,
            Arc::new(ScriptedLookup { script }) as _,
            Arc::new(StaticCaptcha) as _,
        );
        Self {
            engine,
            store,
            notifier,
        }
    }

    /// Insert an event directly through the store, bypassing admin checks.
    pub async fn make_event(
        &self,
        method: AuthMethod,
        status: EventStatus,
        census: Census,
        mutate: impl FnOnce(&mut NewAuthEvent),
    ) -> AuthEvent {
        let mut new = NewAuthEvent::with_defaults(method, census);
        new.status = status;
        mutate(&mut new);
        let events: &Arc<MemoryStore> = &self.store;
        EventStore::create(events.as_ref(), new).await.unwrap()
    }

    pub async fn started_event(&self, method: AuthMethod) -> AuthEvent {
        self.make_event(method, EventStatus::Started, Census::Open, |_| {})
            .await
    }

    /// System principal with full superuser rights.
    pub async fn superadmin(&self) -> Principal {
        PrincipalStore::create(
            self.store.as_ref(),
            NewPrincipal {
                username: Some("root".to_string()),
                superuser: true,
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    /// Plain principal with no grants at all.
    pub async fn plain_user(&self, username: &str) -> Principal {
        PrincipalStore::create(
            self.store.as_ref(),
            NewPrincipal {
                username: Some(username.to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    /// The current (latest) code value for a pair, straight from the store.
    pub async fn current_code(&self, principal_id: i64, event_id: i64) -> String {
        CodeStore::current_code(self.store.as_ref(), principal_id, event_id)
            .await
            .unwrap()
            .expect("no code issued")
            .code
    }
}

/// Build a fields map from a JSON object literal.
pub fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("fields must be an object")
}
