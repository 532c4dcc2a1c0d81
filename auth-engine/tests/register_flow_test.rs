//! Registration admission, dedup, and per-method outcomes.

mod common;

use std::time::Duration;

use auth_engine::models::{AuthMethod, Census, EventStatus, PrincipalStatus};
use auth_engine::services::ServiceError;
use common::{fields, TestApp};
use serde_json::json;

#[tokio::test]
async fn email_register_issues_code_and_notifies() {
    let app = TestApp::spawn();
    let event = app.started_event(AuthMethod::Email).await;

    let outcome = app
        .engine
        .flow
        .register(event.id, fields(json!({"email": "voter@example.com"})))
        .await
        .unwrap();

    assert_eq!(outcome.status, PrincipalStatus::Active);
    assert!(outcome.code_sent);
    assert!(outcome.auth_token.is_none());

    // notification is dispatched on a spawned task
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(app.notifier.count(), 1);
    let code = app.current_code(outcome.principal_id, event.id).await;
    assert!(app.notifier.last_body().unwrap().contains(&code));
}

#[tokio::test]
async fn register_rejected_when_census_close() {
    let app = TestApp::spawn();
    // census close rejects regardless of status
    for status in [EventStatus::NotStarted, EventStatus::Started, EventStatus::Stopped] {
        let event = app
            .make_event(AuthMethod::Email, status, Census::Close, |_| {})
            .await;
        let err = app
            .engine
            .flow
            .register(event.id, fields(json!({"email": "voter@example.com"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RegistrationClosed), "{:?}", status);
    }
}

#[tokio::test]
async fn register_rejected_when_event_not_started() {
    let app = TestApp::spawn();
    for status in [EventStatus::NotStarted, EventStatus::Stopped] {
        let event = app
            .make_event(AuthMethod::Email, status, Census::Open, |_| {})
            .await;
        let err = app
            .engine
            .flow
            .register(event.id, fields(json!({"email": "voter@example.com"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EventNotStarted), "{:?}", status);
    }
}

#[tokio::test]
async fn register_succeeds_when_open_and_started() {
    let app = TestApp::spawn();
    let event = app.started_event(AuthMethod::Email).await;
    assert!(app
        .engine
        .flow
        .register(event.id, fields(json!({"email": "voter@example.com"})))
        .await
        .is_ok());
}

#[tokio::test]
async fn duplicate_email_rejected() {
    let app = TestApp::spawn();
    let event = app.started_event(AuthMethod::Email).await;

    let request = fields(json!({"email": "voter@example.com"}));
    app.engine.flow.register(event.id, request.clone()).await.unwrap();

    let err = app.engine.flow.register(event.id, request).await.unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateValue { ref field, .. } if field == "email"));
}

#[tokio::test]
async fn duplicate_canonical_phone_rejected_for_every_prefix_form() {
    let app = TestApp::spawn();
    let event = app.started_event(AuthMethod::Sms).await;

    app.engine
        .flow
        .register(event.id, fields(json!({"tlf": "666666667"})))
        .await
        .unwrap();

    for raw in ["0034666666667", "+34666666667", "666666667"] {
        let err = app
            .engine
            .flow
            .register(event.id, fields(json!({"tlf": raw})))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ServiceError::DuplicateValue { ref field, .. } if field == "tlf"),
            "prefix form {} must collide",
            raw
        );
    }
}

#[tokio::test]
async fn password_register_returns_token_directly() {
    let app = TestApp::spawn();
    let event = app.started_event(AuthMethod::Password).await;

    let outcome = app
        .engine
        .flow
        .register(
            event.id,
            fields(json!({"username": "alice", "password": "wonderland9"})),
        )
        .await
        .unwrap();

    assert!(!outcome.code_sent);
    let token = outcome.auth_token.expect("password method mints a token");
    assert!(token.starts_with("khmac:///sha-256"));
    assert!(app.engine.codec.verify(&token, Some(Duration::from_secs(300))));
    assert_eq!(
        app.engine.codec.message_of(&token, None).unwrap(),
        "alice"
    );
}

#[tokio::test]
async fn register_for_unknown_event_is_not_found() {
    let app = TestApp::spawn();
    let err = app
        .engine
        .flow
        .register(999, fields(json!({"email": "voter@example.com"})))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn reply_envelope_carries_codename_and_context() {
    let app = TestApp::spawn();
    let event = app
        .make_event(AuthMethod::Email, EventStatus::Started, Census::Close, |_| {})
        .await;

    let reply = app
        .engine
        .flow
        .register_reply(event.id, fields(json!({"email": "voter@example.com"})))
        .await;

    assert!(!reply.ok);
    assert_eq!(reply.error_codename.as_deref(), Some("registration_closed"));
    assert!(reply.error_context.is_some());
    assert!(reply.payload.is_none());
}
