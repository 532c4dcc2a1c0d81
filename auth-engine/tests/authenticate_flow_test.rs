//! Authentication: code and password verification, census grant, token mint.

mod common;

use std::time::Duration;

use auth_engine::models::{AuthMethod, Census, EventStatus, FieldDescriptor, FieldType};
use auth_engine::services::ServiceError;
use common::{fields, TestApp};
use serde_json::json;

fn name_field() -> FieldDescriptor {
    FieldDescriptor {
        name: "name".to_string(),
        field_type: FieldType::Text,
        required: true,
        required_on_authentication: true,
        min: None,
        max: None,
        unique: false,
    }
}

#[tokio::test]
async fn email_code_authentication_mints_token_and_grants_vote() {
    let app = TestApp::spawn();
    let event = app.started_event(AuthMethod::Email).await;

    let registered = app
        .engine
        .flow
        .register(event.id, fields(json!({"email": "voter@example.com"})))
        .await
        .unwrap();
    let code = app.current_code(registered.principal_id, event.id).await;

    let outcome = app
        .engine
        .flow
        .authenticate(
            event.id,
            fields(json!({"email": "voter@example.com", "code": code})),
        )
        .await
        .unwrap();

    assert!(app
        .engine
        .codec
        .verify(&outcome.auth_token, Some(Duration::from_secs(300))));

    let principal = app
        .engine
        .principals
        .get(outcome.principal_id)
        .await
        .unwrap()
        .unwrap();
    assert!(app
        .engine
        .perms
        .has_perm(&principal, "AuthEvent", "vote", event.id)
        .await
        .unwrap());
}

#[tokio::test]
async fn consumed_code_cannot_authenticate_again() {
    let app = TestApp::spawn();
    let event = app.started_event(AuthMethod::Email).await;

    let registered = app
        .engine
        .flow
        .register(event.id, fields(json!({"email": "voter@example.com"})))
        .await
        .unwrap();
    let code = app.current_code(registered.principal_id, event.id).await;
    let credentials = fields(json!({"email": "voter@example.com", "code": code}));

    app.engine
        .flow
        .authenticate(event.id, credentials.clone())
        .await
        .unwrap();

    let err = app
        .engine
        .flow
        .authenticate(event.id, credentials)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidCredentials));
}

#[tokio::test]
async fn wrong_code_and_unknown_principal_are_uniform_failures() {
    let app = TestApp::spawn();
    let event = app.started_event(AuthMethod::Email).await;

    app.engine
        .flow
        .register(event.id, fields(json!({"email": "voter@example.com"})))
        .await
        .unwrap();

    let wrong_code = app
        .engine
        .flow
        .authenticate(
            event.id,
            fields(json!({"email": "voter@example.com", "code": "000000"})),
        )
        .await
        .unwrap_err();
    let unknown = app
        .engine
        .flow
        .authenticate(
            event.id,
            fields(json!({"email": "nobody@example.com", "code": "000000"})),
        )
        .await
        .unwrap_err();

    assert_eq!(wrong_code.codename(), "invalid_credentials");
    assert_eq!(unknown.codename(), "invalid_credentials");
}

#[tokio::test]
async fn authentication_allowed_while_event_stopped() {
    // the admission table closes registration, not authentication
    let app = TestApp::spawn();
    let event = app.started_event(AuthMethod::Email).await;

    let registered = app
        .engine
        .flow
        .register(event.id, fields(json!({"email": "voter@example.com"})))
        .await
        .unwrap();
    let code = app.current_code(registered.principal_id, event.id).await;

    let admin = app.superadmin().await;
    app.engine
        .admin
        .set_status(&admin, event.id, EventStatus::Stopped)
        .await
        .unwrap();

    assert!(app
        .engine
        .flow
        .authenticate(
            event.id,
            fields(json!({"email": "voter@example.com", "code": code})),
        )
        .await
        .is_ok());
}

#[tokio::test]
async fn required_on_authentication_fields_must_match_registration() {
    let app = TestApp::spawn();
    let event = app
        .make_event(
            AuthMethod::Email,
            EventStatus::Started,
            Census::Open,
            |new| new.extra_fields = vec![name_field()],
        )
        .await;

    let registered = app
        .engine
        .flow
        .register(
            event.id,
            fields(json!({"email": "voter@example.com", "name": "Ada"})),
        )
        .await
        .unwrap();
    let code = app.current_code(registered.principal_id, event.id).await;

    let mismatch = app
        .engine
        .flow
        .authenticate(
            event.id,
            fields(json!({"email": "voter@example.com", "code": code, "name": "Eve"})),
        )
        .await
        .unwrap_err();
    assert!(matches!(mismatch, ServiceError::InvalidCredentials));

    // the failed attempt did not consume the code
    assert!(app
        .engine
        .flow
        .authenticate(
            event.id,
            fields(json!({"email": "voter@example.com", "code": code, "name": "Ada"})),
        )
        .await
        .is_ok());
}

#[tokio::test]
async fn password_authentication_verifies_stored_hash() {
    let app = TestApp::spawn();
    let event = app.started_event(AuthMethod::Password).await;

    app.engine
        .flow
        .register(
            event.id,
            fields(json!({"username": "alice", "password": "wonderland9"})),
        )
        .await
        .unwrap();

    let ok = app
        .engine
        .flow
        .authenticate(
            event.id,
            fields(json!({"username": "alice", "password": "wonderland9"})),
        )
        .await
        .unwrap();
    assert_eq!(ok.username, "alice");

    let err = app
        .engine
        .flow
        .authenticate(
            event.id,
            fields(json!({"username": "alice", "password": "queen-of-hearts"})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidCredentials));
}

#[tokio::test]
async fn vote_grant_is_not_duplicated() {
    let app = TestApp::spawn();
    let event = app.started_event(AuthMethod::Email).await;

    let registered = app
        .engine
        .flow
        .register(event.id, fields(json!({"email": "voter@example.com"})))
        .await
        .unwrap();

    for _ in 0..2 {
        let code = app.current_code(registered.principal_id, event.id).await;
        app.engine
            .flow
            .authenticate(
                event.id,
                fields(json!({"email": "voter@example.com", "code": code})),
            )
            .await
            .unwrap();
        // fresh code for the next round
        let _ = app
            .engine
            .flow
            .resend_code(event.id, fields(json!({"email": "voter@example.com"})))
            .await;
    }

    let grants = app
        .engine
        .perms
        .list_for(
            registered.principal_id,
            &auth_engine::services::AclFilter {
                object_type: Some("AuthEvent".to_string()),
                perm: Some("vote".to_string()),
                object_id: Some(event.id),
            },
            auth_engine::services::PageParams::default(),
        )
        .await
        .unwrap();
    assert_eq!(grants.total, 1);
}
