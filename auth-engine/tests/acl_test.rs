//! Permission store semantics: wildcards, revocation, listing, tokens.

mod common;

use auth_engine::services::{AclFilter, PageParams, ServiceError};
use common::TestApp;

#[tokio::test]
async fn wildcard_grant_matches_any_object_id() {
    let app = TestApp::spawn();
    let user = app.plain_user("carol").await;

    app.engine
        .perms
        .grant(user.id, "AuthEvent", "edit", 0)
        .await
        .unwrap();

    for object_id in [0, 1, 42] {
        assert!(app
            .engine
            .perms
            .has_perm(&user, "AuthEvent", "edit", object_id)
            .await
            .unwrap());
    }
    assert!(!app
        .engine
        .perms
        .has_perm(&user, "AuthEvent", "delete", 42)
        .await
        .unwrap());
    assert!(!app
        .engine
        .perms
        .has_perm(&user, "UserData", "edit", 42)
        .await
        .unwrap());
}

#[tokio::test]
async fn wildcard_query_matches_specific_grant() {
    let app = TestApp::spawn();
    let user = app.plain_user("carol").await;

    app.engine
        .perms
        .grant(user.id, "AuthEvent", "edit", 7)
        .await
        .unwrap();

    // querying object id 0 is satisfied by any grant of the pair
    assert!(app
        .engine
        .perms
        .has_perm(&user, "AuthEvent", "edit", 0)
        .await
        .unwrap());
    assert!(!app
        .engine
        .perms
        .has_perm(&user, "AuthEvent", "edit", 8)
        .await
        .unwrap());
}

#[tokio::test]
async fn superuser_bypasses_checks() {
    let app = TestApp::spawn();
    let root = app.superadmin().await;
    assert!(app
        .engine
        .perms
        .has_perm(&root, "Anything", "whatsoever", 123)
        .await
        .unwrap());
}

#[tokio::test]
async fn duplicate_grants_are_stored_but_idempotent_in_effect() {
    let app = TestApp::spawn();
    let user = app.plain_user("carol").await;

    for _ in 0..3 {
        app.engine
            .perms
            .grant(user.id, "AuthEvent", "vote", 5)
            .await
            .unwrap();
    }

    assert!(app
        .engine
        .perms
        .has_perm(&user, "AuthEvent", "vote", 5)
        .await
        .unwrap());
    let page = app
        .engine
        .perms
        .list_for(user.id, &AclFilter::default(), PageParams::default())
        .await
        .unwrap();
    assert_eq!(page.total, 3);

    // revoke deletes every matching record and reports the count
    let deleted = app
        .engine
        .perms
        .revoke_matching(user.id, "AuthEvent", "vote", 5)
        .await
        .unwrap();
    assert_eq!(deleted, 3);
    // revoking again is not an error
    assert_eq!(
        app.engine
            .perms
            .revoke_matching(user.id, "AuthEvent", "vote", 5)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn listing_filters_and_paginates() {
    let app = TestApp::spawn();
    let user = app.plain_user("carol").await;

    for object_id in 1..=4 {
        app.engine
            .perms
            .grant(user.id, "AuthEvent", "edit", object_id)
            .await
            .unwrap();
    }
    for object_id in 1..=3 {
        app.engine
            .perms
            .grant(user.id, "ACL", "view", object_id)
            .await
            .unwrap();
    }

    let all = app
        .engine
        .perms
        .list_for(user.id, &AclFilter::default(), PageParams::default())
        .await
        .unwrap();
    assert_eq!(all.total, 7);

    let acl_only = app
        .engine
        .perms
        .list_for(
            user.id,
            &AclFilter {
                object_type: Some("ACL".to_string()),
                ..Default::default()
            },
            PageParams::default(),
        )
        .await
        .unwrap();
    assert_eq!(acl_only.total, 3);

    let page2 = app
        .engine
        .perms
        .list_for(user.id, &AclFilter::default(), PageParams::new(2, 5))
        .await
        .unwrap();
    assert_eq!(page2.items.len(), 2);

    // unparsable raw params silently fall back
    let fallback = app
        .engine
        .perms
        .list_for(
            user.id,
            &AclFilter::default(),
            PageParams::from_raw(Some("x"), Some("x")),
        )
        .await
        .unwrap();
    assert_eq!(fallback.items.len(), 7);
}

#[tokio::test]
async fn permission_token_binds_the_exact_claim() {
    let app = TestApp::spawn();
    let user = app.plain_user("carol").await;
    app.engine
        .perms
        .grant(user.id, "AuthEvent", "edit", 7)
        .await
        .unwrap();

    let outcome = app
        .engine
        .flow
        .check_permission(user.id, "AuthEvent", "edit", 7)
        .await
        .unwrap();
    assert!(app.engine.codec.verify(&outcome.permission_token, None));
    assert_eq!(
        app.engine
            .codec
            .message_of(&outcome.permission_token, None)
            .unwrap(),
        "carol:AuthEvent:7:edit"
    );
}

#[tokio::test]
async fn check_permission_forbidden_is_distinct_from_not_found() {
    let app = TestApp::spawn();
    let user = app.plain_user("carol").await;

    let forbidden = app
        .engine
        .flow
        .check_permission(user.id, "AuthEvent", "edit", 7)
        .await
        .unwrap_err();
    assert!(matches!(forbidden, ServiceError::Forbidden(_)));

    let missing = app
        .engine
        .flow
        .check_permission(9999, "AuthEvent", "edit", 7)
        .await
        .unwrap_err();
    assert!(matches!(missing, ServiceError::NotFound(_)));

    let reply = app
        .engine
        .flow
        .check_permission_reply(user.id, "AuthEvent", "edit", 7)
        .await;
    assert!(!reply.ok);
    assert_eq!(reply.error_codename.as_deref(), Some("forbidden"));
}

#[tokio::test]
async fn cascade_revocation_with_holder_removal() {
    let app = TestApp::spawn();
    let user = app.plain_user("carol").await;
    app.engine
        .perms
        .grant(user.id, "AuthEvent", "vote", 1)
        .await
        .unwrap();
    app.engine
        .perms
        .grant(user.id, "ACL", "view", 0)
        .await
        .unwrap();

    let removed = app.engine.perms.revoke_all_for(user.id).await.unwrap();
    assert_eq!(removed, 2);
    let page = app
        .engine
        .perms
        .list_for(user.id, &AclFilter::default(), PageParams::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}
