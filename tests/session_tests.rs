//! Tests for session listing, logout, logout-all, and expiry sweeping.
//!
//! Tests cover:
//! - GET /sessions shape: live sessions only, no token material
//! - Logout of a named session, idempotency, and the no-body form
//! - Logout-all revoking every session and cutting off live access tokens
//! - The expired-session sweep

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::*;
use gatewarden::revocation;
use serde_json::json;
use tower::ServiceExt;

fn authed_json_post(uri: &str, access_token: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed_empty_post(uri: &str, access_token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
        .body(Body::empty())
        .unwrap()
}

/// Insert a session row that expired an hour ago, bypassing the store.
async fn insert_expired_session(db: &gatewarden::db::Database, user_id: i64, token: &str) {
    sqlx::query(
        "INSERT INTO sessions (user_id, refresh_token, expires_at)
         VALUES (?, ?, datetime('now', '-1 hour'))",
    )
    .bind(user_id)
    .bind(token)
    .execute(db.pool())
    .await
    .unwrap();
}

// =============================================================================
// Session Listing Tests
// =============================================================================

#[tokio::test]
async fn test_sessions_lists_live_sessions_without_tokens() {
    let (app, _, _) = create_test_app().await;
    let registered = register(&app, "alice", "alice@example.com", "password123").await;
    let logged_in = login(&app, "alice@example.com", "password123").await;

    let response = app
        .oneshot(authed_get(
            "/api/auth/sessions",
            logged_in["accessToken"].as_str().unwrap(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);

    // Newest first.
    assert!(sessions[0]["id"].as_i64().unwrap() > sessions[1]["id"].as_i64().unwrap());

    for session in sessions {
        assert!(session["id"].as_i64().is_some());
        assert!(session["createdAt"].as_str().unwrap().ends_with('Z'));
        assert!(session["expiresAt"].as_str().unwrap().ends_with('Z'));
        assert!(session.get("refreshToken").is_none());
    }

    // Token values must never appear anywhere in the response.
    let raw = body.to_string();
    assert!(!raw.contains(registered["refreshToken"].as_str().unwrap()));
    assert!(!raw.contains(logged_in["refreshToken"].as_str().unwrap()));
}

#[tokio::test]
async fn test_sessions_excludes_expired() {
    let (app, db, issuer) = create_test_app().await;
    let user_id = seed_user(&db, "alice", "alice@example.com", "password123").await;
    let pair = issue_session(&db, &issuer, user_id).await;
    insert_expired_session(&db, user_id, "stale-token").await;

    let response = app
        .oneshot(authed_get("/api/auth/sessions", &pair.access_token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["sessions"].as_array().unwrap().len(), 1);
}

// =============================================================================
// Logout Tests
// =============================================================================

#[tokio::test]
async fn test_logout_removes_named_session() {
    let (app, db, _) = create_test_app().await;
    let registered = register(&app, "alice", "alice@example.com", "password123").await;
    let logged_in = login(&app, "alice@example.com", "password123").await;
    let kept = registered["refreshToken"].as_str().unwrap();
    let dropped = logged_in["refreshToken"].as_str().unwrap();

    let response = app
        .oneshot(authed_json_post(
            "/api/auth/logout",
            registered["accessToken"].as_str().unwrap(),
            json!({ "refreshToken": dropped }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);

    assert!(db.sessions().find_by_token(dropped).await.unwrap().is_none());
    assert!(db.sessions().find_by_token(kept).await.unwrap().is_some());
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let (app, _, _) = create_test_app().await;
    let registered = register(&app, "alice", "alice@example.com", "password123").await;
    // Keep a second session alive so the caller stays authenticated.
    let logged_in = login(&app, "alice@example.com", "password123").await;
    let access = logged_in["accessToken"].as_str().unwrap();
    let target = registered["refreshToken"].as_str().unwrap();

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(authed_json_post(
                "/api/auth/logout",
                access,
                json!({ "refreshToken": target }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
    }
}

#[tokio::test]
async fn test_logout_without_body_is_a_no_op() {
    let (app, db, issuer) = create_test_app().await;
    let user_id = seed_user(&db, "alice", "alice@example.com", "password123").await;
    let pair = issue_session(&db, &issuer, user_id).await;

    let response = app
        .oneshot(authed_empty_post("/api/auth/logout", &pair.access_token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);

    let sessions = db.sessions().list_valid_by_user(user_id).await.unwrap();
    assert_eq!(sessions.len(), 1);
}

#[tokio::test]
async fn test_logout_requires_authentication() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .oneshot(json_post(
            "/api/auth/logout",
            json!({ "refreshToken": "whatever" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(error_code(&body), "MISSING_TOKEN");
}

// =============================================================================
// Logout-All Tests
// =============================================================================

#[tokio::test]
async fn test_logout_all_revokes_every_session() {
    let (app, db, _) = create_test_app().await;
    let registered = register(&app, "alice", "alice@example.com", "password123").await;
    login(&app, "alice@example.com", "password123").await;
    login(&app, "alice@example.com", "password123").await;

    let access = registered["accessToken"].as_str().unwrap();
    let user_id = registered["identity"]["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(authed_empty_post("/api/auth/logout-all", access))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["revoked"], 3);

    let sessions = db.sessions().list_valid_by_user(user_id).await.unwrap();
    assert!(sessions.is_empty());

    // Every refresh token died with its session.
    let response = app
        .clone()
        .oneshot(json_post(
            "/api/auth/refresh",
            json!({ "refreshToken": registered["refreshToken"].as_str().unwrap() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(error_code(&body), "REFRESH_TOKEN_EXPIRED");

    // The caller's still-unexpired access token is cut off too.
    let response = app
        .oneshot(authed_get("/api/auth/me", access))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(error_code(&body), "SESSION_EXPIRED");
}

#[tokio::test]
async fn test_revoke_all_reports_zero_when_nothing_live() {
    let (_, db, _) = create_test_app().await;
    let user_id = seed_user(&db, "alice", "alice@example.com", "password123").await;

    let revoked = revocation::revoke_all(&db, user_id).await.unwrap();
    assert_eq!(revoked, 0);
}

// =============================================================================
// Sweep Tests
// =============================================================================

#[tokio::test]
async fn test_sweep_removes_only_expired_sessions() {
    let (_, db, issuer) = create_test_app().await;
    let user_id = seed_user(&db, "alice", "alice@example.com", "password123").await;
    let pair = issue_session(&db, &issuer, user_id).await;
    insert_expired_session(&db, user_id, "stale-token-1").await;
    insert_expired_session(&db, user_id, "stale-token-2").await;

    revocation::run_sweep(&db, &[]).await;

    assert!(
        db.sessions()
            .find_by_token("stale-token-1")
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        db.sessions()
            .find_by_token("stale-token-2")
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        db.sessions()
            .find_by_token(&pair.refresh_token)
            .await
            .unwrap()
            .is_some()
    );

    // Sweeping an already swept store is a no-op.
    let removed = db.sessions().delete_expired().await.unwrap();
    assert_eq!(removed, 0);
}
