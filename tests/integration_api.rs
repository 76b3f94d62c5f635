//! API Integration Tests
//!
//! The full router over in-memory collaborators. Nothing here needs a
//! database.

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{json, Value};
use welfare_members::domain::{MemberRecord, PaymentRequest, ADMIN_ROLE};
use welfare_members::profile::{FetchStatus, MatchOutcome};
use welfare_members::profile::memory::RecordingMatcher;
use rust_decimal_macros::dec;
use uuid::Uuid;

mod common;

use common::{get, member_record, post, test_app, test_app_with};

fn notification_titles(body: &Value) -> Vec<String> {
    body["notifications"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|n| n["title"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

// =========================================================================
// Sessions
// =========================================================================

#[tokio::test]
async fn test_health_check_sets_request_id() {
    let app = test_app();
    let response = tower::util::ServiceExt::oneshot(app.router.clone(), get("/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_profile_requires_session() {
    let app = test_app();

    let (status, body) = app.send(get("/api/v1/profile", None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "missing_session");
}

#[tokio::test]
async fn test_unknown_token_is_session_expired() {
    let app = test_app();

    let (status, body) = app.send(get("/api/v1/profile", Some("revoked"))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "session_expired");
    assert_eq!(notification_titles(&body), vec!["Session Expired"]);
    assert_eq!(app.store.member_query_count(), 0);
}

// =========================================================================
// GET /profile
// =========================================================================

#[tokio::test]
async fn test_profile_returns_member_aggregate() {
    let app = test_app();
    let principal = app.sign_in("token-1", Some("M0042"));
    app.store.link_member(principal.id, member_record("M0042"));
    app.store.assign_role(principal.id, "member");

    let (status, body) = app.send(get("/api/v1/profile", Some("token-1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["member"]["member_number"], "M0042");
    assert_eq!(body["member"]["roles"], json!(["member"]));
    assert_eq!(body["member"]["family_members"], json!([]));
    assert_eq!(body["member"]["failed_login_attempts"], 0);
    assert_eq!(body["freshness"], "fetched");
    assert_eq!(body["notifications"], json!([]));
}

#[tokio::test]
async fn test_profile_without_member_is_null() {
    let app = test_app();
    app.sign_in("token-1", None);

    let (status, body) = app.send(get("/api/v1/profile", Some("token-1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["member"].is_null());
    assert!(app.matcher.calls().is_empty());
}

#[tokio::test]
async fn test_second_load_served_from_cache() {
    let app = test_app();
    let principal = app.sign_in("token-1", Some("M0042"));
    app.store.link_member(principal.id, member_record("M0042"));

    let (first, _) = app.send(get("/api/v1/profile", Some("token-1"))).await;
    let (second, body) = app.send(get("/api/v1/profile", Some("token-1"))).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(body["freshness"], "fresh");
    assert_eq!(app.store.member_query_count(), 1);
}

#[tokio::test]
async fn test_concurrent_loads_share_one_fetch() {
    let app = test_app();
    let principal = app.sign_in("token-1", Some("M0042"));
    app.store.link_member(principal.id, member_record("M0042"));
    app.store.set_latency(Duration::from_millis(50));

    let (a, b, c) = tokio::join!(
        app.send(get("/api/v1/profile", Some("token-1"))),
        app.send(get("/api/v1/profile", Some("token-1"))),
        app.send(get("/api/v1/profile", Some("token-1"))),
    );

    for (status, body) in [a, b, c] {
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["member"]["member_number"], "M0042");
    }
    assert_eq!(app.store.member_query_count(), 1);
    assert!(app.matcher.calls().is_empty());
}

#[tokio::test]
async fn test_linking_failure_is_reported_not_fatal() {
    let app = test_app_with(
        RecordingMatcher::with_outcome(MatchOutcome::failed("No member found with member number M0042")),
        false,
    );
    app.sign_in("token-1", Some("M0042"));

    let (status, body) = app.send(get("/api/v1/profile", Some("token-1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["member"].is_null());
    assert_eq!(body["notifications"][0]["title"], "Profile Error");
    assert_eq!(body["notifications"][0]["severity"], "destructive");
    assert_eq!(
        body["notifications"][0]["description"],
        "No member found with member number M0042"
    );
}

#[tokio::test]
async fn test_exhausted_retries_return_unavailable() {
    let app = test_app();
    let principal = app.sign_in("token-1", Some("M0042"));
    app.store.link_member(principal.id, member_record("M0042"));
    app.store.fail_member_queries(10);

    let (status, body) = app.send(get("/api/v1/profile", Some("token-1"))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error_code"], "profile_unavailable");
    assert_eq!(notification_titles(&body), vec!["Error"]);
    assert_eq!(app.store.member_query_count(), 3);
}

#[tokio::test]
async fn test_transient_failure_recovers() {
    let app = test_app();
    let principal = app.sign_in("token-1", Some("M0042"));
    app.store.link_member(principal.id, member_record("M0042"));
    app.store.fail_member_queries(2);

    let (status, body) = app.send(get("/api/v1/profile", Some("token-1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["member"]["member_number"], "M0042");
    assert_eq!(app.store.member_query_count(), 3);
}

// =========================================================================
// Refresh, status and logout
// =========================================================================

#[tokio::test]
async fn test_refresh_refetches_after_debounce() {
    let app = test_app();
    let principal = app.sign_in("token-1", Some("M0042"));
    app.store.link_member(principal.id, member_record("M0042"));

    let (status, _) = app.send(get("/api/v1/profile", Some("token-1"))).await;
    assert_eq!(status, StatusCode::OK);

    // Burst of clicks collapses into one refetch
    for _ in 0..3 {
        let (status, body) = app.send(post("/api/v1/profile/refresh", Some("token-1"), None)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "fresh");
    }

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(app.store.member_query_count(), 2);
    assert_eq!(
        app.profiles.orchestrator().status(principal.id).await,
        FetchStatus::Fresh
    );
}

#[tokio::test]
async fn test_status_idle_before_first_load() {
    let app = test_app();
    app.sign_in("token-1", None);

    let (status, body) = app.send(get("/api/v1/profile/status", Some("token-1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "idle");
}

#[tokio::test]
async fn test_logout_ends_session_and_clears_cache() {
    let app = test_app();
    let principal = app.sign_in("token-1", Some("M0042"));
    app.store.link_member(principal.id, member_record("M0042"));

    let (status, _) = app.send(get("/api/v1/profile", Some("token-1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.profiles.orchestrator().len().await, 1);

    let (status, _) = app.send(post("/api/v1/auth/logout", Some("token-1"), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(app.profiles.orchestrator().is_empty().await);

    let (status, body) = app.send(get("/api/v1/profile", Some("token-1"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "session_expired");
}

// =========================================================================
// GET /profile/payments/summary
// =========================================================================

#[tokio::test]
async fn test_payment_summary() {
    let app = test_app();
    let principal = app.sign_in("token-1", Some("M0042"));

    let payment = |amount, status: &str, method: &str| PaymentRequest {
        id: Uuid::new_v4(),
        payment_type: Some("yearly".to_string()),
        payment_method: Some(method.to_string()),
        amount: Some(amount),
        status: Some(status.to_string()),
        created_at: Some(chrono::Utc::now()),
        payment_number: None,
    };
    let record = MemberRecord {
        payment_requests: Some(vec![
            payment(dec!(40.00), "approved", "cash"),
            payment(dec!(20.50), "pending", "bank_transfer"),
        ]),
        ..member_record("M0042")
    };
    app.store.link_member(principal.id, record);

    let (status, body) = app
        .send(get("/api/v1/profile/payments/summary", Some("token-1")))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_payments"], 2);
    assert_eq!(body["pending_payments"], 1);
    assert_eq!(body["approved_payments"], 1);
    assert_eq!(body["payment_methods"]["cash"], 1);
    assert_eq!(body["payment_methods"]["bank_transfer"], 1);
}

#[tokio::test]
async fn test_payment_summary_without_member_is_empty() {
    let app = test_app();
    app.sign_in("token-1", None);

    let (status, body) = app
        .send(get("/api/v1/profile/payments/summary", Some("token-1")))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_payments"], 0);
    assert_eq!(body["recent_payments"], json!([]));
}

// =========================================================================
// Password reset (public)
// =========================================================================

#[tokio::test]
async fn test_password_reset_needs_no_session() {
    let app = test_app();

    let (status, body) = app
        .send(post(
            "/api/v1/password-reset",
            None,
            Some(json!({ "member_number": "  ", "email": "amina@example.org" })),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_member_number");
}

#[tokio::test]
async fn test_password_reset_rejects_bad_email() {
    let app = test_app();

    let (status, body) = app
        .send(post(
            "/api/v1/password-reset",
            None,
            Some(json!({ "member_number": "M0042", "email": "amina@" })),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_email");
}

// =========================================================================
// Admin and maintenance
// =========================================================================

#[tokio::test]
async fn test_admin_routes_forbidden_for_members() {
    let app = test_app();
    let principal = app.sign_in("token-1", None);
    app.store.assign_role(principal.id, "member");

    for uri in [
        "/api/v1/admin/maintenance",
        "/api/v1/admin/system-health",
        "/api/v1/admin/audit-logs",
    ] {
        let (status, body) = app.send(get(uri, Some("token-1"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
        assert_eq!(body["error_code"], "forbidden");
    }
}

#[tokio::test]
async fn test_maintenance_mode_blocks_members() {
    let app = test_app_with(RecordingMatcher::succeeding(), true);
    let principal = app.sign_in("token-1", Some("M0042"));
    app.store.link_member(principal.id, member_record("M0042"));

    let (status, body) = app.send(get("/api/v1/profile", Some("token-1"))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error_code"], "maintenance_mode");
    assert_eq!(app.store.member_query_count(), 0);
}

#[tokio::test]
async fn test_maintenance_mode_lets_admins_through() {
    let app = test_app_with(RecordingMatcher::succeeding(), true);
    let principal = app.sign_in("token-1", Some("M0042"));
    app.store.link_member(principal.id, member_record("M0042"));
    app.store.assign_role(principal.id, ADMIN_ROLE);

    let (status, body) = app.send(get("/api/v1/profile", Some("token-1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["member"]["roles"], json!([ADMIN_ROLE]));
}

#[tokio::test]
async fn test_maintenance_mode_leaves_password_reset_open() {
    let app = test_app_with(RecordingMatcher::succeeding(), true);

    let (status, body) = app
        .send(post(
            "/api/v1/password-reset",
            None,
            Some(json!({ "member_number": "", "email": "amina@example.org" })),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_member_number");
}
