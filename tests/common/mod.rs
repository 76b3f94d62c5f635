//! Common test utilities
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use tower::util::ServiceExt;
use uuid::Uuid;

use welfare_members::api::{build_router, AppState};
use welfare_members::domain::{MemberProfile, MemberRecord, Principal};
use welfare_members::email::{EmailRelay, OutboundEmail, RelayError};
use welfare_members::handlers::PasswordResetSettings;
use welfare_members::maintenance::MaintenanceService;
use welfare_members::profile::memory::{InMemoryProfileStore, RecordingMatcher, StaticAuthProvider};
use welfare_members::profile::{FetchPolicy, ProfileService};
use welfare_members::store::hash_token;

// =========================================================================
// In-process application
// =========================================================================

/// Relay that keeps queued mail in memory
#[derive(Default)]
pub struct RecordingRelay {
    pub sent: Mutex<Vec<OutboundEmail>>,
}

#[async_trait]
impl EmailRelay for RecordingRelay {
    async fn enqueue(&self, _conn: &mut PgConnection, email: OutboundEmail) -> Result<Uuid, RelayError> {
        email.validate()?;
        self.sent.lock().unwrap().push(email);
        Ok(Uuid::new_v4())
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryProfileStore>,
    pub auth: Arc<StaticAuthProvider>,
    pub matcher: Arc<RecordingMatcher>,
    pub profiles: Arc<ProfileService>,
}

/// Pool that never connects; routes backed by Postgres fail fast on it
pub fn lazy_pool() -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(200))
        .connect_lazy("postgres://nobody@127.0.0.1:1/welfare_members_test")
        .unwrap()
}

/// Production windows with short retry and debounce timers
pub fn fast_policy() -> FetchPolicy {
    FetchPolicy {
        backoff_base: Duration::from_millis(10),
        backoff_cap: Duration::from_millis(50),
        refetch_debounce: Duration::from_millis(20),
        ..FetchPolicy::default()
    }
}

pub fn test_app() -> TestApp {
    test_app_with(RecordingMatcher::succeeding(), false)
}

pub fn test_app_with(matcher: RecordingMatcher, maintenance_enabled: bool) -> TestApp {
    let pool = lazy_pool();
    let store = Arc::new(InMemoryProfileStore::new());
    let auth = Arc::new(StaticAuthProvider::new());
    let matcher = Arc::new(matcher);

    let profiles = Arc::new(ProfileService::new(
        auth.clone(),
        store.clone(),
        matcher.clone(),
        fast_policy(),
    ));

    let state = AppState {
        pool: pool.clone(),
        profiles: profiles.clone(),
        relay: Arc::new(RecordingRelay::default()),
        maintenance: MaintenanceService::with_initial_state(pool, maintenance_enabled),
        password_reset: PasswordResetSettings {
            base_url: "http://localhost:5173".to_string(),
            token_ttl: ChronoDuration::hours(1),
        },
    };

    TestApp {
        router: build_router(state),
        store,
        auth,
        matcher,
        profiles,
    }
}

impl TestApp {
    /// Issue `token` for a fresh principal carrying `member_number` as its
    /// sign-up hint
    pub fn sign_in(&self, token: &str, member_number: Option<&str>) -> Principal {
        let mut principal = Principal::new(Uuid::new_v4());
        if let Some(number) = member_number {
            principal = principal.with_metadata("member_number", number);
        }
        self.auth.issue(token, principal.clone());
        principal
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        send(&self.router, request).await
    }
}

pub fn member_profile(member_number: &str) -> MemberProfile {
    MemberProfile {
        id: Uuid::new_v4(),
        member_number: member_number.to_string(),
        full_name: format!("Member {}", member_number),
        email: Some(format!("{}@example.org", member_number.to_lowercase())),
        phone: None,
        address: None,
        town: Some("Burton".to_string()),
        postcode: None,
        status: Some("active".to_string()),
        date_of_birth: None,
        gender: None,
        marital_status: None,
        collector: None,
        photo_url: None,
        membership_type: Some("standard".to_string()),
        payment_date: None,
        yearly_payment_status: None,
        yearly_payment_due_date: None,
        yearly_payment_amount: None,
        emergency_collection_status: None,
        emergency_collection_amount: None,
        emergency_collection_due_date: None,
        updated_at: Utc::now(),
    }
}

pub fn member_record(member_number: &str) -> MemberRecord {
    MemberRecord::new(member_profile(member_number))
}

// =========================================================================
// Requests
// =========================================================================

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    request("GET", uri, token, None)
}

pub fn post(uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    request("POST", uri, token, body)
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let body = match body {
        Some(json) => Body::from(json.to_string()),
        None => Body::empty(),
    };
    builder.body(body).unwrap()
}

/// Status and JSON body (`Null` when the body is empty or not JSON)
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

// =========================================================================
// Postgres
// =========================================================================

pub const TEST_TOKEN: &str = "test-session-token";

/// Seeded rows of [`setup_test_db`]
pub struct Seed {
    pub user_id: Uuid,
    pub member_id: Uuid,
    pub member_number: String,
}

/// Setup test database - truncate tables and seed one principal with a
/// session, a sign-up audit row and an unlinked member
pub async fn setup_test_db() -> (PgPool, Seed) {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    let mut tx = pool.begin().await.expect("Failed to begin transaction");

    sqlx::query(
        r#"
        TRUNCATE TABLE payment_requests, member_notes, family_members, password_reset_tokens,
                       members, members_collectors, email_audit, user_roles, auth_sessions,
                       auth_users, email_outbox, audit_logs, maintenance_history CASCADE
        "#,
    )
    .execute(&mut *tx)
    .await
    .expect("Failed to clean up DB");

    let seed = Seed {
        user_id: Uuid::new_v4(),
        member_id: Uuid::new_v4(),
        member_number: "M0042".to_string(),
    };

    sqlx::query("INSERT INTO auth_users (id, email, raw_user_meta_data) VALUES ($1, $2, $3)")
        .bind(seed.user_id)
        .bind("m0042@example.org")
        .bind(serde_json::json!({ "member_number": seed.member_number }))
        .execute(&mut *tx)
        .await
        .expect("Failed to seed user");

    sqlx::query(
        r#"
        INSERT INTO auth_sessions (id, user_id, token_hash, expires_at)
        VALUES ($1, $2, $3, NOW() + INTERVAL '1 hour')
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(seed.user_id)
    .bind(hash_token(TEST_TOKEN))
    .execute(&mut *tx)
    .await
    .expect("Failed to seed session");

    sqlx::query("INSERT INTO email_audit (auth_user_id, member_number) VALUES ($1, $2)")
        .bind(seed.user_id)
        .bind(&seed.member_number)
        .execute(&mut *tx)
        .await
        .expect("Failed to seed email audit");

    sqlx::query(
        r#"
        INSERT INTO members (id, member_number, full_name, email)
        VALUES ($1, $2, 'Amina Khan', 'm0042@example.org')
        "#,
    )
    .bind(seed.member_id)
    .bind(&seed.member_number)
    .execute(&mut *tx)
    .await
    .expect("Failed to seed member");

    sqlx::query(
        r#"
        INSERT INTO payment_requests (member_number, payment_type, payment_method, amount, status)
        VALUES ($1, 'yearly', 'cash', 40.00, 'approved')
        "#,
    )
    .bind(&seed.member_number)
    .execute(&mut *tx)
    .await
    .expect("Failed to seed payment");

    tx.commit().await.expect("Failed to commit seed");

    (pool, seed)
}
